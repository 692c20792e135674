//! High-level drawing operations on top of the supervisor.
//!
//! Each call builds exactly one [`WireCommand`] and hands it to the send
//! pipeline; nothing here looks at what the device replies.

use tracing::warn;

use crate::command::WireCommand;
use crate::error::SendError;
use crate::supervisor::{DisplayHandle, LinkStatus};

/// Default panel size of the CFAL12856 module.
pub const DEFAULT_WIDTH: u16 = 128;
pub const DEFAULT_HEIGHT: u16 = 56;

#[derive(Debug, Clone)]
pub struct Display {
    handle: DisplayHandle,
    width: u16,
    height: u16,
}

impl Display {
    pub fn new(handle: DisplayHandle, width: u16, height: u16) -> Self {
        Self {
            handle,
            width,
            height,
        }
    }

    pub fn handle(&self) -> &DisplayHandle {
        &self.handle
    }

    pub fn size(&self) -> (u16, u16) {
        (self.width, self.height)
    }

    pub fn is_connected(&self) -> bool {
        self.handle.is_connected()
    }

    pub fn status(&self) -> LinkStatus {
        self.handle.status()
    }

    /// `textxy:{x},{y},{text}`
    pub async fn show_text(&self, text: &str, x: u16, y: u16) -> Result<(), SendError> {
        if x >= self.width || y >= self.height {
            warn!(x, y, "text origin outside the {}x{} panel", self.width, self.height);
        }
        self.send(WireCommand::text_xy(text, x, y)).await
    }

    /// `multiline:{text}`; `text` must already use literal `\n`
    /// separators (see [`escape_newlines`]).
    pub async fn show_multiline(&self, text: &str) -> Result<(), SendError> {
        self.send(WireCommand::Multiline(text.to_string())).await
    }

    /// `text:{text}` at the firmware's default position.
    pub async fn show_plain_text(&self, text: &str) -> Result<(), SendError> {
        self.send(WireCommand::Text(text.to_string())).await
    }

    pub async fn clear(&self) -> Result<(), SendError> {
        self.send(WireCommand::Clear).await
    }

    pub async fn scroll(&self, text: &str) -> Result<(), SendError> {
        self.send(WireCommand::Scroll(text.to_string())).await
    }

    pub async fn send(&self, command: WireCommand) -> Result<(), SendError> {
        self.handle.send(command).await
    }
}

/// Replace real line breaks with the two-character sequence `\n` the
/// firmware's `multiline` command expects.
pub fn escape_newlines(text: &str) -> String {
    text.replace("\r\n", "\\n").replace(['\n', '\r'], "\\n")
}
