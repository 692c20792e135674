//! Newline-delimited ASCII framing for the display link.
//!
//! Outbound: one [`WireCommand`] per line, terminated with `\n`.
//! Inbound: free-form reply lines from the firmware (advisory only).

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::command::WireCommand;
use crate::error::BridgeError;

/// Longest inbound line kept before the buffer is discarded.
pub const MAX_LINE_LENGTH: usize = 1024;

#[derive(Debug, Default, Clone, Copy)]
pub struct LineCodec;

impl Encoder<&WireCommand> for LineCodec {
    type Error = BridgeError;

    fn encode(&mut self, item: &WireCommand, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let line = item.to_string();
        if line.contains(['\n', '\r']) {
            return Err(BridgeError::InvalidCommand(format!(
                "embedded line break in {} command",
                item.keyword()
            )));
        }
        dst.reserve(line.len() + 1);
        dst.put_slice(line.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = BridgeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(pos) = src.iter().position(|b| *b == b'\n') else {
            if src.len() > MAX_LINE_LENGTH {
                // Device is streaming garbage; drop it rather than grow forever.
                src.clear();
            }
            return Ok(None);
        };

        let line = src.split_to(pos + 1);
        let text = String::from_utf8_lossy(&line[..pos]);
        Ok(Some(text.trim_end_matches('\r').to_string()))
    }
}
