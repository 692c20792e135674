//! Wire command vocabulary understood by the display firmware.
//!
//! Every command renders to exactly one line of ASCII text; the line
//! terminator is added by [`LineCodec`](crate::codec::LineCodec).

use std::fmt;
use std::str::FromStr;

use crate::error::BridgeError;

// ── WireCommand ──────────────────────────────────────────────────

/// A single command sent to the microcontroller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WireCommand {
    // ── Bare keywords ────────────────────────────────────────────
    /// Reset the display controller.
    Reset,
    /// Blank the screen.
    Clear,
    /// Show the firmware's built-in help page.
    Help,
    /// Show the logo bitmap.
    Logo,
    /// Show the weather demo screen.
    Weather,
    /// Show the direction arrows demo screen.
    Directions,
    /// Show the index screen.
    ShowIndex,

    // ── Parameterised ────────────────────────────────────────────
    /// Draw `text` at pixel position (`x`, `y`).
    TextXy { x: u16, y: u16, text: String },
    /// Draw `text` at the firmware's default position.
    Text(String),
    /// Draw text containing literal `\n` line separators.
    Multiline(String),
    /// Scroll `text` across the screen.
    Scroll(String),
}

impl WireCommand {
    /// Convenience constructor for [`WireCommand::TextXy`].
    pub fn text_xy(text: impl Into<String>, x: u16, y: u16) -> Self {
        Self::TextXy {
            x,
            y,
            text: text.into(),
        }
    }

    /// The keyword in front of the first `:` (or the whole bare command).
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Reset => "reset",
            Self::Clear => "clear",
            Self::Help => "help",
            Self::Logo => "logo",
            Self::Weather => "weather",
            Self::Directions => "directions",
            Self::ShowIndex => "show_index",
            Self::TextXy { .. } => "textxy",
            Self::Text(_) => "text",
            Self::Multiline(_) => "multiline",
            Self::Scroll(_) => "scroll",
        }
    }
}

impl fmt::Display for WireCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TextXy { x, y, text } => write!(f, "textxy:{x},{y},{text}"),
            Self::Text(text) => write!(f, "text:{text}"),
            Self::Multiline(text) => write!(f, "multiline:{text}"),
            Self::Scroll(text) => write!(f, "scroll:{text}"),
            bare => f.write_str(bare.keyword()),
        }
    }
}

impl FromStr for WireCommand {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim_end_matches(['\r', '\n']);
        let (keyword, arg) = match s.split_once(':') {
            Some((k, a)) => (k, Some(a)),
            None => (s, None),
        };

        match (keyword, arg) {
            ("reset", None) => Ok(Self::Reset),
            ("clear", None) => Ok(Self::Clear),
            ("help", None) => Ok(Self::Help),
            ("logo", None) => Ok(Self::Logo),
            ("weather", None) => Ok(Self::Weather),
            ("directions", None) => Ok(Self::Directions),
            ("show_index", None) => Ok(Self::ShowIndex),
            ("text", Some(text)) => Ok(Self::Text(text.to_string())),
            ("multiline", Some(text)) => Ok(Self::Multiline(text.to_string())),
            ("scroll", Some(text)) => Ok(Self::Scroll(text.to_string())),
            ("textxy", Some(rest)) => {
                let mut parts = rest.splitn(3, ',');
                let (Some(x), Some(y), Some(text)) = (parts.next(), parts.next(), parts.next())
                else {
                    return Err(BridgeError::InvalidCommand(format!(
                        "textxy needs x,y,text: {s}"
                    )));
                };
                let x = x
                    .trim()
                    .parse()
                    .map_err(|_| BridgeError::InvalidCommand(format!("bad x coordinate: {x}")))?;
                let y = y
                    .trim()
                    .parse()
                    .map_err(|_| BridgeError::InvalidCommand(format!("bad y coordinate: {y}")))?;
                Ok(Self::TextXy {
                    x,
                    y,
                    text: text.to_string(),
                })
            }
            _ => Err(BridgeError::InvalidCommand(s.to_string())),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
