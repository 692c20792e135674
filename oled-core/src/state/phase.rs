//! Lifecycle of the display link as seen by the supervisor.
//!
//! Transitions are validated and return `Result` instead of panicking.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::BridgeError;

// ── LinkPhase ────────────────────────────────────────────────────

/// ```text
///  Uninitialized ──► Opening ──► Open
///                      ▲  │        │
///                      │  ▼        ▼
///                Closed { auto_reconnect: true }
///
///  any ──► Closed { auto_reconnect: false }   (shutdown)
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LinkPhase {
    /// Supervisor created, device never opened.
    #[default]
    Uninitialized,

    /// An open attempt (plus reset sequence) is in flight.
    Opening,

    /// Device open and reset; commands go straight to the wire.
    Open {
        /// When the link entered the `Open` state.
        since: Instant,
    },

    /// Device not available. With `auto_reconnect: false` this is
    /// terminal.
    Closed { auto_reconnect: bool },
}

impl fmt::Display for LinkPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "Uninitialized"),
            Self::Opening => write!(f, "Opening"),
            Self::Open { .. } => write!(f, "Open"),
            Self::Closed {
                auto_reconnect: true,
            } => write!(f, "Closed (reconnecting)"),
            Self::Closed {
                auto_reconnect: false,
            } => write!(f, "Closed"),
        }
    }
}

impl LinkPhase {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    /// `true` once no further open attempt will ever be made.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Closed {
                auto_reconnect: false
            }
        )
    }

    /// How long the link has been open. `None` for any other phase.
    pub fn open_duration(&self) -> Option<Duration> {
        match self {
            Self::Open { since } => Some(since.elapsed()),
            _ => None,
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Valid from: `Uninitialized`, `Closed { auto_reconnect: true }`.
    pub fn begin_open(&mut self) -> Result<(), BridgeError> {
        match self {
            Self::Uninitialized
            | Self::Closed {
                auto_reconnect: true,
            } => {
                *self = Self::Opening;
                Ok(())
            }
            _ => Err(BridgeError::InvalidTransition(
                "cannot open: link is not idle",
            )),
        }
    }

    /// Valid from: `Opening`.
    pub fn mark_open(&mut self) -> Result<(), BridgeError> {
        match self {
            Self::Opening => {
                *self = Self::Open {
                    since: Instant::now(),
                };
                Ok(())
            }
            _ => Err(BridgeError::InvalidTransition(
                "cannot mark open: not in Opening state",
            )),
        }
    }

    /// Valid from: `Opening`.
    pub fn open_failed(&mut self, auto_reconnect: bool) -> Result<(), BridgeError> {
        match self {
            Self::Opening => {
                *self = Self::Closed { auto_reconnect };
                Ok(())
            }
            _ => Err(BridgeError::InvalidTransition(
                "cannot fail open: not in Opening state",
            )),
        }
    }

    /// The device went away while in use. Valid from: `Open`.
    pub fn link_lost(&mut self, auto_reconnect: bool) -> Result<(), BridgeError> {
        match self {
            Self::Open { .. } => {
                *self = Self::Closed { auto_reconnect };
                Ok(())
            }
            _ => Err(BridgeError::InvalidTransition(
                "cannot lose link: not in Open state",
            )),
        }
    }

    /// Explicit shutdown; valid from any state.
    pub fn shut_down(&mut self) {
        *self = Self::Closed {
            auto_reconnect: false,
        };
    }
}

// ── Tests ────────────────────────────────────────────────────────
