//! Error types for the display link and the command pipeline.
//!
//! Link-level failures (`LinkError`) are recovered locally by the
//! supervisor; only `SendError` ever reaches a caller of `send`.

use thiserror::Error;

// ── LinkError ────────────────────────────────────────────────────

/// Failures reported by the byte-stream link to the display device.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The device could not be opened (missing, permission denied, busy).
    #[error("failed to open {path}: {source}")]
    OpenFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The transport reported an I/O error while writing a command.
    #[error("write failed: {0}")]
    WriteFailed(#[source] std::io::Error),

    /// A write was attempted on a link that is not open.
    #[error("link is closed")]
    Closed,
}

// ── SendError ────────────────────────────────────────────────────

/// Terminal outcome of a `send` that did not succeed.
#[derive(Debug, Error)]
pub enum SendError {
    /// Every write attempt failed; carries the last link error.
    #[error("delivery failed after {attempts} attempts: {last_error}")]
    DeliveryFailed {
        attempts: u32,
        #[source]
        last_error: LinkError,
    },

    /// The command cannot be framed as a single line; never retried.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// The command was still queued when the supervisor shut down.
    #[error("queued command abandoned on shutdown")]
    QueueAbandoned,

    /// The supervisor task is gone; nothing can be sent any more.
    #[error("display supervisor stopped")]
    SupervisorStopped,
}

// ── BridgeError ──────────────────────────────────────────────────

/// Umbrella error for everything outside the hot send path.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    Send(#[from] SendError),

    /// A command string could not be parsed or encoded.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// A link phase transition was requested from the wrong state.
    #[error("invalid transition: {0}")]
    InvalidTransition(&'static str),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for SendError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        SendError::SupervisorStopped
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for SendError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        SendError::SupervisorStopped
    }
}
