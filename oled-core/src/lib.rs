//! # oled-core
//!
//! Connection manager for an OLED display driven by a microcontroller
//! over a serial link.
//!
//! This crate contains:
//! - **Wire types**: `WireCommand`, the newline-delimited command vocabulary
//! - **Codec**: `LineCodec` for line framing via `tokio_util`
//! - **Link**: `Link` over any `Connector` (serial in production)
//! - **Queue**: `CommandQueue` of commands waiting for the link
//! - **Send**: per-command retry with linear backoff and settle delay
//! - **Supervisor**: the single task owning the link, with reconnection
//! - **Display**: `Display` facade turning intents into commands
//! - **Error**: `LinkError`, `SendError`, `BridgeError`

pub mod codec;
pub mod command;
pub mod display;
pub mod error;
pub mod link;
pub mod queue;
pub mod send;
pub mod state;
pub mod supervisor;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use codec::LineCodec;
pub use command::WireCommand;
pub use display::{DEFAULT_HEIGHT, DEFAULT_WIDTH, Display, escape_newlines};
pub use error::{BridgeError, LinkError, SendError};
pub use link::{BoxedStream, Connector, DeviceStream, Link, LinkConfig, LinkEvent, SerialConnector};
pub use queue::{CommandQueue, PendingCommand};
pub use send::{RetryPolicy, send_with_retry};
pub use state::{LinkPhase, ReconnectSchedule};
pub use supervisor::{DisplayHandle, LinkStatus, Supervisor, SupervisorConfig};
