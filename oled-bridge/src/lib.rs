//! # oled-bridge: wearable-to-OLED bridge service
//!
//! Drives a serial OLED display from wearable session events: voice
//! commands, button presses and session lifecycle. Runs a small HTTP
//! status endpoint next to the event loop.
//!
//! ## Modules
//!
//! - **config**: TOML configuration with environment overrides.
//! - **session**: event types, the wearable surface, and the handler.
//! - **voice**: ordered voice command table.
//! - **dashboard**: the wearable's dashboard document.
//! - **search**: web search summarised for the panel.
//! - **status**: `GET /status`.
//! - **service**: ties the event stream and status endpoint together.

pub mod config;
pub mod dashboard;
pub mod search;
pub mod service;
pub mod session;
pub mod status;
pub mod voice;
