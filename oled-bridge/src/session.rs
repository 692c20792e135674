//! Wearable session events and how they reach the display.
//!
//! Events arrive as JSON objects tagged by `type`. [`SessionHandler`]
//! turns each one into display commands, dashboard changes and feedback
//! on the wearable's own screen ([`SessionSurface`]).

use std::time::Duration;

use async_trait::async_trait;
use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

use oled_core::{BridgeError, Display, WireCommand};

use crate::dashboard::{COLOR_DOWN, COLOR_OK, Dashboard};
use crate::voice::VoiceMatcher;

// ── Events ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    SessionStart {
        #[serde(default)]
        session_id: String,
        #[serde(default)]
        user_id: String,
    },
    Transcription {
        text: String,
        #[serde(default)]
        is_final: bool,
    },
    ButtonPress {
        button: String,
    },
    Capabilities {
        #[serde(default)]
        has_display: bool,
        #[serde(default)]
        has_microphone: bool,
    },
    SessionEnd,
}

impl SessionEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionStart { .. } => "session_start",
            Self::Transcription { .. } => "transcription",
            Self::ButtonPress { .. } => "button_press",
            Self::Capabilities { .. } => "capabilities",
            Self::SessionEnd => "session_end",
        }
    }
}

// ── Surface ──────────────────────────────────────────────────────

/// Something shown on the wearable itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Feedback {
    TextWall {
        text: String,
        duration: Duration,
    },
    ReferenceCard {
        title: String,
        body: String,
        duration: Duration,
    },
}

/// The wearable's own screen and dashboard.
#[async_trait]
pub trait SessionSurface: Send + Sync {
    async fn show_text_wall(&self, text: &str, duration: Duration) -> Result<(), BridgeError>;

    async fn show_reference_card(
        &self,
        title: &str,
        body: &str,
        duration: Duration,
    ) -> Result<(), BridgeError>;

    async fn publish_dashboard(&self, content: &Value) -> Result<(), BridgeError>;

    async fn clear_dashboard(&self) -> Result<(), BridgeError>;

    async fn present(&self, feedback: &Feedback) -> Result<(), BridgeError> {
        match feedback {
            Feedback::TextWall { text, duration } => self.show_text_wall(text, *duration).await,
            Feedback::ReferenceCard {
                title,
                body,
                duration,
            } => self.show_reference_card(title, body, *duration).await,
        }
    }
}

/// Surface that only writes to the log. Used when no wearable is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSurface;

#[async_trait]
impl SessionSurface for LogSurface {
    async fn show_text_wall(&self, text: &str, duration: Duration) -> Result<(), BridgeError> {
        info!(duration_ms = duration.as_millis() as u64, "text wall: {text}");
        Ok(())
    }

    async fn show_reference_card(
        &self,
        title: &str,
        body: &str,
        duration: Duration,
    ) -> Result<(), BridgeError> {
        info!(duration_ms = duration.as_millis() as u64, "reference card {title}: {body}");
        Ok(())
    }

    async fn publish_dashboard(&self, content: &Value) -> Result<(), BridgeError> {
        info!("dashboard: {content}");
        Ok(())
    }

    async fn clear_dashboard(&self) -> Result<(), BridgeError> {
        info!("dashboard cleared");
        Ok(())
    }
}

// ── Handler ──────────────────────────────────────────────────────

/// Result of a recognised voice command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceOutcome {
    pub command: &'static str,
    pub error: Option<String>,
}

pub struct SessionHandler<S> {
    display: Display,
    dashboard: Dashboard,
    matcher: VoiceMatcher,
    surface: S,
}

impl<S: SessionSurface> SessionHandler<S> {
    pub fn new(display: Display, matcher: VoiceMatcher, surface: S) -> Self {
        let (width, height) = display.size();
        Self {
            display,
            dashboard: Dashboard::new(width, height),
            matcher,
            surface,
        }
    }

    pub fn display(&self) -> &Display {
        &self.display
    }

    pub fn dashboard(&self) -> &Dashboard {
        &self.dashboard
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Handle one event. Failures are logged, never returned.
    pub async fn handle(&mut self, event: SessionEvent) {
        let kind = event.kind();
        if let Err(e) = self.dispatch(event).await {
            error!(event = kind, "session handler failed: {e}");
        }
    }

    async fn dispatch(&mut self, event: SessionEvent) -> Result<(), BridgeError> {
        match event {
            SessionEvent::SessionStart {
                session_id,
                user_id,
            } => {
                info!(%session_id, %user_id, "session started");
                self.on_start().await
            }
            SessionEvent::Transcription { text, is_final } => {
                if !is_final {
                    return Ok(());
                }
                info!("final transcription: {text:?}");
                match self.on_transcription(&text).await? {
                    Some(outcome) => {
                        if let Some(e) = &outcome.error {
                            error!(command = outcome.command, "voice command failed: {e}");
                        }
                    }
                    None => {
                        info!("no command recognized");
                        self.surface
                            .show_text_wall(
                                "No command recognized. Say \"help\" for commands.",
                                Duration::from_secs(3),
                            )
                            .await?;
                    }
                }
                Ok(())
            }
            SessionEvent::ButtonPress { button } => self.on_button(&button).await,
            SessionEvent::Capabilities {
                has_display,
                has_microphone,
            } => {
                info!(has_display, has_microphone, "capabilities received");
                if self.dashboard.add_device_info(has_display, has_microphone) {
                    self.surface.publish_dashboard(self.dashboard.content()).await?;
                }
                Ok(())
            }
            SessionEvent::SessionEnd => {
                info!("session ended");
                self.display.show_text("Session Disconnected", 10, 20).await?;
                self.dashboard.clear();
                self.surface.clear_dashboard().await
            }
        }
    }

    async fn on_start(&mut self) -> Result<(), BridgeError> {
        // The greeting below waits for the link, so read liveness first.
        let connected = self.display.is_connected();
        self.dashboard.initialize(Utc::now());
        if connected {
            self.dashboard.update_status("Connected", COLOR_OK);
        } else {
            self.dashboard.update_status("Disconnected", COLOR_DOWN);
        }
        self.surface.publish_dashboard(self.dashboard.content()).await?;

        self.display.show_text("Session Connected!", 10, 10).await?;
        self.surface
            .show_text_wall("OLED Display App Ready", Duration::from_secs(5))
            .await
    }

    /// Run the voice matcher on a final transcription. `None` when
    /// nothing matched; display errors are reported in the outcome.
    pub async fn on_transcription(
        &mut self,
        text: &str,
    ) -> Result<Option<VoiceOutcome>, BridgeError> {
        let Some(matched) = self.matcher.recognize(text) else {
            return Ok(None);
        };
        let command = matched.intent.description();
        info!("matched command: {command}");

        let plan = self.matcher.plan(&matched, Local::now().time());
        for wire in plan.commands {
            if let Err(e) = self.display.send(wire).await {
                return Ok(Some(VoiceOutcome {
                    command,
                    error: Some(e.to_string()),
                }));
            }
        }

        self.dashboard.update_display_content(&plan.dashboard_text);
        self.surface.publish_dashboard(self.dashboard.content()).await?;
        self.surface.present(&plan.feedback).await?;

        Ok(Some(VoiceOutcome {
            command,
            error: None,
        }))
    }

    async fn on_button(&mut self, button: &str) -> Result<(), BridgeError> {
        info!("button pressed: {button}");
        let label = match button {
            "SELECT" => {
                self.display.clear().await?;
                self.display.show_text("Button: SELECT", 10, 10).await?;
                "SELECT Button"
            }
            "BACK" => {
                self.display.send(WireCommand::ShowIndex).await?;
                "Index Screen"
            }
            "UP" => {
                self.display.send(WireCommand::Directions).await?;
                "Directions"
            }
            "DOWN" => {
                self.display.send(WireCommand::Weather).await?;
                "Weather"
            }
            other => {
                warn!("ignoring unknown button {other}");
                return Ok(());
            }
        };

        self.dashboard.update_display_content(label);
        self.surface.publish_dashboard(self.dashboard.content()).await?;
        self.surface
            .show_text_wall(&format!("{button} Button Pressed"), Duration::from_secs(2))
            .await
    }
}
