//! Voice command recognition.
//!
//! An ordered table of case-insensitive patterns; the first pattern that
//! matches a final transcription decides what the display does. Order
//! matters: the catch-all help pattern sits last.

use std::time::Duration;

use chrono::NaiveTime;
use regex::{Regex, RegexBuilder};

use oled_core::{BridgeError, WireCommand};

use crate::session::Feedback;

/// What a recognised utterance asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceIntent {
    ShowText,
    ShowTemperature,
    ShowTime,
    Weather,
    Forecast,
    Logo,
    Directions,
    ClearScreen,
    Help,
}

impl VoiceIntent {
    pub fn description(self) -> &'static str {
        match self {
            Self::ShowText => "Show text on display",
            Self::ShowTemperature => "Show temperature with degree symbol",
            Self::ShowTime => "Show current time",
            Self::Weather => "Show weather demo",
            Self::Forecast => "Show weather forecast with symbols",
            Self::Logo => "Show logo",
            Self::Directions => "Show direction arrows",
            Self::ClearScreen => "Clear screen",
            Self::Help => "Show help",
        }
    }
}

const PATTERNS: &[(&str, VoiceIntent)] = &[
    (r"(?:show|display) text\s+(.+)", VoiceIntent::ShowText),
    (r"(?:show|display) temperature", VoiceIntent::ShowTemperature),
    (r"(?:show|display|set) time", VoiceIntent::ShowTime),
    (r"(?:show|display) weather", VoiceIntent::Weather),
    (r"(?:show|display) forecast", VoiceIntent::Forecast),
    (r"(?:show|display) logo", VoiceIntent::Logo),
    (r"(?:show|display) directions", VoiceIntent::Directions),
    (r"(?:clear|clean) (?:screen|display)", VoiceIntent::ClearScreen),
    (r"(?:help|show help|commands|show commands)", VoiceIntent::Help),
];

/// A matched utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceMatch {
    pub intent: VoiceIntent,
    /// First capture group, if the pattern has one.
    pub argument: Option<String>,
}

/// Everything one recognised command does, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandPlan {
    pub commands: Vec<WireCommand>,
    /// Value for the dashboard's "Last Displayed" item.
    pub dashboard_text: String,
    pub feedback: Feedback,
}

#[derive(Debug)]
pub struct VoiceMatcher {
    table: Vec<(Regex, VoiceIntent)>,
}

impl VoiceMatcher {
    pub fn new() -> Result<Self, BridgeError> {
        let table = PATTERNS
            .iter()
            .map(|(pattern, intent)| {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map(|re| (re, *intent))
                    .map_err(|e| BridgeError::Other(format!("bad voice pattern {pattern}: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { table })
    }

    /// First entry whose pattern occurs anywhere in `text`.
    pub fn recognize(&self, text: &str) -> Option<VoiceMatch> {
        self.table.iter().find_map(|(re, intent)| {
            re.captures(text).map(|caps| VoiceMatch {
                intent: *intent,
                argument: caps.get(1).map(|m| m.as_str().to_string()),
            })
        })
    }

    /// Descriptions of every entry, in table order.
    pub fn descriptions(&self) -> Vec<&'static str> {
        self.table.iter().map(|(_, intent)| intent.description()).collect()
    }

    /// Commands and feedback for a match. `now` is only read by
    /// [`VoiceIntent::ShowTime`].
    pub fn plan(&self, matched: &VoiceMatch, now: NaiveTime) -> CommandPlan {
        let wall = |text: String, secs: u64| Feedback::TextWall {
            text,
            duration: Duration::from_secs(secs),
        };

        match matched.intent {
            VoiceIntent::ShowText => {
                let text = matched.argument.clone().unwrap_or_default();
                CommandPlan {
                    commands: vec![WireCommand::text_xy(text.as_str(), 0, 0)],
                    feedback: wall(format!("Displaying: {text}"), 3),
                    dashboard_text: text,
                }
            }
            VoiceIntent::ShowTemperature => CommandPlan {
                commands: vec![WireCommand::text_xy("Temp: 72\\deg F", 30, 20)],
                dashboard_text: "Temp: 72°F".into(),
                feedback: wall("Temperature: 72°F".into(), 3),
            },
            VoiceIntent::ShowTime => {
                let time = now.format("%-I:%M:%S %p").to_string();
                CommandPlan {
                    commands: vec![WireCommand::Text(time.clone())],
                    feedback: wall(format!("Time: {time}"), 3),
                    dashboard_text: time,
                }
            }
            VoiceIntent::Weather => CommandPlan {
                commands: vec![WireCommand::Weather],
                dashboard_text: "Weather demo".into(),
                feedback: wall("Weather demo displayed".into(), 3),
            },
            VoiceIntent::Forecast => CommandPlan {
                commands: vec![
                    WireCommand::Clear,
                    WireCommand::text_xy("Now: 72\\deg F", 5, 5),
                    WireCommand::text_xy("Today: 68-75\\deg F \\up", 5, 15),
                    WireCommand::text_xy("Tomorrow: 65-70\\deg F \\down", 5, 25),
                    WireCommand::text_xy("Wind: NE 5mph \\right", 5, 35),
                ],
                dashboard_text: "Weather Forecast".into(),
                feedback: wall("Weather forecast displayed with special symbols".into(), 3),
            },
            VoiceIntent::Logo => CommandPlan {
                commands: vec![WireCommand::Logo],
                dashboard_text: "Logo".into(),
                feedback: wall("Logo displayed".into(), 2),
            },
            VoiceIntent::Directions => CommandPlan {
                commands: vec![WireCommand::Directions],
                dashboard_text: "Direction arrows".into(),
                feedback: wall("Direction arrows displayed".into(), 3),
            },
            VoiceIntent::ClearScreen => CommandPlan {
                commands: vec![WireCommand::Clear],
                dashboard_text: "Screen cleared".into(),
                feedback: wall("Display cleared".into(), 2),
            },
            VoiceIntent::Help => CommandPlan {
                commands: vec![WireCommand::Help],
                dashboard_text: "Help displayed".into(),
                feedback: Feedback::ReferenceCard {
                    title: "Available Voice Commands".into(),
                    body: self.descriptions().join("\n"),
                    duration: Duration::from_secs(10),
                },
            },
        }
    }
}
