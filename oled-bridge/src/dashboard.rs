//! Dashboard document shown on the wearable.
//!
//! The document is plain JSON (`main` summary plus `expanded.sections`),
//! kept here and pushed to the session surface after every change.

use chrono::{DateTime, Utc};
use serde_json::{Value, json};

/// Longest "Last Displayed" value before it is shortened.
const MAX_ITEM_CHARS: usize = 20;
const KEEP_ITEM_CHARS: usize = 17;

pub const COLOR_OK: &str = "#00ff00";
pub const COLOR_DOWN: &str = "#ff0000";

#[derive(Debug, Clone)]
pub struct Dashboard {
    width: u16,
    height: u16,
    content: Value,
}

impl Dashboard {
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            content: Value::Null,
        }
    }

    pub fn content(&self) -> &Value {
        &self.content
    }

    /// Replace the document with the initial status and command overview.
    pub fn initialize(&mut self, started_at: DateTime<Utc>) {
        self.content = json!({
            "main": {
                "title": "OLED Status",
                "value": "Connected",
                "color": COLOR_OK,
            },
            "expanded": {
                "sections": [
                    {
                        "title": "OLED Display",
                        "items": [
                            { "label": "Status", "value": "Connected" },
                            { "label": "Display Size", "value": format!("{}x{}", self.width, self.height) },
                            { "label": "Interface", "value": "Serial" },
                            { "label": "Model", "value": "CFAL12856A0-0151-B" },
                            { "label": "Controller", "value": "SSD1309" },
                            { "label": "Connected Since", "value": started_at.to_rfc3339() },
                        ]
                    },
                    {
                        "title": "Available Commands",
                        "items": [
                            { "label": "Text", "value": "Display text messages" },
                            { "label": "Weather", "value": "Show weather data with symbols" },
                            { "label": "Directions", "value": "Display directional arrows" },
                            { "label": "Time", "value": "Show current time" },
                        ]
                    }
                ]
            }
        });
    }

    /// Set the headline status and mirror it into the first item of the
    /// display section.
    pub fn update_status(&mut self, status: &str, color: &str) {
        if !self.content.is_object() {
            self.content = json!({});
        }
        self.content["main"] = json!({
            "title": "OLED Status",
            "value": status,
            "color": color,
        });
        if let Some(first) = self
            .first_items_mut()
            .and_then(|items| items.first_mut())
        {
            first["value"] = json!(status);
        }
    }

    /// Record what the display last showed. Does nothing before
    /// [`initialize`](Self::initialize).
    pub fn update_display_content(&mut self, content: &str) {
        let value = shorten(content);
        let Some(items) = self.first_items_mut() else {
            return;
        };
        match items
            .iter_mut()
            .find(|item| item["label"] == "Last Displayed")
        {
            Some(item) => item["value"] = json!(value),
            None => items.push(json!({ "label": "Last Displayed", "value": value })),
        }
    }

    /// Append a `Device Info` section. Only applies while the document
    /// has exactly one section; returns whether it was added.
    pub fn add_device_info(&mut self, has_display: bool, has_microphone: bool) -> bool {
        let Some(sections) = self.sections_mut() else {
            return false;
        };
        if sections.len() != 1 {
            return false;
        }
        sections.push(json!({
            "title": "Device Info",
            "items": [
                { "label": "Has Display", "value": yes_no(has_display) },
                { "label": "Has Microphone", "value": yes_no(has_microphone) },
            ]
        }));
        true
    }

    pub fn clear(&mut self) {
        self.content = Value::Null;
    }

    fn sections_mut(&mut self) -> Option<&mut Vec<Value>> {
        self.content
            .get_mut("expanded")?
            .get_mut("sections")?
            .as_array_mut()
    }

    fn first_items_mut(&mut self) -> Option<&mut Vec<Value>> {
        self.sections_mut()?
            .first_mut()?
            .get_mut("items")?
            .as_array_mut()
    }
}

fn shorten(content: &str) -> String {
    if content.chars().count() > MAX_ITEM_CHARS {
        let head: String = content.chars().take(KEEP_ITEM_CHARS).collect();
        format!("{head}...")
    } else {
        content.to_string()
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "Yes" } else { "No" }
}
