// Builds the human-readable alert texts.
//
// Composition is pure: the caller resolves time, position and address first,
// so every degrade path (no address, no fix) is decided here from plain values.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::core::model::{AlertMessage, Position};

pub const LOCATION_UNAVAILABLE: &str = "Location unavailable";

const ALERT_TIME_FORMAT: &str = "%d/%m/%Y, %I:%M:%S %p";
const UPDATE_TIME_FORMAT: &str = "%I:%M:%S %p";

/// Header and map link settings - persisted in settings.json
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertSettings {
    pub header: String,
    pub map_base_url: String,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            header: "🚨 EMERGENCY ALERT from SafeHer".to_string(),
            map_base_url: "https://maps.google.com/?q=".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MessageComposer {
    settings: AlertSettings,
}

impl MessageComposer {
    pub fn new(settings: AlertSettings) -> Self {
        Self { settings }
    }

    /// Compose the initial distress message.
    ///
    /// Without a valid position the location line falls back to a fixed
    /// placeholder while the map link still uses the (zero) coordinates.
    pub fn compose_alert(
        &self,
        at: NaiveDateTime,
        position: Option<&Position>,
        address: Option<&str>,
    ) -> AlertMessage {
        let position = position.copied().unwrap_or_else(Position::unknown);

        let location_text = if !position.is_valid() {
            LOCATION_UNAVAILABLE.to_string()
        } else {
            match address.map(str::trim).filter(|a| !a.is_empty()) {
                Some(address) => address.to_string(),
                None => format!(
                    "Lat: {}, Lon: {}",
                    format_coordinate(position.latitude),
                    format_coordinate(position.longitude)
                ),
            }
        };

        AlertMessage::new(format!(
            "{}\nI need help! Time: {}\nLoc: {}\nMap: {}",
            self.settings.header,
            at.format(ALERT_TIME_FORMAT),
            location_text,
            self.map_link(&position)
        ))
    }

    /// Compose the shorter re-alert sent when the user has moved.
    pub fn compose_movement_update(&self, at: NaiveDateTime, position: &Position) -> AlertMessage {
        AlertMessage::new(format!(
            "🚶 Location update: {}\nTime: {}",
            self.map_link(position),
            at.format(UPDATE_TIME_FORMAT)
        ))
    }

    fn map_link(&self, position: &Position) -> String {
        format!(
            "{}{},{}",
            self.settings.map_base_url,
            format_coordinate(position.latitude),
            format_coordinate(position.longitude)
        )
    }
}

/// Plain decimal with at least one fractional digit: `0.0`, `12.9716`.
pub fn format_coordinate(value: f64) -> String {
    if !value.is_finite() {
        return "0.0".to_string();
    }
    let text = value.to_string();
    if text.contains('.') {
        text
    } else {
        format!("{}.0", text)
    }
}
