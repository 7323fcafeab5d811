use std::path::PathBuf;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;

use super::alerts::composer::AlertSettings;
use super::alerts::fanout::DEFAULT_COUNTRY_PREFIX;
use super::alerts::segment::SegmentLimits;
use super::model::{ContactList, Position};
use super::monitor::{MonitorConfig, MonitorSettings};
use super::orchestrator::{DispatchSettings, DispatchTimings};

/// Application settings.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Settings {
    /// Emergency contacts, comma-delimited as the contacts screen stores them
    #[serde(default)]
    pub contacts: String,
    #[serde(default = "default_country_prefix")]
    pub default_country_prefix: String,
    #[serde(default)]
    pub alert: AlertSettings,
    #[serde(default)]
    pub dispatch: DispatchSettings,
    #[serde(default)]
    pub monitor: MonitorSettings,
    #[serde(default)]
    pub segments: SegmentLimits,
    /// Only read by the headless host binary
    #[serde(default)]
    pub host: HostSettings,
}

fn default_country_prefix() -> String {
    DEFAULT_COUNTRY_PREFIX.to_string()
}

/// Stand-ins for platform state when running without a phone.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct HostSettings {
    pub send_allowed: bool,
    pub location_allowed: bool,
    pub position: Option<Position>,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            send_allowed: true,
            location_allowed: true,
            position: None,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            contacts: String::new(),
            default_country_prefix: default_country_prefix(),
            alert: AlertSettings::default(),
            dispatch: DispatchSettings::default(),
            monitor: MonitorSettings::default(),
            segments: SegmentLimits::default(),
            host: HostSettings::default(),
        }
    }
}

impl Settings {
    pub fn contact_list(&self) -> ContactList {
        ContactList::parse(&self.contacts)
    }

    pub fn timings(&self) -> DispatchTimings {
        DispatchTimings::from(&self.dispatch)
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig::from_settings(&self.monitor, self.timings().location_timeout)
    }
}

pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new(app_config_dir: PathBuf) -> Self {
        Self {
            config_path: app_config_dir.join("settings.json"),
        }
    }

    pub fn load(&self) -> Settings {
        if self.config_path.exists() {
            match fs::read_to_string(&self.config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(settings) => return settings,
                    Err(e) => log::warn!("Ignoring invalid settings {:?}: {}", self.config_path, e),
                },
                Err(e) => log::warn!("Could not read settings {:?}: {}", self.config_path, e),
            }
        }
        Settings::default()
    }

    pub fn save(&self, settings: &Settings) -> io::Result<()> {
        // Ensure directory exists
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(settings)?;
        fs::write(&self.config_path, content)
    }
}
