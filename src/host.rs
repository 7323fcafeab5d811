//! Settings-backed collaborators for running the dispatcher headless.
//!
//! A phone build replaces these with platform bindings. Here contacts and
//! permissions come from settings.json, the transport only logs, and status
//! text goes to the log.

use async_trait::async_trait;

use crate::core::config::Settings;
use crate::core::error::{ContactStoreError, GeocodeError, TransportError};
use crate::core::location::ReverseGeocoder;
use crate::core::model::{ContactList, SendStatus};
use crate::core::platform::{ContactStore, PermissionGate, StatusSink};
use crate::core::transport::{OutcomeReporter, Transport};

pub struct SettingsContactStore {
    raw: String,
}

impl SettingsContactStore {
    pub fn new(settings: &Settings) -> Self {
        Self {
            raw: settings.contacts.clone(),
        }
    }
}

impl ContactStore for SettingsContactStore {
    fn contacts(&self) -> Result<ContactList, ContactStoreError> {
        Ok(ContactList::parse(&self.raw))
    }
}

pub struct StaticPermissionGate {
    send_allowed: bool,
    location_allowed: bool,
}

impl StaticPermissionGate {
    pub fn new(send_allowed: bool, location_allowed: bool) -> Self {
        Self {
            send_allowed,
            location_allowed,
        }
    }
}

impl PermissionGate for StaticPermissionGate {
    fn is_send_allowed(&self) -> bool {
        self.send_allowed
    }

    fn is_location_allowed(&self) -> bool {
        self.location_allowed
    }
}

/// No geocoding backend; messages fall back to coordinates.
pub struct NoGeocoder;

#[async_trait]
impl ReverseGeocoder for NoGeocoder {
    async fn resolve(&self, _latitude: f64, _longitude: f64) -> Result<String, GeocodeError> {
        Err(GeocodeError::Unavailable)
    }
}

/// Logs every segment and immediately reports it sent and delivered.
pub struct LoopbackTransport;

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send_segments(
        &self,
        destination: &str,
        segments: &[String],
        reporter: OutcomeReporter,
    ) -> Result<(), TransportError> {
        if destination.len() < 2 {
            return Err(TransportError::InvalidDestination(destination.to_string()));
        }
        let digits = destination.strip_prefix('+').unwrap_or(destination);
        if !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(TransportError::Rejected {
                destination: destination.to_string(),
                reason: "not a dialable number".to_string(),
            });
        }
        for (index, segment) in segments.iter().enumerate() {
            log::info!("[{} {}/{}] {}", destination, index + 1, segments.len(), segment);
        }
        reporter.sent(SendStatus::Success);
        reporter.delivered();
        Ok(())
    }
}

pub struct LogStatusSink;

impl StatusSink for LogStatusSink {
    fn show(&self, text: &str) {
        log::info!("[status] {}", text);
    }
}
