use std::fmt;

use serde::{Deserialize, Serialize};

/// A best-effort position fix in decimal degrees.
///
/// An invalid position is a normal value meaning "no usable fix"; it still
/// carries coordinates (normally 0,0) so callers can render a map link.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default = "default_valid")]
    pub valid: bool,
}

fn default_valid() -> bool {
    true
}

impl Position {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            valid: true,
        }
    }

    pub fn unknown() -> Self {
        Self {
            latitude: 0.0,
            longitude: 0.0,
            valid: false,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::unknown()
    }
}

/// Ordered destination identifiers, as stored by the contacts screen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactList {
    entries: Vec<String>,
}

impl ContactList {
    /// Parse the comma-delimited storage format.
    ///
    /// Entries are kept verbatim, including blanks and duplicates; blank
    /// entries are skipped later at send time.
    pub fn parse(raw: &str) -> Self {
        if raw.is_empty() {
            return Self::default();
        }
        Self {
            entries: raw.split(',').map(str::to_string).collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_raw(&self) -> String {
        self.entries.join(",")
    }
}

/// An immutable alert text. Composed once per dispatch or monitor cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertMessage {
    text: String,
}

impl AlertMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for AlertMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Outcome of submitting one destination's segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendResult {
    Sent,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub destination: String,
    pub segments_attempted: usize,
    pub result: SendResult,
}

impl DispatchOutcome {
    pub fn is_sent(&self) -> bool {
        self.result == SendResult::Sent
    }
}

/// Classified send-result reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SendStatus {
    Success,
    GenericFailure,
    NoService,
    /// The transport could not build a payload (null PDU).
    MalformedPayload,
    RadioOff,
}

impl SendStatus {
    pub const CODE_GENERIC_FAILURE: i32 = 1;
    pub const CODE_RADIO_OFF: i32 = 2;
    pub const CODE_NULL_PDU: i32 = 3;
    pub const CODE_NO_SERVICE: i32 = 4;

    /// Classify a raw platform result code. Unknown codes count as success.
    pub fn from_code(code: i32) -> Self {
        match code {
            Self::CODE_GENERIC_FAILURE => Self::GenericFailure,
            Self::CODE_RADIO_OFF => Self::RadioOff,
            Self::CODE_NULL_PDU => Self::MalformedPayload,
            Self::CODE_NO_SERVICE => Self::NoService,
            _ => Self::Success,
        }
    }

    pub fn is_success(&self) -> bool {
        *self == Self::Success
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Self::Success => "sent",
            Self::GenericFailure => "generic failure",
            Self::NoService => "no service",
            Self::MalformedPayload => "null PDU",
            Self::RadioOff => "radio off",
        }
    }
}

/// Asynchronous transport outcome, correlated by destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryEvent {
    SendResult {
        destination: String,
        status: SendStatus,
    },
    Delivered {
        destination: String,
    },
}

impl DeliveryEvent {
    pub fn destination(&self) -> &str {
        match self {
            Self::SendResult { destination, .. } | Self::Delivered { destination } => destination,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contact_list_keeps_blanks_and_duplicates() {
        let list = ContactList::parse("9876543210, ,+441234,9876543210");
        assert_eq!(list.len(), 4);
        let entries: Vec<_> = list.iter().collect();
        assert_eq!(entries[1], " ");
        assert_eq!(entries[0], entries[3]);
    }

    #[test]
    fn test_contact_list_empty_raw() {
        assert!(ContactList::parse("").is_empty());
        assert_eq!(ContactList::parse("a,b").to_raw(), "a,b");
    }

    #[test]
    fn test_send_status_codes() {
        assert_eq!(SendStatus::from_code(1), SendStatus::GenericFailure);
        assert_eq!(SendStatus::from_code(2), SendStatus::RadioOff);
        assert_eq!(SendStatus::from_code(3), SendStatus::MalformedPayload);
        assert_eq!(SendStatus::from_code(4), SendStatus::NoService);
        assert_eq!(SendStatus::from_code(-1), SendStatus::Success);
        assert_eq!(SendStatus::from_code(0), SendStatus::Success);
    }

    #[test]
    fn test_unknown_position_is_distinguishable() {
        let unknown = Position::unknown();
        assert!(!unknown.is_valid());
        assert!(Position::new(0.0, 0.0).is_valid());
        assert_ne!(unknown, Position::new(0.0, 0.0));
    }
}
