// Fan-out of one alert message to every stored contact.
//
// Each contact is an isolated failure domain: a rejected submission is
// recorded and the loop moves on. Delivery is observed later through the
// outcome channel, never awaited here.

use std::sync::Arc;

use regex::Regex;

use super::segment::{split_segments, SegmentLimits};
use crate::core::model::{AlertMessage, ContactList, DispatchOutcome, SendResult};
use crate::core::transport::{OutcomeSender, Transport};

pub const DEFAULT_COUNTRY_PREFIX: &str = "+91";

/// Turns a stored contact entry into a dialable destination.
#[derive(Debug, Clone)]
pub struct DestinationNormalizer {
    country_prefix: String,
    separators: Regex,
}

impl DestinationNormalizer {
    pub fn new(country_prefix: impl Into<String>) -> Self {
        // Formatting characters people type into phone numbers
        let separators = Regex::new(r"[\s\-().]").expect("Invalid separator regex");
        Self {
            country_prefix: country_prefix.into(),
            separators,
        }
    }

    /// Returns `None` for entries that are blank after cleanup.
    pub fn normalize(&self, raw: &str) -> Option<String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }

        let cleaned = self.separators.replace_all(trimmed, "");
        if cleaned.is_empty() {
            return None;
        }

        if cleaned.starts_with('+') {
            Some(cleaned.into_owned())
        } else {
            log::debug!("Added country code to {}", cleaned);
            Some(format!("{}{}", self.country_prefix, cleaned))
        }
    }
}

impl Default for DestinationNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_COUNTRY_PREFIX)
    }
}

/// Per-destination results of one fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanoutReport {
    pub outcomes: Vec<DispatchOutcome>,
}

impl FanoutReport {
    /// Contacts a submission was made for, accepted or not.
    pub fn attempted(&self) -> usize {
        self.outcomes.len()
    }

    pub fn sent(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_sent()).count()
    }

    pub fn failed(&self) -> usize {
        self.attempted() - self.sent()
    }

    /// Destinations whose submission was accepted, in contact order.
    pub fn sent_destinations(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter(|o| o.is_sent())
            .map(|o| o.destination.clone())
            .collect()
    }
}

pub struct FanoutDispatcher {
    transport: Arc<dyn Transport>,
    outcomes: OutcomeSender,
    normalizer: DestinationNormalizer,
    limits: SegmentLimits,
}

impl FanoutDispatcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        outcomes: OutcomeSender,
        normalizer: DestinationNormalizer,
        limits: SegmentLimits,
    ) -> Self {
        Self {
            transport,
            outcomes,
            normalizer,
            limits,
        }
    }

    /// Submit `message` to every non-blank contact, in order.
    pub async fn dispatch(&self, contacts: &ContactList, message: &AlertMessage) -> FanoutReport {
        let segments = split_segments(message.as_str(), &self.limits);
        let mut report = FanoutReport::default();

        for raw in contacts.iter() {
            let Some(destination) = self.normalizer.normalize(raw) else {
                continue;
            };

            let reporter = self.outcomes.reporter(destination.clone());
            let result = match self
                .transport
                .send_segments(&destination, &segments, reporter)
                .await
            {
                Ok(()) => {
                    log::debug!("Sent {}-part message to {}", segments.len(), destination);
                    SendResult::Sent
                }
                Err(e) => {
                    log::error!("Failed to send message to {}: {}", destination, e);
                    SendResult::Failed(e.to_string())
                }
            };

            report.outcomes.push(DispatchOutcome {
                destination,
                segments_attempted: segments.len(),
                result,
            });
        }

        log::info!(
            "Fan-out finished: {} attempted, {} accepted, {} failed",
            report.attempted(),
            report.sent(),
            report.failed()
        );
        report
    }
}
