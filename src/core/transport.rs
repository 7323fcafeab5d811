//! Messaging transport seam and the outcome channel feeding the tracker.
//!
//! Submission returns as soon as the transport has accepted the segments.
//! Whatever the transport learns later (send result, delivery receipt) goes
//! through the [`OutcomeReporter`] handed to it, which is already keyed by
//! destination.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::error::TransportError;
use super::model::{DeliveryEvent, SendStatus};

/// Best-effort messaging channel.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Submit the ordered segments of one message to one destination.
    async fn send_segments(
        &self,
        destination: &str,
        segments: &[String],
        reporter: OutcomeReporter,
    ) -> Result<(), TransportError>;
}

/// Creates the outcome channel shared by a session's fan-outs and its tracker.
pub fn outcome_channel() -> (OutcomeSender, mpsc::UnboundedReceiver<DeliveryEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (OutcomeSender { tx }, rx)
}

#[derive(Clone, Debug)]
pub struct OutcomeSender {
    tx: mpsc::UnboundedSender<DeliveryEvent>,
}

impl OutcomeSender {
    pub fn reporter(&self, destination: impl Into<String>) -> OutcomeReporter {
        OutcomeReporter {
            destination: destination.into(),
            tx: self.tx.clone(),
        }
    }
}

/// Reports outcomes for a single destination. Never fails: if the tracker is
/// gone the event is dropped.
#[derive(Clone, Debug)]
pub struct OutcomeReporter {
    destination: String,
    tx: mpsc::UnboundedSender<DeliveryEvent>,
}

impl OutcomeReporter {
    pub fn sent(&self, status: SendStatus) {
        self.emit(DeliveryEvent::SendResult {
            destination: self.destination.clone(),
            status,
        });
    }

    /// Report a raw platform result code.
    pub fn sent_code(&self, code: i32) {
        self.sent(SendStatus::from_code(code));
    }

    pub fn delivered(&self) {
        self.emit(DeliveryEvent::Delivered {
            destination: self.destination.clone(),
        });
    }

    fn emit(&self, event: DeliveryEvent) {
        if self.tx.send(event).is_err() {
            log::debug!("Outcome for {} dropped, tracker stopped", self.destination);
        }
    }
}
