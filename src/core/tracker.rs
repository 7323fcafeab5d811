//! Passive consumer of asynchronous send and delivery outcomes.
//!
//! The tracker only classifies, logs and counts. It publishes a snapshot of
//! its counters after every event so the dispatch path can wait for
//! readiness without polling.

use std::collections::{HashMap, HashSet};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::model::{DeliveryEvent, SendStatus};

/// Running counters for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    pub send_results: usize,
    pub sent: usize,
    pub failed: usize,
    pub delivered: usize,
    pub failures_by_status: HashMap<SendStatus, usize>,
    reported: HashSet<String>,
}

impl DeliveryStats {
    /// Whether a send-result has been seen for `destination`.
    pub fn has_result(&self, destination: &str) -> bool {
        self.reported.contains(destination)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DestinationState {
    SendReported,
    Delivered,
    /// Receipt seen before the send result it belongs to.
    DeliveredEarly,
}

pub struct DeliveryTracker {
    stats: DeliveryStats,
    destinations: HashMap<String, DestinationState>,
    stats_tx: watch::Sender<DeliveryStats>,
}

impl DeliveryTracker {
    pub fn new() -> (Self, watch::Receiver<DeliveryStats>) {
        let (stats_tx, stats_rx) = watch::channel(DeliveryStats::default());
        let tracker = Self {
            stats: DeliveryStats::default(),
            destinations: HashMap::new(),
            stats_tx,
        };
        (tracker, stats_rx)
    }

    pub fn stats(&self) -> &DeliveryStats {
        &self.stats
    }

    /// Destinations whose latest send has a delivery receipt.
    pub fn confirmed_destinations(&self) -> usize {
        self.destinations
            .values()
            .filter(|s| **s != DestinationState::SendReported)
            .count()
    }

    /// Classify and count one event.
    pub fn record(&mut self, event: DeliveryEvent) {
        match event {
            DeliveryEvent::SendResult { destination, status } => {
                self.stats.send_results += 1;
                if status.is_success() {
                    self.stats.sent += 1;
                    log::info!("Message sent successfully to {}", destination);
                } else {
                    self.stats.failed += 1;
                    *self.stats.failures_by_status.entry(status).or_insert(0) += 1;
                    log::error!("Send to {} failed: {}", destination, status.describe());
                }
                // A fresh send result starts a new cycle for the destination,
                // unless it completes an early receipt.
                let next = match self.destinations.get(&destination) {
                    Some(DestinationState::DeliveredEarly) => DestinationState::Delivered,
                    _ => DestinationState::SendReported,
                };
                self.destinations.insert(destination.clone(), next);
                self.stats.reported.insert(destination);
            }
            DeliveryEvent::Delivered { destination } => {
                self.stats.delivered += 1;
                let next = if self.destinations.contains_key(&destination) {
                    DestinationState::Delivered
                } else {
                    log::warn!("Delivery receipt for {} arrived before its send result", destination);
                    DestinationState::DeliveredEarly
                };
                log::info!("Message delivered to {}", destination);
                self.destinations.insert(destination, next);
            }
        }

        self.stats_tx.send_replace(self.stats.clone());
    }

    /// Consume events until the channel closes or `cancellation` fires.
    /// Events already queued at cancellation are still recorded.
    pub fn spawn(
        mut self,
        mut events: mpsc::UnboundedReceiver<DeliveryEvent>,
        cancellation: CancellationToken,
    ) -> JoinHandle<DeliveryStats> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Some(event) => self.record(event),
                        None => break,
                    },
                    _ = cancellation.cancelled() => {
                        while let Ok(event) = events.try_recv() {
                            self.record(event);
                        }
                        break;
                    }
                }
            }

            log::debug!(
                "Delivery tracker stopped: {} results, latest send confirmed delivered for {} of {} destinations",
                self.stats.send_results,
                self.confirmed_destinations(),
                self.destinations.len()
            );
            self.stats
        })
    }
}
