//! Movement monitoring after an alert has gone out.
//!
//! The loop re-measures the position on a fixed interval. A significant move
//! re-alerts the contacts with a short update; a run of stationary ticks ends
//! monitoring. Ticks are serialized: each measurement runs in its own short
//! task, but the next tick is only scheduled once the previous one finished.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::alerts::composer::MessageComposer;
use super::alerts::fanout::FanoutDispatcher;
use super::location::{distance_meters, locate, LocationProvider};
use super::model::Position;
use super::platform::{ContactStore, PermissionGate, StatusSink};

pub const MONITORING_STATUS: &str = "Monitoring your location for safety updates...";
pub const MONITORING_STOPPED_STATUS: &str = "Location monitoring stopped: no movement detected";

/// Monitor tuning - persisted in settings.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    /// Seconds between location checks.
    pub check_interval_seconds: u64,
    pub movement_threshold_meters: f64,
    pub stationary_limit: u32,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            check_interval_seconds: 10 * 60,
            movement_threshold_meters: 500.0,
            stationary_limit: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    pub interval: Duration,
    pub movement_threshold_m: f64,
    pub stationary_limit: u32,
    pub location_timeout: Duration,
}

impl MonitorConfig {
    pub fn from_settings(settings: &MonitorSettings, location_timeout: Duration) -> Self {
        Self {
            interval: Duration::from_secs(settings.check_interval_seconds),
            movement_threshold_m: settings.movement_threshold_meters,
            stationary_limit: settings.stationary_limit.max(1),
            location_timeout,
        }
    }
}

/// What one evaluated reading decided.
#[derive(Debug, Clone, PartialEq)]
pub enum TickDecision {
    /// First reading of the session; nothing is sent.
    Baseline(Position),
    Moved { distance_m: f64, position: Position },
    Stationary { distance_m: f64, count: u32 },
    Terminate { distance_m: f64, count: u32 },
}

/// Baseline and stationary counter, owned by the loop task.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonitorState {
    last_position: Option<Position>,
    stationary_count: u32,
}

impl MonitorState {
    pub fn last_position(&self) -> Option<&Position> {
        self.last_position.as_ref()
    }

    pub fn stationary_count(&self) -> u32 {
        self.stationary_count
    }

    /// Fold a successful reading into the state.
    pub fn evaluate(&mut self, current: Position, threshold_m: f64, stationary_limit: u32) -> TickDecision {
        let Some(last) = self.last_position else {
            self.last_position = Some(current);
            return TickDecision::Baseline(current);
        };

        let distance_m = distance_meters(&last, &current);
        if distance_m > threshold_m {
            self.stationary_count = 0;
            self.last_position = Some(current);
            return TickDecision::Moved {
                distance_m,
                position: current,
            };
        }

        self.stationary_count += 1;
        if self.stationary_count >= stationary_limit {
            TickDecision::Terminate {
                distance_m,
                count: self.stationary_count,
            }
        } else {
            TickDecision::Stationary {
                distance_m,
                count: self.stationary_count,
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorExit {
    /// Stationary limit reached.
    Terminated { ticks: u32 },
    /// Host teardown or a newer session.
    Cancelled { ticks: u32 },
}

pub struct MonitorLoop {
    config: MonitorConfig,
    location: Arc<dyn LocationProvider>,
    permissions: Arc<dyn PermissionGate>,
    contacts: Arc<dyn ContactStore>,
    status: Arc<dyn StatusSink>,
    fanout: Arc<FanoutDispatcher>,
    composer: Arc<MessageComposer>,
}

impl MonitorLoop {
    pub fn new(
        config: MonitorConfig,
        location: Arc<dyn LocationProvider>,
        permissions: Arc<dyn PermissionGate>,
        contacts: Arc<dyn ContactStore>,
        status: Arc<dyn StatusSink>,
        fanout: Arc<FanoutDispatcher>,
        composer: Arc<MessageComposer>,
    ) -> Self {
        Self {
            config,
            location,
            permissions,
            contacts,
            status,
            fanout,
            composer,
        }
    }

    pub fn spawn(self, cancellation: CancellationToken) -> MonitorHandle {
        let token = cancellation.clone();
        let handle = tokio::spawn(self.run(token));
        MonitorHandle {
            cancellation,
            handle,
        }
    }

    pub async fn run(self, cancellation: CancellationToken) -> MonitorExit {
        self.status.show(MONITORING_STATUS);
        log::info!(
            "Location monitoring started (every {:?}, threshold {} m)",
            self.config.interval,
            self.config.movement_threshold_m
        );

        let mut state = MonitorState::default();
        let mut ticks = 0;

        loop {
            ticks += 1;

            let location = self.location.clone();
            let permissions = self.permissions.clone();
            let timeout = self.config.location_timeout;
            let measurement = tokio::spawn(async move {
                locate(location.as_ref(), permissions.as_ref(), timeout).await
            });

            // Dropping the handle on cancel lets the measurement finish detached.
            let reading = tokio::select! {
                joined = measurement => joined,
                _ = cancellation.cancelled() => {
                    log::info!("Location monitoring cancelled during tick {}", ticks);
                    return MonitorExit::Cancelled { ticks };
                }
            };

            match reading {
                Ok(Ok(position)) => {
                    let decision = state.evaluate(
                        position,
                        self.config.movement_threshold_m,
                        self.config.stationary_limit,
                    );
                    if self.apply(decision).await {
                        self.status.show(MONITORING_STOPPED_STATUS);
                        return MonitorExit::Terminated { ticks };
                    }
                }
                Ok(Err(e)) => log::warn!("Could not get current location, retrying later: {}", e),
                Err(e) => log::error!("Location measurement task failed: {}", e),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => {}
                _ = cancellation.cancelled() => {
                    log::info!("Location monitoring cancelled after {} ticks", ticks);
                    return MonitorExit::Cancelled { ticks };
                }
            }
        }
    }

    /// Act on a decision. Returns true when monitoring should stop.
    async fn apply(&self, decision: TickDecision) -> bool {
        match decision {
            TickDecision::Baseline(_) => {
                log::debug!("Initial location recorded");
                false
            }
            TickDecision::Moved { distance_m, position } => {
                log::info!("Moved {:.0} m since last check, sending location update", distance_m);
                self.realert(&position).await;
                false
            }
            TickDecision::Stationary { distance_m, count } => {
                log::debug!("Moved {:.0} m, stationary count {}", distance_m, count);
                false
            }
            TickDecision::Terminate { count, .. } => {
                log::info!("No movement detected after {} checks, stopping updates", count);
                true
            }
        }
    }

    async fn realert(&self, position: &Position) {
        let contacts = match self.contacts.contacts() {
            Ok(contacts) if !contacts.is_empty() => contacts,
            Ok(_) => {
                log::warn!("No emergency contacts, skipping location update");
                return;
            }
            Err(e) => {
                log::warn!("Skipping location update: {}", e);
                return;
            }
        };

        let message = self
            .composer
            .compose_movement_update(Local::now().naive_local(), position);
        self.fanout.dispatch(&contacts, &message).await;
    }
}

/// A running monitor loop.
pub struct MonitorHandle {
    cancellation: CancellationToken,
    handle: JoinHandle<MonitorExit>,
}

impl MonitorHandle {
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Wait for the loop to exit. `None` if the task panicked.
    pub async fn join(self) -> Option<MonitorExit> {
        match self.handle.await {
            Ok(exit) => Some(exit),
            Err(e) => {
                log::error!("Monitor task failed: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::core::error::{ContactStoreError, LocationError};
    use crate::core::location::LocationProvider;
    use crate::core::model::{ContactList, Position};
    use crate::core::platform::{ContactStore, PermissionGate, StatusSink};

    /// Serves queued readings in order; `None` entries are failed readings.
    /// Once the script runs out the last reading repeats.
    pub struct ScriptedLocation {
        readings: Mutex<VecDeque<Option<Position>>>,
        last: Mutex<Option<Position>>,
        pub calls: Mutex<u32>,
    }

    impl ScriptedLocation {
        pub fn new(readings: Vec<Option<Position>>) -> Self {
            Self {
                readings: Mutex::new(readings.into()),
                last: Mutex::new(None),
                calls: Mutex::new(0),
            }
        }

        pub fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl LocationProvider for ScriptedLocation {
        async fn last_known(&self) -> Result<Option<Position>, LocationError> {
            *self.calls.lock().unwrap() += 1;
            let next = self.readings.lock().unwrap().pop_front();
            match next {
                Some(Some(position)) => {
                    *self.last.lock().unwrap() = Some(position);
                    Ok(Some(position))
                }
                Some(None) => Err(LocationError::Provider("scripted failure".to_string())),
                None => Ok(*self.last.lock().unwrap()),
            }
        }
    }

    pub struct StaticContacts(pub String);

    impl ContactStore for StaticContacts {
        fn contacts(&self) -> Result<ContactList, ContactStoreError> {
            Ok(ContactList::parse(&self.0))
        }
    }

    /// A contact store whose backend always fails.
    pub struct BrokenContacts;

    impl ContactStore for BrokenContacts {
        fn contacts(&self) -> Result<ContactList, ContactStoreError> {
            Err(ContactStoreError::Backend("contacts provider crashed".to_string()))
        }
    }

    pub struct Permissions {
        pub send: bool,
        pub location: bool,
    }

    impl PermissionGate for Permissions {
        fn is_send_allowed(&self) -> bool {
            self.send
        }
        fn is_location_allowed(&self) -> bool {
            self.location
        }
    }

    #[derive(Default)]
    pub struct RecordingStatus {
        pub shown: Mutex<Vec<String>>,
    }

    impl RecordingStatus {
        pub fn texts(&self) -> Vec<String> {
            self.shown.lock().unwrap().clone()
        }
    }

    impl StatusSink for RecordingStatus {
        fn show(&self, text: &str) {
            self.shown.lock().unwrap().push(text.to_string());
        }
    }
}
