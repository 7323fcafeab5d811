//! One dispatch cycle: validate, locate, compose, fan out, settle, hand off.
//!
//! Only validation can stop a cycle. Everything after it degrades instead of
//! failing, and the cycle always ends by starting the movement monitor.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::alerts::composer::MessageComposer;
use super::alerts::fanout::{FanoutDispatcher, FanoutReport};
use super::location::{locate, resolve_address};
use super::model::{AlertMessage, ContactList, Position};
use super::monitor::{MonitorHandle, MonitorLoop};
use super::platform::Collaborators;
use super::tracker::DeliveryStats;

pub const PREPARING_STATUS: &str = "Preparing emergency alert...";
/// Shown when the foreground alert status is released at hand-off.
pub const ALERT_COMPLETE_STATUS: &str = "Emergency alert dispatched";

/// Dispatch timing - persisted in settings.json
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    /// Upper bound on waiting for send results before handing off.
    pub settle_timeout_ms: u64,
    pub location_timeout_seconds: u64,
    pub geocode_timeout_seconds: u64,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            settle_timeout_ms: 4000,
            location_timeout_seconds: 15,
            geocode_timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchTimings {
    pub settle_timeout: Duration,
    pub location_timeout: Duration,
    pub geocode_timeout: Duration,
}

impl From<&DispatchSettings> for DispatchTimings {
    fn from(settings: &DispatchSettings) -> Self {
        Self {
            settle_timeout: Duration::from_millis(settings.settle_timeout_ms),
            location_timeout: Duration::from_secs(settings.location_timeout_seconds),
            geocode_timeout: Duration::from_secs(settings.geocode_timeout_seconds),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    NoContacts,
    SendPermissionMissing,
}

impl AbortReason {
    /// User-visible status text for this reason.
    pub fn status_text(&self) -> &'static str {
        match self {
            Self::NoContacts => "⚠️ No emergency contacts found!",
            Self::SendPermissionMissing => "❌ Permission missing: SMS blocked",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchPhase {
    Preparing,
    Validating,
    Resolving,
    Sending,
    Reporting,
    Settling,
    HandOff,
    Done,
    Aborted(AbortReason),
}

#[derive(Debug, Clone)]
pub struct DispatchReport {
    /// Terminal phase: `Done` or `Aborted`.
    pub phase: DispatchPhase,
    pub history: Vec<DispatchPhase>,
    pub position: Option<Position>,
    pub message: Option<AlertMessage>,
    pub fanout: Option<FanoutReport>,
}

impl DispatchReport {
    fn new() -> Self {
        Self {
            phase: DispatchPhase::Preparing,
            history: Vec::new(),
            position: None,
            message: None,
            fanout: None,
        }
    }

    fn enter(&mut self, phase: DispatchPhase) {
        log::debug!("Dispatch phase: {:?}", phase);
        self.phase = phase;
        self.history.push(phase);
    }

    pub fn attempted(&self) -> usize {
        self.fanout.as_ref().map(FanoutReport::attempted).unwrap_or(0)
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self.phase, DispatchPhase::Aborted(_))
    }
}

pub struct DispatchRun {
    pub report: DispatchReport,
    /// Present unless the cycle aborted or was cancelled before hand-off.
    pub monitor: Option<MonitorHandle>,
}

pub struct DispatchOrchestrator {
    collaborators: Collaborators,
    composer: Arc<MessageComposer>,
    fanout: Arc<FanoutDispatcher>,
    timings: DispatchTimings,
    delivery: watch::Receiver<DeliveryStats>,
    monitor: MonitorLoop,
}

impl DispatchOrchestrator {
    pub fn new(
        collaborators: Collaborators,
        composer: Arc<MessageComposer>,
        fanout: Arc<FanoutDispatcher>,
        timings: DispatchTimings,
        delivery: watch::Receiver<DeliveryStats>,
        monitor: MonitorLoop,
    ) -> Self {
        Self {
            collaborators,
            composer,
            fanout,
            timings,
            delivery,
            monitor,
        }
    }

    pub async fn run(self, cancellation: CancellationToken) -> DispatchRun {
        let mut report = DispatchReport::new();

        report.enter(DispatchPhase::Preparing);
        self.collaborators.status.show(PREPARING_STATUS);

        report.enter(DispatchPhase::Validating);
        let contacts = match self.validate() {
            Ok(contacts) => contacts,
            Err(reason) => {
                self.collaborators.status.show(reason.status_text());
                report.enter(DispatchPhase::Aborted(reason));
                return DispatchRun {
                    report,
                    monitor: None,
                };
            }
        };

        report.enter(DispatchPhase::Resolving);
        let (position, message) = self.resolve().await;
        report.position = position;
        report.message = Some(message.clone());

        report.enter(DispatchPhase::Sending);
        let fanout = self.fanout.clone();
        let sending = tokio::spawn(async move { fanout.dispatch(&contacts, &message).await });
        match sending.await {
            Ok(fanout_report) => {
                report.enter(DispatchPhase::Reporting);
                self.collaborators.status.show(&sent_status_text(&fanout_report));
                report.fanout = Some(fanout_report);
            }
            Err(e) => log::error!("Fatal failure during alert fan-out: {}", e),
        }

        report.enter(DispatchPhase::Settling);
        let pending = report
            .fanout
            .as_ref()
            .map(FanoutReport::sent_destinations)
            .unwrap_or_default();
        self.settle(pending, &cancellation).await;

        report.enter(DispatchPhase::HandOff);
        log::info!("Releasing foreground alert status");
        self.collaborators.status.show(ALERT_COMPLETE_STATUS);
        let monitor = if cancellation.is_cancelled() {
            log::info!("Dispatch cancelled before hand-off, monitoring not started");
            None
        } else {
            log::info!("Starting periodic location monitoring");
            Some(self.monitor.spawn(cancellation.child_token()))
        };

        report.enter(DispatchPhase::Done);
        DispatchRun { report, monitor }
    }

    fn validate(&self) -> Result<ContactList, AbortReason> {
        let contacts = match self.collaborators.contacts.contacts() {
            Ok(contacts) => contacts,
            Err(e) => {
                log::error!("Could not read emergency contacts: {}", e);
                return Err(AbortReason::NoContacts);
            }
        };
        if contacts.is_empty() {
            log::warn!("No emergency contacts found");
            return Err(AbortReason::NoContacts);
        }
        if !self.collaborators.permissions.is_send_allowed() {
            log::error!("Send permission missing, alert blocked");
            return Err(AbortReason::SendPermissionMissing);
        }
        Ok(contacts)
    }

    /// Locate and compose. A lookup that panics degrades to the placeholder.
    async fn resolve(&self) -> (Option<Position>, AlertMessage) {
        let collaborators = self.collaborators.clone();
        let timings = self.timings;

        let lookup = tokio::spawn(async move {
            let position = match locate(
                collaborators.location.as_ref(),
                collaborators.permissions.as_ref(),
                timings.location_timeout,
            )
            .await
            {
                Ok(position) => position,
                Err(e) => {
                    log::warn!("Location unavailable for alert: {}", e);
                    return (None, None);
                }
            };

            match resolve_address(collaborators.geocoder.as_ref(), &position, timings.geocode_timeout).await {
                Ok(address) => (Some(position), Some(address)),
                Err(e) => {
                    log::debug!("Falling back to coordinates: {}", e);
                    (Some(position), None)
                }
            }
        });

        let (position, address) = match lookup.await {
            Ok(resolved) => resolved,
            Err(e) => {
                log::error!("Error getting location/address: {}", e);
                (None, None)
            }
        };

        let message = self
            .composer
            .compose_alert(Local::now().naive_local(), position.as_ref(), address.as_deref());
        (position, message)
    }

    /// Wait until every accepted destination has a send result, bounded by
    /// the settle timeout.
    async fn settle(&self, pending: Vec<String>, cancellation: &CancellationToken) {
        if pending.is_empty() {
            return;
        }

        let mut delivery = self.delivery.clone();
        let ready = async {
            delivery
                .wait_for(|stats| pending.iter().all(|d| stats.has_result(d)))
                .await
                .is_ok()
        };
        let bounded = tokio::time::timeout(self.timings.settle_timeout, ready);

        tokio::select! {
            settled = bounded => match settled {
                Ok(true) => log::debug!("Send results received for all {} destinations", pending.len()),
                Ok(false) => log::debug!("Delivery tracker stopped before settling"),
                Err(_) => log::info!(
                    "Settle window of {:?} elapsed with send results still pending",
                    self.timings.settle_timeout
                ),
            },
            _ = cancellation.cancelled() => log::debug!("Settling interrupted by cancellation"),
        }
    }
}

fn sent_status_text(report: &FanoutReport) -> String {
    if report.failed() == 0 {
        format!("✅ Alert sent to {} contacts!", report.attempted())
    } else {
        format!("⚠️ Alert sent to {} of {} contacts", report.sent(), report.attempted())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::core::alerts::composer::AlertSettings;
    use crate::core::alerts::fanout::test_support::RecordingTransport;
    use crate::core::alerts::fanout::DestinationNormalizer;
    use crate::core::alerts::segment::SegmentLimits;
    use crate::core::error::{GeocodeError, LocationError, TransportError};
    use crate::core::location::{FixedLocationProvider, LocationProvider, ReverseGeocoder};
    use crate::core::model::SendStatus;
    use crate::core::monitor::test_support::{BrokenContacts, Permissions, RecordingStatus, StaticContacts};
    use crate::core::monitor::MONITORING_STATUS;
    use crate::core::platform::ContactStore;
    use crate::core::monitor::{MonitorConfig, MonitorExit};
    use crate::core::tracker::DeliveryTracker;
    use crate::core::transport::{outcome_channel, OutcomeReporter, Transport};

    struct FailingGeocoder;

    #[async_trait]
    impl ReverseGeocoder for FailingGeocoder {
        async fn resolve(&self, _latitude: f64, _longitude: f64) -> Result<String, GeocodeError> {
            Err(GeocodeError::Backend("grpc failed".to_string()))
        }
    }

    struct StuckGeocoder;

    #[async_trait]
    impl ReverseGeocoder for StuckGeocoder {
        async fn resolve(&self, _latitude: f64, _longitude: f64) -> Result<String, GeocodeError> {
            std::future::pending().await
        }
    }

    struct PanickingLocation;

    #[async_trait]
    impl LocationProvider for PanickingLocation {
        async fn last_known(&self) -> Result<Option<Position>, LocationError> {
            panic!("location service crashed");
        }
    }

    /// Accepts submissions and reports the send result after `delay`, or never.
    struct DelayedTransport {
        delay: Option<Duration>,
    }

    #[async_trait]
    impl Transport for DelayedTransport {
        async fn send_segments(
            &self,
            _destination: &str,
            _segments: &[String],
            reporter: OutcomeReporter,
        ) -> Result<(), TransportError> {
            if let Some(delay) = self.delay {
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    reporter.sent(SendStatus::Success);
                });
            }
            Ok(())
        }
    }

    struct Fixture {
        contacts: Arc<dyn ContactStore>,
        send_allowed: bool,
        geocoder: Arc<dyn ReverseGeocoder>,
        location: Arc<dyn LocationProvider>,
        transport: Arc<dyn Transport>,
        status: Arc<RecordingStatus>,
    }

    impl Fixture {
        fn new(contacts: &'static str) -> Self {
            Self {
                contacts: Arc::new(StaticContacts(contacts.to_string())),
                send_allowed: true,
                geocoder: Arc::new(FailingGeocoder),
                location: Arc::new(FixedLocationProvider::new(Some(Position::new(12.9716, 77.5946)))),
                transport: Arc::new(RecordingTransport::default()),
                status: Arc::new(RecordingStatus::default()),
            }
        }

        fn build(&self) -> DispatchOrchestrator {
            let collaborators = Collaborators {
                contacts: self.contacts.clone(),
                permissions: Arc::new(Permissions {
                    send: self.send_allowed,
                    location: true,
                }),
                location: self.location.clone(),
                geocoder: self.geocoder.clone(),
                transport: self.transport.clone(),
                status: self.status.clone(),
            };

            let (outcomes, events) = outcome_channel();
            let (tracker, delivery) = DeliveryTracker::new();
            tracker.spawn(events, CancellationToken::new());

            let composer = Arc::new(MessageComposer::new(AlertSettings::default()));
            let fanout = Arc::new(FanoutDispatcher::new(
                collaborators.transport.clone(),
                outcomes,
                DestinationNormalizer::default(),
                SegmentLimits::default(),
            ));
            let monitor = MonitorLoop::new(
                MonitorConfig {
                    interval: Duration::from_secs(600),
                    movement_threshold_m: 500.0,
                    stationary_limit: 3,
                    location_timeout: Duration::from_secs(15),
                },
                collaborators.location.clone(),
                collaborators.permissions.clone(),
                collaborators.contacts.clone(),
                collaborators.status.clone(),
                fanout.clone(),
                composer.clone(),
            );

            DispatchOrchestrator::new(
                collaborators,
                composer,
                fanout,
                DispatchTimings::from(&DispatchSettings::default()),
                delivery,
                monitor,
            )
        }
    }

    #[tokio::test]
    async fn test_empty_contacts_abort_without_sending() {
        let fixture = Fixture::new("");
        let transport = Arc::new(RecordingTransport::default());
        let fixture = Fixture {
            transport: transport.clone(),
            ..fixture
        };

        let run = fixture.build().run(CancellationToken::new()).await;

        assert_eq!(run.report.phase, DispatchPhase::Aborted(AbortReason::NoContacts));
        assert!(run.monitor.is_none());
        assert!(run.report.fanout.is_none());
        assert_eq!(transport.count(), 0);
        assert_eq!(
            fixture.status.texts(),
            vec![PREPARING_STATUS.to_string(), AbortReason::NoContacts.status_text().to_string()]
        );
    }

    #[tokio::test]
    async fn test_unreadable_contacts_abort_as_no_contacts() {
        let transport = Arc::new(RecordingTransport::default());
        let fixture = Fixture {
            contacts: Arc::new(BrokenContacts),
            transport: transport.clone(),
            ..Fixture::new("")
        };

        let run = fixture.build().run(CancellationToken::new()).await;

        assert_eq!(run.report.phase, DispatchPhase::Aborted(AbortReason::NoContacts));
        assert!(run.monitor.is_none());
        assert_eq!(transport.count(), 0);
        assert!(fixture
            .status
            .texts()
            .contains(&AbortReason::NoContacts.status_text().to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_geocode_timeout_falls_back_to_coordinates() {
        let fixture = Fixture {
            geocoder: Arc::new(StuckGeocoder),
            ..Fixture::new("9876543210")
        };

        let started = tokio::time::Instant::now();
        let run = fixture.build().run(CancellationToken::new()).await;

        assert!(started.elapsed() >= Duration::from_secs(10));
        assert_eq!(run.report.phase, DispatchPhase::Done);
        let message = run.report.message.as_ref().unwrap().as_str();
        assert!(message.contains("Loc: Lat: 12.9716, Lon: 77.5946"));
        run.monitor.unwrap().cancel();
    }

    #[tokio::test]
    async fn test_missing_send_permission_aborts() {
        let fixture = Fixture {
            send_allowed: false,
            ..Fixture::new("9876543210")
        };

        let run = fixture.build().run(CancellationToken::new()).await;

        assert_eq!(
            run.report.phase,
            DispatchPhase::Aborted(AbortReason::SendPermissionMissing)
        );
        assert!(run.monitor.is_none());
        assert!(fixture
            .status
            .texts()
            .contains(&"❌ Permission missing: SMS blocked".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_cycle_hands_off_to_monitor() {
        let transport = Arc::new(RecordingTransport::default());
        let fixture = Fixture {
            transport: transport.clone(),
            ..Fixture::new("9876543210, ,+441234567")
        };

        let run = fixture.build().run(CancellationToken::new()).await;

        assert_eq!(
            run.report.history,
            vec![
                DispatchPhase::Preparing,
                DispatchPhase::Validating,
                DispatchPhase::Resolving,
                DispatchPhase::Sending,
                DispatchPhase::Reporting,
                DispatchPhase::Settling,
                DispatchPhase::HandOff,
                DispatchPhase::Done,
            ]
        );
        assert_eq!(run.report.attempted(), 2);
        assert_eq!(transport.count(), 2);

        let message = run.report.message.as_ref().unwrap().as_str().to_string();
        assert!(message.contains("Lat: 12.9716, Lon: 77.5946"));
        assert!(!message.contains("grpc failed"));

        let texts = fixture.status.texts();
        assert_eq!(
            texts[..3],
            [
                PREPARING_STATUS.to_string(),
                "✅ Alert sent to 2 contacts!".to_string(),
                ALERT_COMPLETE_STATUS.to_string(),
            ]
        );

        let monitor = run.monitor.expect("monitor should start");
        monitor.cancel();
        assert!(matches!(monitor.join().await, Some(MonitorExit::Cancelled { .. })));
        assert_eq!(fixture.status.texts()[3], MONITORING_STATUS);
    }

    #[tokio::test(start_paused = true)]
    async fn test_location_panic_still_sends_and_hands_off() {
        let transport = Arc::new(RecordingTransport::default());
        let fixture = Fixture {
            location: Arc::new(PanickingLocation),
            transport: transport.clone(),
            ..Fixture::new("9876543210")
        };

        let run = fixture.build().run(CancellationToken::new()).await;

        assert_eq!(run.report.phase, DispatchPhase::Done);
        assert!(run.report.position.is_none());
        let message = run.report.message.as_ref().unwrap().as_str();
        assert!(message.contains("Loc: Location unavailable"));
        assert!(message.contains("?q=0.0,0.0"));
        assert_eq!(transport.count(), 1);

        let monitor = run.monitor.expect("monitor should start");
        monitor.cancel();
        monitor.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_ends_when_send_results_arrive() {
        let fixture = Fixture {
            transport: Arc::new(DelayedTransport {
                delay: Some(Duration::from_millis(500)),
            }),
            ..Fixture::new("111,222")
        };

        let started = tokio::time::Instant::now();
        let run = fixture.build().run(CancellationToken::new()).await;
        let elapsed = started.elapsed();

        assert!(elapsed >= Duration::from_millis(500));
        assert!(elapsed < Duration::from_millis(4000), "settled after {:?}", elapsed);
        run.monitor.unwrap().cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_is_bounded_when_results_never_arrive() {
        let fixture = Fixture {
            transport: Arc::new(DelayedTransport { delay: None }),
            ..Fixture::new("111")
        };

        let started = tokio::time::Instant::now();
        let run = fixture.build().run(CancellationToken::new()).await;

        assert!(started.elapsed() >= Duration::from_millis(4000));
        assert_eq!(run.report.phase, DispatchPhase::Done);
        run.monitor.unwrap().cancel();
    }

    #[tokio::test]
    async fn test_cancel_before_handoff_skips_monitor() {
        let fixture = Fixture::new("111");
        let cancellation = CancellationToken::new();
        cancellation.cancel();

        let run = fixture.build().run(cancellation).await;

        assert_eq!(run.report.phase, DispatchPhase::Done);
        assert!(run.monitor.is_none());
    }
}
