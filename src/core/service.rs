//! Session supervisor.
//!
//! Each trigger becomes one session: a single supervisor task that owns the
//! delivery tracker, runs the dispatch cycle and then waits on the monitor.
//! At most one session is active. A new trigger cancels the previous one, so
//! repeated triggers never pile up background work.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::alerts::composer::MessageComposer;
use super::alerts::fanout::{DestinationNormalizer, FanoutDispatcher};
use super::config::Settings;
use super::monitor::{MonitorExit, MonitorLoop};
use super::orchestrator::{DispatchOrchestrator, DispatchReport};
use super::platform::Collaborators;
use super::tracker::{DeliveryStats, DeliveryTracker};
use super::transport::{outcome_channel, OutcomeSender};

#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub id: u64,
    pub dispatch: DispatchReport,
    pub monitor: Option<MonitorExit>,
    pub delivery: DeliveryStats,
}

struct ActiveSession {
    id: u64,
    cancellation: CancellationToken,
    task: JoinHandle<SessionSummary>,
}

pub struct AlertService {
    settings: Settings,
    collaborators: Collaborators,
    next_id: u64,
    active: Option<ActiveSession>,
}

impl AlertService {
    pub fn new(settings: Settings, collaborators: Collaborators) -> Self {
        Self {
            settings,
            collaborators,
            next_id: 0,
            active: None,
        }
    }

    /// Start a new session, cancelling any active one. Returns the session id.
    pub fn trigger(&mut self) -> u64 {
        if let Some(previous) = self.active.take() {
            if !previous.task.is_finished() {
                log::info!("Replacing active alert session {}", previous.id);
                previous.cancellation.cancel();
            }
        }

        self.next_id += 1;
        let id = self.next_id;
        let cancellation = CancellationToken::new();
        let task = tokio::spawn(run_session(
            id,
            self.settings.clone(),
            self.collaborators.clone(),
            cancellation.clone(),
        ));

        self.active = Some(ActiveSession {
            id,
            cancellation,
            task,
        });
        id
    }

    /// Id of the session still running, if any.
    pub fn active_session(&self) -> Option<u64> {
        self.active
            .as_ref()
            .filter(|s| !s.task.is_finished())
            .map(|s| s.id)
    }

    /// Host teardown: stop the active session's monitor.
    pub fn cancel(&self) {
        if let Some(session) = &self.active {
            log::info!("Cancelling alert session {}", session.id);
            session.cancellation.cancel();
        }
    }

    /// Wait for the active session to finish. Cancel-safe: dropping the
    /// future leaves the session active.
    pub async fn wait(&mut self) -> Option<SessionSummary> {
        let session = self.active.as_mut()?;
        let id = session.id;
        let joined = (&mut session.task).await;
        self.active = None;
        match joined {
            Ok(summary) => Some(summary),
            Err(e) => {
                log::error!("Alert session {} failed: {}", id, e);
                None
            }
        }
    }
}

/// Wire one dispatch cycle and its monitor from settings.
pub fn build_orchestrator(
    settings: &Settings,
    collaborators: &Collaborators,
    outcomes: OutcomeSender,
    delivery: watch::Receiver<DeliveryStats>,
) -> DispatchOrchestrator {
    let composer = Arc::new(MessageComposer::new(settings.alert.clone()));
    let fanout = Arc::new(FanoutDispatcher::new(
        collaborators.transport.clone(),
        outcomes,
        DestinationNormalizer::new(settings.default_country_prefix.clone()),
        settings.segments,
    ));
    let monitor = MonitorLoop::new(
        settings.monitor_config(),
        collaborators.location.clone(),
        collaborators.permissions.clone(),
        collaborators.contacts.clone(),
        collaborators.status.clone(),
        fanout.clone(),
        composer.clone(),
    );

    DispatchOrchestrator::new(
        collaborators.clone(),
        composer,
        fanout,
        settings.timings(),
        delivery,
        monitor,
    )
}

async fn run_session(
    id: u64,
    settings: Settings,
    collaborators: Collaborators,
    cancellation: CancellationToken,
) -> SessionSummary {
    log::info!("Alert session {} started", id);

    let (outcomes, events) = outcome_channel();
    let (tracker, delivery) = DeliveryTracker::new();
    let tracker_cancellation = CancellationToken::new();
    let tracker_task = tracker.spawn(events, tracker_cancellation.clone());

    let orchestrator = build_orchestrator(&settings, &collaborators, outcomes, delivery);
    let run = orchestrator.run(cancellation).await;

    let monitor = match run.monitor {
        Some(handle) => handle.join().await,
        None => None,
    };

    tracker_cancellation.cancel();
    let delivery = match tracker_task.await {
        Ok(stats) => stats,
        Err(e) => {
            log::error!("Delivery tracker for session {} failed: {}", id, e);
            DeliveryStats::default()
        }
    };

    log::info!(
        "Alert session {} finished: {:?}, monitor {:?}, {} sent, {} failed, {} delivered",
        id,
        run.report.phase,
        monitor,
        delivery.sent,
        delivery.failed,
        delivery.delivered
    );

    SessionSummary {
        id,
        dispatch: run.report,
        monitor,
        delivery,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::core::alerts::fanout::test_support::RecordingTransport;
    use crate::core::error::GeocodeError;
    use crate::core::location::ReverseGeocoder;
    use crate::core::model::Position;
    use crate::core::monitor::test_support::{Permissions, RecordingStatus, ScriptedLocation, StaticContacts};
    use crate::core::orchestrator::{AbortReason, DispatchPhase};
    use async_trait::async_trait;

    struct StreetGeocoder;

    #[async_trait]
    impl ReverseGeocoder for StreetGeocoder {
        async fn resolve(&self, _latitude: f64, _longitude: f64) -> Result<String, GeocodeError> {
            Ok("12 Residency Road, Bengaluru".to_string())
        }
    }

    fn collaborators(
        contacts: &str,
        location: Arc<ScriptedLocation>,
        transport: Arc<RecordingTransport>,
    ) -> Collaborators {
        Collaborators {
            contacts: Arc::new(StaticContacts(contacts.to_string())),
            permissions: Arc::new(Permissions {
                send: true,
                location: true,
            }),
            location,
            geocoder: Arc::new(StreetGeocoder),
            transport,
            status: Arc::new(RecordingStatus::default()),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_runs_until_stationary_termination() {
        let here = Position::new(12.97, 77.59);
        let location = Arc::new(ScriptedLocation::new(vec![Some(here)]));
        let transport = Arc::new(RecordingTransport::default());
        let mut service = AlertService::new(
            Settings::default(),
            collaborators("9876543210,+441234567", location.clone(), transport.clone()),
        );

        let id = service.trigger();
        assert_eq!(service.active_session(), Some(id));

        let summary = service.wait().await.unwrap();
        assert_eq!(summary.id, id);
        assert_eq!(summary.dispatch.phase, DispatchPhase::Done);
        assert!(summary
            .dispatch
            .message
            .as_ref()
            .unwrap()
            .as_str()
            .contains("Loc: 12 Residency Road, Bengaluru"));
        // One reading for the alert, then baseline plus three stationary ticks.
        assert_eq!(summary.monitor, Some(MonitorExit::Terminated { ticks: 4 }));
        assert_eq!(location.calls(), 5);
        assert_eq!(summary.delivery.sent, 2);
        assert_eq!(summary.delivery.delivered, 2);
        assert_eq!(transport.count(), 2);
        assert!(service.active_session().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_trigger_replaces_active_session() {
        let location = Arc::new(ScriptedLocation::new(vec![Some(Position::new(1.0, 1.0))]));
        let transport = Arc::new(RecordingTransport::default());
        let mut service = AlertService::new(
            Settings::default(),
            collaborators("555", location, transport.clone()),
        );

        let first = service.trigger();
        tokio::time::sleep(Duration::from_secs(1)).await;
        let second = service.trigger();
        assert_ne!(first, second);

        let summary = service.wait().await.unwrap();
        assert_eq!(summary.id, second);
        assert_eq!(summary.monitor, Some(MonitorExit::Terminated { ticks: 4 }));
        assert_eq!(transport.count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_monitoring() {
        let location = Arc::new(ScriptedLocation::new(vec![Some(Position::new(1.0, 1.0))]));
        let transport = Arc::new(RecordingTransport::default());
        let mut service = AlertService::new(
            Settings::default(),
            collaborators("555", location, transport),
        );

        service.trigger();
        tokio::time::sleep(Duration::from_secs(30)).await;
        service.cancel();

        let summary = service.wait().await.unwrap();
        assert!(matches!(summary.monitor, Some(MonitorExit::Cancelled { .. })));
    }

    #[tokio::test]
    async fn test_aborted_session_has_no_monitor() {
        let location = Arc::new(ScriptedLocation::new(vec![]));
        let transport = Arc::new(RecordingTransport::default());
        let mut service = AlertService::new(
            Settings::default(),
            collaborators("", location.clone(), transport.clone()),
        );

        service.trigger();
        let summary = service.wait().await.unwrap();

        assert_eq!(summary.dispatch.phase, DispatchPhase::Aborted(AbortReason::NoContacts));
        assert!(summary.monitor.is_none());
        assert_eq!(location.calls(), 0);
        assert_eq!(transport.count(), 0);
    }
}
