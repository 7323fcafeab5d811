use std::path::PathBuf;
use std::sync::Arc;

use crate::core::{
    config::{ConfigManager, Settings},
    location::FixedLocationProvider,
    platform::Collaborators,
    service::AlertService,
};
use crate::host::{LogStatusSink, LoopbackTransport, NoGeocoder, SettingsContactStore, StaticPermissionGate};

const CONFIG_DIR_ENV: &str = "DISTRESS_DISPATCH_CONFIG_DIR";

fn config_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV) {
        return PathBuf::from(dir);
    }
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".config/distress-dispatch")
}

fn host_collaborators(settings: &Settings) -> Collaborators {
    Collaborators {
        contacts: Arc::new(SettingsContactStore::new(settings)),
        permissions: Arc::new(StaticPermissionGate::new(
            settings.host.send_allowed,
            settings.host.location_allowed,
        )),
        location: Arc::new(FixedLocationProvider::new(settings.host.position)),
        geocoder: Arc::new(NoGeocoder),
        transport: Arc::new(LoopbackTransport),
        status: Arc::new(LogStatusSink),
    }
}

/// Trigger one alert session and run it until monitoring ends or Ctrl-C.
pub fn run() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config_manager = ConfigManager::new(config_dir());
    let settings = config_manager.load();
    log::info!(
        "Loaded settings: {} contact entries, check interval {}s",
        settings.contact_list().len(),
        settings.monitor.check_interval_seconds
    );

    let runtime = tokio::runtime::Runtime::new().expect("error while starting tokio runtime");
    runtime.block_on(async move {
        let collaborators = host_collaborators(&settings);
        let mut service = AlertService::new(settings, collaborators);
        service.trigger();

        tokio::select! {
            summary = service.wait() => {
                if let Some(summary) = summary {
                    println!(
                        "Session {} finished: {} contacts attempted, monitor {:?}",
                        summary.id,
                        summary.dispatch.attempted(),
                        summary.monitor
                    );
                }
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted, stopping alert session");
                service.cancel();
                service.wait().await;
            }
        }
    });
}
