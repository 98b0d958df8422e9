//! Watcher health check.
//!
//! Periodically writes a probe file under the first watch root and expects
//! the corresponding touch event back within the timeout. A missed round trip
//! means the OS backend has silently stopped delivering; an incident is
//! published so the embedder can restart the watcher.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::events::WatcherIncident;
use crate::file_map::{FileMap, HEALTH_PROBE_PREFIX};

/// Health check settings (`watcher.healthCheck` in the bundler config).
#[derive(Debug, Clone)]
pub struct HealthCheckConfig {
    pub enabled: bool,
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(5),
        }
    }
}

/// Run the probe loop until the returned handle is aborted.
///
/// No-op (immediately returning task) when the config is disabled or the file
/// map has no roots.
pub fn spawn_health_check(
    file_map: Arc<FileMap>,
    config: HealthCheckConfig,
    roots: Vec<std::path::PathBuf>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if !config.enabled {
            return;
        }
        let Some(root) = roots.first().cloned() else {
            return;
        };

        let mut counter: u64 = 0;
        let incidents = file_map_incident_sender(&file_map);

        loop {
            tokio::time::sleep(config.interval).await;
            counter += 1;

            let probe_name = format!("{HEALTH_PROBE_PREFIX}{}-{counter}", std::process::id());
            let probe_path = root.join(&probe_name);

            let mut subscription = {
                let probe_path = probe_path.clone();
                file_map.subscribe(move |event| event.path == probe_path)
            };

            if std::fs::write(&probe_path, b"ferry watcher health probe").is_err() {
                incidents(WatcherIncident::new(format!(
                    "health check could not write probe {}",
                    probe_path.display()
                )));
                continue;
            }

            let observed =
                tokio::time::timeout(config.timeout, subscription.recv()).await;

            let _ = std::fs::remove_file(&probe_path);

            match observed {
                Ok(Some(_)) => debug!(probe = %probe_path.display(), "watcher health check ok"),
                _ => incidents(WatcherIncident::new(format!(
                    "watcher health check timed out after {:?} waiting for {}",
                    config.timeout,
                    probe_path.display()
                ))),
            }
        }
    })
}

fn file_map_incident_sender(file_map: &Arc<FileMap>) -> impl Fn(WatcherIncident) {
    let file_map = Arc::clone(file_map);
    move |incident| file_map.report_incident(incident)
}
