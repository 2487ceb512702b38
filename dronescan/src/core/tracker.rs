/*!
Main async coordinator: capture process, snapshot polling, detection and alerting
*/

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tempfile::TempDir;
use tokio_stream::StreamExt;
use tracing::{error, info, warn};

use dronescan_data::{SignatureStore, default_rule_parser};

use crate::core::{
    config::DronescanConfig,
    detection_engine::{DetectionContext, DetectionEngine},
    event_system::{CaptureEvent, SnapshotMonitor},
    output_plugins::OutputManager,
    state_manager::SuppressionState,
    supervisor::{CaptureProcess, SupervisorError},
};

/// Running totals for the session
#[derive(Debug, Clone, Default)]
pub struct ScanStats {
    pub snapshots_processed: u64,
    pub records_evaluated: u64,
    pub alerts_emitted: u64,
}

/// Where snapshots are written, and the scratch directory backing it if any
struct SnapshotPrefix {
    path: PathBuf,
    _scratch: Option<TempDir>,
}

impl SnapshotPrefix {
    fn resolve(configured: Option<&Path>) -> std::io::Result<Self> {
        match configured {
            Some(prefix) => {
                let path = std::path::absolute(expand_home(prefix))?;
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                Ok(Self { path, _scratch: None })
            }
            None => {
                let scratch = tempfile::Builder::new().prefix("dronescan_").tempdir()?;
                Ok(Self {
                    path: scratch.path().join("scan"),
                    _scratch: Some(scratch),
                })
            }
        }
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

/// Main tracker that coordinates all components
pub struct ScanTracker {
    config: DronescanConfig,
    prefix: SnapshotPrefix,
    capture: CaptureProcess,
    detection_engine: DetectionEngine,
    suppression: SuppressionState,
    output_manager: OutputManager,
    stats: ScanStats,
}

impl ScanTracker {
    /// Load the rules, launch the capture process and open the outputs.
    ///
    /// Fails only when the snapshot location cannot be prepared or the capture
    /// process cannot be started.
    pub async fn new(config: DronescanConfig) -> Result<Self, Box<dyn std::error::Error>> {
        info!("Initializing drone scanner...");

        let signatures = &config.signatures;
        let parser = default_rule_parser();
        let store = SignatureStore::load(
            &signatures.resolve(&signatures.drone_ouis),
            &signatures.resolve(&signatures.module_ouis),
            signatures.include_modules,
            &signatures.resolve(&signatures.ssid_rules),
            parser.as_ref(),
        );
        if store.vendors.is_empty() && store.names.is_empty() {
            warn!("No vendor prefixes or SSID patterns loaded; nothing can match");
        }
        let vendor_count = store.vendors.len();
        let pattern_count = store.names.pattern_count();

        let prefix = SnapshotPrefix::resolve(config.capture.prefix.as_deref())?;
        let capture = CaptureProcess::start(&config.capture, &prefix.path)?;

        info!("🚀 Started capture: {}", capture.command_line());
        info!("🔍 Loaded {} OUIs and {} SSID patterns", vendor_count, pattern_count);
        info!(
            "📁 Snapshot prefix: {}-NN.csv (interval {}s)",
            prefix.path.display(),
            config.capture.poll_interval().as_secs()
        );

        let mut output_manager = OutputManager::new(&config.outputs);
        output_manager.initialize().await;

        Ok(Self {
            detection_engine: DetectionEngine::new(Arc::new(store)),
            suppression: SuppressionState::new(config.detection.suppression_window()),
            config,
            prefix,
            capture,
            output_manager,
            stats: ScanStats::default(),
        })
    }

    /// Poll and alert until `shutdown` resolves or the capture process dies.
    ///
    /// The capture process is stopped and the outputs are flushed either way.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<(), Box<dyn std::error::Error>>
    where
        F: Future<Output = ()>,
    {
        let monitor = SnapshotMonitor::new(self.prefix.path.clone(), self.config.capture.poll_interval());
        let events = monitor.into_stream();
        tokio::pin!(events);
        tokio::pin!(shutdown);

        let outcome = loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("🛑 Interrupt received, shutting down");
                    break Ok(());
                }
                event = events.next() => {
                    let Some(event) = event else { break Ok(()) };
                    // A final snapshot written just before exit is still evaluated
                    self.handle_event(event).await;
                    if let Some(status) = self.capture.exit_status() {
                        error!("Capture process exited ({}); stopping", status);
                        break Err(SupervisorError::Exited(status));
                    }
                }
            }
        };

        self.shutdown().await;
        outcome.map_err(Into::into)
    }

    /// Handle a single poll result
    async fn handle_event(&mut self, event: CaptureEvent) {
        match event {
            CaptureEvent::Snapshot { path, records } => {
                let mut context = DetectionContext {
                    suppression: &mut self.suppression,
                    now: Utc::now(),
                };
                let alerts = self.detection_engine.process_snapshot(&path, &records, &mut context);

                self.stats.snapshots_processed += 1;
                self.stats.records_evaluated += records.len() as u64;
                self.stats.alerts_emitted += alerts.len() as u64;

                for alert in &alerts {
                    self.output_manager.handle_alert(alert).await;
                }
            }
            CaptureEvent::NoSnapshot => {}
            CaptureEvent::MonitoringError(e) => {
                warn!("⚠️ Snapshot unavailable this cycle: {}", e);
            }
        }
    }

    /// Stop the capture process and flush outputs. Safe to call more than once.
    pub async fn shutdown(&mut self) {
        self.capture.stop().await;
        self.output_manager.finalize().await;
        info!(
            "🏁 Scanner stopped: {} snapshots, {} access points evaluated, {} alerts",
            self.stats.snapshots_processed, self.stats.records_evaluated, self.stats.alerts_emitted
        );
    }

    #[cfg(test)]
    pub fn stats(&self) -> &ScanStats {
        &self.stats
    }

    #[cfg(test)]
    pub fn snapshot_prefix(&self) -> &Path {
        &self.prefix.path
    }
}
