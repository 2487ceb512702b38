/*!
Alert outputs: console lines and an append-only JSON-lines log
*/

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::core::{
    config::{OutputConfig, TerminalFormat},
    detection_engine::{AlertEvent, Severity},
};

pub type OutputResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Trait for output plugins
#[async_trait]
pub trait OutputHandler: Send {
    /// Name of the output handler
    fn name(&self) -> &'static str;

    /// Initialize the output handler (open files, etc.)
    async fn initialize(&mut self) -> OutputResult;

    /// Handle one alert
    async fn handle_alert(&mut self, alert: &AlertEvent) -> OutputResult;

    /// Flush and release resources
    async fn finalize(&mut self) -> OutputResult;
}

/// Fans alerts out to every enabled handler.
///
/// A handler that fails is dropped with a warning; the rest keep going.
pub struct OutputManager {
    handlers: Vec<Box<dyn OutputHandler>>,
}

impl OutputManager {
    pub fn new(config: &OutputConfig) -> Self {
        let mut handlers: Vec<Box<dyn OutputHandler>> = Vec::new();

        if config.console {
            handlers.push(Box::new(TerminalOutputHandler::new(config.console_format)));
        }
        if let Some(path) = &config.jsonl {
            handlers.push(Box::new(JsonLinesOutputHandler::new(path.clone())));
        }

        info!("Initialized output manager with {} handlers", handlers.len());
        Self { handlers }
    }

    #[cfg(test)]
    pub fn with_handlers(handlers: Vec<Box<dyn OutputHandler>>) -> Self {
        Self { handlers }
    }

    /// Initialize all handlers, dropping those that cannot start
    pub async fn initialize(&mut self) {
        let mut ready = Vec::with_capacity(self.handlers.len());
        for mut handler in self.handlers.drain(..) {
            match handler.initialize().await {
                Ok(()) => {
                    info!("Initialized output handler: {}", handler.name());
                    ready.push(handler);
                }
                Err(e) => warn!("Disabling {} output: {}", handler.name(), e),
            }
        }
        self.handlers = ready;
    }

    /// Send an alert to every handler
    pub async fn handle_alert(&mut self, alert: &AlertEvent) {
        let mut failed = Vec::new();
        for (idx, handler) in self.handlers.iter_mut().enumerate() {
            if let Err(e) = handler.handle_alert(alert).await {
                warn!("Disabling {} output after write failure: {}", handler.name(), e);
                failed.push(idx);
            }
        }
        for idx in failed.into_iter().rev() {
            let mut handler = self.handlers.remove(idx);
            if let Err(e) = handler.finalize().await {
                warn!("Failed to finalize {} output: {}", handler.name(), e);
            }
        }
    }

    /// Finalize all handlers
    pub async fn finalize(&mut self) {
        for handler in &mut self.handlers {
            if let Err(e) = handler.finalize().await {
                warn!("Failed to finalize {} output: {}", handler.name(), e);
            }
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Appends one JSON object per alert
pub struct JsonLinesOutputHandler {
    file_path: PathBuf,
    file: Option<File>,
}

impl JsonLinesOutputHandler {
    pub fn new(file_path: PathBuf) -> Self {
        Self {
            file_path,
            file: None,
        }
    }
}

#[async_trait]
impl OutputHandler for JsonLinesOutputHandler {
    fn name(&self) -> &'static str {
        "JSONL"
    }

    async fn initialize(&mut self) -> OutputResult {
        if let Some(parent) = self.file_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        self.file = Some(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.file_path)?,
        );
        Ok(())
    }

    async fn handle_alert(&mut self, alert: &AlertEvent) -> OutputResult {
        if let Some(ref mut file) = self.file {
            let json_str = serde_json::to_string(alert)?;
            writeln!(file, "{}", json_str)?;
            file.flush()?;
        }
        Ok(())
    }

    async fn finalize(&mut self) -> OutputResult {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }
        Ok(())
    }
}

/// Terminal output handler
pub struct TerminalOutputHandler {
    format: TerminalFormat,
}

impl TerminalOutputHandler {
    pub fn new(format: TerminalFormat) -> Self {
        Self { format }
    }

    fn format_alert(&self, alert: &AlertEvent) -> String {
        match self.format {
            TerminalFormat::Plain => alert_line(alert, alert.severity.as_str()),
            TerminalFormat::Colored => {
                let color = match alert.severity {
                    Severity::DroneConfirmed => "31",
                    Severity::OuiMatch => "33",
                    Severity::SsidMatch => "36",
                };
                alert_line(alert, &format!("\x1b[1;{color}m{}\x1b[0m", alert.severity))
            }
            TerminalFormat::Json => serde_json::to_string(alert)
                .unwrap_or_else(|_| "JSON serialization failed".to_string()),
        }
    }
}

/// `[TIME] SEVERITY BSSID=.. SSID='..' OUI=.. TAGS=a,b CH=.. PWR=..`, empty parts left out
fn alert_line(alert: &AlertEvent, severity: &str) -> String {
    let mut line = format!("[{}] {} BSSID={}", alert.time_string(), severity, alert.bssid);
    if let Some(ssid) = &alert.ssid {
        line.push_str(&format!(" SSID='{ssid}'"));
    }
    if let Some(oui) = &alert.oui {
        line.push_str(&format!(" OUI={oui}"));
    }
    if let Some(labels) = &alert.ssid_labels {
        line.push_str(&format!(" TAGS={}", labels.join(",")));
    }
    if !alert.channel.is_empty() {
        line.push_str(&format!(" CH={}", alert.channel));
    }
    if !alert.power.is_empty() {
        line.push_str(&format!(" PWR={}", alert.power));
    }
    line
}

#[async_trait]
impl OutputHandler for TerminalOutputHandler {
    fn name(&self) -> &'static str {
        "Terminal"
    }

    async fn initialize(&mut self) -> OutputResult {
        Ok(())
    }

    async fn handle_alert(&mut self, alert: &AlertEvent) -> OutputResult {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", self.format_alert(alert))?;
        stdout.flush()?;
        Ok(())
    }

    async fn finalize(&mut self) -> OutputResult {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::detection_engine::ALERT_SOURCE;
    use chrono::{TimeZone, Utc};
    use std::sync::{Arc, Mutex};

    fn alert() -> AlertEvent {
        AlertEvent {
            time: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
            severity: Severity::DroneConfirmed,
            bssid: "AA:BB:CC:11:22:33".to_string(),
            channel: "6".to_string(),
            power: "-41".to_string(),
            ssid: Some("DJI-Mavic-1234".to_string()),
            oui: Some("AA:BB:CC".to_string()),
            ssid_labels: Some(vec!["dji".to_string(), "mavic".to_string()]),
            source: ALERT_SOURCE,
            csv: PathBuf::from("/tmp/scan-01.csv"),
        }
    }

    #[test]
    fn plain_line_lists_every_present_field() {
        let line = TerminalOutputHandler::new(TerminalFormat::Plain).format_alert(&alert());
        assert_eq!(
            line,
            "[2024-05-01T10:00:00Z] DRONE_CONFIRMED BSSID=AA:BB:CC:11:22:33 SSID='DJI-Mavic-1234' OUI=AA:BB:CC TAGS=dji,mavic CH=6 PWR=-41"
        );
    }

    #[test]
    fn plain_line_omits_missing_fields() {
        let mut sparse = alert();
        sparse.severity = Severity::OuiMatch;
        sparse.ssid = None;
        sparse.ssid_labels = None;
        sparse.channel.clear();
        sparse.power.clear();
        let line = TerminalOutputHandler::new(TerminalFormat::Plain).format_alert(&sparse);
        assert_eq!(line, "[2024-05-01T10:00:00Z] OUI_MATCH BSSID=AA:BB:CC:11:22:33 OUI=AA:BB:CC");
    }

    #[test]
    fn colored_line_wraps_only_the_severity() {
        let line = TerminalOutputHandler::new(TerminalFormat::Colored).format_alert(&alert());
        assert!(line.contains("\x1b[1;31mDRONE_CONFIRMED\x1b[0m BSSID="));
    }

    #[tokio::test]
    async fn jsonl_appends_one_record_per_alert() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("alerts.jsonl");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{\"earlier\":true}\n").unwrap();

        let mut manager = OutputManager::new(&OutputConfig {
            console: false,
            console_format: TerminalFormat::Plain,
            jsonl: Some(path.clone()),
        });
        manager.initialize().await;
        manager.handle_alert(&alert()).await;
        manager.handle_alert(&alert()).await;
        manager.finalize().await;

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        let record: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(record["severity"], "DRONE_CONFIRMED");
        assert_eq!(record["ssid_labels"], serde_json::json!(["dji", "mavic"]));
        assert_eq!(record["csv"], "/tmp/scan-01.csv");
    }

    #[tokio::test]
    async fn unopenable_log_is_dropped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = OutputManager::new(&OutputConfig {
            console: false,
            console_format: TerminalFormat::Plain,
            // A directory cannot be opened for appending
            jsonl: Some(dir.path().to_path_buf()),
        });
        assert_eq!(manager.len(), 1);
        manager.initialize().await;
        assert!(manager.is_empty());
        manager.handle_alert(&alert()).await;
    }

    struct Flaky {
        calls: Arc<Mutex<usize>>,
        finalized: Arc<Mutex<usize>>,
    }

    #[async_trait]
    impl OutputHandler for Flaky {
        fn name(&self) -> &'static str {
            "Flaky"
        }

        async fn initialize(&mut self) -> OutputResult {
            Ok(())
        }

        async fn handle_alert(&mut self, _alert: &AlertEvent) -> OutputResult {
            *self.calls.lock().unwrap() += 1;
            Err("disk full".into())
        }

        async fn finalize(&mut self) -> OutputResult {
            *self.finalized.lock().unwrap() += 1;
            Err("close failed".into())
        }
    }

    #[tokio::test]
    async fn failing_handler_is_finalized_and_removed_after_first_error() {
        let calls = Arc::new(Mutex::new(0));
        let finalized = Arc::new(Mutex::new(0));
        let mut manager = OutputManager::with_handlers(vec![Box::new(Flaky {
            calls: Arc::clone(&calls),
            finalized: Arc::clone(&finalized),
        })]);
        manager.initialize().await;

        manager.handle_alert(&alert()).await;
        manager.handle_alert(&alert()).await;
        assert_eq!(*calls.lock().unwrap(), 1);
        assert_eq!(*finalized.lock().unwrap(), 1);
        assert!(manager.is_empty());

        manager.finalize().await;
        assert_eq!(*finalized.lock().unwrap(), 1);
    }
}
