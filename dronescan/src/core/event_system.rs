/*!
Polling of airodump-ng snapshots on a fixed interval
*/

use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_stream::{Stream, StreamExt, wrappers::IntervalStream};
use tracing::{debug, info};

use dronescan_data::{ApRecord, find_latest_snapshot, parse_snapshot_text};

/// Events emitted by the snapshot monitor, one per poll
#[derive(Debug, Clone)]
pub enum CaptureEvent {
    /// Freshest snapshot and the access points parsed from it
    Snapshot { path: PathBuf, records: Vec<ApRecord> },
    /// Capture process has not written a snapshot yet
    NoSnapshot,
    /// Snapshot could not be read this time around
    MonitoringError(String),
}

/// Watches `<prefix>-NN.csv` for the newest snapshot
pub struct SnapshotMonitor {
    prefix: PathBuf,
    interval: Duration,
    current: Option<PathBuf>,
}

impl SnapshotMonitor {
    pub fn new(prefix: PathBuf, interval: Duration) -> Self {
        Self {
            prefix,
            interval,
            current: None,
        }
    }

    /// Poll once per interval, first poll immediately.
    ///
    /// The next poll only starts once the consumer has asked for the next event, so
    /// a snapshot is always fully handled before another one is read. Late ticks are
    /// delayed rather than bunched up.
    pub fn into_stream(mut self) -> impl Stream<Item = CaptureEvent> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticks = IntervalStream::new(ticker);

        async_stream::stream! {
            while ticks.next().await.is_some() {
                yield self.poll().await;
            }
        }
    }

    /// Locate and parse the freshest snapshot
    pub async fn poll(&mut self) -> CaptureEvent {
        let prefix = self.prefix.clone();
        let latest = match tokio::task::spawn_blocking(move || find_latest_snapshot(&prefix)).await {
            Ok(latest) => latest,
            Err(e) => return CaptureEvent::MonitoringError(format!("snapshot scan failed: {e}")),
        };

        let Some(path) = latest else {
            debug!("No snapshot under {:?} yet", self.prefix);
            return CaptureEvent::NoSnapshot;
        };

        if self.current.as_ref() != Some(&path) {
            info!("📄 Reading snapshots from {:?}", path);
            self.current = Some(path.clone());
        }

        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let records = parse_snapshot_text(&String::from_utf8_lossy(&bytes));
                debug!("Parsed {} access points from {:?}", records.len(), path);
                CaptureEvent::Snapshot { path, records }
            }
            // Rotated away between listing and reading
            Err(e) if e.kind() == ErrorKind::NotFound => CaptureEvent::NoSnapshot,
            Err(e) => CaptureEvent::MonitoringError(format!("failed to read {}: {e}", path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNAPSHOT: &str = "BSSID, First time seen, Last time seen, channel, Speed, Privacy, Cipher, Authentication, Power, # beacons, # IV, LAN IP, ID-length, ESSID, Key\n\
AA:BB:CC:11:22:33, 2024-05-01 10:00:00, 2024-05-01 10:00:09, 6, 54, WPA2, CCMP, PSK, -41, 12, 0, 0.0.0.0, 7, Generic, \n\n";

    #[tokio::test]
    async fn reports_missing_snapshot_then_parses_it() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("scan");
        let mut monitor = SnapshotMonitor::new(prefix, Duration::from_secs(1));

        assert!(matches!(monitor.poll().await, CaptureEvent::NoSnapshot));

        let path = dir.path().join("scan-01.csv");
        std::fs::write(&path, SNAPSHOT).unwrap();
        match monitor.poll().await {
            CaptureEvent::Snapshot { path: seen, records } => {
                assert_eq!(seen, path);
                assert_eq!(records.len(), 1);
                assert_eq!(records[0].essid, "Generic");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn stream_polls_once_per_tick() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("scan-01.csv"), SNAPSHOT).unwrap();

        let monitor = SnapshotMonitor::new(dir.path().join("scan"), Duration::from_millis(10));
        let events = monitor.into_stream();
        tokio::pin!(events);

        for _ in 0..3 {
            match events.next().await {
                Some(CaptureEvent::Snapshot { records, .. }) => assert_eq!(records.len(), 1),
                other => panic!("unexpected event {other:?}"),
            }
        }
    }
}
