/*!
Signature-based detection of drone access points
*/

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use tracing::{debug, info};

use dronescan_data::{ApRecord, SignatureStore};

use crate::core::state_manager::{DedupKey, SuppressionState};

/// Fixed provenance tag carried by every alert
pub const ALERT_SOURCE: &str = "dronescan(airodump-ng)";

/// Confidence of an alert, from the signature types that matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// Vendor prefix only
    OuiMatch,
    /// Network name only
    SsidMatch,
    /// Vendor prefix and network name
    DroneConfirmed,
}

impl Severity {
    /// Highest applicable severity, or `None` when nothing matched
    pub fn from_hits(vendor_hit: bool, name_hit: bool) -> Option<Self> {
        match (vendor_hit, name_hit) {
            (true, true) => Some(Severity::DroneConfirmed),
            (true, false) => Some(Severity::OuiMatch),
            (false, true) => Some(Severity::SsidMatch),
            (false, false) => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::OuiMatch => "OUI_MATCH",
            Severity::SsidMatch => "SSID_MATCH",
            Severity::DroneConfirmed => "DRONE_CONFIRMED",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A detection that made it past de-duplication
#[derive(Debug, Clone, Serialize)]
pub struct AlertEvent {
    #[serde(serialize_with = "serialize_utc_seconds")]
    pub time: DateTime<Utc>,
    pub severity: Severity,
    pub bssid: String,
    pub channel: String,
    pub power: String,
    pub ssid: Option<String>,
    /// Matched vendor prefix
    pub oui: Option<String>,
    /// Matched name-rule labels
    pub ssid_labels: Option<Vec<String>>,
    pub source: &'static str,
    /// Snapshot the access point was read from
    pub csv: PathBuf,
}

impl AlertEvent {
    /// UTC timestamp with second precision, e.g. `2024-05-01T10:00:00Z`
    pub fn time_string(&self) -> String {
        self.time.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

fn serialize_utc_seconds<S: Serializer>(time: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&time.to_rfc3339_opts(SecondsFormat::Secs, true))
}

/// What a single detector found on one access point
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureHit {
    VendorPrefix(String),
    NameLabels(Vec<String>),
}

/// Trait for signature detectors
pub trait SignatureDetector: Send + Sync {
    /// Name of the detector
    fn name(&self) -> &'static str;

    /// Check one access point; `None` means no match
    fn detect(&self, record: &ApRecord) -> Option<SignatureHit>;
}

/// Matches the vendor prefix of the hardware address
struct VendorPrefixDetector {
    signatures: Arc<SignatureStore>,
}

impl SignatureDetector for VendorPrefixDetector {
    fn name(&self) -> &'static str {
        "VendorPrefix"
    }

    fn detect(&self, record: &ApRecord) -> Option<SignatureHit> {
        self.signatures.vendor_hit(&record.bssid).map(SignatureHit::VendorPrefix)
    }
}

/// Matches the broadcast name against every labeled pattern
struct NamePatternDetector {
    signatures: Arc<SignatureStore>,
}

impl SignatureDetector for NamePatternDetector {
    fn name(&self) -> &'static str {
        "NamePattern"
    }

    fn detect(&self, record: &ApRecord) -> Option<SignatureHit> {
        let labels = self.signatures.name_hits(&record.essid);
        (!labels.is_empty()).then_some(SignatureHit::NameLabels(labels))
    }
}

/// Context threaded through each evaluation pass
pub struct DetectionContext<'a> {
    pub suppression: &'a mut SuppressionState,
    pub now: DateTime<Utc>,
}

/// Combined verdict for one access point, before de-duplication
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub severity: Severity,
    pub prefix: Option<String>,
    pub labels: Vec<String>,
}

/// Runs every detector over each access point and turns hits into alerts
pub struct DetectionEngine {
    detectors: Vec<Box<dyn SignatureDetector>>,
}

impl DetectionEngine {
    pub fn new(signatures: Arc<SignatureStore>) -> Self {
        let detectors: Vec<Box<dyn SignatureDetector>> = vec![
            Box::new(VendorPrefixDetector {
                signatures: Arc::clone(&signatures),
            }),
            Box::new(NamePatternDetector { signatures }),
        ];

        info!("Initialized detection engine with {} detectors", detectors.len());

        Self { detectors }
    }

    /// Evaluate one access point against all detectors.
    ///
    /// Records without a hardware address are never classified.
    pub fn classify(&self, record: &ApRecord) -> Option<Detection> {
        if record.bssid.is_empty() {
            return None;
        }

        let mut prefix = None;
        let mut labels = Vec::new();
        for detector in &self.detectors {
            match detector.detect(record) {
                Some(SignatureHit::VendorPrefix(p)) => prefix = Some(p),
                Some(SignatureHit::NameLabels(l)) => labels.extend(l),
                None => {
                    debug!("No {} match for {}", detector.name(), record.bssid);
                }
            }
        }

        let severity = Severity::from_hits(prefix.is_some(), !labels.is_empty())?;
        Some(Detection {
            severity,
            prefix,
            labels,
        })
    }

    /// Evaluate a whole snapshot, returning the alerts that pass de-duplication.
    ///
    /// Every record is re-evaluated on every pass; the suppression window alone
    /// keeps persistent sightings from repeating.
    pub fn process_snapshot(
        &self,
        snapshot: &Path,
        records: &[ApRecord],
        context: &mut DetectionContext<'_>,
    ) -> Vec<AlertEvent> {
        let mut alerts = Vec::new();

        for record in records {
            let Some(detection) = self.classify(record) else {
                continue;
            };

            let key = DedupKey {
                severity: detection.severity,
                prefix: detection.prefix.clone().unwrap_or_default(),
                name: record.essid.clone(),
            };
            if !context.suppression.should_emit(key, context.now) {
                continue;
            }

            alerts.push(AlertEvent {
                time: context.now,
                severity: detection.severity,
                bssid: record.bssid.clone(),
                channel: record.channel.clone(),
                power: record.power.clone(),
                ssid: (!record.essid.is_empty()).then(|| record.essid.clone()),
                oui: detection.prefix,
                ssid_labels: (!detection.labels.is_empty()).then_some(detection.labels),
                source: ALERT_SOURCE,
                csv: snapshot.to_path_buf(),
            });
        }

        alerts
    }
}
