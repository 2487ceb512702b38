/*!
Parsers for the static inputs and the live capture output that drive drone
access-point detection.

- [`vendor`]: hardware-address vendor prefixes (OUIs) and the vendor-file validator
- [`rules`]: labeled network-name patterns and the rule-document parsers
- [`store`]: both rule sets bundled for the detector
- [`snapshot`]: discovery and parsing of airodump-ng CSV snapshots
*/

pub mod error;
pub mod rules;
pub mod snapshot;
pub mod store;
pub mod vendor;

pub use error::{CaptureError, SignatureError};
pub use rules::{NamePatterns, RuleDocument, RuleDocumentParser, default_rule_parser};
pub use snapshot::{
    ApRecord, find_latest_snapshot, parse_snapshot, parse_snapshot_text, select_latest,
};
pub use store::SignatureStore;
pub use vendor::{ValidationReport, VendorPrefixSet, validate_vendor_file, vendor_prefix};
