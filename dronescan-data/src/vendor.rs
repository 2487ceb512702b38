/*!
Vendor prefix (OUI) tables

Vendor files are CSV tables with a `vendor,oui,source_url,notes` header. Only the
`oui` column takes part in matching; the rest is provenance for humans and for
[`validate_vendor_file`].
*/

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, Trim};
use tracing::{debug, info, warn};

use crate::error::SignatureError;

/// Columns a vendor table must carry, in any order
pub const VENDOR_COLUMNS: [&str; 4] = ["vendor", "oui", "source_url", "notes"];

/// Normalize a vendor prefix to `XX:XX:XX`.
///
/// Accepts `-` or `:` separators in any case. Returns `None` unless the value is
/// exactly three groups of two hexadecimal digits.
pub fn normalize_oui(raw: &str) -> Option<String> {
    let canonical = raw.trim().to_ascii_uppercase().replace('-', ":");
    let groups: Vec<&str> = canonical.split(':').collect();
    if groups.len() == 3 && groups.iter().all(|g| is_hex_pair(g)) {
        Some(canonical)
    } else {
        None
    }
}

/// Derive the vendor prefix of a hardware address, e.g. `aa-bb-cc-11-22-33` -> `AA:BB:CC`.
///
/// Returns `None` when the input is not a six-group address.
pub fn vendor_prefix(mac: &str) -> Option<String> {
    let canonical = mac.trim().to_ascii_uppercase().replace('-', ":");
    if canonical.len() != 17 {
        return None;
    }
    let groups: Vec<&str> = canonical.split(':').collect();
    if groups.len() != 6 || !groups.iter().all(|g| is_hex_pair(g)) {
        return None;
    }
    Some(groups[..3].join(":"))
}

fn is_hex_pair(group: &str) -> bool {
    group.len() == 2 && group.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Immutable set of canonical vendor prefixes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VendorPrefixSet {
    prefixes: BTreeSet<String>,
}

impl VendorPrefixSet {
    /// Load the primary vendor table and, when `include_supplementary` is set, the
    /// supplementary one as well.
    ///
    /// Missing files count as empty. Unreadable files are logged and skipped.
    pub fn load(primary: &Path, supplementary: &Path, include_supplementary: bool) -> Self {
        let mut sources = vec![primary];
        if include_supplementary {
            sources.push(supplementary);
        }

        let mut set = Self::default();
        for source in sources {
            if !source.exists() {
                debug!("Vendor table {:?} not present, skipping", source);
                continue;
            }
            match set.extend_from_path(source) {
                Ok(added) => info!("Loaded {} vendor prefixes from {:?}", added, source),
                Err(e) => warn!("Skipping vendor table: {}", e),
            }
        }
        set
    }

    /// Read one vendor table, returning the number of well-formed rows seen.
    ///
    /// Rows with a missing or malformed `oui` are skipped silently.
    pub fn extend_from_path(&mut self, path: &Path) -> Result<usize, SignatureError> {
        let csv_err = |source: csv::Error| SignatureError::Csv { path: path.to_path_buf(), source };

        let mut reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .from_path(path)
            .map_err(csv_err)?;

        let headers = reader.headers().map_err(csv_err)?.clone();
        let Some(oui_idx) = headers.iter().position(|h| h == "oui") else {
            warn!("Vendor table {:?} has no `oui` column", path);
            return Ok(0);
        };

        let mut added = 0;
        for record in reader.records() {
            let Ok(record) = record else { continue };
            if let Some(oui) = record.get(oui_idx).and_then(normalize_oui) {
                self.prefixes.insert(oui);
                added += 1;
            }
        }
        Ok(added)
    }

    pub fn contains(&self, prefix: &str) -> bool {
        self.prefixes.contains(prefix)
    }

    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.prefixes.iter().map(String::as_str)
    }
}

impl<S: AsRef<str>> FromIterator<S> for VendorPrefixSet {
    /// Collect prefixes, dropping anything that does not normalize.
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            prefixes: iter
                .into_iter()
                .filter_map(|p| normalize_oui(p.as_ref()))
                .collect(),
        }
    }
}

/// A single validator finding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    /// 1-based line number in the file, `None` for file-level findings
    pub line: Option<u64>,
    pub message: String,
}

/// Outcome of validating one vendor table
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub path: PathBuf,
    pub errors: Vec<Finding>,
    pub warnings: Vec<Finding>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, line: Option<u64>, message: String) {
        self.errors.push(Finding { line, message });
    }

    fn warning(&mut self, line: Option<u64>, message: String) {
        self.warnings.push(Finding { line, message });
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = self.path.display();
        for (tag, findings) in [("ERROR", &self.errors), ("WARN ", &self.warnings)] {
            for finding in findings {
                match finding.line {
                    Some(line) => writeln!(f, "[{tag}] {path}:{line} {}", finding.message)?,
                    None => writeln!(f, "[{tag}] {path} {}", finding.message)?,
                }
            }
        }
        Ok(())
    }
}

/// Check a vendor table for schema and content problems.
///
/// Errors: wrong column set, missing `vendor`/`oui`, malformed OUI, duplicate OUI.
/// Warnings: `source_url` that is not http(s).
pub fn validate_vendor_file(path: &Path) -> Result<ValidationReport, SignatureError> {
    let csv_err = |source: csv::Error| SignatureError::Csv { path: path.to_path_buf(), source };
    let mut report = ValidationReport {
        path: path.to_path_buf(),
        ..Default::default()
    };

    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_path(path)
        .map_err(csv_err)?;
    let headers = reader.headers().map_err(csv_err)?.clone();

    let found: BTreeSet<&str> = headers.iter().collect();
    let required: BTreeSet<&str> = VENDOR_COLUMNS.into_iter().collect();
    if found != required {
        report.error(
            None,
            format!(
                "columns must be exactly: {:?} (got {:?})",
                required,
                headers.iter().collect::<Vec<_>>()
            ),
        );
        return Ok(report);
    }

    let column = |name: &str| headers.iter().position(|h| h == name);
    let (Some(vendor_idx), Some(oui_idx), Some(url_idx)) =
        (column("vendor"), column("oui"), column("source_url"))
    else {
        return Ok(report);
    };

    let mut seen = HashSet::new();
    for record in reader.records() {
        let record = record.map_err(csv_err)?;
        let line = record.position().map(|p| p.line());

        let vendor = record.get(vendor_idx).unwrap_or_default();
        let oui = record
            .get(oui_idx)
            .unwrap_or_default()
            .to_ascii_uppercase()
            .replace('-', ":");
        let source_url = record.get(url_idx).unwrap_or_default();

        if vendor.is_empty() || oui.is_empty() {
            report.error(line, "vendor and oui are required".to_string());
            continue;
        }
        if normalize_oui(&oui).is_none() {
            report.error(line, format!("bad OUI format (want XX:XX:XX): {oui}"));
        }
        if !seen.insert(oui.clone()) {
            report.error(line, format!("duplicate OUI: {oui}"));
        }
        if !source_url.is_empty()
            && !(source_url.starts_with("http://") || source_url.starts_with("https://"))
        {
            report.warning(line, format!("source_url should be http(s): {source_url}"));
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn prefix_is_canonical_regardless_of_style() {
        for mac in ["aa:bb:cc:11:22:33", "AA-BB-CC-11-22-33", "aA-bB:Cc-11:22-33", " AA:BB:CC:11:22:33 "] {
            assert_eq!(vendor_prefix(mac).as_deref(), Some("AA:BB:CC"), "{mac}");
        }
    }

    #[test]
    fn prefix_rejects_short_or_garbled_addresses() {
        assert_eq!(vendor_prefix(""), None);
        assert_eq!(vendor_prefix("AA:BB:CC"), None);
        assert_eq!(vendor_prefix("AABBCC112233"), None);
        assert_eq!(vendor_prefix("GG:BB:CC:11:22:33"), None);
        assert_eq!(vendor_prefix("AA:BB:CC:11:22:33:44"), None);
    }

    #[test]
    fn normalize_oui_validates_shape() {
        assert_eq!(normalize_oui("60-60-1f").as_deref(), Some("60:60:1F"));
        assert_eq!(normalize_oui("60:60:1F:00"), None);
        assert_eq!(normalize_oui("6:60:1F"), None);
        assert_eq!(normalize_oui("ZZ:60:1F"), None);
    }

    #[test]
    fn load_skips_malformed_rows_and_tolerates_missing_sources() {
        let dir = tempfile::tempdir().unwrap();
        let drones = write(
            &dir,
            "oui_drones.csv",
            "vendor,oui,source_url,notes\n\
             DJI,60-60-1f,https://example.org,\n\
             Parrot,90:3a:e6,,\n\
             Broken,60:60,,\n\
             Empty,,,\n",
        );
        let missing = dir.path().join("oui_modules.csv");

        let set = VendorPrefixSet::load(&drones, &missing, true);
        assert_eq!(set.len(), 2);
        assert!(set.contains("60:60:1F"));
        assert!(set.contains("90:3A:E6"));
    }

    #[test]
    fn supplementary_source_only_when_requested() {
        let dir = tempfile::tempdir().unwrap();
        let drones = write(&dir, "d.csv", "vendor,oui,source_url,notes\nDJI,60:60:1F,,\n");
        let modules = write(&dir, "m.csv", "vendor,oui,source_url,notes\nEspressif,24:0A:C4,,\n");

        assert_eq!(VendorPrefixSet::load(&drones, &modules, false).len(), 1);
        let both = VendorPrefixSet::load(&drones, &modules, true);
        assert!(both.contains("24:0A:C4"));
        assert_eq!(both.len(), 2);
    }

    #[test]
    fn loading_twice_yields_the_same_set() {
        let dir = tempfile::tempdir().unwrap();
        let drones = write(
            &dir,
            "d.csv",
            "notes,oui,vendor,source_url\n,60:60:1F,DJI,\n,60:60:1f,DJI dup,\n",
        );
        let none = dir.path().join("nope.csv");
        let first = VendorPrefixSet::load(&drones, &none, false);
        let second = VendorPrefixSet::load(&drones, &none, false);
        assert_eq!(first, second);
        assert_eq!(first.len(), 1);
    }

    #[test]
    fn validator_reports_each_problem() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "v.csv",
            "vendor,oui,source_url,notes\n\
             DJI,60:60:1F,https://example.org,\n\
             DJI again,60-60-1f,ftp://example.org,\n\
             ,AA:BB:CC,,\n\
             Bad,AABBCC,,\n",
        );

        let report = validate_vendor_file(&path).unwrap();
        assert!(!report.is_ok());
        let messages: Vec<_> = report.errors.iter().map(|f| (f.line, f.message.as_str())).collect();
        assert_eq!(
            messages,
            vec![
                (Some(3), "duplicate OUI: 60:60:1F"),
                (Some(4), "vendor and oui are required"),
                (Some(5), "bad OUI format (want XX:XX:XX): AABBCC"),
            ]
        );
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].line, Some(3));
    }

    #[test]
    fn validator_rejects_wrong_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "v.csv", "vendor,oui\nDJI,60:60:1F\n");
        let report = validate_vendor_file(&path).unwrap();
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].line, None);
    }

    #[test]
    fn validator_accepts_clean_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "v.csv",
            "oui,vendor,notes,source_url\n60:60:1F,DJI,,https://example.org\n",
        );
        let report = validate_vendor_file(&path).unwrap();
        assert!(report.is_ok());
        assert!(report.warnings.is_empty());
        assert_eq!(report.to_string(), "");
    }
}
