/*!
airodump-ng CSV snapshots

airodump-ng rewrites `<prefix>-NN.csv` every write interval. The file holds two
tables separated by a blank line: access points first, then client stations. Only
the access-point table is read here.
*/

use std::ffi::OsStr;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use csv::{ReaderBuilder, StringRecord, Trim};
use serde::Serialize;
use tracing::debug;

use crate::error::CaptureError;

/// First field of the access-point table header
pub const AP_HEADER_MARKER: &str = "BSSID";
/// First field of the station table header
pub const STATION_HEADER_MARKER: &str = "Station MAC";
/// Rows shorter than this are not access points
pub const MIN_AP_COLUMNS: usize = 14;
/// File extension airodump-ng uses for CSV output
pub const SNAPSHOT_EXTENSION: &str = "csv";

// Fixed column positions in the access-point table
const COL_BSSID: usize = 0;
const COL_FIRST_SEEN: usize = 1;
const COL_LAST_SEEN: usize = 2;
const COL_CHANNEL: usize = 3;
const COL_POWER: usize = 8;
const COL_ESSID: usize = 13;

/// One access point as reported in a snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApRecord {
    /// Hardware address, uppercased; empty if the capture tool left it blank
    pub bssid: String,
    /// Broadcast network name, possibly empty
    pub essid: String,
    pub channel: String,
    pub power: String,
    pub first_seen: String,
    pub last_seen: String,
}

/// Parse the access-point table out of snapshot text.
///
/// Rows before the header are skipped; a blank row or the station header ends the
/// table. Short or unreadable rows are dropped individually.
pub fn parse_snapshot_text(text: &str) -> Vec<ApRecord> {
    let mut records = Vec::new();
    let mut in_table = false;

    for line in text.lines() {
        if line.trim().is_empty() {
            if in_table {
                break;
            }
            continue;
        }

        let Some(row) = split_row(line) else {
            debug!("Skipping unreadable snapshot row");
            continue;
        };
        let first = row.get(0).unwrap_or_default();

        if first.eq_ignore_ascii_case(AP_HEADER_MARKER) {
            in_table = true;
            continue;
        }
        if !in_table {
            continue;
        }
        if first.eq_ignore_ascii_case(STATION_HEADER_MARKER) {
            break;
        }
        if row.len() < MIN_AP_COLUMNS {
            debug!("Skipping short snapshot row ({} columns)", row.len());
            continue;
        }

        let field = |idx: usize| row.get(idx).unwrap_or_default().to_string();
        records.push(ApRecord {
            bssid: field(COL_BSSID).to_ascii_uppercase(),
            essid: field(COL_ESSID),
            channel: field(COL_CHANNEL),
            power: field(COL_POWER),
            first_seen: field(COL_FIRST_SEEN),
            last_seen: field(COL_LAST_SEEN),
        });
    }

    records
}

fn split_row(line: &str) -> Option<StringRecord> {
    ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(line.as_bytes())
        .records()
        .next()?
        .ok()
}

/// Read and parse a snapshot file. A file that does not exist parses as empty.
pub fn parse_snapshot(path: &Path) -> Result<Vec<ApRecord>, CaptureError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(parse_snapshot_text(&String::from_utf8_lossy(&bytes))),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
        Err(source) => Err(CaptureError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Sequence number of a snapshot file name, if it follows `<stem>-NN.csv`.
pub fn snapshot_index(file_name: &str, stem: &str) -> Option<u32> {
    let digits = file_name
        .strip_prefix(stem)?
        .strip_prefix('-')?
        .strip_suffix(SNAPSHOT_EXTENSION)?
        .strip_suffix('.')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Pick the most recently modified snapshot for `prefix` out of a directory listing.
///
/// Entries whose file name does not follow `<stem>-NN.csv` are ignored. Ties on
/// modification time go to the higher sequence number.
pub fn select_latest<I>(prefix: &Path, listing: I) -> Option<PathBuf>
where
    I: IntoIterator<Item = (PathBuf, SystemTime)>,
{
    let stem = prefix.file_name().and_then(OsStr::to_str)?;

    listing
        .into_iter()
        .filter_map(|(path, modified)| {
            let index = snapshot_index(path.file_name()?.to_str()?, stem)?;
            Some((modified, index, path))
        })
        .max_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)))
        .map(|(_, _, path)| path)
}

/// Locate the freshest `<prefix>-NN.csv` in the prefix's directory.
pub fn find_latest_snapshot(prefix: &Path) -> Option<PathBuf> {
    let dir = match prefix.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Cannot list snapshot directory {:?}: {}", dir, e);
            return None;
        }
    };

    let listing = entries.filter_map(|entry| {
        let entry = entry.ok()?;
        let modified = entry.metadata().ok()?.modified().ok()?;
        Some((entry.path(), modified))
    });

    select_latest(prefix, listing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const SNAPSHOT: &str = "\r\n\
BSSID, First time seen, Last time seen, channel, Speed, Privacy, Cipher, Authentication, Power, # beacons, # IV, LAN IP, ID-length, ESSID, Key\r\n\
aa:bb:cc:11:22:33, 2024-05-01 10:00:00, 2024-05-01 10:00:09,  6,  54, WPA2, CCMP, PSK, -41,       12,        0,   0.  0.  0.   0,  14, DJI-Mavic-1234, \r\n\
60:60:1F:00:00:01, 2024-05-01 10:00:01, 2024-05-01 10:00:08, 11, 130, OPN,  ,  , -67,        3,        0,   0.  0.  0.   0,   0, , \r\n\
truncated, row\r\n\
\r\n\
Station MAC, First time seen, Last time seen, Power, # packets, BSSID, Probed ESSIDs\r\n\
11:22:33:44:55:66, 2024-05-01 10:00:02, 2024-05-01 10:00:05, -50, 10, (not associated) ,\r\n";

    #[test]
    fn parses_access_point_table_only() {
        let records = parse_snapshot_text(SNAPSHOT);
        assert_eq!(records.len(), 2);

        assert_eq!(
            records[0],
            ApRecord {
                bssid: "AA:BB:CC:11:22:33".to_string(),
                essid: "DJI-Mavic-1234".to_string(),
                channel: "6".to_string(),
                power: "-41".to_string(),
                first_seen: "2024-05-01 10:00:00".to_string(),
                last_seen: "2024-05-01 10:00:09".to_string(),
            }
        );
        assert_eq!(records[1].essid, "");
        assert_eq!(records[1].channel, "11");
    }

    #[test]
    fn station_header_ends_table_without_blank_line() {
        let text = SNAPSHOT.replace("\r\n\r\nStation", "\r\nStation");
        assert_eq!(parse_snapshot_text(&text).len(), 2);
    }

    #[test]
    fn trailing_blank_lines_end_cleanly() {
        let text = "BSSID,a,b,c,d,e,f,g,h,i,j,k,l,ESSID,Key\n\
                    AA:BB:CC:00:00:01,,,1,,,,,-30,,,,,Net,\n\n\n\n";
        let records = parse_snapshot_text(text);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].essid, "Net");
    }

    #[test]
    fn no_header_means_no_records() {
        assert!(parse_snapshot_text("AA:BB:CC:00:00:01,1,2,3,4,5,6,7,8,9,10,11,12,13,14\n").is_empty());
        assert!(parse_snapshot_text("").is_empty());
    }

    #[test]
    fn header_marker_is_case_insensitive() {
        let text = "bssid,a,b,c,d,e,f,g,h,i,j,k,l,essid,key\nAA:BB:CC:00:00:01,,,1,,,,,-30,,,,,x,\n";
        assert_eq!(parse_snapshot_text(text).len(), 1);
    }

    #[test]
    fn snapshot_index_requires_exact_naming() {
        assert_eq!(snapshot_index("scan-01.csv", "scan"), Some(1));
        assert_eq!(snapshot_index("scan-123.csv", "scan"), Some(123));
        assert_eq!(snapshot_index("scan-01.log.csv", "scan"), None);
        assert_eq!(snapshot_index("scan-.csv", "scan"), None);
        assert_eq!(snapshot_index("scan-01.cap", "scan"), None);
        assert_eq!(snapshot_index("other-01.csv", "scan"), None);
        assert_eq!(snapshot_index("scan01.csv", "scan"), None);
    }

    #[test]
    fn select_latest_uses_modification_time() {
        let base = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
        let dir = PathBuf::from("/tmp/cap");
        let listing = vec![
            (dir.join("scan-01.csv"), base + Duration::from_secs(30)),
            (dir.join("scan-02.csv"), base + Duration::from_secs(10)),
            (dir.join("scan-03.kismet.csv"), base + Duration::from_secs(99)),
            (dir.join("notes.txt"), base + Duration::from_secs(99)),
        ];
        assert_eq!(
            select_latest(&dir.join("scan"), listing),
            Some(dir.join("scan-01.csv"))
        );
    }

    #[test]
    fn select_latest_breaks_ties_by_sequence() {
        let t = SystemTime::UNIX_EPOCH;
        let listing = vec![
            (PathBuf::from("scan-02.csv"), t),
            (PathBuf::from("scan-10.csv"), t),
            (PathBuf::from("scan-03.csv"), t),
        ];
        assert_eq!(
            select_latest(Path::new("scan"), listing),
            Some(PathBuf::from("scan-10.csv"))
        );
    }

    #[test]
    fn select_latest_without_candidates() {
        assert_eq!(select_latest(Path::new("/tmp/scan"), Vec::new()), None);
    }
}
