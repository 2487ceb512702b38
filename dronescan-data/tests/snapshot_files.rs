use std::fs;

use dronescan_data::{find_latest_snapshot, parse_snapshot};
use filetime::{FileTime, set_file_mtime};

const HEADER: &str = "BSSID, First time seen, Last time seen, channel, Speed, Privacy, Cipher, Authentication, Power, # beacons, # IV, LAN IP, ID-length, ESSID, Key";

fn snapshot_with(essid: &str) -> String {
    format!(
        "\n{HEADER}\nAA:BB:CC:11:22:33, 2024-05-01 10:00:00, 2024-05-01 10:00:09, 6, 54, WPA2, CCMP, PSK, -41, 12, 0, 0.0.0.0, 4, {essid}, \n\n"
    )
}

#[test]
fn finds_most_recently_written_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let prefix = dir.path().join("scan");

    let older = dir.path().join("scan-01.csv");
    let newer = dir.path().join("scan-02.csv");
    fs::write(&older, snapshot_with("old")).unwrap();
    fs::write(&newer, snapshot_with("new")).unwrap();
    fs::write(dir.path().join("scan-03.log.csv"), "noise").unwrap();

    set_file_mtime(&older, FileTime::from_unix_time(1_700_000_100, 0)).unwrap();
    set_file_mtime(&newer, FileTime::from_unix_time(1_700_000_000, 0)).unwrap();
    assert_eq!(find_latest_snapshot(&prefix), Some(older.clone()));

    set_file_mtime(&newer, FileTime::from_unix_time(1_700_000_200, 0)).unwrap();
    let latest = find_latest_snapshot(&prefix).unwrap();
    assert_eq!(latest, newer);

    let records = parse_snapshot(&latest).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].essid, "new");
}

#[test]
fn no_snapshot_yet() {
    let dir = tempfile::tempdir().unwrap();
    assert_eq!(find_latest_snapshot(&dir.path().join("scan")), None);
    assert_eq!(find_latest_snapshot(&dir.path().join("missing").join("scan")), None);
}

#[test]
fn missing_snapshot_parses_as_empty() {
    let dir = tempfile::tempdir().unwrap();
    let records = parse_snapshot(&dir.path().join("scan-01.csv")).unwrap();
    assert!(records.is_empty());
}

#[test]
fn non_utf8_bytes_do_not_abort_the_parse() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scan-01.csv");
    let mut bytes = snapshot_with("caf").into_bytes();
    let at = bytes.windows(3).position(|w| w == b"caf").unwrap() + 3;
    bytes.insert(at, 0xff);
    fs::write(&path, bytes).unwrap();

    let records = parse_snapshot(&path).unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].essid.starts_with("caf"));
}
