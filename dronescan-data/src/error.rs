/*!
Error types for signature loading and snapshot reading
*/

use std::path::PathBuf;

use thiserror::Error;

/// Failures while reading vendor or name-pattern sources
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed vendor table {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("malformed rule document: {0}")]
    Document(String),
}

/// Failures while locating or reading capture snapshots
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
