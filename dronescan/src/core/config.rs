/*!
Configuration management for the drone scanner
*/

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DronescanConfig {
    /// External capture process settings
    pub capture: CaptureConfig,
    /// Where the detection rules live
    pub signatures: SignatureConfig,
    /// Detection behavior settings
    pub detection: DetectionConfig,
    /// Output configuration
    pub outputs: OutputConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Monitor-mode interface handed to airodump-ng
    pub interface: String,
    /// Path or name of the airodump-ng binary
    pub binary: PathBuf,
    /// Snapshot refresh interval in seconds; also the poll interval
    pub write_interval_secs: u64,
    /// Band to hop across when no channel list is given
    pub band: Option<Band>,
    /// Comma-separated channel list, takes precedence over `band`
    pub channels: Option<String>,
    /// Snapshot path prefix; a temporary directory is used when unset
    pub prefix: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SignatureConfig {
    /// Base directory for relative rule paths
    pub data_root: PathBuf,
    /// Drone vendor prefixes, always loaded
    pub drone_ouis: PathBuf,
    /// Radio-module vendor prefixes, loaded with `include_modules`
    pub module_ouis: PathBuf,
    pub include_modules: bool,
    /// Labeled SSID patterns
    pub ssid_rules: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Identical alerts inside this many seconds are suppressed
    pub suppression_window_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Print alerts to stdout
    pub console: bool,
    pub console_format: TerminalFormat,
    /// Append alerts as JSON lines to this file
    pub jsonl: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TerminalFormat {
    #[default]
    Plain,
    Colored,
    Json,
}

/// airodump-ng band selection
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Band {
    A,
    B,
    G,
    Bg,
    Abg,
}

impl Band {
    pub const NAMES: [&'static str; 5] = ["a", "b", "g", "bg", "abg"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Band::A => "a",
            Band::B => "b",
            Band::G => "g",
            Band::Bg => "bg",
            Band::Abg => "abg",
        }
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Band {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "a" => Ok(Band::A),
            "b" => Ok(Band::B),
            "g" => Ok(Band::G),
            "bg" => Ok(Band::Bg),
            "abg" => Ok(Band::Abg),
            other => Err(ConfigError::Invalid(format!("unknown band '{other}'"))),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{0}")]
    Invalid(String),
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interface: String::new(),
            binary: PathBuf::from("airodump-ng"),
            write_interval_secs: 2,
            band: None,
            channels: None,
            prefix: None,
        }
    }
}

impl CaptureConfig {
    /// Poll cadence, never shorter than one second
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.write_interval_secs.max(1))
    }
}

impl Default for SignatureConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("."),
            drone_ouis: PathBuf::from("data/oui_drones.csv"),
            module_ouis: PathBuf::from("data/oui_modules.csv"),
            include_modules: false,
            ssid_rules: PathBuf::from("rules/ssids.yml"),
        }
    }
}

impl SignatureConfig {
    /// Resolve a rule path against `data_root` unless it is already absolute
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_root.join(path)
        }
    }

    /// Both vendor tables, whether or not the module table is loaded for scanning
    pub fn vendor_tables(&self) -> [PathBuf; 2] {
        [self.resolve(&self.drone_ouis), self.resolve(&self.module_ouis)]
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            suppression_window_secs: 120,
        }
    }
}

impl DetectionConfig {
    pub fn suppression_window(&self) -> Duration {
        Duration::from_secs(self.suppression_window_secs)
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            console: true,
            console_format: TerminalFormat::Plain,
            jsonl: None,
        }
    }
}

impl DronescanConfig {
    /// Load a TOML config file; sections and keys left out keep their defaults
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// `$XDG_CONFIG_HOME/dronescan/config.toml` or the platform equivalent
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("dronescan").join("config.toml"))
    }

    /// Reject settings the scanner cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capture.interface.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "a monitor-mode interface is required (--iface)".to_string(),
            ));
        }
        if let Some(channels) = &self.capture.channels {
            let valid = !channels.is_empty()
                && channels
                    .split(',')
                    .all(|c| !c.trim().is_empty() && c.trim().bytes().all(|b| b.is_ascii_digit() || b == b'-'));
            if !valid {
                return Err(ConfigError::Invalid(format!("invalid channel list '{channels}'")));
            }
        }
        Ok(())
    }
}
