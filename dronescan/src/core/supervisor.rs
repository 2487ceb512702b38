/*!
Lifecycle of the external airodump-ng capture process
*/

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use thiserror::Error;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::core::config::CaptureConfig;

/// How long a terminated capture process gets before it is killed
pub const STOP_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("capture binary {binary:?} not found")]
    NotFound { binary: PathBuf },
    #[error("failed to launch {binary:?}: {source}")]
    Spawn {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("capture process exited unexpectedly ({0})")]
    Exited(ExitStatus),
}

/// Arguments for airodump-ng, derived only from the config and snapshot prefix.
///
/// A channel list wins over a band; at most one of the two is passed.
pub fn capture_args(config: &CaptureConfig, prefix: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        config.interface.clone().into(),
        "--output-format".into(),
        "csv".into(),
        "--write".into(),
        prefix.as_os_str().to_owned(),
        "--write-interval".into(),
        config.poll_interval().as_secs().to_string().into(),
    ];

    match (&config.channels, config.band) {
        (Some(channels), _) => {
            args.push("--channel".into());
            args.push(channels.clone().into());
        }
        (None, Some(band)) => {
            args.push("--band".into());
            args.push(band.as_str().into());
        }
        (None, None) => {}
    }

    args
}

/// A running capture process. Dropping it kills the child.
pub struct CaptureProcess {
    child: Option<Child>,
    command_line: String,
}

impl CaptureProcess {
    /// Launch the capture binary with its output discarded.
    ///
    /// A binary that is missing or cannot be executed is an error; nothing useful
    /// can happen without it.
    pub fn start(config: &CaptureConfig, prefix: &Path) -> Result<Self, SupervisorError> {
        let args = capture_args(config, prefix);
        let command_line = std::iter::once(config.binary.as_os_str())
            .chain(args.iter().map(OsString::as_os_str))
            .map(|part| part.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ");

        let child = Command::new(&config.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| match source.kind() {
                ErrorKind::NotFound => SupervisorError::NotFound {
                    binary: config.binary.clone(),
                },
                _ => SupervisorError::Spawn {
                    binary: config.binary.clone(),
                    source,
                },
            })?;

        info!("Started capture process (pid {:?})", child.id());
        Ok(Self {
            child: Some(child),
            command_line,
        })
    }

    /// The full command line, for display
    pub fn command_line(&self) -> &str {
        &self.command_line
    }

    /// Exit status if the process has ended on its own. `None` while running or
    /// after [`CaptureProcess::stop`].
    pub fn exit_status(&mut self) -> Option<ExitStatus> {
        let child = self.child.as_mut()?;
        match child.try_wait() {
            Ok(status) => status,
            Err(e) => {
                warn!("Cannot query capture process state: {}", e);
                None
            }
        }
    }

    /// Ask the process to terminate, killing it if it is still alive after
    /// [`STOP_TIMEOUT`].
    ///
    /// Calling this again, or on a process that already exited, does nothing.
    pub async fn stop(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };

        if let Ok(Some(status)) = child.try_wait() {
            debug!("Capture process already exited ({})", status);
            return;
        }

        terminate(&mut child);
        match tokio::time::timeout(STOP_TIMEOUT, child.wait()).await {
            Ok(Ok(status)) => info!("Capture process stopped ({})", status),
            Ok(Err(e)) => warn!("Waiting for capture process failed: {}", e),
            Err(_) => {
                warn!("Capture process ignored termination for {:?}, killing it", STOP_TIMEOUT);
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill capture process: {}", e);
                }
            }
        }
    }
}

#[cfg(unix)]
fn terminate(child: &mut Child) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else { return };
    let Ok(pid) = i32::try_from(pid) else { return };
    if let Err(e) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
        debug!("SIGTERM to capture process failed: {}", e);
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        debug!("Terminating capture process failed: {}", e);
    }
}
