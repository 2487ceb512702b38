/*!
Drone access-point scanner

Runs airodump-ng, tails its CSV snapshots and alerts on drone vendor prefixes and
drone-like network names.
*/

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

use dronescan_data::vendor::validate_vendor_file;

mod core;

use crate::core::{
    config::{Band, ConfigError, DronescanConfig, TerminalFormat},
    tracker::ScanTracker,
};

fn cli() -> Command {
    Command::new("dronescan")
        .version(clap::crate_version!())
        .about("OUI & SSID drone alerting on top of airodump-ng")
        .arg(
            Arg::new("iface")
                .short('i')
                .long("iface")
                .help("Monitor-mode interface (e.g. wlan0mon)")
                .value_name("IFACE"),
        )
        .arg(
            Arg::new("band")
                .long("band")
                .help("airodump-ng band hopping")
                .value_parser(Band::NAMES),
        )
        .arg(
            Arg::new("channels")
                .long("channels")
                .help("Comma-separated channel list (e.g. 1,6,11); overrides --band")
                .value_name("LIST"),
        )
        .arg(
            Arg::new("write-interval")
                .long("write-interval")
                .help("CSV refresh interval in seconds [default: 2]")
                .value_name("SECS")
                .value_parser(value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new("include-modules")
                .long("include-modules")
                .help("Also load OUIs from data/oui_modules.csv")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("jsonl")
                .long("jsonl")
                .help("Append JSON-lines alerts to this file")
                .value_name("PATH")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("dedup-secs")
                .long("dedup-secs")
                .help("Suppress identical alerts within N seconds [default: 120]")
                .value_name("SECS")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("airodump-bin")
                .long("airodump-bin")
                .help("Path to airodump-ng [default: airodump-ng]")
                .value_name("PATH")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("prefix")
                .long("prefix")
                .help("Custom CSV prefix (directory/file); a temporary directory otherwise")
                .value_name("PATH")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("format")
                .long("format")
                .help("Console alert format")
                .value_parser(["plain", "colored", "json"]),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Suppress console alerts (JSONL output still written)")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .help("TOML config file")
                .value_name("PATH")
                .value_parser(value_parser!(PathBuf))
                .global(true),
        )
        .arg(
            Arg::new("data-root")
                .long("data-root")
                .help("Directory holding data/ and rules/ [default: .]")
                .value_name("DIR")
                .value_parser(value_parser!(PathBuf))
                .global(true),
        )
        .subcommand(
            Command::new("validate")
                .about("Check vendor OUI tables for schema and content problems")
                .arg(
                    Arg::new("files")
                        .help("Tables to check; defaults to the configured vendor files")
                        .value_name("FILE")
                        .num_args(0..)
                        .value_parser(value_parser!(PathBuf)),
                ),
        )
}

fn init_tracing(quiet: bool) {
    let default_level = if quiet { "warn" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Defaults, then the config file, then command-line flags
fn load_config(matches: &ArgMatches) -> Result<DronescanConfig, ConfigError> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => DronescanConfig::from_toml_file(path)?,
        None => match DronescanConfig::default_path() {
            Some(path) if path.exists() => DronescanConfig::from_toml_file(&path)?,
            _ => DronescanConfig::default(),
        },
    };
    apply_cli(&mut config, matches);
    Ok(config)
}

fn apply_cli(config: &mut DronescanConfig, matches: &ArgMatches) {
    if let Some(iface) = matches.get_one::<String>("iface") {
        config.capture.interface = iface.clone();
    }
    if let Some(band) = matches.get_one::<String>("band").and_then(|b| b.parse().ok()) {
        config.capture.band = Some(band);
    }
    if let Some(channels) = matches.get_one::<String>("channels") {
        config.capture.channels = Some(channels.clone());
    }
    if let Some(&interval) = matches.get_one::<u64>("write-interval") {
        config.capture.write_interval_secs = interval;
    }
    if let Some(binary) = matches.get_one::<PathBuf>("airodump-bin") {
        config.capture.binary = binary.clone();
    }
    if let Some(prefix) = matches.get_one::<PathBuf>("prefix") {
        config.capture.prefix = Some(prefix.clone());
    }
    if let Some(root) = matches.get_one::<PathBuf>("data-root") {
        config.signatures.data_root = root.clone();
    }
    if matches.get_flag("include-modules") {
        config.signatures.include_modules = true;
    }
    if let Some(&secs) = matches.get_one::<u64>("dedup-secs") {
        config.detection.suppression_window_secs = secs;
    }
    if let Some(path) = matches.get_one::<PathBuf>("jsonl") {
        config.outputs.jsonl = Some(path.clone());
    }
    if let Some(format) = matches.get_one::<String>("format") {
        config.outputs.console_format = match format.as_str() {
            "colored" => TerminalFormat::Colored,
            "json" => TerminalFormat::Json,
            _ => TerminalFormat::Plain,
        };
    }
    if matches.get_flag("quiet") {
        config.outputs.console = false;
    }
}

/// Run the vendor-table validator; non-zero exit when any table has errors
fn validate(config: &DronescanConfig, matches: &ArgMatches) -> ExitCode {
    let files: Vec<PathBuf> = match matches.get_many::<PathBuf>("files") {
        Some(files) => files.cloned().collect(),
        None => config
            .signatures
            .vendor_tables()
            .into_iter()
            .filter(|path| path.exists())
            .collect(),
    };
    if files.is_empty() {
        warn!("No vendor tables found to validate");
    }

    let total = validate_tables(&files);
    if total > 0 {
        println!("[FAIL] validation errors: {total}");
        ExitCode::FAILURE
    } else {
        println!("[OK] validation passed");
        ExitCode::SUCCESS
    }
}

/// Print the findings for each table and return the total error count
fn validate_tables(files: &[PathBuf]) -> usize {
    let mut total = 0;
    for path in files {
        match validate_vendor_file(path) {
            Ok(report) => {
                print!("{report}");
                total += report.errors.len();
            }
            Err(e) => {
                println!("[ERROR] {e}");
                total += 1;
            }
        }
    }
    total
}

/// Resolves on Ctrl+C, or SIGTERM on Unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Cannot listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("quiet"));

    let config = match load_config(&matches) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Some(sub) = matches.subcommand_matches("validate") {
        return validate(&config, sub);
    }

    if let Err(e) = config.validate() {
        error!("{}", e);
        return ExitCode::FAILURE;
    }

    let mut tracker = match ScanTracker::new(config).await {
        Ok(tracker) => tracker,
        Err(e) => {
            error!("Startup failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match tracker.run(shutdown_signal()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
