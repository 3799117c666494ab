//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "dispenser", version, about = "Networked supplement dispenser node")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/dispenser.toml")]
    pub config: PathBuf,

    /// Optional calibration CSV (strict header: channel,sec_per_unit)
    #[arg(long, value_name = "FILE")]
    pub calibration: Option<PathBuf>,

    /// Log as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); RUST_LOG takes precedence
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Override [device] id
    #[arg(long, value_name = "ID", env = "DEVICE_UUID")]
    pub device_id: Option<String>,

    /// Override [broker] host
    #[arg(long, value_name = "HOST", env = "BROKER_HOST")]
    pub broker_host: Option<String>,

    /// Override [broker] port
    #[arg(long, value_name = "PORT", env = "BROKER_PORT")]
    pub broker_port: Option<u16>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Connect to the broker and serve commands until interrupted
    Run,
    /// Pulse every configured relay in table order
    RelayTest {
        /// How long each relay stays energized
        #[arg(long, value_name = "MS", default_value_t = 1000)]
        on_ms: u64,
        /// Pause after each relay is released
        #[arg(long, value_name = "MS", default_value_t = 500)]
        off_ms: u64,
        /// Number of passes over the table
        #[arg(long, default_value_t = 1)]
        cycles: u32,
    },
    /// Publish one test command (or wash request) to this device and exit
    Send {
        /// Units per channel, e.g. --amount zinc=2 (repeatable)
        #[arg(long = "amount", value_name = "CHANNEL=UNITS", value_parser = parse_amount)]
        amounts: Vec<(String, f64)>,
        /// Command id to send (default: generated from the current time)
        #[arg(long, value_name = "ID")]
        command_id: Option<String>,
        /// Send a wash request for this slot instead of a dispense command
        #[arg(long, value_name = "SLOT", conflicts_with = "amounts")]
        wash: Option<i64>,
        /// Wash duration in seconds (with --wash)
        #[arg(long, value_name = "SECONDS", requires = "wash")]
        wash_seconds: Option<f64>,
        /// Print topic and payload instead of publishing
        #[arg(long, action = ArgAction::SetTrue)]
        dry_run: bool,
    },
    /// Load and validate the config, then print the effective table and topics
    CheckConfig,
    /// Health check for operational monitoring
    Health,
}

fn parse_amount(s: &str) -> Result<(String, f64), String> {
    let (name, units) = s
        .split_once('=')
        .ok_or_else(|| format!("expected CHANNEL=UNITS, got '{s}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing channel name in '{s}'"));
    }
    let units: f64 = units
        .trim()
        .parse()
        .map_err(|_| format!("units must be a number in '{s}'"))?;
    if !units.is_finite() || units < 0.0 {
        return Err(format!("units must be >= 0 in '{s}'"));
    }
    Ok((name.to_string(), units))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_parser() {
        assert_eq!(parse_amount("zinc=2").unwrap(), ("zinc".into(), 2.0));
        assert_eq!(parse_amount(" mg = 0.5 ").unwrap(), ("mg".into(), 0.5));
        assert!(parse_amount("zinc").is_err());
        assert!(parse_amount("=2").is_err());
        assert!(parse_amount("zinc=-1").is_err());
        assert!(parse_amount("zinc=lots").is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
