//! Startup plumbing: effective config (file + CLI/env overrides + calibration)
//! and the tracing subscriber.

use std::path::Path;

use dispenser_config::Config;
use eyre::{Result, WrapErr};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::cli::{Cli, FILE_GUARD};
use crate::error_fmt::InvalidConfig;

/// Effective configuration plus what startup did to it, for logging once the
/// subscriber is up.
#[derive(Debug)]
pub struct Loaded {
    pub config: Config,
    /// Calibration rows applied, when `--calibration` was given.
    pub calibration_rows: Option<usize>,
}

/// Read, override, calibrate and validate. Every failure is an `InvalidConfig`.
pub fn load_config(cli: &Cli) -> Result<Loaded> {
    let text = std::fs::read_to_string(&cli.config)
        .map_err(|e| InvalidConfig(format!("read {}: {e}", cli.config.display())))?;
    let mut cfg = dispenser_config::load_toml(&text)
        .map_err(|e| InvalidConfig(format!("parse {}: {e}", cli.config.display())))?;

    if let Some(id) = &cli.device_id {
        cfg.device.id = id.clone();
    }
    if let Some(host) = &cli.broker_host {
        cfg.broker.host = host.clone();
    }
    if let Some(port) = cli.broker_port {
        cfg.broker.port = port;
    }

    let calibration_rows = match &cli.calibration {
        Some(path) => Some(apply_calibration(&mut cfg, path)?),
        None => None,
    };

    cfg.validate().map_err(|e| InvalidConfig(e.to_string()))?;
    Ok(Loaded {
        config: cfg,
        calibration_rows,
    })
}

fn apply_calibration(cfg: &mut Config, path: &Path) -> Result<usize> {
    let rows = dispenser_config::load_calibration_csv(path)
        .map_err(|e| InvalidConfig(e.to_string()))?;
    cfg.apply_calibration(&rows)
        .map_err(|e| InvalidConfig(e.to_string()))?;
    Ok(rows.len())
}

/// Console (pretty or JSON) on stderr plus an optional JSON-lines file.
/// Level precedence: RUST_LOG, then --log-level, then [logging] level, then info.
pub fn init_tracing(cli: &Cli, logging: Option<&dispenser_config::Logging>) -> Result<()> {
    let level = cli
        .log_level
        .clone()
        .or_else(|| logging.and_then(|l| l.level.clone()))
        .unwrap_or_else(|| "info".to_string());
    let filter = match EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => EnvFilter::try_new(&level).wrap_err_with(|| format!("invalid log level '{level}'"))?,
    };

    let (console_json, console_pretty) = if cli.json {
        (Some(fmt::layer().json().with_writer(std::io::stderr)), None)
    } else {
        (None, Some(fmt::layer().with_writer(std::io::stderr)))
    };

    let file_layer = match logging.and_then(|l| l.file.as_deref()) {
        Some(file) => {
            let path = Path::new(file);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| eyre::eyre!("logging.file '{file}' has no file name"))?;
            let rotation = logging
                .and_then(|l| l.rotation.as_deref())
                .unwrap_or("never")
                .trim()
                .to_ascii_lowercase();
            let appender = match rotation.as_str() {
                "daily" => tracing_appender::rolling::daily(dir, name),
                "hourly" => tracing_appender::rolling::hourly(dir, name),
                _ => tracing_appender::rolling::never(dir, name),
            };
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            Some(fmt::layer().json().with_ansi(false).with_writer(writer))
        }
        None => None,
    };

    // A second init (tests, repeated calls) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(console_json)
        .with(console_pretty)
        .with(file_layer)
        .try_init();
    Ok(())
}
