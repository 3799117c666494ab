#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod cli;
mod error_fmt;
mod hw;
mod mqtt;
mod send;
mod serve;
mod setup;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use dispenser_config::Config;
use dispenser_core::codec::{DeviceIdentity, Topics};
use eyre::Result;
use serde_json::json;

use crate::cli::{Cli, Commands, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

fn main() {
    let _ = color_eyre::install();
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(e) = real_main(&cli) {
        tracing::error!(error = %e, "exiting with error");
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", format_error_json(&e));
        } else {
            eprintln!("{}", humanize(&e));
        }
        std::process::exit(exit_code_for_error(&e));
    }
}

fn real_main(cli: &Cli) -> Result<()> {
    let loaded = match setup::load_config(cli) {
        Ok(loaded) => loaded,
        Err(e) => {
            setup::init_tracing(cli, None)?;
            return Err(e);
        }
    };
    let cfg = loaded.config;
    setup::init_tracing(cli, Some(&cfg.logging))?;
    tracing::debug!(config = %cli.config.display(), "config loaded");
    if let (Some(path), Some(rows)) = (&cli.calibration, loaded.calibration_rows) {
        tracing::info!(path = %path.display(), rows, "calibration applied");
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let flag = shutdown.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            flag.store(true, Ordering::Relaxed);
        }) {
            tracing::warn!(error = %e, "failed to install signal handler");
        }
    }

    match &cli.cmd {
        Commands::Run => serve::run(&cfg, shutdown),
        Commands::RelayTest {
            on_ms,
            off_ms,
            cycles,
        } => {
            let pulse = relay_test::Pulse {
                on: Duration::from_millis(*on_ms),
                off: Duration::from_millis(*off_ms),
                cycles: *cycles,
            };
            let pulses = relay_test::run(&cfg, pulse, shutdown)?;
            if cli.json {
                println!("{}", json!({ "relay_test": "complete", "pulses": pulses }));
            } else {
                println!("relay test complete: {pulses} pulses");
            }
            Ok(())
        }
        Commands::Send {
            amounts,
            command_id,
            wash,
            wash_seconds,
            dry_run,
        } => {
            let req = send::Request {
                amounts: amounts.clone(),
                command_id: command_id.clone(),
                wash: *wash,
                wash_seconds: *wash_seconds,
            };
            let out = send::build(&cfg, &req);
            if *dry_run {
                println!("{}", out.topic);
                println!("{}", String::from_utf8_lossy(&out.payload));
                return Ok(());
            }
            match send::send(&cfg, &out)? {
                Some(reply) => {
                    println!("{}", reply.body);
                    match reply.status {
                        dispenser_core::Status::Success => Ok(()),
                        dispenser_core::Status::Fail => {
                            eyre::bail!("device reported failure: {}", reply.body)
                        }
                    }
                }
                None => eyre::bail!("no response on {}", out.response_topic),
            }
        }
        Commands::CheckConfig => {
            print_effective_config(&cfg, cli.json);
            Ok(())
        }
        Commands::Health => health(&cfg, cli.json),
    }
}

fn print_effective_config(cfg: &Config, as_json: bool) {
    let topics = Topics::for_device(&DeviceIdentity::from(&cfg.device));
    if as_json {
        let channels: Vec<_> = cfg
            .channels
            .iter()
            .map(|c| {
                json!({
                    "name": c.name,
                    "pin": c.pin,
                    "sec_per_unit": c.sec_per_unit,
                    "ml_per_unit": c.ml_per_unit,
                    "aliases": c.aliases,
                })
            })
            .collect();
        let slots: Vec<_> = cfg
            .wash
            .slots
            .iter()
            .map(|s| json!({ "slot": s.slot, "channel": s.channel }))
            .collect();
        println!(
            "{}",
            json!({
                "device": device_label(cfg),
                "broker": mqtt::endpoint(cfg),
                "channels": channels,
                "wash_slots": slots,
                "subscribe": topics.subscriptions(),
                "publish": [topics.register, topics.command_response, topics.wash_response],
            })
        );
        return;
    }

    println!("config ok: device {}", device_label(cfg));
    println!("broker: {}", mqtt::endpoint(cfg));
    println!("channels (dispense order):");
    for c in &cfg.channels {
        let ml = c
            .ml_per_unit
            .map(|m| format!(", {m} mL/unit"))
            .unwrap_or_default();
        let aliases = if c.aliases.is_empty() {
            String::new()
        } else {
            format!(", aliases: {}", c.aliases.join(","))
        };
        println!("  {:<14} pin {:>2}  {} s/unit{ml}{aliases}", c.name, c.pin, c.sec_per_unit);
    }
    for s in &cfg.wash.slots {
        println!("wash slot {} -> {}", s.slot, s.channel);
    }
    for t in topics.subscriptions() {
        println!("subscribe: {t}");
    }
}

fn device_label(cfg: &Config) -> String {
    DeviceIdentity::from(&cfg.device).to_string()
}

fn health(cfg: &Config, as_json: bool) -> Result<()> {
    // Claiming the pins proves the relay board is reachable; dropping releases them.
    drop(hw::open_bank(cfg)?);
    if as_json {
        println!(
            "{}",
            json!({
                "status": "ok",
                "device": device_label(cfg),
                "channels": cfg.channels.len(),
                "backend": hw::backend_name(),
            })
        );
    } else {
        println!("ok ({} channels, {} relays)", cfg.channels.len(), hw::backend_name());
    }
    Ok(())
}
