mod cli;
mod error_fmt;
mod logging;
mod notify;
mod plant;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use eyre::{Result, WrapErr};
use feeder_config::{Config, HistoryStore};
use feeder_core::hw_error::map_telemetry_error;
use feeder_core::{
    Controller, ControllerSettings, FeederError, HistorySink, Scheduler, StatusSnapshot,
    SystemState,
};
use feeder_traits::{Actuator, BinReader, Clock, SystemWallClock};
use serde_json::json;

use crate::cli::{Cli, Commands, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};
use crate::notify::LogNotifier;
use crate::plant::Plant;

const BIN_NAMES: [&str; 4] = ["A", "B", "C", "D"];

fn main() {
    let _ = color_eyre::install();
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(e) = run(cli) {
        tracing::error!(error = %e, "command failed");
        if JSON_MODE.get().copied().unwrap_or(false) {
            println!("{}", format_error_json(&e));
        } else {
            eprintln!("{}", humanize(&e));
        }
        std::process::exit(exit_code_for_error(&e));
    }
}

fn load_config(path: &std::path::Path) -> Result<Config> {
    let text =
        std::fs::read_to_string(path).wrap_err_with(|| format!("read config {path:?}"))?;
    let cfg = feeder_config::load_toml(&text).wrap_err("parse config")?;
    cfg.validate().wrap_err("invalid configuration")?;
    Ok(cfg)
}

fn run(cli: Cli) -> Result<()> {
    let cfg = load_config(&cli.config)?;
    logging::init_tracing(cli.json, &cli.log_level, &cfg.logging)?;
    let plant = Plant::select(cli.simulate);

    match cli.cmd {
        Commands::Run { max_ticks } => cmd_run(&cfg, &plant, max_ticks, cli.json),
        Commands::Feed { target } => cmd_feed(&cfg, &plant, target, cli.json),
        Commands::Bins => cmd_bins(&cfg, &plant, cli.json),
        Commands::Schedule => cmd_schedule(&cfg, cli.json),
        Commands::Relay { actuator, secs } => cmd_relay(&cfg, &plant, actuator, secs, cli.json),
        Commands::History { limit } => cmd_history(&cfg, limit, cli.json),
        Commands::SelfCheck => cmd_self_check(&cfg, &plant, cli.json),
    }
}

type CliController =
    Controller<Box<dyn feeder_traits::Outputs>, Box<dyn BinReader>, HistoryStore, LogNotifier>;

fn build_controller(
    cfg: &Config,
    plant: &Plant,
    clock: Arc<dyn Clock + Send + Sync>,
    settings: ControllerSettings,
) -> Result<CliController> {
    let engine = feeder_core::builder()
        .with_outputs(plant.outputs(cfg)?)
        .with_clock(clock.clone())
        .with_policy((&cfg.safety).into())
        .build()?;
    let reader = plant.reader(cfg, clock.clone());
    let scheduler = Scheduler::new(Arc::new(SystemWallClock));
    let mut controller = Controller::new(
        engine,
        reader,
        scheduler,
        HistoryStore::from_config(&cfg.history),
        LogNotifier::default(),
        clock,
        settings,
    );
    controller.begin()?;
    Ok(controller)
}

fn install_stop_flag() -> Arc<AtomicBool> {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = stop.clone();
    if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed)) {
        tracing::warn!(error = %e, "failed to install Ctrl-C handler");
    }
    stop
}

fn status_json(s: &StatusSnapshot, unit: &str) -> serde_json::Value {
    json!({
        "state": s.state.as_str(),
        "stage": s.stage.as_str(),
        "actuator_1": s.actuator_1,
        "actuator_2": s.actuator_2,
        "bins": s.bins,
        "total_weight": s.total_weight,
        "dispensed": s.dispensed,
        "flow_rate": s.flow_rate,
        "duration_secs": s.duration_secs,
        "alarm": s.alarm,
        "warning": s.last_warning,
        "indicator_connected": s.indicator_connected,
        "last_error": s.last_error,
        "unit": unit,
    })
}

fn cmd_run(cfg: &Config, plant: &Plant, max_ticks: Option<u64>, json_out: bool) -> Result<()> {
    let clock = plant.clock(false);
    let mut controller =
        build_controller(cfg, plant, clock, ControllerSettings::from(cfg))?;
    let stop = install_stop_flag();
    tracing::info!(
        feed_times = ?cfg.schedule.feed_times,
        tick_ms = cfg.runner.tick_ms,
        "control loop starting"
    );
    let ticks = controller.run(
        Duration::from_millis(cfg.runner.tick_ms),
        &stop,
        max_ticks,
    );
    let status = controller.status();
    tracing::info!(ticks, state = %status.state, "control loop stopped");

    if json_out {
        let mut obj = status_json(&status, cfg.feeding.unit.label());
        obj["ticks"] = json!(ticks);
        println!("{obj}");
    } else {
        println!("Control loop stopped after {ticks} ticks (state {})", status.state);
    }
    Ok(())
}

fn cmd_feed(cfg: &Config, plant: &Plant, target: Option<f32>, json_out: bool) -> Result<()> {
    let clock = plant.clock(true);
    let settings = ControllerSettings {
        auto_feed: false,
        ..ControllerSettings::from(cfg)
    };
    let mut controller = build_controller(cfg, plant, clock.clone(), settings)?;
    let stop = install_stop_flag();
    let period = Duration::from_millis(cfg.runner.tick_ms);

    controller.start_manual_feed(target)?;
    while controller.state() == SystemState::Feeding {
        if stop.load(Ordering::Relaxed) {
            controller.stop();
            eyre::bail!("feeding interrupted; outputs switched off");
        }
        clock.sleep(period);
        controller.tick();
    }

    let status = controller.status();
    if status.state == SystemState::Alarm {
        let reason = status.alarm.unwrap_or_default();
        return Err(FeederError::AlarmLatched(reason).into());
    }

    let unit = cfg.feeding.unit.label();
    if json_out {
        let mut obj = status_json(&status, unit);
        obj["target_weight"] = json!(controller.engine().cycle_config().target_weight);
        println!("{obj}");
    } else {
        println!(
            "Feeding complete: dispensed {:.2} {unit} of {:.2} in {}s ({:.2} {unit}/min)",
            status.dispensed,
            controller.engine().cycle_config().target_weight,
            status.duration_secs,
            status.flow_rate,
        );
        if let Some(w) = status.last_warning {
            println!("Last warning: {w}");
        }
    }
    Ok(())
}

fn cmd_bins(cfg: &Config, plant: &Plant, json_out: bool) -> Result<()> {
    let mut reader = plant.reader(cfg, plant.clock(false));
    let bins = reader
        .read_all_bins()
        .map_err(|e| map_telemetry_error(&*e))?;
    let total: f32 = bins.iter().sum();
    let unit = cfg.feeding.unit.label();

    if json_out {
        println!("{}", json!({ "bins": bins, "total": total, "unit": unit }));
    } else {
        for (name, w) in BIN_NAMES.iter().zip(bins) {
            println!("Bin {name}: {w:>8.2} {unit}");
        }
        println!("Total: {total:>8.2} {unit}");
    }
    Ok(())
}

fn cmd_schedule(cfg: &Config, json_out: bool) -> Result<()> {
    let mut scheduler = Scheduler::new(Arc::new(SystemWallClock));
    scheduler.begin(cfg.schedule.utc_offset_hours)?;
    scheduler.update();
    let times = cfg.schedule.feed_times;
    let next = scheduler.next_feed(&times);

    if json_out {
        let slots: Vec<_> = times
            .iter()
            .enumerate()
            .map(|(i, &t)| json!({ "cycle": i + 1, "time": Scheduler::minutes_to_time(t) }))
            .collect();
        println!(
            "{}",
            json!({
                "now": scheduler.current_time_str(),
                "synced": scheduler.is_time_synced(),
                "auto_feed": cfg.schedule.auto_feed,
                "feed_times": slots,
                "next": next.map(|(i, t)| json!({ "cycle": i + 1, "time": Scheduler::minutes_to_time(t) })),
            })
        );
    } else {
        println!("Now: {}", scheduler.current_time_str());
        for (i, &t) in times.iter().enumerate() {
            println!("Cycle {}: {}", i + 1, Scheduler::minutes_to_time(t));
        }
        match next {
            Some((i, t)) => println!("Next: cycle {} at {}", i + 1, Scheduler::minutes_to_time(t)),
            None => println!("Next: none remaining today"),
        }
        if !cfg.schedule.auto_feed {
            println!("Automatic feeding is disabled");
        }
    }
    Ok(())
}

fn cmd_relay(cfg: &Config, plant: &Plant, actuator: u8, secs: u64, json_out: bool) -> Result<()> {
    let id = Actuator::from_number(actuator)
        .ok_or_else(|| eyre::eyre!("actuator must be 1 or 2 (got {actuator})"))?;
    let clock = plant.clock(true);
    let mut engine = feeder_core::builder()
        .with_outputs(plant.outputs(cfg)?)
        .with_clock(clock.clone())
        .build()?;

    engine.set_actuator(id, true)?;
    tracing::info!(actuator, secs, "manual output on");
    clock.sleep(Duration::from_secs(secs));
    engine.stop_all();
    tracing::info!(actuator, "manual output off");

    if json_out {
        println!("{}", json!({ "actuator": actuator, "secs": secs, "state": "off" }));
    } else {
        println!("Actuator {actuator} ran for {secs}s and is off");
    }
    Ok(())
}

fn cmd_history(cfg: &Config, limit: usize, json_out: bool) -> Result<()> {
    let store = HistoryStore::from_config(&cfg.history);
    let rows = store.load_recent(limit)?;

    if json_out {
        let items: Vec<_> = rows
            .iter()
            .map(|r| {
                json!({
                    "timestamp": r.timestamp,
                    "cycle": r.cycle.map(|c| c + 1),
                    "target_weight": r.target_weight,
                    "actual_weight": r.actual_weight,
                    "duration_secs": r.duration_secs,
                    "alarm": r.alarm,
                    "alarm_reason": r.alarm_reason,
                })
            })
            .collect();
        println!("{}", json!(items));
    } else if rows.is_empty() {
        println!("No feed history");
    } else {
        let unit = cfg.feeding.unit.label();
        for r in &rows {
            let cycle = r
                .cycle
                .map_or_else(|| "manual".to_string(), |c| format!("cycle {}", c + 1));
            let outcome = if r.alarm {
                format!("ALARM: {}", r.alarm_reason)
            } else {
                "ok".to_string()
            };
            println!(
                "{} {cycle:<8} {:.2}/{:.2} {unit} {}s {outcome}",
                r.timestamp, r.actual_weight, r.target_weight, r.duration_secs
            );
        }
    }
    Ok(())
}

fn cmd_self_check(cfg: &Config, plant: &Plant, json_out: bool) -> Result<()> {
    let mut store = HistoryStore::from_config(&cfg.history);
    store.check()?;

    let mut reader = plant.reader(cfg, plant.clock(false));
    if !reader.reconnect() {
        return Err(FeederError::Telemetry(reader.last_error().to_string()).into());
    }

    if json_out {
        println!(
            "{}",
            json!({ "ok": true, "simulated": plant.is_simulated(), "policy": cfg.safety.policy })
        );
    } else {
        println!(
            "OK (config valid, history readable, indicator {})",
            if plant.is_simulated() { "simulated" } else { "reachable" }
        );
    }
    Ok(())
}
