//! Backend assembly: the real indicator and relays, or the simulated bench plant.
//!
//! The bench plant is tuned through environment variables so integration tests
//! can shape a run without a config change:
//! - `FEEDER_SIM_WEIGHT`: starting weight in bin A (default 500)
//! - `FEEDER_SIM_FLOW`: weight leaving bin A per read while both actuators run (default 0.5)
//! - `FEEDER_SIM_FAIL_READS`: number of initial reads that time out (default 0)

use std::sync::Arc;
use std::time::Duration;

use feeder_config::Config;
use feeder_hardware::{IndicatorClient, SimulatedPlant};
use feeder_traits::{BinReader, Clock, ManualClock, MonotonicClock, Outputs};

pub enum Plant {
    Simulated(SimulatedPlant),
    Hardware,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Plant {
    pub fn select(simulate: bool) -> Self {
        if !simulate {
            return Plant::Hardware;
        }
        let weight: f32 = env_or("FEEDER_SIM_WEIGHT", 500.0);
        let flow: f32 = env_or("FEEDER_SIM_FLOW", 0.5);
        let plant = SimulatedPlant::new([weight, 0.0, 0.0, 0.0], flow);
        let fail: u32 = env_or("FEEDER_SIM_FAIL_READS", 0);
        if fail > 0 {
            plant.fail_next_reads(fail);
        }
        tracing::info!(weight, flow, fail, "using simulated plant");
        Plant::Simulated(plant)
    }

    pub fn is_simulated(&self) -> bool {
        matches!(self, Plant::Simulated(_))
    }

    /// Simulated runs fast-forward: `sleep` advances a manual clock instead of blocking.
    pub fn clock(&self, fast_forward: bool) -> Arc<dyn Clock + Send + Sync> {
        if fast_forward && self.is_simulated() {
            Arc::new(ManualClock::new())
        } else {
            Arc::new(MonotonicClock::new())
        }
    }

    pub fn reader(&self, cfg: &Config, clock: Arc<dyn Clock + Send + Sync>) -> Box<dyn BinReader> {
        match self {
            Plant::Simulated(p) => Box::new(p.bins()),
            Plant::Hardware => {
                let ind = &cfg.indicator;
                let mut client = IndicatorClient::new(clock).with_timeouts(
                    Duration::from_millis(ind.timeout_ms),
                    Duration::from_millis(ind.retry_delay_ms),
                );
                client.connect(ind.host.clone(), ind.port, ind.unit_id);
                Box::new(client)
            }
        }
    }

    pub fn outputs(&self, cfg: &Config) -> eyre::Result<Box<dyn Outputs>> {
        match self {
            Plant::Simulated(p) => Ok(Box::new(p.relays())),
            Plant::Hardware => hardware_outputs(cfg),
        }
    }
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
fn hardware_outputs(cfg: &Config) -> eyre::Result<Box<dyn Outputs>> {
    let relays = feeder_hardware::GpioRelays::new(
        cfg.pins.actuator_1,
        cfg.pins.actuator_2,
        cfg.pins.active_low,
    )
    .map_err(|e| eyre::eyre!("open relay pins: {e}"))?;
    tracing::info!(
        actuator_1 = cfg.pins.actuator_1,
        actuator_2 = cfg.pins.actuator_2,
        active_low = cfg.pins.active_low,
        "relays ready"
    );
    Ok(Box::new(relays))
}

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
fn hardware_outputs(_cfg: &Config) -> eyre::Result<Box<dyn Outputs>> {
    eyre::bail!(
        "relay outputs need the `hardware` feature on Linux; pass --simulate to use the bench plant"
    )
}
