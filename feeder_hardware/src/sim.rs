//! Bench plant: relays and bin weights that react to each other.
//!
//! While both actuators are on, bin A loses `flow_per_read` on every read.
//! Handles share state through `Rc<RefCell<_>>`, so the plant is meant for
//! the single-threaded control loop and tests.

use std::cell::RefCell;
use std::rc::Rc;

use feeder_traits::{Actuator, BinReader, Outputs};

use crate::error::HwError;
use crate::util::ReadPhase;

#[derive(Debug)]
struct PlantState {
    bins: [f32; 4],
    outputs: [bool; 2],
    flow_per_read: f32,
    failing_reads: u32,
}

#[derive(Debug, Clone)]
pub struct SimulatedPlant {
    state: Rc<RefCell<PlantState>>,
}

impl SimulatedPlant {
    pub fn new(bins: [f32; 4], flow_per_read: f32) -> Self {
        Self {
            state: Rc::new(RefCell::new(PlantState {
                bins,
                outputs: [false; 2],
                flow_per_read,
                failing_reads: 0,
            })),
        }
    }

    pub fn relays(&self) -> SimulatedRelays {
        SimulatedRelays {
            state: Rc::clone(&self.state),
        }
    }

    pub fn bins(&self) -> SimulatedBins {
        SimulatedBins {
            state: Rc::clone(&self.state),
        }
    }

    pub fn output(&self, id: Actuator) -> bool {
        self.state.borrow().outputs[slot(id)]
    }

    pub fn weights(&self) -> [f32; 4] {
        self.state.borrow().bins
    }

    /// Add material to a bin, as if someone were filling it mid-cycle.
    pub fn refill(&self, index: usize, amount: f32) {
        if let Some(b) = self.state.borrow_mut().bins.get_mut(index) {
            *b += amount;
        }
    }

    /// Make the next `n` reads fail as if the indicator had gone silent.
    pub fn fail_next_reads(&self, n: u32) {
        self.state.borrow_mut().failing_reads = n;
    }
}

fn slot(id: Actuator) -> usize {
    usize::from(id.number() - 1)
}

#[derive(Debug)]
pub struct SimulatedRelays {
    state: Rc<RefCell<PlantState>>,
}

impl Outputs for SimulatedRelays {
    fn set_output(
        &mut self,
        id: Actuator,
        on: bool,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.state.borrow_mut().outputs[slot(id)] = on;
        tracing::debug!(actuator = id.number(), on, "relay (simulated)");
        Ok(())
    }
}

#[derive(Debug)]
pub struct SimulatedBins {
    state: Rc<RefCell<PlantState>>,
}

impl BinReader for SimulatedBins {
    fn read_all_bins(&mut self) -> Result<[f32; 4], Box<dyn std::error::Error + Send + Sync>> {
        let mut s = self.state.borrow_mut();
        if s.failing_reads > 0 {
            s.failing_reads -= 1;
            return Err(HwError::Timeout {
                phase: ReadPhase::Header,
                addr: "simulated".to_string(),
            }
            .into());
        }
        if s.outputs.iter().all(|&on| on) {
            s.bins[0] = (s.bins[0] - s.flow_per_read).max(0.0);
        }
        Ok(s.bins)
    }

    fn is_connected(&mut self) -> bool {
        self.state.borrow().failing_reads == 0
    }

    fn reconnect(&mut self) -> bool {
        self.state.borrow().failing_reads == 0
    }

    fn last_error(&self) -> &str {
        if self.state.borrow().failing_reads > 0 {
            "simulated indicator offline"
        } else {
            "Connected"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bin_a_drains_only_with_both_relays_on() {
        let plant = SimulatedPlant::new([500.0, 0.0, 0.0, 0.0], 2.0);
        let mut relays = plant.relays();
        let mut bins = plant.bins();

        relays.set_output(Actuator::One, true).unwrap();
        assert_eq!(bins.read_all_bins().unwrap()[0], 500.0);

        relays.set_output(Actuator::Two, true).unwrap();
        assert_eq!(bins.read_all_bins().unwrap()[0], 498.0);
        assert!(plant.output(Actuator::Two));
    }

    #[test]
    fn injected_failures_are_consumed() {
        let plant = SimulatedPlant::new([100.0; 4], 0.0);
        let mut bins = plant.bins();
        plant.fail_next_reads(1);
        assert!(!bins.is_connected());
        assert!(bins.read_all_bins().is_err());
        assert!(bins.read_all_bins().is_ok());
        assert!(bins.reconnect());
    }
}
