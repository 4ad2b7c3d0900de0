//! Test and helper mocks for feeder_core

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use feeder_traits::{Actuator, BinReader, Outputs};

use crate::events::FeederEvent;
use crate::runner::Notifier;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Records every output command; clones share the log.
#[derive(Debug, Default, Clone)]
pub struct RecordingOutputs {
    log: Rc<RefCell<Vec<(Actuator, bool)>>>,
}

impl RecordingOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<(Actuator, bool)> {
        self.log.borrow().clone()
    }

    /// Last commanded level for `id`, false if never driven.
    pub fn is_on(&self, id: Actuator) -> bool {
        self.log
            .borrow()
            .iter()
            .rev()
            .find(|(a, _)| *a == id)
            .is_some_and(|&(_, on)| on)
    }
}

impl Outputs for RecordingOutputs {
    fn set_output(&mut self, id: Actuator, on: bool) -> Result<(), BoxError> {
        self.log.borrow_mut().push((id, on));
        Ok(())
    }
}

/// Refuses to switch `id` on; switching off always succeeds.
#[derive(Debug, Clone, Copy)]
pub struct FailingOutputs {
    pub id: Actuator,
}

impl Outputs for FailingOutputs {
    fn set_output(&mut self, id: Actuator, on: bool) -> Result<(), BoxError> {
        if on && id == self.id {
            return Err(Box::new(std::io::Error::other(format!(
                "relay {} stuck",
                id.number()
            ))));
        }
        Ok(())
    }
}

/// Plays back a script of bin readings; `None` entries fail the read.
/// The last entry repeats once the script runs out.
#[derive(Debug, Default, Clone)]
pub struct ScriptedBins {
    script: VecDeque<Option<[f32; 4]>>,
    last: Option<[f32; 4]>,
    pub reconnects: u32,
}

impl ScriptedBins {
    pub fn new(script: impl IntoIterator<Item = Option<[f32; 4]>>) -> Self {
        Self {
            script: script.into_iter().collect(),
            ..Self::default()
        }
    }

    /// A reader that always reports the same total in bin A.
    pub fn constant(total: f32) -> Self {
        Self::new([Some([total, 0.0, 0.0, 0.0])])
    }

    pub fn push(&mut self, reading: Option<[f32; 4]>) {
        self.script.push_back(reading);
    }
}

impl BinReader for ScriptedBins {
    fn read_all_bins(&mut self) -> Result<[f32; 4], BoxError> {
        let next = match self.script.pop_front() {
            Some(r) => {
                self.last = r;
                r
            }
            None => self.last,
        };
        next.ok_or_else(|| Box::new(std::io::Error::other("scripted read failure")) as BoxError)
    }

    fn is_connected(&mut self) -> bool {
        self.last.is_some()
    }

    fn reconnect(&mut self) -> bool {
        self.reconnects += 1;
        false
    }

    fn last_error(&self) -> &str {
        if self.last.is_some() {
            "Connected"
        } else {
            "scripted read failure"
        }
    }
}

/// Collects forwarded events.
#[derive(Debug, Default, Clone)]
pub struct RecordingNotifier {
    pub events: Vec<FeederEvent>,
}

impl Notifier for RecordingNotifier {
    fn notify(&mut self, event: &FeederEvent) {
        self.events.push(event.clone());
    }
}
