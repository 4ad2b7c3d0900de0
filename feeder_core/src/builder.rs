//! Type-state builder for `FeedingEngine` and the `build_engine` constructor.
//!
//! The builder enforces at compile time that outputs are provided before
//! `build()` is available. `try_build()` runs the same policy checks for any
//! builder whose outputs type implements `Outputs`.

use std::marker::PhantomData;
use std::sync::Arc;

use feeder_traits::clock::{Clock, MonotonicClock};
use feeder_traits::Outputs;

use crate::config::{SafetyPolicy, StrictLimits};
use crate::engine::FeedingEngine;
use crate::error::{BuildError, Result};

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

pub struct FeedingEngineBuilder<O, S> {
    outputs: O,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    policy: SafetyPolicy,
    _s: PhantomData<S>,
}

impl Default for FeedingEngineBuilder<(), Missing> {
    fn default() -> Self {
        Self {
            outputs: (),
            clock: None,
            policy: SafetyPolicy::default(),
            _s: PhantomData,
        }
    }
}

/// Start building a `FeedingEngine`.
pub fn builder() -> FeedingEngineBuilder<(), Missing> {
    FeedingEngineBuilder::default()
}

impl<O, S> FeedingEngineBuilder<O, S> {
    pub fn with_outputs<O2: Outputs>(self, outputs: O2) -> FeedingEngineBuilder<O2, Set> {
        FeedingEngineBuilder {
            outputs,
            clock: self.clock,
            policy: self.policy,
            _s: PhantomData,
        }
    }

    /// Inject a clock (tests, simulations). Defaults to `MonotonicClock`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_policy(mut self, policy: SafetyPolicy) -> Self {
        self.policy = policy;
        self
    }
}

impl<O: Outputs, S> FeedingEngineBuilder<O, S> {
    /// Build with runtime checks regardless of type-state.
    pub fn try_build(self) -> Result<FeedingEngine<O>> {
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(MonotonicClock::new()));
        build_engine(self.outputs, clock, self.policy)
    }
}

impl<O: Outputs> FeedingEngineBuilder<O, Set> {
    pub fn build(self) -> Result<FeedingEngine<O>> {
        self.try_build()
    }
}

fn validate_policy(policy: &SafetyPolicy) -> Result<()> {
    if let SafetyPolicy::Strict(StrictLimits {
        weight_rise_limit,
        no_progress_secs,
        min_progress,
    }) = *policy
    {
        if !(weight_rise_limit.is_finite() && weight_rise_limit > 0.0) {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "weight_rise_limit must be > 0",
            )));
        }
        if no_progress_secs == 0 {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "no_progress_secs must be >= 1",
            )));
        }
        if !min_progress.is_finite() || min_progress.is_sign_negative() {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "min_progress must be >= 0",
            )));
        }
    }
    Ok(())
}

/// Validate the policy and construct an engine with both outputs forced off.
pub fn build_engine<O: Outputs>(
    outputs: O,
    clock: Arc<dyn Clock + Send + Sync>,
    policy: SafetyPolicy,
) -> Result<FeedingEngine<O>> {
    validate_policy(&policy)?;
    let mut engine = FeedingEngine::new(outputs, clock, policy);
    engine.begin();
    Ok(engine)
}
