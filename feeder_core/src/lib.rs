#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core feeding logic (hardware-agnostic).
//!
//! All hardware interactions go through `feeder_traits::Outputs` and
//! `feeder_traits::BinReader`; time comes from the injected `Clock` and
//! `WallClock`.
//!
//! ## Architecture
//!
//! - **Engine**: two-stage cycle state machine with fill pause (`engine`)
//! - **Scheduler**: four daily feed windows in local time (`scheduler`)
//! - **Controller**: one tick wires telemetry, schedule, engine and history (`runner`)
//! - **Configuration**: runtime config structs and policy (`config`)
//! - **Status**: stages, system states and snapshots (`status`)

pub mod builder;
pub mod config;
pub mod conversions;
pub mod engine;
pub mod error;
pub mod events;
pub mod history;
pub mod hw_error;
pub mod mocks;
pub mod runner;
pub mod scheduler;
pub mod status;

pub use builder::{FeedingEngineBuilder, Missing, Set, build_engine, builder};
pub use config::{FeedCycleConfig, SafetyPolicy, StrictLimits};
pub use engine::FeedingEngine;
pub use error::{BuildError, FeederError, Report, Result};
pub use events::{FeederEvent, WarningKind};
pub use history::{FeedRecord, HistorySink, MemoryHistory};
pub use runner::{Controller, ControllerSettings, Notifier, NullNotifier, RECONNECT_AFTER_MS};
pub use scheduler::{FEED_SLOTS, Scheduler};
pub use status::{FeedingStage, StatusSnapshot, SystemState};
