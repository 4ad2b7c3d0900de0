use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FeederError {
    #[error("feeding already in progress")]
    AlreadyActive,
    #[error("manual control rejected: feeding in progress")]
    ManualOverrideRejected,
    #[error("alarm active: {0}")]
    AlarmLatched(String),
    #[error("invalid target weight: {0}")]
    InvalidTarget(f32),
    #[error("telemetry error: {0}")]
    Telemetry(String),
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
