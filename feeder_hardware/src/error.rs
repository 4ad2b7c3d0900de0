use thiserror::Error;

use crate::modbus::ModbusError;
use crate::util::ReadPhase;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("gpio error: {0}")]
    Gpio(String),
    #[error("indicator not configured: {0}")]
    NotConfigured(&'static str),
    #[error("bin index {0} out of range (0..4)")]
    BinIndex(usize),
    #[error("TCP connection failed to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("timeout waiting for {phase} from {addr}")]
    Timeout { phase: ReadPhase, addr: String },
    #[error("connection closed by {addr} while waiting for {phase}")]
    Closed { phase: ReadPhase, addr: String },
    #[error("{0}")]
    Modbus(#[from] ModbusError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
