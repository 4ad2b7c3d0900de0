pub mod error;
pub mod indicator;
pub mod modbus;
pub mod sim;
pub mod util;

#[cfg(all(feature = "gpio", target_os = "linux"))]
pub mod relays;

pub use error::HwError;
pub use indicator::{IndicatorClient, ReadLayout};
pub use sim::{SimulatedBins, SimulatedPlant, SimulatedRelays};

#[cfg(all(feature = "gpio", target_os = "linux"))]
pub use relays::GpioRelays;
