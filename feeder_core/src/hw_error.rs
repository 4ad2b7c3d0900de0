//! Maps `Box<dyn Error>` from trait boundaries to typed `FeederError`.
//!
//! The traits in `feeder_traits` use `Box<dyn Error + Send + Sync>` so any
//! backend can plug in; this module converts those to our typed error enum,
//! with an optional feature-gated path for `feeder_hardware::HwError`
//! downcasting.

use crate::error::FeederError;

/// Map an output (relay) failure to a typed `FeederError`.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> FeederError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<feeder_hardware::error::HwError>() {
            return match hw {
                feeder_hardware::error::HwError::Gpio(msg) => FeederError::Hardware(msg.clone()),
                other => FeederError::Telemetry(other.to_string()),
            };
        }
    }

    FeederError::Hardware(e.to_string())
}

/// Map a weight-read failure to a typed `FeederError`.
///
/// Anything coming out of a `BinReader` is a telemetry problem unless the
/// backend says otherwise.
pub fn map_telemetry_error(e: &(dyn std::error::Error + 'static)) -> FeederError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(feeder_hardware::error::HwError::Gpio(msg)) =
            e.downcast_ref::<feeder_hardware::error::HwError>()
        {
            return FeederError::Hardware(msg.clone());
        }
    }

    FeederError::Telemetry(e.to_string())
}
