use rppal::gpio::{Gpio, OutputPin};

use feeder_traits::{Actuator, Outputs};

use crate::error::{HwError, Result};

/// Two relay outputs on Raspberry Pi GPIO lines.
pub struct GpioRelays {
    pins: [OutputPin; 2],
    active_low: bool,
}

impl GpioRelays {
    /// Claim both lines and drive them to the "off" level immediately.
    pub fn new(actuator_1: u8, actuator_2: u8, active_low: bool) -> Result<Self> {
        let gpio = Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
        let claim = |pin: u8| -> Result<OutputPin> {
            let p = gpio.get(pin).map_err(|e| HwError::Gpio(e.to_string()))?;
            Ok(if active_low {
                p.into_output_high()
            } else {
                p.into_output_low()
            })
        };
        let pins = [claim(actuator_1)?, claim(actuator_2)?];
        tracing::info!(actuator_1, actuator_2, active_low, "relay outputs claimed");
        Ok(Self { pins, active_low })
    }
}

impl Outputs for GpioRelays {
    fn set_output(
        &mut self,
        id: Actuator,
        on: bool,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let pin = &mut self.pins[usize::from(id.number() - 1)];
        if on != self.active_low {
            pin.set_high();
        } else {
            pin.set_low();
        }
        tracing::debug!(actuator = id.number(), on, "relay");
        Ok(())
    }
}
