pub mod clock;

pub use clock::{Clock, ManualClock, ManualWallClock, MonotonicClock, SystemWallClock, WallClock};

/// One of the two independently switched conveyance mechanisms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Actuator {
    /// Started first; runs alone for the pre-run period.
    One,
    /// Joins once the pre-run period has elapsed.
    Two,
}

impl Actuator {
    pub const ALL: [Actuator; 2] = [Actuator::One, Actuator::Two];

    /// 1-based number as printed on the panel.
    pub fn number(self) -> u8 {
        match self {
            Actuator::One => 1,
            Actuator::Two => 2,
        }
    }

    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            1 => Some(Actuator::One),
            2 => Some(Actuator::Two),
            _ => None,
        }
    }
}

/// Digital output capability driving the actuator relays.
pub trait Outputs {
    fn set_output(
        &mut self,
        id: Actuator,
        on: bool,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Source of per-bin weights (the remote load-cell indicator or a simulation).
pub trait BinReader {
    /// Read all four bins. Disabled or unreachable bins report 0.0.
    fn read_all_bins(&mut self) -> Result<[f32; 4], Box<dyn std::error::Error + Send + Sync>>;

    /// True if a read succeeded recently enough to trust the link.
    fn is_connected(&mut self) -> bool;

    /// Attempt to re-establish the link; implementations rate-limit themselves.
    fn reconnect(&mut self) -> bool;

    /// Most recent human-readable failure description.
    fn last_error(&self) -> &str;
}

impl<T: Outputs + ?Sized> Outputs for Box<T> {
    fn set_output(
        &mut self,
        id: Actuator,
        on: bool,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).set_output(id, on)
    }
}

impl<T: BinReader + ?Sized> BinReader for Box<T> {
    fn read_all_bins(&mut self) -> Result<[f32; 4], Box<dyn std::error::Error + Send + Sync>> {
        (**self).read_all_bins()
    }

    fn is_connected(&mut self) -> bool {
        (**self).is_connected()
    }

    fn reconnect(&mut self) -> bool {
        (**self).reconnect()
    }

    fn last_error(&self) -> &str {
        (**self).last_error()
    }
}
