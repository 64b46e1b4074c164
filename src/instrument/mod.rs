//! Instrument control: the command/query bus abstraction and the SR810 driver.
//!
//! The driver never talks to hardware directly. It owns a [`Transport`],
//! obtained from a [`Connector`] so that a dead handle can be replaced by a
//! fresh one at the same address (see [`Sr810::reconnect`]).
//!
//! - [`visa`] - GPIB/USB/LAN through the system VISA library (feature
//!   `instrument_visa`)
//! - [`mock`] - an in-memory SR810 used by tests and the `--mock` CLI mode

pub mod mock;
pub mod params;
pub mod sr810;
pub mod visa;

use crate::error::DaqResult;

pub use mock::MockLockin;
pub use params::{Sensitivity, TimeConstant};
pub use sr810::Sr810;
pub use visa::VisaConnector;

/// Default GPIB address of the lock-in on the lab bench.
pub const DEFAULT_GPIB_ADDRESS: &str = "GPIB0::8::INSTR";

/// In-band value recorded for a reading taken while the input is overloaded.
pub const OVERLOAD_SENTINEL: f64 = -1.0;

/// An open, line-oriented ASCII command channel to one device.
pub trait Transport {
    /// Send a command that produces no reply.
    fn write(&mut self, command: &str) -> DaqResult<()>;

    /// Send a query and return its reply with the terminator stripped.
    fn query(&mut self, command: &str) -> DaqResult<String>;
}

/// Opens [`Transport`] handles for a bus address.
pub trait Connector {
    /// Handle type produced by [`open`](Self::open).
    type Link: Transport;

    /// Open a new handle at `address`.
    fn open(&self, address: &str) -> DaqResult<Self::Link>;
}

/// Result of one probe voltage read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProbeReading {
    /// Measured magnitude in volts.
    Volts(f64),
    /// The input overload bit was set; no measurement was taken.
    Overload,
}

impl ProbeReading {
    /// Value as stored in a trace, with overload mapped to [`OVERLOAD_SENTINEL`].
    pub fn as_volts(self) -> f64 {
        match self {
            ProbeReading::Volts(v) => v,
            ProbeReading::Overload => OVERLOAD_SENTINEL,
        }
    }

    /// Whether the device reported an overload.
    pub fn is_overload(self) -> bool {
        matches!(self, ProbeReading::Overload)
    }
}

impl From<ProbeReading> for f64 {
    fn from(reading: ProbeReading) -> Self {
        reading.as_volts()
    }
}

/// Anything the acquisition loop can sample a voltage from.
pub trait VoltageProbe {
    /// Take one reading.
    fn read_probe_voltage(&mut self) -> DaqResult<ProbeReading>;
}

impl<P: VoltageProbe + ?Sized> VoltageProbe for &mut P {
    fn read_probe_voltage(&mut self) -> DaqResult<ProbeReading> {
        (**self).read_probe_voltage()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overload_maps_to_sentinel() {
        assert_eq!(ProbeReading::Overload.as_volts(), -1.0);
        assert!(ProbeReading::Overload.is_overload());
        assert_eq!(f64::from(ProbeReading::Volts(0.25)), 0.25);
        assert!(!ProbeReading::Volts(-1.0).is_overload());
    }
}
