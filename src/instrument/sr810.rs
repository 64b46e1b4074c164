//! Stanford Research SR810 lock-in amplifier driver.
//!
//! Command reference: SR810 manual, chapter 5 (GPIB commands).
//!
//! Every get/set accessor follows the same shape: an optional write, then an
//! unconditional query of the same setting, whose parsed reply is returned.
//! The value handed back is therefore always what the device accepted, which
//! may differ from what was requested (the excitation level, for example, is
//! rounded to 2 mV and clamped by the instrument).
//!
//! ```no_run
//! use lockin_daq::instrument::{MockLockin, Sr810};
//!
//! let mut lockin = Sr810::connect(MockLockin::new(), "GPIB0::8::INSTR")?;
//! let tc = lockin.time_constant(Some(10))?;
//! let volts = lockin.read_probe_voltage()?.as_volts();
//! # Ok::<(), lockin_daq::error::DaqError>(())
//! ```

use std::str::FromStr;

use tracing::{debug, info, warn};

use super::params::{Sensitivity, TimeConstant};
use super::{Connector, ProbeReading, Transport, VoltageProbe};
use crate::error::{DaqError, DaqResult};

/// Bit in the `LIAS?` status word set while the input is overloaded.
const INPUT_OVERLOAD_BIT: u8 = 1 << 2;

/// `OUTP?` channel for the R (magnitude) output.
const OUTPUT_R: u8 = 3;

/// SR810 driver bound to a single bus address.
pub struct Sr810<C: Connector> {
    address: String,
    connector: C,
    link: C::Link,
}

impl<C: Connector> Sr810<C> {
    /// Open the device at `address` and put it in remote mode.
    ///
    /// Routes output to the GPIB interface (`OUTX 1`) and keeps the front
    /// panel usable while remote (`OVRM 1`).
    ///
    /// # Errors
    ///
    /// [`DaqError::ConnectionFailed`] if the handle cannot be opened, or any
    /// bus error raised by the two initialisation writes.
    pub fn connect(connector: C, address: impl Into<String>) -> DaqResult<Self> {
        let address = address.into();
        let link = connector.open(&address)?;
        let mut lockin = Self {
            address,
            connector,
            link,
        };

        lockin.write("OUTX 1")?;
        lockin.write("OVRM 1")?;
        info!("SR810 ready at {}", lockin.address);
        Ok(lockin)
    }

    /// Bus address this driver was opened with.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Replace the current handle with a freshly opened one.
    ///
    /// The old handle is only released once the new one is open, so a failed
    /// reconnect leaves the driver as it was. Initialisation commands are not
    /// re-sent; the instrument keeps its own state across handle swaps.
    pub fn reconnect(&mut self) -> DaqResult<()> {
        warn!("Reconnecting to SR810 at {}", self.address);
        let fresh = self.connector.open(&self.address)?;
        self.link = fresh;
        Ok(())
    }

    /// Identification string (`*IDN?`).
    pub fn identify(&mut self) -> DaqResult<String> {
        self.query("*IDN?")
    }

    /// Get, or set then get, the sine output amplitude in volts.
    ///
    /// No range check is done here; the requested value is forwarded as-is and
    /// the instrument's own coercion shows up in the returned value.
    pub fn excitation_voltage(&mut self, volts: Option<f64>) -> DaqResult<f64> {
        if let Some(volts) = volts {
            self.write(&format!("SLVL {volts}"))?;
        }
        self.query_parse("SLVL?")
    }

    /// Get, or set then get, the sensitivity code (0 through 26).
    ///
    /// # Errors
    ///
    /// [`DaqError::InvalidParameter`] for codes outside 0..=26; nothing is
    /// written to the device in that case.
    pub fn sensitivity(&mut self, index: Option<i64>) -> DaqResult<i64> {
        if let Some(index) = index {
            let sens = Sensitivity::new(index)?;
            self.write(&format!("SENS {}", sens.index()))?;
        }
        let confirmed = self.query_parse("SENS?")?;
        if let Ok(sens) = Sensitivity::new(confirmed) {
            debug!("Sensitivity is {}", sens);
        }
        Ok(confirmed)
    }

    /// Get, or set then get, the time constant code (0 through 19).
    ///
    /// # Errors
    ///
    /// [`DaqError::InvalidParameter`] for codes outside 0..=19; nothing is
    /// written to the device in that case.
    pub fn time_constant(&mut self, index: Option<i64>) -> DaqResult<i64> {
        if let Some(index) = index {
            let tc = TimeConstant::new(index)?;
            self.write(&format!("OFLT {}", tc.index()))?;
        }
        let confirmed = self.query_parse("OFLT?")?;
        if let Ok(tc) = TimeConstant::new(confirmed) {
            debug!("Time constant is {}", tc);
        }
        Ok(confirmed)
    }

    /// Read the R output, checking for input overload first.
    ///
    /// Clears the status registers, then reads `LIAS?`. When the overload bit
    /// is set the measurement query is skipped entirely, because the reading
    /// would be meaningless.
    pub fn read_probe_voltage(&mut self) -> DaqResult<ProbeReading> {
        self.write("*CLS")?;
        let status: i64 = self.query_parse("LIAS?")?;
        if status & i64::from(INPUT_OVERLOAD_BIT) != 0 {
            debug!("Input overload (LIAS {})", status);
            return Ok(ProbeReading::Overload);
        }

        let volts = self.query_parse(&format!("OUTP? {OUTPUT_R}"))?;
        Ok(ProbeReading::Volts(volts))
    }

    fn write(&mut self, command: &str) -> DaqResult<()> {
        debug!("SR810 write: {}", command);
        self.link.write(command)
    }

    fn query(&mut self, command: &str) -> DaqResult<String> {
        let response = self.link.query(command)?;
        debug!("SR810 query '{}' -> '{}'", command, response);
        Ok(response)
    }

    fn query_parse<T: FromStr>(&mut self, command: &str) -> DaqResult<T> {
        let response = self.query(command)?;
        response.trim().parse().map_err(|_| DaqError::Parse {
            command: command.to_string(),
            response: response.trim().to_string(),
        })
    }
}

impl<C: Connector> VoltageProbe for Sr810<C> {
    fn read_probe_voltage(&mut self) -> DaqResult<ProbeReading> {
        Sr810::read_probe_voltage(self)
    }
}
