//! VISA transport for GPIB, USB and LAN instruments.
//!
//! This module provides a [`Connector`] that opens sessions through the
//! system VISA library using the `visa-rs` crate. Resource strings look like
//! `GPIB0::8::INSTR`, `USB0::0x1234::0x5678::SERIAL::INSTR` or
//! `TCPIP0::192.168.1.100::INSTR`.
//!
//! VISA support is behind the `instrument_visa` feature because it links
//! against a vendor VISA installation (NI-VISA, Keysight IO Libraries, ...).
//! Without the feature, opening any address fails with
//! [`DaqError::FeatureNotEnabled`](crate::error::DaqError::FeatureNotEnabled).

use std::time::Duration;

use super::{Connector, Transport};
use crate::error::{DaqError, DaqResult};

/// Opens VISA sessions.
#[derive(Debug, Clone)]
pub struct VisaConnector {
    /// Open and I/O timeout.
    pub(crate) timeout: Duration,

    /// Line terminator appended to every command (SR810 accepts LF).
    pub(crate) line_terminator: String,
}

impl Default for VisaConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl VisaConnector {
    /// Connector with a 5 s timeout and LF terminator.
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            line_terminator: "\n".to_string(),
        }
    }

    /// Set the open/read timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the command terminator.
    pub fn with_line_terminator(mut self, terminator: String) -> Self {
        self.line_terminator = terminator;
        self
    }
}

#[cfg(feature = "instrument_visa")]
mod visa_enabled {
    use super::*;
    use std::ffi::CString;
    use std::io::{BufRead, BufReader, Write};
    use tracing::debug;
    use visa_rs::prelude::*;

    /// Open VISA session.
    pub struct VisaLink {
        // Declared before the resource manager so it is closed first.
        instr: Instrument,
        _rm: DefaultRM,
        line_terminator: String,
    }

    impl Connector for VisaConnector {
        type Link = VisaLink;

        fn open(&self, address: &str) -> DaqResult<VisaLink> {
            let failed = |reason: String| DaqError::ConnectionFailed {
                address: address.to_string(),
                reason,
            };

            let rm = DefaultRM::new()
                .map_err(|e| failed(format!("VISA resource manager unavailable: {e}")))?;
            let resource = CString::new(address).map_err(|e| failed(e.to_string()))?;
            let instr = rm
                .open(&resource.into(), AccessMode::NO_LOCK, self.timeout)
                .map_err(|e| failed(e.to_string()))?;

            debug!("Opened VISA session {}", address);
            Ok(VisaLink {
                instr,
                _rm: rm,
                line_terminator: self.line_terminator.clone(),
            })
        }
    }

    impl Transport for VisaLink {
        fn write(&mut self, command: &str) -> DaqResult<()> {
            let line = format!("{}{}", command, self.line_terminator);
            self.instr.write_all(line.as_bytes())?;
            Ok(())
        }

        fn query(&mut self, command: &str) -> DaqResult<String> {
            self.write(command)?;
            let mut response = String::new();
            {
                // Scoped so the reader's borrow ends before the next write.
                let mut reader = BufReader::new(&self.instr);
                reader.read_line(&mut response)?;
            }
            Ok(response.trim_end().to_string())
        }
    }
}

#[cfg(not(feature = "instrument_visa"))]
mod visa_disabled {
    use super::*;

    /// Uninhabited: no VISA session can exist without the feature.
    pub enum VisaLink {}

    impl Connector for VisaConnector {
        type Link = VisaLink;

        fn open(&self, _address: &str) -> DaqResult<VisaLink> {
            Err(DaqError::FeatureNotEnabled("instrument_visa".to_string()))
        }
    }

    impl Transport for VisaLink {
        fn write(&mut self, _command: &str) -> DaqResult<()> {
            match *self {}
        }

        fn query(&mut self, _command: &str) -> DaqResult<String> {
            match *self {}
        }
    }
}

#[cfg(feature = "instrument_visa")]
pub use visa_enabled::VisaLink;

#[cfg(not(feature = "instrument_visa"))]
pub use visa_disabled::VisaLink;
