//! Custom error types for the recorder.
//!
//! This module defines the primary error type, `DaqError`, shared by the
//! instrument driver, the acquisition loop and the storage layer. Using the
//! `thiserror` crate, it gives every failure a single, consistent shape so
//! that the binary can surface it through `anyhow` with the `?` operator.
//!
//! ## Error Hierarchy
//!
//! - **`ConnectionFailed`**: the bus handle could not be opened. Fatal at
//!   driver construction; the only recovery is an operator-invoked reconnect.
//! - **`InvalidParameter`**: an indexed lock-in setting was outside its
//!   domain. Raised before anything is written to the device.
//! - **`Io`** / **`Csv`**: bus or file I/O failures.
//! - **`Parse`**: the device answered a query with text that is not a number.
//! - **`Config`**: settings could not be extracted from the configuration
//!   sources.
//! - **`FeatureNotEnabled`**: the requested functionality (for example a real
//!   VISA bus) was not compiled in.
//!
//! An overloaded input is deliberately *not* an error; see
//! [`crate::instrument::ProbeReading`].

use thiserror::Error;

/// Convenience alias for results using the recorder error type.
pub type DaqResult<T> = std::result::Result<T, DaqError>;

/// Every failure the recorder library can report.
#[derive(Error, Debug)]
pub enum DaqError {
    /// The bus handle could not be opened.
    #[error("Failed to open connection to '{address}': {reason}")]
    ConnectionFailed {
        /// Bus address that was being opened.
        address: String,
        /// Underlying cause reported by the transport.
        reason: String,
    },

    /// A setting was outside its valid domain; nothing was sent to the device.
    #[error("Invalid {parameter} {value}: must be between {min} and {max}")]
    InvalidParameter {
        /// Name of the rejected setting.
        parameter: &'static str,
        /// Requested value.
        value: i64,
        /// Inclusive lower bound.
        min: i64,
        /// Inclusive upper bound.
        max: i64,
    },

    /// Bus or filesystem I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The CSV writer or reader failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The device answered a query with unparseable text.
    #[error("Could not parse response {response:?} to '{command}'")]
    Parse {
        /// Query that was sent.
        command: String,
        /// Raw (trimmed) reply.
        response: String,
    },

    /// Settings could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Settings were loaded but are semantically wrong.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// A display sink failed to render.
    #[error("Plot error: {0}")]
    Plot(String),

    /// Functionality was not compiled into this build.
    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),
}

impl From<figment::Error> for DaqError {
    fn from(err: figment::Error) -> Self {
        DaqError::Config(Box::new(err))
    }
}
