//! Indexed SR810 settings.
//!
//! The SR810 exposes sensitivity and time constant as small integer codes
//! (`SENS`, `OFLT`). These newtypes validate the code range on construction
//! and translate codes to the front-panel values for logging.

use std::fmt;
use std::time::Duration;

use crate::error::{DaqError, DaqResult};

/// Full-scale sensitivity labels, indexed by `SENS` code.
const SENSITIVITY_LABELS: [&str; 27] = [
    "2 nV/fA", "5 nV/fA", "10 nV/fA", "20 nV/fA", "50 nV/fA", "100 nV/fA", "200 nV/fA",
    "500 nV/fA", "1 µV/pA", "2 µV/pA", "5 µV/pA", "10 µV/pA", "20 µV/pA", "50 µV/pA",
    "100 µV/pA", "200 µV/pA", "500 µV/pA", "1 mV/nA", "2 mV/nA", "5 mV/nA", "10 mV/nA",
    "20 mV/nA", "50 mV/nA", "100 mV/nA", "200 mV/nA", "500 mV/nA", "1 V/µA",
];

/// Time constant labels, indexed by `OFLT` code.
const TIME_CONSTANT_LABELS: [&str; 20] = [
    "10 µs", "30 µs", "100 µs", "300 µs", "1 ms", "3 ms", "10 ms", "30 ms", "100 ms",
    "300 ms", "1 s", "3 s", "10 s", "30 s", "100 s", "300 s", "1 ks", "3 ks", "10 ks", "30 ks",
];

fn check_range(parameter: &'static str, value: i64, max: u8) -> DaqResult<u8> {
    if (0..=i64::from(max)).contains(&value) {
        Ok(value as u8)
    } else {
        Err(DaqError::InvalidParameter {
            parameter,
            value,
            min: 0,
            max: i64::from(max),
        })
    }
}

/// Sensitivity code, 0 (2 nV) through 26 (1 V).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Sensitivity(u8);

impl Sensitivity {
    /// Highest valid code.
    pub const MAX: u8 = 26;

    /// Validate a raw code.
    pub fn new(index: i64) -> DaqResult<Self> {
        check_range("sensitivity", index, Self::MAX).map(Self)
    }

    /// Raw `SENS` code.
    pub fn index(self) -> u8 {
        self.0
    }

    /// Front-panel full-scale value, e.g. `"1 mV/nA"`.
    pub fn label(self) -> &'static str {
        SENSITIVITY_LABELS[usize::from(self.0)]
    }
}

impl fmt::Display for Sensitivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0, self.label())
    }
}

/// Time constant code, 0 (10 µs) through 19 (30 ks).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeConstant(u8);

impl TimeConstant {
    /// Highest valid code.
    pub const MAX: u8 = 19;

    /// Validate a raw code.
    pub fn new(index: i64) -> DaqResult<Self> {
        check_range("time constant", index, Self::MAX).map(Self)
    }

    /// Raw `OFLT` code.
    pub fn index(self) -> u8 {
        self.0
    }

    /// Front-panel value, e.g. `"300 ms"`.
    pub fn label(self) -> &'static str {
        TIME_CONSTANT_LABELS[usize::from(self.0)]
    }

    /// The filter time constant. Codes alternate 1x/3x steps from 10 µs.
    pub fn duration(self) -> Duration {
        let decade = 10u64.pow(u32::from(self.0 / 2));
        let mantissa = if self.0 % 2 == 0 { 10 } else { 30 };
        Duration::from_micros(mantissa * decade)
    }
}

impl fmt::Display for TimeConstant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0, self.label())
    }
}
