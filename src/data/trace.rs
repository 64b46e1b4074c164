//! In-memory voltage trace.

use chrono::{DateTime, TimeZone};

use crate::instrument::ProbeReading;

/// Wall-clock format of sample timestamps.
pub const TIMESTAMP_FORMAT: &str = "%H:%M:%S";

/// One reading with the time it was taken.
///
/// Overloaded readings are kept as ordinary samples carrying the sentinel
/// value, so they stay aligned with their timestamp in the persisted rows.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    /// `HH:MM:SS` local time.
    pub timestamp: String,
    /// Volts, or -1 for overload.
    pub volts: f64,
}

impl Sample {
    /// Sample from an already formatted timestamp.
    pub fn new(timestamp: impl Into<String>, volts: f64) -> Self {
        Self {
            timestamp: timestamp.into(),
            volts,
        }
    }

    /// Sample taken at `time`.
    pub fn at<Tz: TimeZone>(time: &DateTime<Tz>, reading: ProbeReading) -> Self
    where
        Tz::Offset: std::fmt::Display,
    {
        Self::new(time.format(TIMESTAMP_FORMAT).to_string(), reading.as_volts())
    }
}

/// Append-only record of one acquisition run.
///
/// Samples are stored as (timestamp, voltage) pairs and pushed whole, so the
/// timestamp and voltage sequences can never differ in length.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Trace {
    samples: Vec<Sample>,
}

impl Trace {
    /// Empty trace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one sample.
    pub fn push(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether no samples were taken.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// All samples in acquisition order.
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// The most recent `size` samples, or all of them if there are fewer.
    pub fn window(&self, size: usize) -> &[Sample] {
        let start = self.samples.len().saturating_sub(size);
        &self.samples[start..]
    }

    /// Timestamp column.
    pub fn timestamps(&self) -> impl Iterator<Item = &str> + '_ {
        self.samples.iter().map(|s| s.timestamp.as_str())
    }

    /// Voltage column.
    pub fn voltages(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().map(|s| s.volts)
    }
}

impl FromIterator<Sample> for Trace {
    fn from_iter<I: IntoIterator<Item = Sample>>(iter: I) -> Self {
        Self {
            samples: iter.into_iter().collect(),
        }
    }
}
