//! Trace data and its storage.

pub mod storage;
pub mod trace;

pub use storage::{CsvTraceWriter, DEFAULT_FILE_PREFIX};
pub use trace::{Sample, Trace};
