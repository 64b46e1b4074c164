//! Core library for the SR810 lock-in recorder.
//!
//! This library contains the instrument driver, the acquisition loop and the
//! trace storage used by the `sr810_logger` binary. The driver talks to the
//! instrument through the [`instrument::Transport`] seam, so everything above
//! it runs the same against a real GPIB bus or the simulated
//! [`instrument::MockLockin`].

pub mod acquisition;
pub mod config;
pub mod data;
pub mod display;
pub mod error;
pub mod instrument;
