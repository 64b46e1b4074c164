//! The acquisition loop and its stop signal.
//!
//! An [`Acquisition`] owns the [`Trace`] for one run and moves through two
//! states:
//!
//! ```text
//! Running --(stop requested)--> Finalizing --> saved, run over
//! ```
//!
//! While running, each cycle timestamps a probe reading, appends it, refreshes
//! the display with the recent window and waits for the poll interval. The
//! wait returns early when the [`StopSignal`] is tripped, so a stop never
//! splits a sample.
//!
//! Finalizing runs exactly once: [`Acquisition::finalize`] consumes the
//! acquisition, persists the trace, prints the save confirmation and renders
//! the final view. A probe or bus error while running ends the run with that
//! error and nothing is saved.

use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use tracing::{debug, info, trace, warn};

use crate::data::{CsvTraceWriter, Sample, Trace};
use crate::display::TraceDisplay;
use crate::error::DaqResult;
use crate::instrument::VoltageProbe;

/// Pause between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Number of recent samples shown by the live display.
pub const DEFAULT_LIVE_WINDOW: usize = 20;

/// Cross-thread request to stop acquiring.
///
/// Clones share the same flag. Tripping it wakes any thread blocked in
/// [`wait_timeout`](Self::wait_timeout).
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopSignal {
    /// An untripped signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request the stop. Idempotent.
    pub fn request_stop(&self) {
        let (flag, wake) = &*self.inner;
        *flag.lock().unwrap_or_else(PoisonError::into_inner) = true;
        wake.notify_all();
    }

    /// Whether a stop has been requested.
    pub fn is_stop_requested(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block for up to `timeout` or until a stop is requested.
    ///
    /// Returns `true` if a stop has been requested.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (flag, wake) = &*self.inner;
        let guard = flag.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = wake
            .wait_timeout_while(guard, timeout, |stopped| !*stopped)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

/// Lifecycle state of an acquisition run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Polling the probe.
    Running,
    /// Stop received; saving and rendering the final view.
    Finalizing,
}

/// Timing and windowing of the poll loop.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionConfig {
    /// Pause after each cycle. I/O time is not subtracted.
    pub poll_interval: Duration,
    /// Samples handed to the live display each cycle.
    pub live_window: usize,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            live_window: DEFAULT_LIVE_WINDOW,
        }
    }
}

/// Outcome of a finalized run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Where the trace file ended up.
    pub saved: PathBuf,
    /// Number of samples written.
    pub samples: usize,
}

impl RunSummary {
    /// File name of the saved trace, for the confirmation message.
    pub fn file_name(&self) -> String {
        self.saved
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// One acquisition run: a probe, a display sink and the trace they fill.
pub struct Acquisition<P, D> {
    probe: P,
    display: D,
    writer: CsvTraceWriter,
    config: AcquisitionConfig,
    trace: Trace,
    state: RunState,
}

impl<P: VoltageProbe, D: TraceDisplay> Acquisition<P, D> {
    /// A run with an empty trace, in the [`RunState::Running`] state.
    pub fn new(probe: P, display: D, writer: CsvTraceWriter, config: AcquisitionConfig) -> Self {
        Self {
            probe,
            display,
            writer,
            config,
            trace: Trace::new(),
            state: RunState::Running,
        }
    }

    /// Current state.
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Samples recorded so far.
    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    /// Take one sample and refresh the live display.
    ///
    /// The timestamp is captured before the read. A display failure is
    /// logged and otherwise ignored.
    pub fn sample_once(&mut self) -> DaqResult<()> {
        let now = Local::now();
        let reading = self.probe.read_probe_voltage()?;
        let sample = Sample::at(&now, reading);
        trace!("Sample {}: {} V", sample.timestamp, sample.volts);
        self.trace.push(sample);

        if let Err(e) = self.display.refresh(self.trace.window(self.config.live_window)) {
            warn!("Live display refresh failed: {}", e);
        }
        Ok(())
    }

    /// Poll until `stop` is tripped, then finalize.
    ///
    /// The stop is checked before every cycle and during the pause. Errors
    /// from the probe end the run immediately without saving.
    pub fn run(mut self, stop: &StopSignal) -> DaqResult<RunSummary> {
        info!(
            "Acquisition running (every {:?}, live window {})",
            self.config.poll_interval, self.config.live_window
        );
        loop {
            match self.state {
                RunState::Running => {
                    if stop.is_stop_requested() {
                        self.state = RunState::Finalizing;
                        continue;
                    }
                    if let Err(e) = self.sample_once() {
                        warn!(
                            "Acquisition aborted after {} samples; trace not saved",
                            self.trace.len()
                        );
                        return Err(e);
                    }
                    if stop.wait_timeout(self.config.poll_interval) {
                        self.state = RunState::Finalizing;
                    }
                }
                RunState::Finalizing => return self.finalize(),
            }
        }
    }

    /// Save the trace stamped with the current local time and show the
    /// final view.
    pub fn finalize(self) -> DaqResult<RunSummary> {
        let at = Local::now().naive_local();
        self.finalize_at(&at)
    }

    /// Save the trace with file and folder names derived from `at`.
    ///
    /// Prints `saved <file name>` once the file is in place, before the
    /// final view is rendered.
    pub fn finalize_at(mut self, at: &NaiveDateTime) -> DaqResult<RunSummary> {
        self.state = RunState::Finalizing;
        info!("Stop received; saving {} samples", self.trace.len());

        let saved = self.writer.persist(&self.trace, at)?;
        let summary = RunSummary {
            saved,
            samples: self.trace.len(),
        };
        println!("saved {}", summary.file_name());

        if let Err(e) = self.display.finish(&self.trace, &summary.saved) {
            warn!("Final plot failed: {}", e);
        }
        debug!("Run finalized");
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::ProbeReading;
    use std::path::Path;
    use std::thread;
    use std::time::Instant;

    struct Counter(f64);

    impl VoltageProbe for Counter {
        fn read_probe_voltage(&mut self) -> DaqResult<ProbeReading> {
            self.0 += 1.0;
            Ok(ProbeReading::Volts(self.0))
        }
    }

    #[derive(Default)]
    struct Silent;

    impl TraceDisplay for Silent {
        fn refresh(&mut self, _window: &[Sample]) -> DaqResult<()> {
            Ok(())
        }

        fn finish(&mut self, _trace: &Trace, _saved: &Path) -> DaqResult<()> {
            Ok(())
        }
    }

    #[test]
    fn stop_signal_is_shared_between_clones() {
        let stop = StopSignal::new();
        let remote = stop.clone();
        assert!(!stop.is_stop_requested());
        remote.request_stop();
        assert!(stop.is_stop_requested());
        assert!(stop.wait_timeout(Duration::from_secs(60)));
    }

    #[test]
    fn wait_timeout_wakes_on_stop() {
        let stop = StopSignal::new();
        let remote = stop.clone();
        let started = Instant::now();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.request_stop();
        });
        assert!(stop.wait_timeout(Duration::from_secs(30)));
        assert!(started.elapsed() < Duration::from_secs(30));
        handle.join().unwrap();
    }

    #[test]
    fn wait_timeout_expires_without_stop() {
        assert!(!StopSignal::new().wait_timeout(Duration::from_millis(5)));
    }

    #[test]
    fn each_cycle_appends_one_sample() -> DaqResult<()> {
        let dir = tempfile::tempdir()?;
        let mut acq = Acquisition::new(
            Counter(0.0),
            Silent,
            CsvTraceWriter::new(dir.path(), "T"),
            AcquisitionConfig::default(),
        );
        for n in 1..=7 {
            acq.sample_once()?;
            assert_eq!(acq.trace().timestamps().count(), n);
            assert_eq!(acq.trace().voltages().count(), n);
        }
        assert_eq!(acq.state(), RunState::Running);
        Ok(())
    }

    /// Notes whether the trace file was already in place at `finish`.
    #[derive(Default)]
    struct FinishWitness {
        file_present: Option<bool>,
    }

    impl TraceDisplay for &mut FinishWitness {
        fn refresh(&mut self, _window: &[Sample]) -> DaqResult<()> {
            Ok(())
        }

        fn finish(&mut self, _trace: &Trace, saved: &Path) -> DaqResult<()> {
            self.file_present = Some(saved.exists());
            Ok(())
        }
    }

    #[test]
    fn final_view_comes_after_the_file_is_saved() -> DaqResult<()> {
        let dir = tempfile::tempdir()?;
        let mut witness = FinishWitness::default();
        let mut acq = Acquisition::new(
            Counter(0.0),
            &mut witness,
            CsvTraceWriter::new(dir.path().join("not_yet_created"), "T"),
            AcquisitionConfig::default(),
        );
        acq.sample_once()?;
        let summary = acq.finalize()?;

        assert_eq!(summary.samples, 1);
        assert!(summary.file_name().starts_with("T_"));
        assert_eq!(witness.file_present, Some(true));
        Ok(())
    }

    #[test]
    fn pre_tripped_stop_saves_empty_trace() -> DaqResult<()> {
        let dir = tempfile::tempdir()?;
        let stop = StopSignal::new();
        stop.request_stop();
        let acq = Acquisition::new(
            Counter(0.0),
            Silent,
            CsvTraceWriter::new(dir.path(), "T"),
            AcquisitionConfig::default(),
        );
        let summary = acq.run(&stop)?;
        assert_eq!(summary.samples, 0);
        assert!(summary.saved.exists());
        Ok(())
    }
}
