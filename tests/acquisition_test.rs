//! End-to-end acquisition runs against the simulated lock-in.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use lockin_daq::acquisition::{Acquisition, AcquisitionConfig, RunState, StopSignal};
use lockin_daq::data::storage::read_rows;
use lockin_daq::data::{CsvTraceWriter, Sample, Trace, DEFAULT_FILE_PREFIX};
use lockin_daq::display::TraceDisplay;
use lockin_daq::error::{DaqError, DaqResult};
use lockin_daq::instrument::{MockLockin, Sr810};

/// Remembers every window it was shown.
#[derive(Clone, Default)]
struct Recorder {
    windows: Arc<Mutex<Vec<Vec<f64>>>>,
    finished: Arc<Mutex<Option<usize>>>,
}

impl TraceDisplay for Recorder {
    fn refresh(&mut self, window: &[Sample]) -> DaqResult<()> {
        self.windows
            .lock()
            .unwrap()
            .push(window.iter().map(|s| s.volts).collect());
        Ok(())
    }

    fn finish(&mut self, trace: &Trace, _saved: &Path) -> DaqResult<()> {
        *self.finished.lock().unwrap() = Some(trace.len());
        Ok(())
    }
}

/// Always fails to render.
struct Broken;

impl TraceDisplay for Broken {
    fn refresh(&mut self, _window: &[Sample]) -> DaqResult<()> {
        Err(DaqError::Plot("display closed".into()))
    }

    fn finish(&mut self, _trace: &Trace, _saved: &Path) -> DaqResult<()> {
        Err(DaqError::Plot("display closed".into()))
    }
}

fn stop_instant() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 9)
        .and_then(|d| d.and_hms_opt(14, 2, 51))
        .expect("valid date")
}

fn lockin(bus: &MockLockin) -> Sr810<MockLockin> {
    Sr810::connect(bus.clone(), "GPIB0::8::INSTR").expect("Failed to connect to mock")
}

fn fast() -> AcquisitionConfig {
    AcquisitionConfig {
        poll_interval: Duration::from_millis(1),
        live_window: 20,
    }
}

#[test]
fn test_twenty_five_samples_then_interrupt() {
    let dir = tempfile::tempdir().expect("tempdir");
    let bus = MockLockin::new();
    let display = Recorder::default();
    let mut acq = Acquisition::new(
        lockin(&bus),
        display.clone(),
        CsvTraceWriter::new(dir.path(), DEFAULT_FILE_PREFIX),
        fast(),
    );

    for _ in 0..25 {
        acq.sample_once().expect("sample failed");
    }
    let voltages: Vec<f64> = acq.trace().voltages().collect();
    assert_eq!(acq.state(), RunState::Running);

    {
        let windows = display.windows.lock().unwrap();
        assert_eq!(windows.len(), 25);
        assert_eq!(windows[4].len(), 5);
        let last = windows.last().expect("no refresh");
        assert_eq!(last.len(), 20);
        assert_eq!(last.as_slice(), &voltages[5..]);
    }

    let summary = acq.finalize_at(&stop_instant()).expect("finalize failed");
    assert_eq!(summary.samples, 25);
    assert_eq!(summary.file_name(), "LaserV_2024_03_09_14.02.51.csv");
    assert_eq!(
        summary.saved,
        dir.path()
            .join("LaserV_2024_03_09")
            .join("LaserV_2024_03_09_14.02.51.csv")
    );
    assert_eq!(*display.finished.lock().unwrap(), Some(25));

    let rows = read_rows(&summary.saved).expect("read back failed");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].len(), 25);
    assert_eq!(rows[1].len(), 25);
    assert!(rows[0].iter().all(|t| t.len() == 8 && t.as_bytes()[2] == b':'));
    let stored: Vec<f64> = rows[1].iter().map(|v| v.parse().unwrap()).collect();
    assert_eq!(stored, voltages);
}

#[test]
fn test_overload_is_stored_as_sentinel_in_its_column() {
    let dir = tempfile::tempdir().expect("tempdir");
    let bus = MockLockin::new();
    bus.set_reading(3.0e-3);
    let mut acq = Acquisition::new(
        lockin(&bus),
        Recorder::default(),
        CsvTraceWriter::new(dir.path(), DEFAULT_FILE_PREFIX),
        fast(),
    );

    acq.sample_once().expect("sample failed");
    bus.set_overload(true);
    acq.sample_once().expect("sample failed");
    bus.set_overload(false);
    acq.sample_once().expect("sample failed");

    let summary = acq.finalize_at(&stop_instant()).expect("finalize failed");
    let rows = read_rows(&summary.saved).expect("read back failed");
    assert_eq!(rows[1], vec!["0.003", "-1", "0.003"]);
    assert_eq!(bus.measurement_queries(), 2);
}

#[test]
fn test_interrupt_before_first_sample_saves_empty_trace() {
    let dir = tempfile::tempdir().expect("tempdir");
    let bus = MockLockin::new();
    let acq = Acquisition::new(
        lockin(&bus),
        Recorder::default(),
        CsvTraceWriter::new(dir.path(), DEFAULT_FILE_PREFIX),
        fast(),
    );

    let summary = acq.finalize_at(&stop_instant()).expect("finalize failed");
    assert_eq!(summary.samples, 0);
    let raw = std::fs::read_to_string(&summary.saved).expect("read back failed");
    assert_eq!(raw, "\n\n");
    let rows = read_rows(&summary.saved).expect("read back failed");
    assert!(rows.iter().all(|row| row.is_empty()));
    assert_eq!(bus.measurement_queries(), 0);
}

#[test]
fn test_stop_from_another_thread_finalizes_once() {
    let dir = tempfile::tempdir().expect("tempdir");
    let bus = MockLockin::new();
    let display = Recorder::default();
    let acq = Acquisition::new(
        lockin(&bus),
        display.clone(),
        CsvTraceWriter::new(dir.path(), DEFAULT_FILE_PREFIX),
        fast(),
    );

    let stop = StopSignal::new();
    let worker_stop = stop.clone();
    let worker = thread::spawn(move || acq.run(&worker_stop));
    thread::sleep(Duration::from_millis(50));
    stop.request_stop();

    let summary = worker
        .join()
        .expect("worker panicked")
        .expect("run failed");
    assert!(summary.samples > 0);
    assert_eq!(summary.samples, bus.measurement_queries());
    assert_eq!(*display.finished.lock().unwrap(), Some(summary.samples));

    let rows = read_rows(&summary.saved).expect("read back failed");
    assert_eq!(rows[0].len(), summary.samples);
    assert_eq!(rows[1].len(), summary.samples);
    assert!(summary.saved.starts_with(dir.path()));
}

#[test]
fn test_bus_failure_ends_run_without_saving() {
    let dir = tempfile::tempdir().expect("tempdir");
    let bus = MockLockin::new();
    let mut acq = Acquisition::new(
        lockin(&bus),
        Recorder::default(),
        CsvTraceWriter::new(dir.path(), DEFAULT_FILE_PREFIX),
        fast(),
    );
    acq.sample_once().expect("sample failed");
    bus.go_offline();

    let err = acq.run(&StopSignal::new()).unwrap_err();
    assert!(matches!(err, DaqError::Io(_)));
    let entries = std::fs::read_dir(dir.path()).expect("read_dir").count();
    assert_eq!(entries, 0);
}

#[test]
fn test_display_failures_do_not_stop_acquisition() {
    let dir = tempfile::tempdir().expect("tempdir");
    let bus = MockLockin::new();
    let mut acq = Acquisition::new(
        lockin(&bus),
        Broken,
        CsvTraceWriter::new(dir.path(), DEFAULT_FILE_PREFIX),
        fast(),
    );

    for _ in 0..3 {
        acq.sample_once().expect("sample failed");
    }
    let summary = acq.finalize_at(&stop_instant()).expect("finalize failed");
    assert_eq!(summary.samples, 3);
    assert!(summary.saved.exists());
}
