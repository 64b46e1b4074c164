//! Record the SR810 probe voltage until Ctrl-C, then save the trace.
//!
//! ```text
//! sr810_logger --address GPIB0::8::INSTR --interval 0.5
//! sr810_logger --mock --window 50 --no-plot
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lockin_daq::acquisition::{Acquisition, StopSignal};
use lockin_daq::config::Settings;
use lockin_daq::display::{LogDisplay, SvgPlot, TraceDisplay};
use lockin_daq::instrument::{Connector, MockLockin, Sensitivity, Sr810, TimeConstant, VisaConnector};

/// SR810 lock-in probe voltage recorder
#[derive(Parser, Debug)]
#[command(name = "sr810_logger")]
#[command(about = "Poll an SR810 lock-in amplifier and save the voltage trace on Ctrl-C")]
#[command(version)]
struct Args {
    /// Settings file (TOML); defaults to ./sr810.toml when present
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// VISA resource string of the lock-in
    #[arg(long)]
    address: Option<String>,

    /// Seconds between polls
    #[arg(short, long)]
    interval: Option<f64>,

    /// Samples in the live view
    #[arg(short, long)]
    window: Option<usize>,

    /// Directory the day folders are created in
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Prefix of trace files and day folders
    #[arg(long)]
    prefix: Option<String>,

    /// Sensitivity code to apply before recording (0-26)
    #[arg(long)]
    sensitivity: Option<i64>,

    /// Time constant code to apply before recording (0-19)
    #[arg(long)]
    time_constant: Option<i64>,

    /// Excitation amplitude to apply before recording, volts
    #[arg(long)]
    excitation: Option<f64>,

    /// Use the simulated lock-in instead of a VISA bus
    #[arg(long)]
    mock: bool,

    /// Skip the SVG charts
    #[arg(long)]
    no_plot: bool,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    /// Layer the flags over the file and environment settings.
    fn settings(&self) -> Result<Settings> {
        let mut settings =
            Settings::load(self.config.as_deref()).context("Failed to load settings")?;

        if let Some(address) = &self.address {
            settings.address = address.clone();
        }
        if let Some(secs) = self.interval {
            settings.poll_interval = Duration::try_from_secs_f64(secs)
                .with_context(|| format!("Invalid poll interval {secs}"))?;
        }
        if let Some(window) = self.window {
            settings.live_window = window;
        }
        if let Some(dir) = &self.output_dir {
            settings.output_dir = dir.clone();
        }
        if let Some(prefix) = &self.prefix {
            settings.file_prefix = prefix.clone();
        }
        if self.sensitivity.is_some() {
            settings.sensitivity = self.sensitivity;
        }
        if self.time_constant.is_some() {
            settings.time_constant = self.time_constant;
        }
        if self.excitation.is_some() {
            settings.excitation_volts = self.excitation;
        }
        if self.no_plot {
            settings.plot = false;
        }
        if self.verbose {
            settings.log_level = "debug".to_string();
        }

        settings.validate()?;
        Ok(settings)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    let settings = args.settings()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_level)),
        )
        .init();

    if args.mock {
        info!("Using simulated SR810");
        record(MockLockin::new(), settings).await
    } else {
        record(VisaConnector::new(), settings).await
    }
}

async fn record<C>(connector: C, settings: Settings) -> Result<()>
where
    C: Connector + Send + 'static,
    C::Link: Send + 'static,
{
    let mut lockin = Sr810::connect(connector, settings.address.as_str())
        .with_context(|| format!("Failed to connect to SR810 at {}", settings.address))?;
    info!("Connected: {}", lockin.identify()?.trim());
    apply_setup(&mut lockin, &settings)?;

    let acquisition = Acquisition::new(
        lockin,
        displays(&settings),
        settings.writer(),
        settings.acquisition(),
    );

    let stop = StopSignal::new();
    let worker_stop = stop.clone();
    let mut worker = tokio::task::spawn_blocking(move || acquisition.run(&worker_stop));
    info!("Recording; press Ctrl-C to stop and save");

    let outcome = tokio::select! {
        finished = &mut worker => finished,
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            info!("Interrupt received");
            stop.request_stop();
            worker.await
        }
    };

    let summary = outcome.context("Acquisition task panicked")??;
    info!("{} samples recorded in '{}'", summary.samples, summary.saved.display());
    Ok(())
}

/// Push the requested front-panel settings and log what the device reports.
fn apply_setup<C: Connector>(lockin: &mut Sr810<C>, settings: &Settings) -> Result<()> {
    let volts = lockin.excitation_voltage(settings.excitation_volts)?;
    info!("Excitation: {} V", volts);

    let sens = lockin.sensitivity(settings.sensitivity)?;
    match Sensitivity::new(sens) {
        Ok(sens) => info!("Sensitivity: {}", sens),
        Err(_) => warn!("Device reports unknown sensitivity code {}", sens),
    }

    let tc = lockin.time_constant(settings.time_constant)?;
    match TimeConstant::new(tc) {
        Ok(tc) => info!("Time constant: {}", tc),
        Err(_) => warn!("Device reports unknown time constant code {}", tc),
    }
    Ok(())
}

fn displays(settings: &Settings) -> Vec<Box<dyn TraceDisplay + Send>> {
    let mut displays: Vec<Box<dyn TraceDisplay + Send>> = vec![Box::new(LogDisplay)];
    if settings.plot {
        if cfg!(feature = "plot_svg") {
            let live = settings
                .output_dir
                .join(format!("{}_live.svg", settings.file_prefix));
            info!("Live plot: {}", live.display());
            displays.push(Box::new(SvgPlot::new(live)));
        } else {
            warn!("Built without plot_svg; charts disabled");
        }
    }
    displays
}
