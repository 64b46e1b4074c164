//! Display sinks for the live and final trace views.
//!
//! The acquisition loop refreshes its display once per cycle with the
//! current window of samples, and once more after the trace has been saved.
//! Displays are pure sinks: the loop logs their failures and carries on.
//!
//! - [`LogDisplay`] - one log line per cycle, always available
//! - [`SvgPlot`] - "Voltage vs Time" SVG charts (feature `plot_svg`); the
//!   live chart is rewritten in place so any auto-reloading viewer follows it

use std::path::Path;

use tracing::{info, warn};

use crate::data::{Sample, Trace};
use crate::error::{DaqError, DaqResult};

/// A sink for rendered views of the trace.
pub trait TraceDisplay {
    /// Show the current window of recent samples.
    fn refresh(&mut self, window: &[Sample]) -> DaqResult<()>;

    /// Show the complete trace after it was saved to `saved`.
    fn finish(&mut self, trace: &Trace, saved: &Path) -> DaqResult<()>;
}

impl<D: TraceDisplay + ?Sized> TraceDisplay for Box<D> {
    fn refresh(&mut self, window: &[Sample]) -> DaqResult<()> {
        (**self).refresh(window)
    }

    fn finish(&mut self, trace: &Trace, saved: &Path) -> DaqResult<()> {
        (**self).finish(trace, saved)
    }
}

/// Fan-out to several displays. Every display is driven even if an earlier
/// one fails; the first failure is returned.
impl<D: TraceDisplay> TraceDisplay for Vec<D> {
    fn refresh(&mut self, window: &[Sample]) -> DaqResult<()> {
        let mut first_err = None;
        for display in self.iter_mut() {
            if let Err(e) = display.refresh(window) {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    fn finish(&mut self, trace: &Trace, saved: &Path) -> DaqResult<()> {
        let mut first_err = None;
        for display in self.iter_mut() {
            if let Err(e) = display.finish(trace, saved) {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

/// Reports each refresh as a log line.
#[derive(Debug, Default)]
pub struct LogDisplay;

impl TraceDisplay for LogDisplay {
    fn refresh(&mut self, window: &[Sample]) -> DaqResult<()> {
        let Some(latest) = window.last() else {
            return Ok(());
        };
        if latest.volts == crate::instrument::OVERLOAD_SENTINEL {
            warn!("{}  input overload", latest.timestamp);
            return Ok(());
        }
        let (lo, hi) = window_bounds(window);
        info!(
            "{}  {:.6e} V  (last {}: {:.3e} .. {:.3e})",
            latest.timestamp,
            latest.volts,
            window.len(),
            lo,
            hi
        );
        Ok(())
    }

    fn finish(&mut self, trace: &Trace, saved: &Path) -> DaqResult<()> {
        info!("Recorded {} samples into '{}'", trace.len(), saved.display());
        Ok(())
    }
}

/// Lowest and highest voltage in `samples`.
fn window_bounds(samples: &[Sample]) -> (f64, f64) {
    samples
        .iter()
        .map(|s| s.volts)
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        })
}

#[cfg_attr(not(feature = "plot_svg"), allow(dead_code))]
/// Padded y-range so a flat or single-point trace still gets a visible axis.
fn y_range(samples: &[Sample]) -> (f64, f64) {
    let (lo, hi) = window_bounds(samples);
    if !lo.is_finite() || !hi.is_finite() {
        return (-1.0, 1.0);
    }
    let pad = if hi > lo {
        (hi - lo) * 0.05
    } else {
        lo.abs().max(1e-6) * 0.1
    };
    (lo - pad, hi + pad)
}

#[cfg_attr(not(feature = "plot_svg"), allow(dead_code))]
fn plot_err<E: std::fmt::Display>(err: E) -> DaqError {
    DaqError::Plot(err.to_string())
}

#[cfg(feature = "plot_svg")]
mod svg {
    use super::*;
    use plotters::prelude::*;
    use std::path::PathBuf;

    const SIZE: (u32, u32) = (800, 500);

    /// Renders "Voltage vs Time" charts with plotters.
    #[derive(Debug, Clone)]
    pub struct SvgPlot {
        live_path: PathBuf,
    }

    impl SvgPlot {
        /// Plot whose live view is written to `live_path`.
        pub fn new(live_path: impl Into<PathBuf>) -> Self {
            Self {
                live_path: live_path.into(),
            }
        }

        /// Where the live chart is written.
        pub fn live_path(&self) -> &Path {
            &self.live_path
        }
    }

    impl TraceDisplay for SvgPlot {
        fn refresh(&mut self, window: &[Sample]) -> DaqResult<()> {
            // Timestamps as tick labels; only a short window keeps them legible.
            let label = |x: &f64| {
                let i = x.round();
                if i >= 0.0 && (i as usize) < window.len() {
                    window[i as usize].timestamp.clone()
                } else {
                    String::new()
                }
            };
            render(&self.live_path, window, "Time", &label)
        }

        fn finish(&mut self, trace: &Trace, saved: &Path) -> DaqResult<()> {
            let path = saved.with_extension("svg");
            render(&path, trace.samples(), "Sample", &|x: &f64| format!("{x:.0}"))?;
            info!("Final plot written to '{}'", path.display());
            Ok(())
        }
    }

    fn render(
        path: &Path,
        samples: &[Sample],
        x_desc: &str,
        x_label: &dyn Fn(&f64) -> String,
    ) -> DaqResult<()> {
        let root = SVGBackend::new(path, SIZE).into_drawing_area();
        root.fill(&WHITE).map_err(plot_err)?;

        let x_max = samples.len().saturating_sub(1).max(1) as f64;
        let (y_min, y_max) = y_range(samples);

        let mut chart = ChartBuilder::on(&root)
            .caption("Voltage vs Time", ("sans-serif", 24).into_font())
            .margin(10)
            .x_label_area_size(60)
            .y_label_area_size(80)
            .build_cartesian_2d(0f64..x_max, y_min..y_max)
            .map_err(plot_err)?;

        chart
            .configure_mesh()
            .x_desc(x_desc)
            .y_desc("Volts")
            .x_label_formatter(x_label)
            .draw()
            .map_err(plot_err)?;

        chart
            .draw_series(LineSeries::new(
                samples.iter().enumerate().map(|(i, s)| (i as f64, s.volts)),
                &BLUE,
            ))
            .map_err(plot_err)?;

        root.present().map_err(plot_err)?;
        Ok(())
    }
}

#[cfg(feature = "plot_svg")]
pub use svg::SvgPlot;

#[cfg(not(feature = "plot_svg"))]
mod svg_disabled {
    use super::*;
    use std::path::PathBuf;

    /// Placeholder; every render reports the missing feature.
    #[derive(Debug, Clone)]
    pub struct SvgPlot {
        live_path: PathBuf,
    }

    impl SvgPlot {
        /// Plot whose live view would be written to `live_path`.
        pub fn new(live_path: impl Into<PathBuf>) -> Self {
            Self {
                live_path: live_path.into(),
            }
        }

        /// Where the live chart would be written.
        pub fn live_path(&self) -> &Path {
            &self.live_path
        }
    }

    impl TraceDisplay for SvgPlot {
        fn refresh(&mut self, _window: &[Sample]) -> DaqResult<()> {
            Err(DaqError::FeatureNotEnabled("plot_svg".to_string()))
        }

        fn finish(&mut self, _trace: &Trace, _saved: &Path) -> DaqResult<()> {
            Err(DaqError::FeatureNotEnabled("plot_svg".to_string()))
        }
    }
}

#[cfg(not(feature = "plot_svg"))]
pub use svg_disabled::SvgPlot;

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing;

    impl TraceDisplay for Failing {
        fn refresh(&mut self, _window: &[Sample]) -> DaqResult<()> {
            Err(DaqError::Plot("no surface".into()))
        }

        fn finish(&mut self, _trace: &Trace, _saved: &Path) -> DaqResult<()> {
            Err(DaqError::Plot("no surface".into()))
        }
    }

    #[test]
    fn y_range_pads_flat_traces() {
        let flat = [Sample::new("00:00:00", 0.5), Sample::new("00:00:01", 0.5)];
        let (lo, hi) = y_range(&flat);
        assert!(lo < 0.5 && hi > 0.5);
        assert_eq!(y_range(&[]), (-1.0, 1.0));
    }

    #[test]
    fn fan_out_drives_every_display() {
        let mut displays: Vec<Box<dyn TraceDisplay>> = vec![Box::new(Failing), Box::new(LogDisplay)];
        let window = [Sample::new("00:00:00", 1e-3)];
        assert!(matches!(displays.refresh(&window), Err(DaqError::Plot(_))));
        assert!(LogDisplay.refresh(&[]).is_ok());
    }

    #[cfg(feature = "plot_svg")]
    #[test]
    fn svg_plot_writes_live_and_final_charts() -> DaqResult<()> {
        let dir = tempfile::tempdir()?;
        let mut plot = SvgPlot::new(dir.path().join("live.svg"));
        let trace: Trace = (0..30)
            .map(|i| Sample::new(format!("10:00:{:02}", i), if i == 7 { -1.0 } else { f64::from(i) * 1e-4 }))
            .collect();

        plot.refresh(trace.window(20))?;
        assert!(std::fs::read_to_string(plot.live_path())?.contains("<svg"));

        let saved = dir.path().join("LaserV_2024_03_09_14.02.51.csv");
        plot.finish(&trace, &saved)?;
        assert!(dir.path().join("LaserV_2024_03_09_14.02.51.svg").exists());
        Ok(())
    }
}
