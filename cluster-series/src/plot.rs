use anyhow::{Result, bail};
use itertools::{Itertools, izip};
use lammps_precipitate_util::{Column, LinearFit, TimeSeries, error_bar_stride, to_days};
use log::{info, warn};
use plotters::coord::Shift;
use plotters::prelude::*;
use std::ops::Range;
use std::path::Path;

const PLOT_WIDTH: u32 = 1000;
const PLOT_HEIGHT: u32 = 900;
const MEAN_COLOR: RGBColor = RGBColor(70, 130, 180);
const COUNT_COLOR: RGBColor = RGBColor(255, 69, 0);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backend {
    Svg,
    Png,
}

impl Backend {
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        match extension.as_str() {
            "svg" => Ok(Self::Svg),
            "png" => Ok(Self::Png),
            _ => bail!(
                "Unsupported plot format for {}, use .svg or .png",
                path.to_string_lossy()
            ),
        }
    }
}

/// Values prepared for drawing. Each panel and the regression filter the
/// series with their own mask, so a frame without precipitates still shows
/// up as a zero count.
pub struct PlotData {
    /// Frames with finite time, mean and std.
    pub mean_days: Vec<f64>,
    pub means: Vec<f64>,
    pub stds: Vec<f64>,
    /// Frames with finite time and count.
    pub count_days: Vec<f64>,
    pub counts: Vec<f64>,
    /// Maps days to dose, `None` when the regression is unusable.
    pub dose_fit: Option<LinearFit>,
    pub stride: usize,
}

impl PlotData {
    pub fn new(series: &TimeSeries, num_error_bars: usize) -> Result<Self> {
        let [count_times, counts] = series.filtered([Column::Time, Column::NumClusters]);
        if counts.is_empty() {
            bail!("No valid frames to plot");
        }
        let [mean_times, means, stds] =
            series.filtered([Column::Time, Column::MeanClusterSize, Column::StdClusterSize]);
        if means.is_empty() {
            warn!("No frame has a cluster of the minimum size");
        }
        let [fit_times, doses] = series.filtered([Column::Time, Column::Dose]);
        let dose_fit =
            LinearFit::fit(&to_days(&fit_times), &doses).filter(|fit| !fit.is_flat() && fit.slope > 0.0);
        match dose_fit {
            Some(fit) => info!(
                "dose = {:.6e} + {:.6e} * t[days], r = {:.4}",
                fit.intercept, fit.slope, fit.r_value
            ),
            None => warn!("Dose does not increase with time, the dose axis is omitted"),
        }
        Ok(Self {
            stride: error_bar_stride(means.len(), num_error_bars),
            mean_days: to_days(&mean_times),
            means,
            stds,
            count_days: to_days(&count_times),
            counts,
            dose_fit,
        })
    }

    fn day_range(&self) -> Range<f64> {
        padded_range(self.mean_days.iter().chain(&self.count_days).copied(), 0.0)
    }

    fn mean_range(&self) -> Range<f64> {
        let bounds = izip!(&self.means, &self.stds).flat_map(|(m, s)| [m - s, m + s]);
        padded_range(bounds, 0.05)
    }

    fn count_range(&self) -> Range<f64> {
        let top = padded_range(self.counts.iter().copied(), 0.05).end;
        0.0..top.max(1.0)
    }
}

/// Smallest range holding all `values`, widened by `margin` of its length on
/// both sides. A single value gets a unit-wide range around it.
pub fn padded_range(values: impl IntoIterator<Item = f64>, margin: f64) -> Range<f64> {
    let (lo, hi) = values
        .into_iter()
        .minmax_by(|a, b| a.total_cmp(b))
        .into_option()
        .unwrap_or((0.0, 1.0));
    let width = hi - lo;
    if width <= f64::EPSILON * hi.abs().max(1.0) {
        return lo - 0.5..hi + 0.5;
    }
    lo - margin * width..hi + margin * width
}

pub fn plot(data: &PlotData, path: &Path) -> Result<()> {
    match Backend::from_path(path)? {
        Backend::Svg => {
            let root = SVGBackend::new(path, (PLOT_WIDTH, PLOT_HEIGHT)).into_drawing_area();
            draw(&root, data)?;
            root.present()?;
        }
        Backend::Png => {
            let root = BitMapBackend::new(path, (PLOT_WIDTH, PLOT_HEIGHT)).into_drawing_area();
            draw(&root, data)?;
            root.present()?;
        }
    }
    info!("Plot saved to {}", path.to_string_lossy());
    Ok(())
}

fn draw<DB>(root: &DrawingArea<DB, Shift>, data: &PlotData) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    root.fill(&WHITE)?;
    let panels = root.split_evenly((2, 1));
    let x_range = data.day_range();

    let mut chart = ChartBuilder::on(&panels[0])
        .margin(10)
        .x_label_area_size(30)
        .top_x_label_area_size(if data.dose_fit.is_some() { 40 } else { 0 })
        .y_label_area_size(70)
        .build_cartesian_2d(x_range.clone(), data.mean_range())?
        .set_secondary_coord(dose_range(data.dose_fit, &x_range), data.mean_range());
    chart
        .configure_mesh()
        .x_desc("time (days)")
        .y_desc("mean cluster size (atoms)")
        .draw()?;
    if data.dose_fit.is_some() {
        chart
            .configure_secondary_axes()
            .x_desc("dose (dpa)")
            .draw()?;
    }
    chart.draw_series(LineSeries::new(
        izip!(&data.mean_days, &data.means).map(|(x, y)| (*x, *y)),
        MEAN_COLOR.stroke_width(2),
    ))?;
    chart.draw_series(
        izip!(&data.mean_days, &data.means, &data.stds)
            .step_by(data.stride)
            .map(|(x, m, s)| ErrorBar::new_vertical(*x, m - s, *m, m + s, MEAN_COLOR.filled(), 8)),
    )?;

    let mut chart = ChartBuilder::on(&panels[1])
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(70)
        .build_cartesian_2d(x_range, data.count_range())?;
    chart
        .configure_mesh()
        .x_desc("time (days)")
        .y_desc("number of clusters")
        .draw()?;
    chart.draw_series(LineSeries::new(
        izip!(&data.count_days, &data.counts).map(|(x, y)| (*x, *y)),
        COUNT_COLOR.stroke_width(2),
    ))?;
    Ok(())
}

/// Dose axis aligned with the time axis. Without a fit the time range is
/// reused and the axis is not drawn.
fn dose_range(fit: Option<LinearFit>, days: &Range<f64>) -> Range<f64> {
    match fit {
        Some(fit) => fit.forward(days.start)..fit.forward(days.end),
        None => days.clone(),
    }
}
