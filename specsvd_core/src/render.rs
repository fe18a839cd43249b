//! PNG heatmaps of decibel spectrograms.
//!
//! Frequency grows upward and time to the right. A labelled color scale sits
//! to the right of the chart.

use std::ops::Range;
use std::path::Path;

use plotters::coord::Shift;
use plotters::prelude::*;

use crate::error::{PipelineError, Result};
use crate::spectral::Spectrogram;

pub const WIDTH: u32 = 1000;
pub const HEIGHT: u32 = 600;
const BAR_AREA_WIDTH: u32 = 140;
const FONT: &str = "sans-serif";

/// Upper bound on drawn cells per axis; larger matrices are decimated.
const MAX_CELLS_X: usize = 800;
const MAX_CELLS_Y: usize = 520;

/// Control points of a magma-like colormap, low to high.
const MAGMA: [[u8; 3]; 9] = [
    [0, 0, 4],
    [28, 16, 68],
    [79, 18, 123],
    [129, 37, 129],
    [181, 54, 122],
    [229, 80, 100],
    [251, 135, 97],
    [254, 194, 135],
    [252, 253, 191],
];

/// Axis scaling information for a spectrogram plot.
#[derive(Debug, Clone, Copy)]
pub struct PlotAxes {
    pub sample_rate: u32,
    pub hop_length: usize,
}

impl PlotAxes {
    fn seconds_per_frame(&self) -> f64 {
        self.hop_length as f64 / self.sample_rate.max(1) as f64
    }

    fn hz_per_bin(&self, rows: usize) -> f64 {
        let nyquist = self.sample_rate as f64 / 2.0;
        if rows > 1 {
            nyquist / (rows - 1) as f64
        } else {
            nyquist.max(1.0)
        }
    }
}

/// Render a decibel matrix (rows = frequency bins) to a PNG at `path`.
pub fn render_spectrogram(db: &Spectrogram, axes: PlotAxes, title: &str, path: &Path) -> Result<()> {
    let root = BitMapBackend::new(path, (WIDTH, HEIGHT)).into_drawing_area();
    draw_spectrogram(&root, db, axes, title)
        .and_then(|_| root.present())
        .map_err(|e| PipelineError::Render {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

/// Draw the heatmap and color scale onto `root`.
///
/// Returns the pixel range of the heatmap's plotting area.
pub fn draw_spectrogram<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    db: &Spectrogram,
    axes: PlotAxes,
    title: &str,
) -> std::result::Result<(Range<i32>, Range<i32>), DrawingAreaErrorKind<DB::ErrorType>> {
    root.fill(&WHITE)?;
    let (rows, cols) = db.dim();
    let (lo, hi) = value_range(db);

    let (width, _) = root.dim_in_pixel();
    let (plot_area, bar_area) = root.split_horizontally(width.saturating_sub(BAR_AREA_WIDTH));

    let dt = axes.seconds_per_frame();
    let df = axes.hz_per_bin(rows);
    let x_max = (cols.max(1) as f64 * dt).max(f64::EPSILON);
    let y_max = (rows.max(1) as f64 * df).max(f64::EPSILON);

    let mut chart = ChartBuilder::on(&plot_area)
        .caption(title, (FONT, 22))
        .margin(10)
        .x_label_area_size(45)
        .y_label_area_size(70)
        .build_cartesian_2d(0f64..x_max, 0f64..y_max)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("Time")
        .y_desc("Frequency")
        .x_label_formatter(&|v| format!("{v:.1}"))
        .y_label_formatter(&|v| format!("{v:.0}"))
        .draw()?;

    let row_step = rows.div_ceil(MAX_CELLS_Y).max(1);
    let col_step = cols.div_ceil(MAX_CELLS_X).max(1);
    let cells = (0..rows).step_by(row_step).flat_map(|r| {
        (0..cols).step_by(col_step).map(move |c| {
            let x0 = c as f64 * dt;
            let x1 = (c + col_step).min(cols) as f64 * dt;
            let y0 = r as f64 * df;
            let y1 = (r + row_step).min(rows) as f64 * df;
            let color = colormap(scale(db[[r, c]], lo, hi));
            Rectangle::new([(x0, y0), (x1, y1)], color.filled())
        })
    });
    chart.draw_series(cells)?;
    let plot_pixels = chart.plotting_area().get_pixel_range();

    draw_color_bar(&bar_area, lo, hi)?;
    Ok(plot_pixels)
}

fn draw_color_bar<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    lo: f32,
    hi: f32,
) -> std::result::Result<(), DrawingAreaErrorKind<DB::ErrorType>> {
    let (lo, hi) = if hi > lo {
        (lo as f64, hi as f64)
    } else {
        (lo as f64 - 1.0, lo as f64 + 1.0)
    };
    let mut bar = ChartBuilder::on(area)
        .margin(10)
        .margin_top(45)
        .x_label_area_size(45)
        .y_label_area_size(70)
        .build_cartesian_2d(0f64..1f64, lo..hi)?;

    bar.configure_mesh()
        .disable_mesh()
        .disable_x_axis()
        .x_labels(0)
        .y_desc("Amplitude (dB)")
        .y_label_formatter(&|v| format!("{v:.0}"))
        .draw()?;

    let steps = 128;
    let span = hi - lo;
    bar.draw_series((0..steps).map(|i| {
        let t0 = i as f64 / steps as f64;
        let t1 = (i + 1) as f64 / steps as f64;
        Rectangle::new(
            [(0.0, lo + t0 * span), (1.0, lo + t1 * span)],
            colormap(t0 as f32).filled(),
        )
    }))?;
    Ok(())
}

fn value_range(db: &Spectrogram) -> (f32, f32) {
    let (lo, hi) = db
        .iter()
        .filter(|v| v.is_finite())
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    if lo.is_finite() { (lo, hi) } else { (0.0, 0.0) }
}

fn scale(value: f32, lo: f32, hi: f32) -> f32 {
    if !value.is_finite() || hi <= lo {
        return 0.0;
    }
    ((value - lo) / (hi - lo)).clamp(0.0, 1.0)
}

/// Map `t` in [0, 1] onto the colormap by linear interpolation.
pub fn colormap(t: f32) -> RGBColor {
    let t = t.clamp(0.0, 1.0) * (MAGMA.len() - 1) as f32;
    let i = (t.floor() as usize).min(MAGMA.len() - 2);
    let frac = t - i as f32;
    let (a, b) = (MAGMA[i], MAGMA[i + 1]);
    let mix = |k: usize| (a[k] as f32 + (b[k] as f32 - a[k] as f32) * frac).round() as u8;
    RGBColor(mix(0), mix(1), mix(2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use tempfile::TempDir;

    fn axes() -> PlotAxes {
        PlotAxes {
            sample_rate: 16_000,
            hop_length: 512,
        }
    }

    /// Render into an RGB buffer, returning it with the heatmap pixel range.
    fn render_to_buffer(db: &Spectrogram, title: &str) -> (Vec<u8>, (Range<i32>, Range<i32>)) {
        let mut buf = vec![0u8; (WIDTH * HEIGHT * 3) as usize];
        let ranges = {
            let root = BitMapBackend::with_buffer(&mut buf, (WIDTH, HEIGHT)).into_drawing_area();
            let ranges = draw_spectrogram(&root, db, axes(), title).unwrap();
            root.present().unwrap();
            ranges
        };
        (buf, ranges)
    }

    fn pixel(buf: &[u8], x: i32, y: i32) -> [u8; 3] {
        let i = (y as usize * WIDTH as usize + x as usize) * 3;
        [buf[i], buf[i + 1], buf[i + 2]]
    }

    fn ink_in(buf: &[u8], xs: Range<i32>, ys: Range<i32>) -> usize {
        ys.flat_map(|y| xs.clone().map(move |x| (x, y)))
            .filter(|&(x, y)| pixel(buf, x, y) != [255, 255, 255])
            .count()
    }

    #[test]
    fn colormap_endpoints_match_table() {
        let rgb = |c: RGBColor| [c.0, c.1, c.2];
        assert_eq!(rgb(colormap(0.0)), MAGMA[0]);
        assert_eq!(rgb(colormap(-3.0)), MAGMA[0]);
        assert_eq!(rgb(colormap(1.0)), MAGMA[MAGMA.len() - 1]);
    }

    #[test]
    fn low_frequencies_are_drawn_at_the_bottom() {
        let mut db = Array2::from_elem((4, 3), -80.0_f32);
        db.row_mut(0).fill(0.0);
        let (buf, (xs, ys)) = render_to_buffer(&db, "bands");

        let x = (xs.start + xs.end) / 2;
        let bottom = pixel(&buf, x, ys.end - 3);
        let top = pixel(&buf, x, ys.start + 3);
        let hot = colormap(1.0);
        let cold = colormap(0.0);
        assert_eq!(bottom, [hot.0, hot.1, hot.2]);
        assert_eq!(top, [cold.0, cold.1, cold.2]);
    }

    #[test]
    fn title_axis_and_scale_labels_are_drawn() {
        let db = Array2::from_shape_fn((513, 32), |(r, c)| -((r + c) as f32 % 80.0));
        let (buf, (xs, ys)) = render_to_buffer(&db, "Original Spectrogram: tone.wav");
        let plot_right = (WIDTH - BAR_AREA_WIDTH) as i32;

        let title = ink_in(&buf, xs.clone(), 0..ys.start - 2);
        let y_label = ink_in(&buf, 0..30, ys.clone());
        // Below the tick marks: tick numbers and the axis description.
        let x_label = ink_in(&buf, xs.clone(), ys.end + 12..HEIGHT as i32 - 5);
        let bar_label = ink_in(&buf, plot_right..plot_right + 35, ys.clone());
        assert!(title > 0, "no caption ink");
        assert!(y_label > 0, "no frequency label ink");
        assert!(x_label > 0, "no time label ink");
        assert!(bar_label > 0, "no color scale label ink");
    }

    #[test]
    fn flat_matrix_renders_without_error() {
        let db = Array2::from_elem((513, 32), 0.0_f32);
        let (_, (xs, ys)) = render_to_buffer(&db, "flat");
        assert!(xs.end > xs.start && ys.end > ys.start);
    }

    #[test]
    fn long_matrix_still_fills_the_plot() {
        let db = Array2::from_shape_fn((513, 4000), |(_, c)| -((c % 80) as f32));
        let (buf, (xs, ys)) = render_to_buffer(&db, "long");
        let y = (ys.start + ys.end) / 2;
        assert_ne!(pixel(&buf, xs.end - 3, y), [255, 255, 255]);
    }

    #[test]
    fn writes_png_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plot.png");
        let db = Array2::from_shape_fn((33, 10), |(r, c)| -((r + c) as f32));
        render_spectrogram(&db, axes(), "Filtered Spectrogram (After SVD): x.wav", &path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
    }
}
