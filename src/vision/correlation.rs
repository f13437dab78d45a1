//! Colour Template Correlation
//!
//! Zero-mean normalized cross-correlation of an RGB template against every
//! placement in a frame, computed in the frequency domain.
//!
//! The frame's channels stay interleaved: the grid is `3 * width` columns by
//! `height` rows, so a horizontal shift of `3 * x` lines each template channel
//! up with the same frame channel and a single 2-D transform covers all three.
//! The per-window energy used for normalization comes from integral images,
//! one lookup per placement.

use image::{ImageBuffer, Luma, Rgb, RgbImage};
use imageproc::integral_image::{integral_image, integral_squared_image};
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

use super::error::VisionError;

/// One correlation score per template placement, indexed by its top-left corner
pub type ScoreMap = ImageBuffer<Luma<f32>, Vec<f32>>;

type Integral = ImageBuffer<Rgb<u64>, Vec<u64>>;

/// Row and column transforms for one grid size
struct GridFft {
    cols: usize,
    rows: usize,
    row_forward: Arc<dyn Fft<f64>>,
    row_inverse: Arc<dyn Fft<f64>>,
    col_forward: Arc<dyn Fft<f64>>,
    col_inverse: Arc<dyn Fft<f64>>,
}

impl GridFft {
    fn new(cols: usize, rows: usize) -> Self {
        let mut planner = FftPlanner::<f64>::new();
        Self {
            cols,
            rows,
            row_forward: planner.plan_fft_forward(cols),
            row_inverse: planner.plan_fft_inverse(cols),
            col_forward: planner.plan_fft_forward(rows),
            col_inverse: planner.plan_fft_inverse(rows),
        }
    }

    fn forward(&self, grid: &mut [Complex<f64>]) {
        self.transform(grid, &self.row_forward, &self.col_forward);
    }

    /// Unnormalized: results are scaled by `cols * rows`
    fn inverse(&self, grid: &mut [Complex<f64>]) {
        self.transform(grid, &self.row_inverse, &self.col_inverse);
    }

    fn transform(
        &self,
        grid: &mut [Complex<f64>],
        along_rows: &Arc<dyn Fft<f64>>,
        along_cols: &Arc<dyn Fft<f64>>,
    ) {
        // buffer holds `rows` back-to-back rows; process runs one FFT per row
        along_rows.process(grid);

        let mut columns = transpose(grid, self.cols, self.rows);
        along_cols.process(&mut columns);

        let restored = transpose(&columns, self.rows, self.cols);
        grid.copy_from_slice(&restored);
    }
}

/// Row-major `width` x `height` grid to its column-major layout
fn transpose(grid: &[Complex<f64>], width: usize, height: usize) -> Vec<Complex<f64>> {
    let mut out = vec![Complex::new(0.0, 0.0); grid.len()];
    for y in 0..height {
        for x in 0..width {
            out[x * height + y] = grid[y * width + x];
        }
    }
    out
}

/// A frame transformed once and shared by every template of a scan
pub struct PreparedFrame {
    width: u32,
    height: u32,
    fft: GridFft,
    spectrum: Vec<Complex<f64>>,
    integral: Integral,
    integral_squared: Integral,
}

impl PreparedFrame {
    /// `frame` must have at least one pixel
    pub fn new(frame: &RgbImage) -> Self {
        let (width, height) = frame.dimensions();
        let fft = GridFft::new(width as usize * 3, height as usize);

        let mut spectrum: Vec<Complex<f64>> = frame
            .as_raw()
            .iter()
            .map(|&v| Complex::new(v as f64, 0.0))
            .collect();
        fft.forward(&mut spectrum);

        Self {
            width,
            height,
            fft,
            spectrum,
            integral: integral_image::<_, u64>(frame),
            integral_squared: integral_squared_image::<_, u64>(frame),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Sum over channels of the squared deviation from the window mean
    fn window_energy(&self, x: u32, y: u32, w: u32, h: u32) -> f64 {
        let count = w as u128 * h as u128;
        let sums = window_sum(&self.integral, x, y, w, h);
        let squares = window_sum(&self.integral_squared, x, y, w, h);

        (0..3)
            .map(|c| {
                let s = sums[c] as u128;
                // n * sum(v^2) >= sum(v)^2, exact in integers
                let spread = count * squares[c] as u128 - s * s;
                spread as f64 / count as f64
            })
            .sum()
    }
}

/// Per-channel sum over the `w` x `h` window at (x, y)
fn window_sum(integral: &Integral, x: u32, y: u32, w: u32, h: u32) -> [u64; 3] {
    let bottom_right = integral.get_pixel(x + w, y + h).0;
    let bottom_left = integral.get_pixel(x, y + h).0;
    let top_right = integral.get_pixel(x + w, y).0;
    let top_left = integral.get_pixel(x, y).0;

    [0, 1, 2].map(|c| bottom_right[c] + top_left[c] - bottom_left[c] - top_right[c])
}

/// Template values with each channel's mean removed, plus their total energy
struct CenteredTemplate {
    values: Vec<f64>,
    energy: f64,
}

impl CenteredTemplate {
    fn new(template: &RgbImage) -> Self {
        let raw = template.as_raw();
        let count = (template.width() * template.height()) as f64;

        let mut means = [0.0f64; 3];
        for px in raw.chunks_exact(3) {
            for c in 0..3 {
                means[c] += px[c] as f64;
            }
        }
        for mean in &mut means {
            *mean /= count;
        }

        let values: Vec<f64> = raw
            .chunks_exact(3)
            .flat_map(|px| (0..3).map(move |c| px[c] as f64 - means[c]))
            .collect();
        let energy = values.iter().map(|v| v * v).sum();

        Self { values, energy }
    }
}

/// Score every placement of `template` in the prepared frame
pub fn correlation_map(frame: &PreparedFrame, template: &RgbImage) -> Result<ScoreMap, VisionError> {
    let (img_w, img_h) = frame.dimensions();
    let (tmpl_w, tmpl_h) = template.dimensions();

    if tmpl_w == 0 || tmpl_h == 0 || tmpl_w > img_w || tmpl_h > img_h {
        return Err(VisionError::TemplateTooLarge {
            template: (tmpl_w, tmpl_h),
            frame: (img_w, img_h),
        });
    }

    let centered = CenteredTemplate::new(template);
    let cols = frame.fft.cols;

    let mut grid = vec![Complex::new(0.0, 0.0); frame.spectrum.len()];
    for (ty, row) in centered.values.chunks_exact(tmpl_w as usize * 3).enumerate() {
        for (i, &v) in row.iter().enumerate() {
            grid[ty * cols + i] = Complex::new(v, 0.0);
        }
    }

    frame.fft.forward(&mut grid);
    for (g, f) in grid.iter_mut().zip(&frame.spectrum) {
        *g = *f * g.conj();
    }
    frame.fft.inverse(&mut grid);

    let norm = 1.0 / grid.len() as f64;
    let out_w = img_w - tmpl_w + 1;
    let out_h = img_h - tmpl_h + 1;

    Ok(ImageBuffer::from_fn(out_w, out_h, |x, y| {
        let cross = grid[y as usize * cols + x as usize * 3].re * norm;
        let energy = frame.window_energy(x, y, tmpl_w, tmpl_h);
        Luma([normalize(cross, energy, centered.energy)])
    }))
}

/// Flat windows or templates score 0 rather than dividing by ~0
fn normalize(cross: f64, window_energy: f64, template_energy: f64) -> f32 {
    let denominator = (window_energy * template_energy).sqrt();
    if denominator < 1e-10 {
        return 0.0;
    }

    (cross / denominator).clamp(0.0, 1.0) as f32
}
