//! Frame Change Filter
//!
//! Skips scanning when the watched region looks the same as the last frame
//! that produced no detections.

use image::RgbImage;
use tracing::debug;

/// Remembers the last no-detection frame and compares new frames against it
#[derive(Debug)]
pub struct ChangeFilter {
    /// Mean absolute channel difference (0-255 scale) below which a frame counts as unchanged
    threshold: f64,
    previous: Option<RgbImage>,
}

impl ChangeFilter {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            previous: None,
        }
    }

    /// Decide whether `current` differs enough from the remembered frame to scan
    pub fn should_scan(&self, current: &RgbImage) -> bool {
        let Some(previous) = &self.previous else {
            return true;
        };

        match mean_abs_diff(previous, current) {
            Some(diff) if diff < self.threshold => {
                debug!("Frame unchanged (mean diff {:.2}), skipping scan", diff);
                false
            }
            Some(_) => true,
            None => {
                debug!(
                    "Frame size changed {:?} -> {:?}, scanning",
                    previous.dimensions(),
                    current.dimensions()
                );
                true
            }
        }
    }

    /// Keep `frame` as the reference for later comparisons
    pub fn remember(&mut self, frame: &RgbImage) {
        self.previous = Some(frame.clone());
    }

    /// Forget the reference frame
    pub fn clear(&mut self) {
        self.previous = None;
    }
}

/// Mean absolute per-channel difference, or `None` when dimensions differ
pub fn mean_abs_diff(a: &RgbImage, b: &RgbImage) -> Option<f64> {
    if a.dimensions() != b.dimensions() {
        return None;
    }

    let raw_a = a.as_raw();
    let raw_b = b.as_raw();
    if raw_a.is_empty() {
        return Some(0.0);
    }

    let total: u64 = raw_a
        .iter()
        .zip(raw_b.iter())
        .map(|(&x, &y)| x.abs_diff(y) as u64)
        .sum();

    Some(total as f64 / raw_a.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn solid(w: u32, h: u32, v: u8) -> RgbImage {
        RgbImage::from_pixel(w, h, Rgb([v, v, v]))
    }

    #[test]
    fn test_mean_abs_diff_values() {
        assert_eq!(mean_abs_diff(&solid(4, 4, 10), &solid(4, 4, 10)), Some(0.0));
        assert_eq!(mean_abs_diff(&solid(4, 4, 10), &solid(4, 4, 30)), Some(20.0));
        assert_eq!(mean_abs_diff(&solid(4, 4, 30), &solid(4, 4, 10)), Some(20.0));
        assert_eq!(mean_abs_diff(&solid(4, 4, 0), &solid(5, 4, 0)), None);
    }

    #[test]
    fn test_first_frame_always_scanned() {
        let filter = ChangeFilter::new(5.0);
        assert!(filter.should_scan(&solid(4, 4, 0)));
    }

    #[test]
    fn test_identical_frame_skipped() {
        let mut filter = ChangeFilter::new(5.0);
        filter.remember(&solid(4, 4, 100));
        assert!(!filter.should_scan(&solid(4, 4, 100)));
        assert!(!filter.should_scan(&solid(4, 4, 104)));
        assert!(filter.should_scan(&solid(4, 4, 105)));
    }

    #[test]
    fn test_resized_frame_forces_scan() {
        let mut filter = ChangeFilter::new(5.0);
        filter.remember(&solid(4, 4, 100));
        assert!(filter.should_scan(&solid(8, 4, 100)));
    }

    #[test]
    fn test_clear_forgets_previous() {
        let mut filter = ChangeFilter::new(5.0);
        filter.remember(&solid(4, 4, 100));
        assert!(!filter.should_scan(&solid(4, 4, 100)));
        filter.clear();
        assert!(filter.should_scan(&solid(4, 4, 100)));
    }
}
