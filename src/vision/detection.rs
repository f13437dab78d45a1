//! Match Worker
//!
//! Template matching of card images against a frame. Scores come from
//! zero-mean normalized cross-correlation over all three colour channels,
//! so a score near 1.0 means the frame contains the card's exact rendering.

use image::RgbImage;
use imageproc::template_matching::find_extremes;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

use super::correlation::{correlation_map, PreparedFrame};
use super::error::VisionError;
use super::memory::DetectionMemory;
use super::preprocess;
use super::templates::Template;

/// A card confirmed in the current frame
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    /// Name of the matched template
    pub template_name: String,
    /// Correlation score (0.0 - 1.0)
    pub confidence: f32,
    /// Top-left corner of the best match, in full-resolution frame pixels
    pub location: (u32, u32),
    /// Worker that found the match
    pub worker_id: usize,
}

/// Best-aligned position of a template in a frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchScore {
    pub confidence: f32,
    pub location: (u32, u32),
}

/// Scans one chunk of templates against a frame
pub struct MatchWorker<'a> {
    pub id: usize,
    /// Minimum score for a detection
    threshold: f32,
    /// Scale the frame and templates were reduced by
    scale: f32,
    memory: &'a DetectionMemory,
    correlations: &'a AtomicUsize,
}

impl<'a> MatchWorker<'a> {
    pub fn new(
        id: usize,
        threshold: f32,
        scale: f32,
        memory: &'a DetectionMemory,
        correlations: &'a AtomicUsize,
    ) -> Self {
        Self {
            id,
            threshold,
            scale,
            memory,
            correlations,
        }
    }

    /// Try each template in order, stopping at the first one found.
    ///
    /// A worker reports at most one new card per scan; any other new card in
    /// its chunk is picked up on a following capture tick.
    pub fn scan(&self, frame: &PreparedFrame, templates: &[&Template]) -> Vec<DetectionResult> {
        let mut checked = 0;

        for template in templates {
            if self.memory.contains(&template.name) {
                continue;
            }

            checked += 1;
            self.correlations.fetch_add(1, Ordering::Relaxed);

            let score = match best_match(frame, template.image()) {
                Ok(score) => score,
                Err(e) => {
                    debug!("Worker {}: '{}' not matchable: {}", self.id, template.name, e);
                    continue;
                }
            };

            if score.confidence < self.threshold {
                continue;
            }

            if !self.memory.try_insert(&template.name) {
                continue;
            }

            info!(
                "Worker {}: card detected: {} (confidence: {:.3}) after {} templates",
                self.id, template.name, score.confidence, checked
            );

            return vec![DetectionResult {
                template_name: template.name.clone(),
                confidence: score.confidence,
                location: preprocess::upscale_location(score.location, self.scale),
                worker_id: self.id,
            }];
        }

        debug!("Worker {}: no match among {} templates", self.id, checked);
        Vec::new()
    }
}

/// Find the highest-scoring placement of `template` inside `frame`
pub fn best_match(frame: &PreparedFrame, template: &RgbImage) -> Result<MatchScore, VisionError> {
    let scores = correlation_map(frame, template)?;
    let extremes = find_extremes(&scores);

    Ok(MatchScore {
        confidence: extremes.max_value,
        location: extremes.max_value_location,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn pattern(w: u32, h: u32, seed: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| {
            let v = (x * 37 + y * 91 + seed * 53) ^ (x * y + seed);
            Rgb([(v % 251) as u8, ((v / 3) % 241) as u8, ((v * 7) % 239) as u8])
        })
    }

    fn embed(frame: &mut RgbImage, patch: &RgbImage, at: (u32, u32)) {
        image::imageops::replace(frame, patch, at.0 as i64, at.1 as i64);
    }

    fn best(frame: &RgbImage, template: &RgbImage) -> Result<MatchScore, VisionError> {
        best_match(&PreparedFrame::new(frame), template)
    }

    #[test]
    fn test_exact_match_location() {
        let card = pattern(8, 10, 1);
        let mut frame = RgbImage::from_pixel(40, 30, Rgb([20, 120, 40]));
        embed(&mut frame, &card, (10, 10));

        let score = best(&frame, &card).unwrap();
        assert!(score.confidence > 0.999, "got {}", score.confidence);
        assert_eq!(score.location, (10, 10));
    }

    #[test]
    fn test_different_card_scores_low() {
        let card = pattern(8, 10, 1);
        let other = pattern(8, 10, 9);
        let mut frame = RgbImage::from_pixel(40, 30, Rgb([20, 120, 40]));
        embed(&mut frame, &other, (5, 5));

        let score = best(&frame, &card).unwrap();
        assert!(score.confidence < 0.99, "got {}", score.confidence);
    }

    #[test]
    fn test_brightness_offset_still_matches() {
        let card = pattern(6, 6, 4);
        let brighter = RgbImage::from_fn(6, 6, |x, y| {
            let p = card.get_pixel(x, y).0;
            Rgb([p[0] / 2 + 10, p[1] / 2 + 10, p[2] / 2 + 10])
        });
        let mut frame = RgbImage::new(20, 20);
        embed(&mut frame, &brighter, (3, 7));

        let score = best(&frame, &card).unwrap();
        assert!(score.confidence > 0.99, "got {}", score.confidence);
        assert_eq!(score.location, (3, 7));
    }

    #[test]
    fn test_flat_region_scores_zero() {
        let flat = RgbImage::from_pixel(4, 4, Rgb([9, 9, 9]));
        let frame = RgbImage::from_pixel(10, 10, Rgb([9, 9, 9]));
        let score = best(&frame, &flat).unwrap();
        assert_eq!(score.confidence, 0.0);
    }

    #[test]
    fn test_template_larger_than_frame() {
        let card = pattern(12, 12, 1);
        let frame = RgbImage::new(10, 10);
        assert!(matches!(
            best(&frame, &card),
            Err(VisionError::TemplateTooLarge { .. })
        ));
    }

    #[test]
    fn test_score_is_deterministic() {
        let card = pattern(7, 9, 2);
        let mut frame = pattern(30, 25, 5);
        embed(&mut frame, &card, (12, 4));

        let prepared = PreparedFrame::new(&frame);
        let a = best_match(&prepared, &card).unwrap();
        let b = best_match(&prepared, &card).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, best(&frame, &card).unwrap());
    }

    #[test]
    fn test_worker_stops_after_first_match() {
        let a = Template::new("a", pattern(6, 6, 1));
        let b = Template::new("b", pattern(6, 6, 2));
        let mut frame = RgbImage::from_pixel(30, 12, Rgb([200, 10, 10]));
        embed(&mut frame, a.image(), (1, 1));
        embed(&mut frame, b.image(), (15, 3));
        let frame = PreparedFrame::new(&frame);

        let memory = DetectionMemory::new();
        let counter = AtomicUsize::new(0);
        let worker = MatchWorker::new(3, 0.99, 1.0, &memory, &counter);

        let found = worker.scan(&frame, &[&a, &b]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].template_name, "a");
        assert_eq!(found[0].worker_id, 3);
        assert_eq!(counter.load(Ordering::Relaxed), 1);

        // next tick picks up the second card
        let found = worker.scan(&frame, &[&a, &b]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].template_name, "b");
        assert_eq!(found[0].location, (15, 3));
    }

    #[test]
    fn test_worker_skips_remembered_cards() {
        let a = Template::new("a", pattern(6, 6, 1));
        let mut frame = RgbImage::new(20, 20);
        embed(&mut frame, a.image(), (2, 2));

        let memory = DetectionMemory::new();
        memory.try_insert("a");
        let counter = AtomicUsize::new(0);
        let worker = MatchWorker::new(0, 0.99, 1.0, &memory, &counter);

        assert!(worker.scan(&PreparedFrame::new(&frame), &[&a]).is_empty());
        assert_eq!(counter.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_worker_maps_location_back_to_full_resolution() {
        let a = Template::new("a", pattern(6, 6, 1));
        let mut frame = RgbImage::new(20, 20);
        embed(&mut frame, a.image(), (4, 6));

        let memory = DetectionMemory::new();
        let counter = AtomicUsize::new(0);
        let worker = MatchWorker::new(0, 0.95, 0.5, &memory, &counter);

        let found = worker.scan(&PreparedFrame::new(&frame), &[&a]);
        assert_eq!(found[0].location, (8, 12));
    }
}
