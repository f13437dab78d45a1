//! Human-readable reports of detection results

use crate::vision::DetectionResult;

/// One line per detected card, or a short notice when nothing was found
pub fn detection_summary(detections: &[DetectionResult]) -> String {
    if detections.is_empty() {
        return "No cards detected".to_string();
    }

    let mut summary = format!("{} cards detected:\n", detections.len());
    for card in detections {
        summary.push_str(&format!(
            "- {} (confidence: {:.2}) at ({}, {})\n",
            card.template_name, card.confidence, card.location.0, card.location.1
        ));
    }

    summary
}
