//! Event stream logging

use image::DynamicImage;
use tracing::{debug, trace};

use crate::analysis::{DetectionResult, Observer, VoteTally};
use crate::capture::{CaptureRegion, CapturedFrame};

/// Logs every detector event through `tracing`
#[derive(Debug, Default)]
pub struct LogObserver;

impl Observer for LogObserver {
    fn name(&self) -> &str {
        "log"
    }

    fn detector_started(&mut self) {
        debug!("event: detector_started");
    }

    fn image_captured(&mut self, frame: &CapturedFrame, region: &CaptureRegion) {
        let (width, height) = frame.dimensions();
        trace!(
            "event: image_captured {}x{} region {:?}",
            width,
            height,
            region.rect()
        );
    }

    fn image_processed(&mut self, image: &DynamicImage) {
        trace!("event: image_processed {}x{}", image.width(), image.height());
    }

    fn card_guesses(&mut self, tally: &VoteTally) {
        debug!("event: card_guesses leader={:?}", tally.leader());
    }

    fn card_detected(&mut self, result: &DetectionResult) {
        debug!(
            "event: card_detected {} [{}] in {:.2}s",
            result.card.name,
            result.card.expansion,
            result.elapsed.as_secs_f64()
        );
    }

    fn card_not_found(&mut self, slug: &str) {
        debug!("event: card_not_found {}", slug);
    }

    fn detector_gave_up(&mut self, tally: &VoteTally) {
        debug!("event: detector_gave_up ({} votes dropped)", tally.total());
    }

    fn detector_stopped(&mut self) {
        debug!("event: detector_stopped");
    }
}
