//! Detector lifecycle events
//!
//! The recognition loop publishes [`DetectorEvent`]s through an [`EventBus`],
//! which hands each one to every registered [`Observer`] in order.

use image::DynamicImage;
use tracing::{info, trace};

use super::detector::{DetectionResult, VoteTally};
use crate::capture::{CaptureRegion, CapturedFrame};

/// A lifecycle event with its payload
#[derive(Debug, Clone, Copy)]
pub enum DetectorEvent<'a> {
    /// The loop is about to wait for its first frame
    Started,
    /// A frame was taken off the queue
    ImageCaptured {
        frame: &'a CapturedFrame,
        region: &'a CaptureRegion,
    },
    /// The processing chain produced the OCR input
    ImageProcessed(&'a DynamicImage),
    /// A vote was counted
    CardGuesses(&'a VoteTally),
    /// A slug reached the vote threshold and resolved to a card
    CardDetected(&'a DetectionResult),
    /// A slug reached the vote threshold but is not in the catalog
    CardNotFound(&'a str),
    /// Nothing was detected within the wait limit; carries the discarded votes
    GaveUp(&'a VoteTally),
    /// The loop has exited
    Stopped,
}

impl DetectorEvent<'_> {
    /// Stable event name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Started => "detector_started",
            Self::ImageCaptured { .. } => "image_captured",
            Self::ImageProcessed(_) => "image_processed",
            Self::CardGuesses(_) => "card_guesses",
            Self::CardDetected(_) => "card_detected",
            Self::CardNotFound(_) => "card_not_found",
            Self::GaveUp(_) => "detector_gave_up",
            Self::Stopped => "detector_stopped",
        }
    }
}

/// Receiver of detector events.
///
/// Every handler defaults to a no-op, so an observer only implements the
/// events it cares about. Handlers run on the recognition thread and must
/// return quickly.
pub trait Observer {
    /// Name used in logs
    fn name(&self) -> &str;

    fn detector_started(&mut self) {}

    fn image_captured(&mut self, _frame: &CapturedFrame, _region: &CaptureRegion) {}

    fn image_processed(&mut self, _image: &DynamicImage) {}

    fn card_guesses(&mut self, _tally: &VoteTally) {}

    fn card_detected(&mut self, _result: &DetectionResult) {}

    fn card_not_found(&mut self, _slug: &str) {}

    fn detector_gave_up(&mut self, _tally: &VoteTally) {}

    fn detector_stopped(&mut self) {}
}

/// Ordered fan-out to observers
#[derive(Default)]
pub struct EventBus {
    observers: Vec<Box<dyn Observer>>,
}

impl EventBus {
    /// Observers are notified in the order given here
    pub fn new(observers: Vec<Box<dyn Observer>>) -> Self {
        let bus = Self { observers };
        info!("Registered observers: {}", bus.observer_names().join(", "));
        bus
    }

    /// Dispatch `event` synchronously to every observer
    pub fn send(&mut self, event: DetectorEvent<'_>) {
        trace!(
            "Dispatching {} to {} observers",
            event.name(),
            self.observers.len()
        );

        for observer in &mut self.observers {
            match event {
                DetectorEvent::Started => observer.detector_started(),
                DetectorEvent::ImageCaptured { frame, region } => {
                    observer.image_captured(frame, region)
                }
                DetectorEvent::ImageProcessed(image) => observer.image_processed(image),
                DetectorEvent::CardGuesses(tally) => observer.card_guesses(tally),
                DetectorEvent::CardDetected(result) => observer.card_detected(result),
                DetectorEvent::CardNotFound(slug) => observer.card_not_found(slug),
                DetectorEvent::GaveUp(tally) => observer.detector_gave_up(tally),
                DetectorEvent::Stopped => observer.detector_stopped(),
            }
        }
    }

    /// Names of the registered observers, in dispatch order
    pub fn observer_names(&self) -> Vec<&str> {
        self.observers.iter().map(|o| o.name()).collect()
    }
}
