//! Analysis Layer
//!
//! The recognition state machine and the events it publishes.

pub mod detector;
pub mod events;

pub use detector::{
    DetectionResult, DetectorConfig, DetectorStats, RecognitionLoop, StopHandle, VoteTally,
};
pub use events::{EventBus, Observer};
