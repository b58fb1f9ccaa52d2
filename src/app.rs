//! Application Coordinator
//!
//! Builds the capture thread and the recognition loop from the configuration
//! and runs them until the scan is stopped.

use anyhow::{bail, Context, Result};
use tracing::info;

use crate::analysis::{DetectorStats, EventBus, Observer, RecognitionLoop, StopHandle};
use crate::capture::{open_camera, CaptureRegion, FrameConsumer, FrameQueue, FrameSource};
use crate::config::AppConfig;
use crate::storage::SqliteCatalog;
use crate::vision::{create_extractor, Dictionary, ProcessingChain, StepRegistry, TextExtractor};

/// Main application coordinator
pub struct ScannerApp {
    source: FrameSource,
    frames: FrameConsumer,
    detector: RecognitionLoop,
}

impl ScannerApp {
    /// Set up every component; any failure here is fatal
    pub fn new(config: &AppConfig, observers: Vec<Box<dyn Observer>>) -> Result<Self> {
        let extractor = create_extractor(config.ocr.backend, &config.ocr.language, config.ocr.psm)
            .context("Failed to initialize OCR")?;
        Self::with_extractor(config, extractor, observers)
    }

    /// Like [`ScannerApp::new`] with an already created OCR backend
    pub fn with_extractor(
        config: &AppConfig,
        extractor: Box<dyn TextExtractor>,
        observers: Vec<Box<dyn Observer>>,
    ) -> Result<Self> {
        let detector_config = config.detector.to_detector_config()?;
        // The matcher must be able to return more than `max_guesses` candidates
        let match_settings = config.dictionary.match_settings();
        if match_settings.limit <= detector_config.max_guesses {
            bail!(
                "dictionary.limit ({}) must be greater than detector.max_guesses ({})",
                match_settings.limit,
                detector_config.max_guesses
            );
        }

        let catalog_path = config.catalog.resolved_path()?;
        let catalog = SqliteCatalog::open(&catalog_path, &config.catalog.expansions)
            .context("Failed to open card database")?;
        if catalog.is_empty() {
            bail!(
                "No cards in {:?}, run `card-scanner import <cards.json>` first",
                catalog_path
            );
        }

        let dictionary_path = config.dictionary.resolved_path()?;
        if !dictionary_path.exists() {
            info!("No dictionary at {:?}, generating it", dictionary_path);
            catalog
                .write_dictionary(&dictionary_path)
                .context("Failed to generate dictionary")?;
        }
        let dictionary = Dictionary::load(&dictionary_path, match_settings)
            .context("Failed to load dictionary")?;

        let capture = config.camera.to_capture_config();
        let camera = open_camera(&capture).context("Failed to open camera")?;
        let (producer, frames) = FrameQueue::bounded(capture.queue_capacity);
        let source = FrameSource::new(camera, producer).context("Failed to start camera")?;

        let region = CaptureRegion::centered(
            source.frame_size(),
            config.region.width,
            config.region.height,
            config.region.top,
            config.region.steps.clone(),
        );
        let chain = ProcessingChain::new(&StepRegistry::with_builtin_steps(), region)
            .context("Invalid capture region")?;
        info!(
            "Reading region {:?} with steps [{}]",
            chain.region().rect(),
            chain.step_names().join(", ")
        );

        let detector = RecognitionLoop::new(
            detector_config,
            chain,
            extractor,
            Box::new(dictionary),
            Box::new(catalog),
            EventBus::new(observers),
        );

        Ok(Self {
            source,
            frames,
            detector,
        })
    }

    /// Handle for stopping the scan from another thread
    pub fn stop_handle(&self) -> StopHandle {
        self.detector.stop_handle()
    }

    /// Capture and recognize until stopped or the camera fails
    pub fn run(&mut self) -> Result<DetectorStats> {
        self.source
            .start()
            .context("Failed to start capture thread")?;

        self.detector.run(&self.frames);

        self.source.join();
        Ok(self.detector.stats())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::DetectionResult;
    use crate::storage::catalog::NewCard;
    use image::{DynamicImage, Rgba, RgbaImage};
    use std::cell::RefCell;
    use std::path::Path;
    use std::rc::Rc;
    use tempfile::TempDir;

    struct FixedText(&'static str);

    impl TextExtractor for FixedText {
        fn extract(&mut self, _image: &DynamicImage) -> String {
            self.0.to_string()
        }
    }

    /// Stops the scan after the first detection
    struct StopAfterFirst {
        stop: Rc<RefCell<Option<StopHandle>>>,
        detected: Rc<RefCell<Vec<String>>>,
    }

    impl Observer for StopAfterFirst {
        fn name(&self) -> &str {
            "stop_after_first"
        }

        fn card_detected(&mut self, result: &DetectionResult) {
            self.detected.borrow_mut().push(result.card.name.clone());
            if let Some(stop) = self.stop.borrow().as_ref() {
                stop.stop();
            }
        }
    }

    fn setup(dir: &Path) -> AppConfig {
        let replay = dir.join("frames");
        std::fs::create_dir(&replay).unwrap();
        RgbaImage::from_pixel(64, 48, Rgba([255, 255, 255, 255]))
            .save(replay.join("0001.png"))
            .unwrap();

        let mut config = AppConfig::default();
        config.camera.replay_dir = Some(replay);
        config.camera.frame_interval_ms = Some(5);
        config.catalog.path = Some(dir.join("cards.sqlite"));
        config.dictionary.path = Some(dir.join("cards.dic"));
        config.detector.min_suggestions = 2;
        config.detector.max_wait_secs = 5.0;
        config
    }

    #[test]
    fn test_empty_catalog_is_fatal() {
        let dir = TempDir::new().unwrap();
        let config = setup(dir.path());

        let result = ScannerApp::with_extractor(&config, Box::new(FixedText("Shock")), vec![]);
        assert!(result.is_err());
    }

    #[test]
    fn test_scan_replayed_frames() {
        let dir = TempDir::new().unwrap();
        let config = setup(dir.path());
        SqliteCatalog::open(&dir.path().join("cards.sqlite"), &[])
            .unwrap()
            .import_cards(&[NewCard {
                name: "Shock".to_string(),
                expansion: "Stronghold".to_string(),
                vendor_id: String::new(),
            }])
            .unwrap();

        let stop = Rc::new(RefCell::new(None));
        let detected = Rc::new(RefCell::new(Vec::new()));
        let observer = StopAfterFirst {
            stop: stop.clone(),
            detected: detected.clone(),
        };

        let mut app =
            ScannerApp::with_extractor(&config, Box::new(FixedText("Shock")), vec![Box::new(observer)])
                .unwrap();
        *stop.borrow_mut() = Some(app.stop_handle());

        let stats = app.run().unwrap();

        assert_eq!(*detected.borrow(), vec!["Shock".to_string()]);
        assert_eq!(stats.detections, 1);
        assert!(dir.path().join("cards.dic").exists());
    }

    #[test]
    fn test_match_limit_must_exceed_max_guesses() {
        let dir = TempDir::new().unwrap();
        let mut config = setup(dir.path());
        config.dictionary.limit = 5;
        config.detector.max_guesses = 5;

        let err = ScannerApp::with_extractor(&config, Box::new(FixedText("Shock")), vec![])
            .err()
            .unwrap();
        assert!(err.to_string().contains("max_guesses"));
    }

    #[test]
    fn test_unknown_step_is_fatal() {
        let dir = TempDir::new().unwrap();
        let mut config = setup(dir.path());
        config.region.steps = vec!["crop".to_string(), "sepia".to_string()];
        SqliteCatalog::open(&dir.path().join("cards.sqlite"), &[])
            .unwrap()
            .import_cards(&[NewCard {
                name: "Shock".to_string(),
                expansion: "Stronghold".to_string(),
                vendor_id: String::new(),
            }])
            .unwrap();

        let result = ScannerApp::with_extractor(&config, Box::new(FixedText("Shock")), vec![]);
        assert!(result.is_err());
    }
}
