//! Application Configuration
//!
//! Scanner settings stored in TOML format. Every section and field has a
//! default, so a partial file only overrides what it names.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::analysis::DetectorConfig;
use crate::capture::CaptureConfig;
use crate::output::OutputFormat;
use crate::storage;
use crate::vision::{default_steps, MatchSettings, OcrBackend};

/// Default config file name inside the config directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Camera settings
    pub camera: CameraSettings,
    /// Recognition thresholds
    pub detector: DetectorSettings,
    /// Capture region settings
    pub region: RegionSettings,
    /// OCR backend settings
    pub ocr: OcrSettings,
    /// Dictionary settings
    pub dictionary: DictionarySettings,
    /// Card database settings
    pub catalog: CatalogSettings,
    /// Detection outputs
    pub output: OutputSettings,
}

/// Camera settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    /// Webcam number, device path or ffmpeg input
    pub device: String,
    /// Capture width in pixels
    pub width: u32,
    /// Capture height in pixels
    pub height: u32,
    /// Frames buffered between capture and recognition
    pub queue_capacity: usize,
    /// Read images from this directory instead of a camera
    pub replay_dir: Option<PathBuf>,
    /// Delay between replayed images in milliseconds
    pub frame_interval_ms: Option<u64>,
}

impl Default for CameraSettings {
    fn default() -> Self {
        let capture = CaptureConfig::default();
        Self {
            device: capture.device,
            width: capture.width,
            height: capture.height,
            queue_capacity: capture.queue_capacity,
            replay_dir: None,
            frame_interval_ms: None,
        }
    }
}

impl CameraSettings {
    pub fn to_capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            device: self.device.clone(),
            width: self.width,
            height: self.height,
            queue_capacity: self.queue_capacity,
            replay_dir: self.replay_dir.clone(),
            frame_interval: self.frame_interval_ms.map(Duration::from_millis),
        }
    }
}

/// Recognition thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorSettings {
    /// Equal guesses needed, exclusive (8 means the 9th equal guess wins)
    pub min_suggestions: u32,
    /// Seconds without a detection before the votes are dropped
    pub max_wait_secs: f64,
    /// Minimum length of the OCR text
    pub min_card_name: usize,
    /// More candidates than this makes a read ambiguous
    pub max_guesses: usize,
    /// Seconds to ignore frames after a detection
    pub switch_time_secs: f64,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        let detector = DetectorConfig::default();
        Self {
            min_suggestions: detector.min_suggestions,
            max_wait_secs: detector.max_wait.as_secs_f64(),
            min_card_name: detector.min_card_name,
            max_guesses: detector.max_guesses,
            switch_time_secs: detector.switch_time.as_secs_f64(),
        }
    }
}

impl DetectorSettings {
    pub fn to_detector_config(&self) -> Result<DetectorConfig> {
        Ok(DetectorConfig {
            min_suggestions: self.min_suggestions,
            max_wait: seconds(self.max_wait_secs, "detector.max_wait_secs")?,
            min_card_name: self.min_card_name,
            max_guesses: self.max_guesses,
            switch_time: seconds(self.switch_time_secs, "detector.switch_time_secs")?,
        })
    }
}

fn seconds(value: f64, field: &str) -> Result<Duration> {
    Duration::try_from_secs_f64(value)
        .with_context(|| format!("{field} must be a non-negative number of seconds, got {value}"))
}

/// Capture region settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionSettings {
    /// Region width in pixels
    pub width: u32,
    /// Region height in pixels
    pub height: u32,
    /// Distance from the top of the frame
    pub top: u32,
    /// Processing steps, in order
    pub steps: Vec<String>,
}

impl Default for RegionSettings {
    fn default() -> Self {
        Self {
            width: 350,
            height: 30,
            top: 0,
            steps: default_steps(),
        }
    }
}

/// OCR backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSettings {
    pub backend: OcrBackend,
    /// Tesseract language code
    pub language: String,
    /// Tesseract page segmentation mode
    pub psm: i32,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            backend: OcrBackend::default(),
            language: "eng".to_string(),
            psm: crate::vision::tesseract::PSM_SINGLE_LINE,
        }
    }
}

/// Dictionary settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DictionarySettings {
    /// `.dic` word list, defaults to `cards.dic` in the data directory
    pub path: Option<PathBuf>,
    /// Minimum similarity (0.0 - 1.0) for a suggestion
    pub min_similarity: f64,
    /// Maximum suggestions per read
    pub limit: usize,
}

impl Default for DictionarySettings {
    fn default() -> Self {
        let settings = MatchSettings::default();
        Self {
            path: None,
            min_similarity: settings.min_similarity,
            limit: settings.limit,
        }
    }
}

impl DictionarySettings {
    pub fn match_settings(&self) -> MatchSettings {
        MatchSettings {
            min_similarity: self.min_similarity,
            limit: self.limit,
        }
    }

    pub fn resolved_path(&self) -> Result<PathBuf> {
        match &self.path {
            Some(path) => Ok(path.clone()),
            None => Ok(storage::get_data_dir()?.join("cards.dic")),
        }
    }
}

/// Card database settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogSettings {
    /// SQLite database, defaults to `cards.sqlite` in the data directory
    pub path: Option<PathBuf>,
    /// Only load cards from these expansions (empty = all)
    pub expansions: Vec<String>,
}

impl CatalogSettings {
    pub fn resolved_path(&self) -> Result<PathBuf> {
        match &self.path {
            Some(path) => Ok(path.clone()),
            None => Ok(storage::get_data_dir()?.join("cards.sqlite")),
        }
    }
}

/// A detection log file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputFile {
    pub path: PathBuf,
    #[serde(default)]
    pub format: OutputFormat,
}

/// Detection outputs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    /// Play a sound on detection
    pub beep: bool,
    /// WAV file to play instead of the built-in tone
    pub beep_sound: Option<PathBuf>,
    /// Sound volume (0.0 - 1.0)
    pub beep_volume: f32,
    /// Copy detected card names to the clipboard
    pub clipboard: bool,
    /// Files receiving one row per detection
    pub files: Vec<OutputFile>,
    /// Write a preview PNG of the capture here
    pub preview: Option<PathBuf>,
    /// Console feedback (0: quiet, 1: feedback, 2: debug rows)
    pub verbosity: u8,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            beep: false,
            beep_sound: None,
            beep_volume: 0.7,
            clipboard: false,
            files: Vec::new(),
            preview: None,
            verbosity: 0,
        }
    }
}

/// Path of the config file in the user config directory
pub fn default_config_path() -> Result<PathBuf> {
    Ok(storage::get_config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {:?}", path))?;
    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Invalid config file {:?}", path))?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write config file {:?}", path))?;
    Ok(())
}

/// Load the explicitly given file, or the default one if present.
///
/// Problems with an explicit file are errors; problems with the default
/// file are logged and defaults are used.
pub fn load_or_default(explicit: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = explicit {
        let config = load_config(path)?;
        info!("Loaded configuration from {:?}", path);
        return Ok(config);
    }

    let path = match default_config_path() {
        Ok(path) => path,
        Err(err) => {
            warn!("No config directory ({:#}), using defaults", err);
            return Ok(AppConfig::default());
        }
    };

    if !path.exists() {
        info!("Using default configuration");
        return Ok(AppConfig::default());
    }

    match load_config(&path) {
        Ok(config) => {
            info!("Loaded configuration from {:?}", path);
            Ok(config)
        }
        Err(err) => {
            warn!("Ignoring config file: {:#}", err);
            Ok(AppConfig::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_app_config() {
        let config = AppConfig::default();

        assert_eq!(config.camera.device, "1");
        assert_eq!(config.camera.queue_capacity, 2);

        assert_eq!(config.detector.min_suggestions, 8);
        assert_eq!(config.detector.min_card_name, 3);
        assert_eq!(config.detector.max_guesses, 5);
        assert!((config.detector.max_wait_secs - 80.0).abs() < f64::EPSILON);
        assert!((config.detector.switch_time_secs - 2.0).abs() < f64::EPSILON);

        assert_eq!((config.region.width, config.region.height), (350, 30));
        assert_eq!(config.region.steps, vec!["crop", "greyscale"]);

        assert_eq!(config.ocr.backend, OcrBackend::Tesseract);
        assert_eq!(config.ocr.psm, 7);

        assert!(!config.output.beep);
        assert!(config.output.files.is_empty());
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let mut config = AppConfig::default();
        config.output.files.push(OutputFile {
            path: PathBuf::from("cards.csv"),
            format: OutputFormat::DebugCsv,
        });

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(parsed.output.files, config.output.files);
        assert_eq!(parsed.detector.min_suggestions, config.detector.min_suggestions);
        assert_eq!(parsed.region.steps, config.region.steps);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: AppConfig = toml::from_str(
            r#"
            [detector]
            min_suggestions = 3

            [region]
            steps = ["crop", "invert", "greyscale"]

            [[output.files]]
            path = "deck.csv"
            "#,
        )
        .unwrap();

        assert_eq!(parsed.detector.min_suggestions, 3);
        assert_eq!(parsed.detector.max_guesses, 5);
        assert_eq!(parsed.region.width, 350);
        assert_eq!(parsed.region.steps.len(), 3);
        assert_eq!(parsed.output.files[0].format, OutputFormat::DeckboxOrgCsv);
    }

    #[test]
    fn test_detector_settings_conversion() {
        let settings = DetectorSettings {
            max_wait_secs: 1.5,
            ..DetectorSettings::default()
        };
        let config = settings.to_detector_config().unwrap();
        assert_eq!(config.max_wait, Duration::from_millis(1500));
        assert_eq!(config.switch_time, Duration::from_secs(2));

        let negative = DetectorSettings {
            switch_time_secs: -1.0,
            ..DetectorSettings::default()
        };
        assert!(negative.to_detector_config().is_err());
    }

    #[test]
    fn test_camera_settings_conversion() {
        let settings = CameraSettings {
            frame_interval_ms: Some(40),
            ..CameraSettings::default()
        };
        let capture = settings.to_capture_config();
        assert_eq!(capture.frame_interval, Some(Duration::from_millis(40)));
        assert_eq!(capture.device, "1");
    }

    #[test]
    fn test_save_and_load_config() {
        let mut config = AppConfig::default();
        config.catalog.expansions = vec!["Tempest".to_string()];

        let temp_file = NamedTempFile::new().unwrap();
        save_config(&config, temp_file.path()).unwrap();

        let loaded = load_config(temp_file.path()).unwrap();
        assert_eq!(loaded.catalog.expansions, config.catalog.expansions);

        let explicit = load_or_default(Some(temp_file.path())).unwrap();
        assert_eq!(explicit.catalog.expansions, config.catalog.expansions);
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
        assert!(load_or_default(Some(Path::new("/nonexistent/path/config.toml"))).is_err());
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "this is not valid toml {{{{").unwrap();

        let result = load_config(temp_file.path());
        assert!(result.is_err());
    }
}
