//! Vision/OCR Layer
//!
//! Turns captured frames into candidate card slugs:
//! - [`ProcessingChain`]: configurable image preprocessing
//! - [`TextExtractor`]: OCR backends (tesseract, Windows OCR)
//! - [`VocabularyMatcher`]: fuzzy lookup of OCR text in the card dictionary

pub mod matcher;
pub mod preprocess;
pub mod tesseract;
#[cfg(windows)]
pub mod windows_ocr;

use image::DynamicImage;
use thiserror::Error;

pub use matcher::{slugify, Dictionary, MatchSettings, VocabularyMatcher};
pub use preprocess::{default_steps, ProcessingChain, StepRegistry};
pub use tesseract::TesseractExtractor;
#[cfg(windows)]
pub use windows_ocr::WindowsOcrExtractor;

/// Image to raw text.
///
/// Implementations never fail per call: an internal error yields an empty
/// string so the caller simply discards the cycle.
pub trait TextExtractor {
    fn extract(&mut self, image: &DynamicImage) -> String;
}

/// OCR engine setup errors
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("OCR backend unavailable: {0}")]
    Unavailable(String),
}

/// OCR backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrBackend {
    /// System tesseract binary
    #[default]
    Tesseract,
    /// Windows built-in OCR
    WindowsOcr,
}

/// Create the configured text extractor
pub fn create_extractor(
    backend: OcrBackend,
    language: &str,
    psm: i32,
) -> Result<Box<dyn TextExtractor>, OcrError> {
    match backend {
        OcrBackend::Tesseract => Ok(Box::new(TesseractExtractor::new(language, psm)?)),
        #[cfg(windows)]
        OcrBackend::WindowsOcr => Ok(Box::new(WindowsOcrExtractor::new(&windows_language(
            language,
        ))?)),
        #[cfg(not(windows))]
        OcrBackend::WindowsOcr => Err(OcrError::Unavailable(
            "Windows OCR is only available on Windows".to_string(),
        )),
    }
}

/// Map a tesseract language code onto a BCP-47 tag for Windows OCR
#[cfg(windows)]
fn windows_language(language: &str) -> String {
    match language {
        "eng" => "en-US".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_serde_names() {
        #[derive(serde::Deserialize)]
        struct Wrapper {
            backend: OcrBackend,
        }

        let parsed: Wrapper = toml::from_str("backend = \"windows_ocr\"").unwrap();
        assert_eq!(parsed.backend, OcrBackend::WindowsOcr);
        assert_eq!(OcrBackend::default(), OcrBackend::Tesseract);
    }

    #[cfg(not(windows))]
    #[test]
    fn test_windows_backend_unavailable_elsewhere() {
        let result = create_extractor(OcrBackend::WindowsOcr, "eng", 7);
        assert!(matches!(result, Err(OcrError::Unavailable(_))));
    }
}
