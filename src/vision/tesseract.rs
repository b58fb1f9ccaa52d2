//! Tesseract backend
//!
//! Runs the system `tesseract` binary through rusty-tesseract. Card names are
//! a single line of text, so page segmentation defaults to mode 7.

use image::DynamicImage;
use rusty_tesseract::{Args, Image};
use std::collections::HashMap;
use tracing::{debug, info};

use super::{OcrError, TextExtractor};

/// Single text line page segmentation
pub const PSM_SINGLE_LINE: i32 = 7;

/// Text extractor backed by the tesseract CLI
pub struct TesseractExtractor {
    args: Args,
}

impl TesseractExtractor {
    /// Check that tesseract is installed and prepare arguments
    pub fn new(language: &str, psm: i32) -> Result<Self, OcrError> {
        let version = rusty_tesseract::get_tesseract_version()
            .map_err(|err| OcrError::Unavailable(format!("tesseract not found: {err}")))?;
        info!("Using tesseract {}", version.lines().next().unwrap_or("").trim());

        Ok(Self {
            args: Args {
                lang: language.to_string(),
                config_variables: HashMap::new(),
                dpi: Some(300),
                psm: Some(psm),
                oem: Some(3),
            },
        })
    }
}

impl TextExtractor for TesseractExtractor {
    fn extract(&mut self, image: &DynamicImage) -> String {
        let tess_image = match Image::from_dynamic_image(image) {
            Ok(img) => img,
            Err(err) => {
                debug!("Failed to hand image to tesseract: {}", err);
                return String::new();
            }
        };

        match rusty_tesseract::image_to_string(&tess_image, &self.args) {
            Ok(text) => text.trim().to_string(),
            Err(err) => {
                debug!("Tesseract failed: {}", err);
                String::new()
            }
        }
    }
}
