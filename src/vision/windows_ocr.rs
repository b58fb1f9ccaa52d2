//! Windows OCR API backend
//!
//! Uses the built-in Windows OCR (Media.Ocr). No external binary is needed,
//! which makes it the easier backend to ship on Windows.

use anyhow::{Context, Result};
use image::DynamicImage;
use tracing::{debug, info, warn};
use windows::{
    core::HSTRING,
    Globalization::Language,
    Graphics::Imaging::{BitmapPixelFormat, SoftwareBitmap},
    Media::Ocr::OcrEngine as WinOcrEngine,
    Storage::Streams::DataWriter,
};

use super::{OcrError, TextExtractor};

/// Text extractor backed by `Windows.Media.Ocr`
pub struct WindowsOcrExtractor {
    engine: WinOcrEngine,
}

impl WindowsOcrExtractor {
    /// Create an engine for `language_tag`, falling back to the user profile languages
    pub fn new(language_tag: &str) -> Result<Self, OcrError> {
        Self::create_engine(language_tag)
            .map(|engine| Self { engine })
            .map_err(|err| OcrError::Unavailable(format!("{err:#}")))
    }

    fn create_engine(language_tag: &str) -> Result<WinOcrEngine> {
        let language = Language::CreateLanguage(&HSTRING::from(language_tag))
            .context("Failed to create language")?;

        if WinOcrEngine::IsLanguageSupported(&language).context("Failed to check language support")? {
            info!("Windows OCR initialized with language: {}", language_tag);
            return WinOcrEngine::TryCreateFromLanguage(&language)
                .context("Failed to create OCR engine for language");
        }

        warn!(
            "Language '{}' not supported, falling back to user profile languages",
            language_tag
        );
        WinOcrEngine::TryCreateFromUserProfileLanguages()
            .context("Failed to create OCR engine from user profile")
    }

    fn recognize(&self, image: &DynamicImage) -> Result<String> {
        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();

        // Windows expects BGRA
        let mut bgra = rgba.into_raw();
        for px in bgra.chunks_exact_mut(4) {
            px.swap(0, 2);
        }

        let writer = DataWriter::new().context("Failed to create data writer")?;
        writer.WriteBytes(&bgra).context("Failed to write pixel data")?;
        let buffer = writer.DetachBuffer().context("Failed to detach buffer")?;

        let bitmap = SoftwareBitmap::CreateCopyFromBuffer(
            &buffer,
            BitmapPixelFormat::Bgra8,
            width as i32,
            height as i32,
        )
        .context("Failed to create SoftwareBitmap")?;

        let result = self
            .engine
            .RecognizeAsync(&bitmap)
            .context("Failed to start OCR recognition")?
            .get()
            .context("OCR recognition failed")?;

        Ok(result.Text().context("Failed to get OCR text")?.to_string())
    }
}

impl TextExtractor for WindowsOcrExtractor {
    fn extract(&mut self, image: &DynamicImage) -> String {
        if image.width() == 0 || image.height() == 0 {
            return String::new();
        }

        match self.recognize(image) {
            Ok(text) => text.trim().to_string(),
            Err(err) => {
                debug!("Windows OCR failed: {:#}", err);
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn test_blank_image_yields_no_text() {
        let Ok(mut ocr) = WindowsOcrExtractor::new("en-US") else {
            return;
        };
        let blank = DynamicImage::ImageRgba8(RgbaImage::from_pixel(64, 32, Rgba([255; 4])));
        assert_eq!(ocr.extract(&blank), "");
    }
}
