//! Frame processing chain
//!
//! A chain is an ordered list of named, pure image transformations resolved
//! from a [`StepRegistry`] when the chain is built. Unknown names fail at
//! that point, never while frames are flowing.

use image::imageops::FilterType;
use image::{DynamicImage, Luma};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::capture::{CaptureRegion, CapturedFrame};

/// Chain construction errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChainError {
    /// A step name has no registered implementation
    #[error("unknown processing step {name:?} (available: {available})")]
    UnknownStep { name: String, available: String },
    /// The capture region covers no pixels
    #[error("capture region is empty")]
    EmptyRegion,
}

/// A single image transformation
pub trait ProcessingStep: Send + Sync {
    /// Transform `image`; `region` is the session's capture region
    fn apply(&self, image: DynamicImage, region: &CaptureRegion) -> DynamicImage;
}

impl<F> ProcessingStep for F
where
    F: Fn(DynamicImage, &CaptureRegion) -> DynamicImage + Send + Sync,
{
    fn apply(&self, image: DynamicImage, region: &CaptureRegion) -> DynamicImage {
        self(image, region)
    }
}

/// Crop to the capture region
pub struct Crop;

impl ProcessingStep for Crop {
    fn apply(&self, image: DynamicImage, region: &CaptureRegion) -> DynamicImage {
        let r = region.rect();
        image.crop_imm(r.x, r.y, r.width, r.height)
    }
}

/// Convert to 8-bit luminance
pub struct Greyscale;

impl ProcessingStep for Greyscale {
    fn apply(&self, image: DynamicImage, _region: &CaptureRegion) -> DynamicImage {
        DynamicImage::ImageLuma8(image.to_luma8())
    }
}

/// Invert colors, useful for light text on dark card frames
pub struct Invert;

impl ProcessingStep for Invert {
    fn apply(&self, mut image: DynamicImage, _region: &CaptureRegion) -> DynamicImage {
        image.invert();
        image
    }
}

/// Integer upscale; tesseract struggles with glyphs under ~20px
pub struct Upscale {
    pub factor: u32,
}

impl ProcessingStep for Upscale {
    fn apply(&self, image: DynamicImage, _region: &CaptureRegion) -> DynamicImage {
        if self.factor <= 1 {
            return image;
        }
        image.resize_exact(
            image.width() * self.factor,
            image.height() * self.factor,
            FilterType::Triangle,
        )
    }
}

/// Unsharp mask
pub struct Sharpen;

impl ProcessingStep for Sharpen {
    fn apply(&self, image: DynamicImage, _region: &CaptureRegion) -> DynamicImage {
        image.unsharpen(1.0, 5)
    }
}

/// Otsu binarisation
pub struct Threshold;

impl ProcessingStep for Threshold {
    fn apply(&self, image: DynamicImage, _region: &CaptureRegion) -> DynamicImage {
        let luma = image.to_luma8();
        let level = imageproc::contrast::otsu_level(&luma);
        let binary = imageproc::map::map_colors(&luma, |p| {
            if p[0] > level {
                Luma([255u8])
            } else {
                Luma([0u8])
            }
        });
        DynamicImage::ImageLuma8(binary)
    }
}

/// Name to implementation mapping for processing steps
#[derive(Clone)]
pub struct StepRegistry {
    steps: BTreeMap<String, Arc<dyn ProcessingStep>>,
}

impl StepRegistry {
    /// Registry with no steps
    pub fn empty() -> Self {
        Self {
            steps: BTreeMap::new(),
        }
    }

    /// Registry with every built-in step
    pub fn with_builtin_steps() -> Self {
        let mut registry = Self::empty();
        registry.register("crop", Crop);
        registry.register("greyscale", Greyscale);
        registry.register("grayscale", Greyscale);
        registry.register("invert", Invert);
        registry.register("upscale", Upscale { factor: 2 });
        registry.register("sharpen", Sharpen);
        registry.register("threshold", Threshold);
        registry
    }

    /// Add or replace a step
    pub fn register(&mut self, name: impl Into<String>, step: impl ProcessingStep + 'static) {
        self.steps.insert(name.into(), Arc::new(step));
    }

    /// Look up a step by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn ProcessingStep>> {
        self.steps.get(name).cloned()
    }

    /// Registered step names in sorted order
    pub fn names(&self) -> Vec<&str> {
        self.steps.keys().map(String::as_str).collect()
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::with_builtin_steps()
    }
}

impl fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepRegistry")
            .field("steps", &self.names())
            .finish()
    }
}

/// Steps applied when none are configured
pub fn default_steps() -> Vec<String> {
    vec!["crop".to_string(), "greyscale".to_string()]
}

/// Ordered, validated list of steps bound to a capture region
pub struct ProcessingChain {
    region: CaptureRegion,
    steps: Vec<(String, Arc<dyn ProcessingStep>)>,
}

impl ProcessingChain {
    /// Resolve every step named by `region` against `registry`
    pub fn new(registry: &StepRegistry, region: CaptureRegion) -> Result<Self, ChainError> {
        if region.is_empty() {
            return Err(ChainError::EmptyRegion);
        }

        let steps = region
            .steps()
            .iter()
            .map(|name| {
                registry
                    .get(name)
                    .map(|step| (name.clone(), step))
                    .ok_or_else(|| ChainError::UnknownStep {
                        name: name.clone(),
                        available: registry.names().join(", "),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            "Processing chain: [{}] over {:?}",
            region.steps().join(" -> "),
            region.rect()
        );

        Ok(Self { region, steps })
    }

    /// Run every step in order over a copy of the frame
    pub fn apply(&self, frame: &CapturedFrame) -> DynamicImage {
        self.steps.iter().fold(
            DynamicImage::ImageRgba8(frame.image.clone()),
            |image, (_, step)| step.apply(image, &self.region),
        )
    }

    /// Region this chain was built for
    pub fn region(&self) -> &CaptureRegion {
        &self.region
    }

    /// Step names in application order
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|(name, _)| name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::frame::Rect;
    use image::{Rgba, RgbaImage};

    fn test_frame() -> CapturedFrame {
        // Left half white, right half dark red
        CapturedFrame::new(RgbaImage::from_fn(20, 10, |x, _| {
            if x < 10 {
                Rgba([255, 255, 255, 255])
            } else {
                Rgba([120, 0, 0, 255])
            }
        }))
    }

    fn region(steps: &[&str]) -> CaptureRegion {
        CaptureRegion::new(
            Rect::new(8, 2, 6, 4),
            steps.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[test]
    fn test_unknown_step_rejected() {
        let registry = StepRegistry::with_builtin_steps();
        let err = ProcessingChain::new(&registry, region(&["crop", "blur"]))
            .err()
            .unwrap();

        match err {
            ChainError::UnknownStep { name, available } => {
                assert_eq!(name, "blur");
                assert!(available.contains("greyscale"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_empty_region_rejected() {
        let registry = StepRegistry::with_builtin_steps();
        let empty = CaptureRegion::new(Rect::new(0, 0, 0, 10), default_steps());
        assert_eq!(
            ProcessingChain::new(&registry, empty).err(),
            Some(ChainError::EmptyRegion)
        );
    }

    #[test]
    fn test_crop_and_greyscale() {
        let registry = StepRegistry::with_builtin_steps();
        let chain = ProcessingChain::new(&registry, region(&["crop", "greyscale"])).unwrap();

        let out = chain.apply(&test_frame());
        assert_eq!((out.width(), out.height()), (6, 4));

        let luma = out.as_luma8().expect("greyscale output");
        assert_eq!(luma.get_pixel(0, 0).0[0], 255);
        assert!(luma.get_pixel(5, 0).0[0] < 100);
    }

    #[test]
    fn test_invert() {
        let registry = StepRegistry::with_builtin_steps();
        let chain =
            ProcessingChain::new(&registry, region(&["crop", "grayscale", "invert"])).unwrap();

        let luma = chain.apply(&test_frame()).to_luma8();
        assert_eq!(luma.get_pixel(0, 0).0[0], 0);
    }

    #[test]
    fn test_upscale_and_threshold() {
        let registry = StepRegistry::with_builtin_steps();
        let chain =
            ProcessingChain::new(&registry, region(&["crop", "upscale", "threshold"])).unwrap();

        let out = chain.apply(&test_frame());
        assert_eq!((out.width(), out.height()), (12, 8));
        assert!(out
            .to_luma8()
            .pixels()
            .all(|p| p.0[0] == 0 || p.0[0] == 255));
    }

    #[test]
    fn test_custom_step_registration() {
        let mut registry = StepRegistry::with_builtin_steps();
        registry.register("half", |image: DynamicImage, _: &CaptureRegion| {
            image.resize_exact(image.width() / 2, image.height() / 2, FilterType::Nearest)
        });

        let chain = ProcessingChain::new(&registry, region(&["half"])).unwrap();
        assert_eq!(chain.step_names(), vec!["half"]);

        let out = chain.apply(&test_frame());
        assert_eq!((out.width(), out.height()), (10, 5));
    }
}
