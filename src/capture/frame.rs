//! Frame data structures for captured camera content

use image::RgbaImage;
use std::time::Instant;

/// A captured frame from the camera
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    /// RGBA pixel data
    pub image: RgbaImage,
    /// Timestamp when frame was captured
    pub timestamp: Instant,
}

impl CapturedFrame {
    /// Wrap an already decoded image
    pub fn new(image: RgbaImage) -> Self {
        Self {
            image,
            timestamp: Instant::now(),
        }
    }

    /// Build a frame from raw RGBA bytes, `None` if the buffer does not match the size
    pub fn from_rgba(data: Vec<u8>, width: u32, height: u32) -> Option<Self> {
        RgbaImage::from_raw(width, height, data).map(Self::new)
    }

    /// Get frame dimensions as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// Axis-aligned pixel rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// The part of every frame that is read, plus the processing steps applied to it.
///
/// Derived once from the first frame of a session and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRegion {
    rect: Rect,
    steps: Vec<String>,
}

impl CaptureRegion {
    /// Create a region from an explicit rectangle
    pub fn new(rect: Rect, steps: Vec<String>) -> Self {
        Self { rect, steps }
    }

    /// Center a `width` x `height` box horizontally, `top` pixels from the top edge.
    ///
    /// The box is clamped so it always lies inside `frame_size`.
    pub fn centered(
        frame_size: (u32, u32),
        width: u32,
        height: u32,
        top: u32,
        steps: Vec<String>,
    ) -> Self {
        let (frame_w, frame_h) = frame_size;
        let width = width.min(frame_w);
        let y = top.min(frame_h);
        let height = height.min(frame_h - y);
        let x = (frame_w - width) / 2;

        Self::new(Rect::new(x, y, width, height), steps)
    }

    /// Pixel rectangle inside the frame
    pub fn rect(&self) -> Rect {
        self.rect
    }

    /// Ordered processing step names
    pub fn steps(&self) -> &[String] {
        &self.steps
    }

    /// Whether the region covers no pixels
    pub fn is_empty(&self) -> bool {
        self.rect.area() == 0
    }
}
