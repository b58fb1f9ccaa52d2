//! Capture preview snapshots
//!
//! Writes the latest camera frame with the capture region outlined, plus the
//! processed crop the OCR engine sees, so the card can be lined up.

use image::{DynamicImage, Rgba};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect as DrawRect;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::analysis::Observer;
use crate::capture::{CaptureRegion, CapturedFrame};

/// Minimum delay between two snapshots
const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(1);

const OUTLINE: Rgba<u8> = Rgba([250, 50, 50, 255]);
const SHADOW: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// Periodically saves the capture frame and processed crop as images
pub struct PreviewObserver {
    frame_path: PathBuf,
    processed_path: PathBuf,
    last_written: Option<Instant>,
    /// Set while the frame just written awaits its own processed crop
    want_processed: bool,
}

impl PreviewObserver {
    /// `path` receives the frame, `<stem>-processed.<ext>` the crop
    pub fn new(path: &Path) -> Self {
        Self {
            frame_path: path.to_path_buf(),
            processed_path: processed_path(path),
            last_written: None,
            want_processed: false,
        }
    }

    fn due(&self, now: Instant) -> bool {
        self.last_written
            .map_or(true, |last| now.duration_since(last) >= SNAPSHOT_INTERVAL)
    }
}

fn processed_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "preview".to_string());
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "png".to_string());
    path.with_file_name(format!("{stem}-processed.{ext}"))
}

/// Copy of the frame with the region outlined
fn annotate(frame: &CapturedFrame, region: &CaptureRegion) -> image::RgbaImage {
    let mut image = frame.image.clone();
    let rect = region.rect();
    if region.is_empty() {
        return image;
    }

    let outline = DrawRect::at(rect.x as i32, rect.y as i32).of_size(rect.width, rect.height);
    let shadow = DrawRect::at(rect.x as i32, rect.y as i32 + 1).of_size(rect.width, rect.height);
    draw_hollow_rect_mut(&mut image, shadow, SHADOW);
    draw_hollow_rect_mut(&mut image, outline, OUTLINE);
    image
}

impl Observer for PreviewObserver {
    fn name(&self) -> &str {
        "preview"
    }

    fn image_captured(&mut self, frame: &CapturedFrame, region: &CaptureRegion) {
        // A crop from any later frame would not match the snapshot
        self.want_processed = false;

        let now = Instant::now();
        if !self.due(now) {
            return;
        }
        self.last_written = Some(now);

        match annotate(frame, region).save(&self.frame_path) {
            Ok(()) => {
                debug!("Preview written to {:?}", self.frame_path);
                self.want_processed = true;
            }
            Err(err) => warn!("Failed to write preview {:?}: {}", self.frame_path, err),
        }
    }

    fn image_processed(&mut self, image: &DynamicImage) {
        if !std::mem::take(&mut self.want_processed) {
            return;
        }
        if let Err(err) = image.save(&self.processed_path) {
            warn!(
                "Failed to write processed preview {:?}: {}",
                self.processed_path, err
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::frame::Rect;
    use image::RgbaImage;
    use tempfile::TempDir;

    fn frame() -> CapturedFrame {
        CapturedFrame::new(RgbaImage::from_pixel(40, 20, Rgba([255, 255, 255, 255])))
    }

    fn region() -> CaptureRegion {
        CaptureRegion::new(Rect::new(10, 0, 20, 5), vec![])
    }

    #[test]
    fn test_processed_path() {
        assert_eq!(
            processed_path(Path::new("/tmp/scan.png")),
            PathBuf::from("/tmp/scan-processed.png")
        );
    }

    #[test]
    fn test_annotate_outlines_region() {
        let image = annotate(&frame(), &region());
        assert_eq!(*image.get_pixel(10, 0), OUTLINE);
        assert_eq!(*image.get_pixel(29, 4), OUTLINE);
        assert_eq!(*image.get_pixel(15, 2), Rgba([255, 255, 255, 255]));
        assert_eq!(*image.get_pixel(0, 10), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn test_writes_frame_then_processed_crop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("preview.png");
        let mut observer = PreviewObserver::new(&path);

        observer.image_captured(&frame(), &region());
        let crop = DynamicImage::ImageRgba8(RgbaImage::new(20, 5));
        observer.image_processed(&crop);

        assert!(path.exists());
        assert!(dir.path().join("preview-processed.png").exists());

        // Throttled: the next frame within a second is not written
        std::fs::remove_file(&path).unwrap();
        observer.image_captured(&frame(), &region());
        assert!(!path.exists());
    }

    #[test]
    fn test_skipped_crop_is_not_taken_from_next_frame() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("preview.png");
        let mut observer = PreviewObserver::new(&path);

        // Snapshot frame lands in the cooldown: no processed image follows it
        observer.image_captured(&frame(), &region());
        observer.image_captured(&frame(), &region());
        observer.image_processed(&DynamicImage::ImageRgba8(RgbaImage::new(20, 5)));

        assert!(path.exists());
        assert!(!dir.path().join("preview-processed.png").exists());
    }
}
