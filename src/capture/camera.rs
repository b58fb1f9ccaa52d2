//! Camera devices
//!
//! Two devices are provided: an ffmpeg child process reading a live camera
//! (or any input ffmpeg understands) as raw RGBA, and a replay device cycling
//! over still images in a directory.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::frame::CapturedFrame;
use super::CaptureError;

/// A blocking frame provider
pub trait CameraDevice: Send {
    /// Block until the next frame is available
    fn next_frame(&mut self) -> Result<CapturedFrame, CaptureError>;

    /// Human readable device description for logs
    fn describe(&self) -> String;
}

/// Live camera read through an `ffmpeg` child process
pub struct FfmpegCamera {
    child: Child,
    stdout: ChildStdout,
    device: String,
    width: u32,
    height: u32,
    buffer: Vec<u8>,
}

impl FfmpegCamera {
    /// Spawn ffmpeg for `device`, scaling every frame to `width` x `height`
    pub fn open(device: &str, width: u32, height: u32) -> Result<Self, CaptureError> {
        let mut cmd = Command::new("ffmpeg");
        cmd.arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .args(ffmpeg_input_args(device))
            .arg("-vf")
            .arg(format!("scale={width}:{height}"))
            .arg("-pix_fmt")
            .arg("rgba")
            .arg("-f")
            .arg("rawvideo")
            .arg("-")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        debug!("Spawning ffmpeg: {:?}", cmd);

        let mut child = cmd.spawn().map_err(|err| CaptureError::Unavailable {
            device: device.to_string(),
            reason: format!("failed to spawn ffmpeg: {err}"),
        })?;

        let stdout = child.stdout.take().ok_or_else(|| CaptureError::Unavailable {
            device: device.to_string(),
            reason: "failed to capture ffmpeg stdout".to_string(),
        })?;

        info!("Opened camera {} at {}x{}", device, width, height);

        Ok(Self {
            child,
            stdout,
            device: device.to_string(),
            width,
            height,
            buffer: vec![0; (width as usize) * (height as usize) * 4],
        })
    }
}

impl CameraDevice for FfmpegCamera {
    fn next_frame(&mut self) -> Result<CapturedFrame, CaptureError> {
        self.stdout
            .read_exact(&mut self.buffer)
            .map_err(|source| CaptureError::Read {
                device: self.device.clone(),
                source,
            })?;

        CapturedFrame::from_rgba(self.buffer.clone(), self.width, self.height).ok_or_else(|| {
            CaptureError::BadFrame {
                device: self.device.clone(),
                reason: "raw frame size mismatch".to_string(),
            }
        })
    }

    fn describe(&self) -> String {
        format!("ffmpeg:{} ({}x{})", self.device, self.width, self.height)
    }
}

impl Drop for FfmpegCamera {
    fn drop(&mut self) {
        if let Err(err) = self.child.kill() {
            debug!("ffmpeg for {} already exited: {}", self.device, err);
        }
        let _ = self.child.wait();
    }
}

/// Translate a camera selector into ffmpeg input arguments.
///
/// A bare number selects a local camera by index, everything else is passed
/// to ffmpeg as-is (device paths, `video=<name>` for dshow, files, URLs).
fn ffmpeg_input_args(device: &str) -> Vec<String> {
    let (format, input) = if let Ok(index) = device.parse::<u32>() {
        if cfg!(target_os = "macos") {
            (Some("avfoundation"), index.to_string())
        } else {
            (Some("video4linux2"), format!("/dev/video{index}"))
        }
    } else if device.starts_with("/dev/video") {
        (Some("video4linux2"), device.to_string())
    } else if device.starts_with("video=") {
        (Some("dshow"), device.to_string())
    } else {
        (None, device.to_string())
    };

    let mut args = Vec::with_capacity(4);
    if let Some(format) = format {
        args.push("-f".to_string());
        args.push(format.to_string());
    }
    args.push("-i".to_string());
    args.push(input);
    args
}

/// Replays still images from a directory in name order, looping forever
pub struct ReplayCamera {
    dir: PathBuf,
    files: Vec<PathBuf>,
    next_index: usize,
    interval: Option<Duration>,
    last_frame_at: Option<Instant>,
}

impl ReplayCamera {
    /// Collect the images in `dir`; an empty directory is an error
    pub fn open(dir: &Path, interval: Option<Duration>) -> Result<Self, CaptureError> {
        let unavailable = |reason: String| CaptureError::Unavailable {
            device: dir.display().to_string(),
            reason,
        };

        let entries = std::fs::read_dir(dir).map_err(|err| unavailable(err.to_string()))?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && is_image_path(path))
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(unavailable("directory contains no images".to_string()));
        }

        info!("Replaying {} images from {:?}", files.len(), dir);

        Ok(Self {
            dir: dir.to_path_buf(),
            files,
            next_index: 0,
            interval,
            last_frame_at: None,
        })
    }

    fn pace(&mut self) {
        if let (Some(interval), Some(last)) = (self.interval, self.last_frame_at) {
            let elapsed = last.elapsed();
            if elapsed < interval {
                thread::sleep(interval - elapsed);
            }
        }
        self.last_frame_at = Some(Instant::now());
    }
}

impl CameraDevice for ReplayCamera {
    fn next_frame(&mut self) -> Result<CapturedFrame, CaptureError> {
        self.pace();

        let path = &self.files[self.next_index];
        self.next_index = (self.next_index + 1) % self.files.len();

        let image = image::open(path).map_err(|err| {
            warn!("Failed to decode {:?}: {}", path, err);
            CaptureError::BadFrame {
                device: path.display().to_string(),
                reason: err.to_string(),
            }
        })?;

        Ok(CapturedFrame::new(image.to_rgba8()))
    }

    fn describe(&self) -> String {
        format!("replay:{} ({} images)", self.dir.display(), self.files.len())
    }
}

fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            matches!(
                ext.to_ascii_lowercase().as_str(),
                "png" | "jpg" | "jpeg" | "bmp" | "webp" | "tif" | "tiff"
            )
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use tempfile::TempDir;

    #[test]
    fn test_ffmpeg_input_args_path() {
        assert_eq!(
            ffmpeg_input_args("/dev/video2"),
            vec!["-f", "video4linux2", "-i", "/dev/video2"]
        );
        assert_eq!(ffmpeg_input_args("video=USB Camera")[1], "dshow");
        assert_eq!(ffmpeg_input_args("clip.mp4"), vec!["-i", "clip.mp4"]);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_ffmpeg_input_args_index() {
        assert_eq!(
            ffmpeg_input_args("1"),
            vec!["-f", "video4linux2", "-i", "/dev/video1"]
        );
    }

    #[test]
    fn test_replay_empty_dir_fails() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not an image").unwrap();

        let result = ReplayCamera::open(dir.path(), None);
        assert!(matches!(result, Err(CaptureError::Unavailable { .. })));
    }

    #[test]
    fn test_replay_cycles_in_name_order() {
        let dir = TempDir::new().unwrap();
        RgbaImage::from_pixel(4, 2, Rgba([10, 0, 0, 255]))
            .save(dir.path().join("a.png"))
            .unwrap();
        RgbaImage::from_pixel(4, 2, Rgba([20, 0, 0, 255]))
            .save(dir.path().join("b.png"))
            .unwrap();

        let mut camera = ReplayCamera::open(dir.path(), None).unwrap();
        let reds: Vec<u8> = (0..3)
            .map(|_| camera.next_frame().unwrap().image.get_pixel(0, 0).0[0])
            .collect();

        assert_eq!(reds, vec![10, 20, 10]);
        assert!(camera.describe().contains("2 images"));
    }
}
