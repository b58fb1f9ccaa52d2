//! Camera Capture Layer
//!
//! Acquires frames on a dedicated thread and hands them to the recognition
//! loop through a bounded [`FrameQueue`]. Capture never waits for recognition:
//! when the queue is full the oldest pending frame is dropped.

pub mod camera;
pub mod frame;
pub mod queue;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

pub use camera::{CameraDevice, FfmpegCamera, ReplayCamera};
pub use frame::{CaptureRegion, CapturedFrame};
pub use queue::{FrameConsumer, FrameProducer, FrameQueue, QueueError};

/// Consecutive read failures after which the device is treated as gone
const MAX_CONSECUTIVE_ERRORS: u32 = 25;

/// Pause after a failed read before trying again
const ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Camera capture errors
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The device cannot be opened or delivers nothing at startup
    #[error("camera {device:?} unavailable: {reason}")]
    Unavailable { device: String, reason: String },
    /// A read from an open device failed
    #[error("failed to read frame from {device:?}")]
    Read {
        device: String,
        #[source]
        source: std::io::Error,
    },
    /// The device returned data that is not a usable frame
    #[error("bad frame from {device:?}: {reason}")]
    BadFrame { device: String, reason: String },
}

/// Camera capture configuration
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Camera selector: device index, device path or any ffmpeg input
    pub device: String,
    /// Capture width in pixels
    pub width: u32,
    /// Capture height in pixels
    pub height: u32,
    /// Frames that may wait for the recognition loop
    pub queue_capacity: usize,
    /// Replay images from this directory instead of opening a camera
    pub replay_dir: Option<PathBuf>,
    /// Minimum delay between replayed images
    pub frame_interval: Option<Duration>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: "1".to_string(),
            width: 640,
            height: 480,
            queue_capacity: 2,
            replay_dir: None,
            frame_interval: None,
        }
    }
}

/// Open the device described by `config`
pub fn open_camera(config: &CaptureConfig) -> Result<Box<dyn CameraDevice>, CaptureError> {
    match &config.replay_dir {
        Some(dir) => Ok(Box::new(ReplayCamera::open(dir, config.frame_interval)?)),
        None => Ok(Box::new(FfmpegCamera::open(
            &config.device,
            config.width,
            config.height,
        )?)),
    }
}

/// Capture counters shared with the owning thread
#[derive(Debug, Default)]
struct CaptureCounters {
    captured: AtomicU64,
    dropped: AtomicU64,
    errors: AtomicU64,
}

/// Snapshot of capture counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    /// Frames pushed into the queue
    pub captured: u64,
    /// Stale frames evicted because the queue was full
    pub dropped: u64,
    /// Failed device reads
    pub errors: u64,
}

/// Continuously pulls frames from a camera into a [`FrameProducer`]
pub struct FrameSource {
    /// Device and producer, moved onto the capture thread by `start`
    parts: Option<(Box<dyn CameraDevice>, FrameProducer)>,
    description: String,
    frame_size: (u32, u32),
    running: Arc<AtomicBool>,
    counters: Arc<CaptureCounters>,
    handle: Option<JoinHandle<()>>,
}

impl FrameSource {
    /// Wrap `camera`, reading one frame up front.
    ///
    /// Fails if the device cannot deliver that first frame. The frame is
    /// queued so it is not lost, and its size is kept for region derivation.
    pub fn new(
        mut camera: Box<dyn CameraDevice>,
        producer: FrameProducer,
    ) -> Result<Self, CaptureError> {
        let description = camera.describe();
        let first = camera
            .next_frame()
            .map_err(|err| CaptureError::Unavailable {
                device: description.clone(),
                reason: format!("no initial frame: {err}"),
            })?;

        let frame_size = first.dimensions();
        producer.put(first);
        info!(
            "Camera {} ready ({}x{})",
            description, frame_size.0, frame_size.1
        );

        let counters = Arc::new(CaptureCounters::default());
        counters.captured.fetch_add(1, Ordering::Relaxed);

        Ok(Self {
            parts: Some((camera, producer)),
            description,
            frame_size,
            running: Arc::new(AtomicBool::new(false)),
            counters,
            handle: None,
        })
    }

    /// Size of the frames this source delivers
    pub fn frame_size(&self) -> (u32, u32) {
        self.frame_size
    }

    /// Spawn the capture thread. Calling it again is a no-op.
    pub fn start(&mut self) -> std::io::Result<()> {
        let Some((camera, producer)) = self.parts.take() else {
            debug!("Frame source {} already started", self.description);
            return Ok(());
        };

        self.running.store(true, Ordering::SeqCst);
        let running = self.running.clone();
        let counters = self.counters.clone();

        let handle = thread::Builder::new()
            .name("frame-source".to_string())
            .spawn(move || capture_loop(camera, producer, running, counters))?;

        self.handle = Some(handle);
        info!("Frame source {} started", self.description);
        Ok(())
    }

    /// Ask the capture thread to stop after its current read. Idempotent.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            debug!("Frame source {} stopping", self.description);
        }
    }

    /// Stop and wait for the capture thread to exit
    pub fn join(&mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Frame source thread panicked");
            }
            let stats = self.stats();
            info!(
                "Frame source stopped: {} captured, {} dropped, {} errors",
                stats.captured, stats.dropped, stats.errors
            );
        }
    }

    /// Current capture counters
    pub fn stats(&self) -> CaptureStats {
        CaptureStats {
            captured: self.counters.captured.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
        }
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.join();
    }
}

fn capture_loop(
    mut camera: Box<dyn CameraDevice>,
    producer: FrameProducer,
    running: Arc<AtomicBool>,
    counters: Arc<CaptureCounters>,
) {
    let mut consecutive_errors = 0u32;

    while running.load(Ordering::SeqCst) {
        match camera.next_frame() {
            Ok(frame) => {
                consecutive_errors = 0;
                // A stop requested during the read wins over the frame
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                let evicted = producer.put(frame);
                counters.captured.fetch_add(1, Ordering::Relaxed);
                counters.dropped.fetch_add(evicted as u64, Ordering::Relaxed);
            }
            Err(err) => {
                counters.errors.fetch_add(1, Ordering::Relaxed);
                consecutive_errors += 1;
                if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                    error!(
                        "Camera {} failed {} times in a row, giving up: {}",
                        camera.describe(),
                        consecutive_errors,
                        err
                    );
                    break;
                }
                warn!("Camera read failed: {}", err);
                thread::sleep(ERROR_BACKOFF);
            }
        }
    }

    running.store(false, Ordering::SeqCst);
    // Dropping the producer here disconnects the consumer
}
