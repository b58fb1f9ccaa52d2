//! Bounded frame hand-off between the capture thread and the recognition loop
//!
//! The producer never blocks: when the queue is full the oldest pending frame
//! is discarded to make room. The consumer blocks up to a timeout.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::time::Duration;
use thiserror::Error;

use super::frame::CapturedFrame;

/// Reasons a consumer can come back without a frame
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    /// Nothing arrived within the timeout
    #[error("no frame received within {0:?}")]
    Timeout(Duration),
    /// The producer side has been dropped
    #[error("frame producer disconnected")]
    Disconnected,
}

/// Constructor for a single-producer/single-consumer frame queue
pub struct FrameQueue;

impl FrameQueue {
    /// Create a queue holding at most `capacity` pending frames (minimum 1)
    pub fn bounded(capacity: usize) -> (FrameProducer, FrameConsumer) {
        let (tx, rx) = bounded(capacity.max(1));
        (
            FrameProducer {
                tx,
                overflow: rx.clone(),
            },
            FrameConsumer { rx },
        )
    }
}

/// Producer half, owned by the frame source
pub struct FrameProducer {
    tx: Sender<CapturedFrame>,
    /// Receiver clone used only to evict the oldest frame on overflow
    overflow: Receiver<CapturedFrame>,
}

impl FrameProducer {
    /// Push a frame without blocking.
    ///
    /// Returns the number of stale frames evicted to make room.
    pub fn put(&self, frame: CapturedFrame) -> usize {
        let mut frame = frame;
        let mut evicted = 0;
        loop {
            match self.tx.try_send(frame) {
                Ok(()) => return evicted,
                Err(TrySendError::Full(rejected)) => {
                    if self.overflow.try_recv().is_ok() {
                        evicted += 1;
                    }
                    frame = rejected;
                }
                // Unreachable while `overflow` is alive, kept for completeness
                Err(TrySendError::Disconnected(_)) => return evicted,
            }
        }
    }
}

/// Consumer half, owned by the recognition loop
pub struct FrameConsumer {
    rx: Receiver<CapturedFrame>,
}

impl FrameConsumer {
    /// Wait up to `timeout` for the next frame in FIFO order
    pub fn get(&self, timeout: Duration) -> Result<CapturedFrame, QueueError> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => QueueError::Timeout(timeout),
            RecvTimeoutError::Disconnected => QueueError::Disconnected,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use std::thread;
    use std::time::Instant;

    /// 1x1 frame whose red channel carries an id
    fn frame(id: u8) -> CapturedFrame {
        CapturedFrame::new(RgbaImage::from_pixel(1, 1, Rgba([id, 0, 0, 255])))
    }

    fn id_of(frame: &CapturedFrame) -> u8 {
        frame.image.get_pixel(0, 0).0[0]
    }

    #[test]
    fn test_fifo_order() {
        let (producer, consumer) = FrameQueue::bounded(4);
        for id in 1..=3 {
            assert_eq!(producer.put(frame(id)), 0);
        }
        for id in 1..=3 {
            let got = consumer.get(Duration::from_millis(10)).unwrap();
            assert_eq!(id_of(&got), id);
        }
    }

    #[test]
    fn test_full_queue_drops_oldest() {
        let (producer, consumer) = FrameQueue::bounded(2);
        producer.put(frame(1));
        producer.put(frame(2));
        assert_eq!(producer.put(frame(3)), 1);
        assert_eq!(producer.tx.len(), 2);

        let first = consumer.get(Duration::from_millis(10)).unwrap();
        let second = consumer.get(Duration::from_millis(10)).unwrap();
        assert_eq!((id_of(&first), id_of(&second)), (2, 3));
    }

    #[test]
    fn test_get_times_out() {
        let (_producer, consumer) = FrameQueue::bounded(1);
        let start = Instant::now();
        let result = consumer.get(Duration::from_millis(30));
        assert_eq!(result.unwrap_err(), QueueError::Timeout(Duration::from_millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_get_disconnected() {
        let (producer, consumer) = FrameQueue::bounded(1);
        drop(producer);
        assert_eq!(
            consumer.get(Duration::from_millis(10)).unwrap_err(),
            QueueError::Disconnected
        );
    }

    #[test]
    fn test_cross_thread_no_duplicates() {
        let (producer, consumer) = FrameQueue::bounded(1);
        let handle = thread::spawn(move || {
            for id in 0..50 {
                producer.put(frame(id));
            }
        });
        handle.join().unwrap();

        // Only the newest frame survives a capacity-1 queue
        let last = consumer.get(Duration::from_millis(10)).unwrap();
        assert_eq!(id_of(&last), 49);
        assert!(consumer.get(Duration::from_millis(10)).is_err());
    }
}
