use super::frame::AudioFrame;
use parking_lot::Mutex;
use ringbuf::{traits::*, HeapRb};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::trace;

/// Bounded, thread-safe FIFO of audio frames.
///
/// `push` never blocks: when the queue is full the incoming frame is dropped
/// and the queued frames are kept. `pop` suspends the calling task until a
/// frame arrives. Producers may live on any thread (including hardware
/// callbacks); there is one async consumer per queue.
pub struct FrameQueue {
    buffer: Arc<Mutex<HeapRb<AudioFrame>>>,
    available: Arc<Notify>,
    dropped: Arc<AtomicU64>,
}

impl FrameQueue {
    /// Create a new queue holding at most `capacity` frames
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(HeapRb::new(capacity.max(1)))),
            available: Arc::new(Notify::new()),
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Insert a frame, returning `false` if it was dropped because the queue is full
    pub fn push(&self, frame: AudioFrame) -> bool {
        let accepted = self.buffer.lock().try_push(frame).is_ok();

        if accepted {
            self.available.notify_one();
        } else {
            let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            trace!("Frame queue full, dropped newest frame ({} dropped so far)", total);
        }

        accepted
    }

    /// Take the oldest frame if one is queued
    pub fn try_pop(&self) -> Option<AudioFrame> {
        self.buffer.lock().try_pop()
    }

    /// Wait for the oldest frame.
    ///
    /// Cancel-safe: a frame is only removed from the queue in the same poll
    /// that returns it.
    pub async fn pop(&self) -> AudioFrame {
        loop {
            if let Some(frame) = self.try_pop() {
                return frame;
            }
            self.available.notified().await;
        }
    }

    /// Discard every queued frame, returning how many were removed
    pub fn clear(&self) -> usize {
        let mut buffer = self.buffer.lock();
        let removed = buffer.occupied_len();
        buffer.clear();
        removed
    }

    /// Get the number of frames available to read
    pub fn len(&self) -> usize {
        self.buffer.lock().occupied_len()
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.buffer.lock().is_empty()
    }

    /// Get the capacity of the queue
    pub fn capacity(&self) -> usize {
        self.buffer.lock().capacity().get()
    }

    /// Frames rejected because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Clone for FrameQueue {
    fn clone(&self) -> Self {
        Self {
            buffer: Arc::clone(&self.buffer),
            available: Arc::clone(&self.available),
            dropped: Arc::clone(&self.dropped),
        }
    }
}
