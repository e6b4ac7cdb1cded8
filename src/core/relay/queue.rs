//! The two queues shared between relay flows.
//!
//! - Upstream: bounded, inbound collector -> upstream sender. A full queue
//!   suspends the producer instead of dropping audio.
//! - Outbound: unbounded, downstream receiver -> outbound dispatcher. Pushing
//!   never suspends the receiver; `flush` voids everything queued so far.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc};

use crate::core::audio::AudioFrame;

/// Default upstream queue capacity.
pub const DEFAULT_UPSTREAM_CAPACITY: usize = 5;

/// Producer half of the upstream queue.
pub type UpstreamProducer = mpsc::Sender<AudioFrame>;

/// Consumer half of the upstream queue.
pub type UpstreamConsumer = mpsc::Receiver<AudioFrame>;

/// Create the bounded upstream queue. A capacity of zero is raised to one.
pub fn upstream_queue(capacity: usize) -> (UpstreamProducer, UpstreamConsumer) {
    mpsc::channel(capacity.max(1))
}

#[derive(Debug, Default)]
struct OutboundInner {
    frames: VecDeque<AudioFrame>,
    epoch: u64,
}

/// Unbounded FIFO of agent audio awaiting delivery.
///
/// Every flush bumps an epoch. [`OutboundQueue::pop`] returns the epoch a
/// frame was taken in, so a consumer that popped just before a flush can
/// tell the frame is void and skip it.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    inner: Mutex<OutboundInner>,
    notify: Notify,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a frame. Never suspends.
    pub fn push(&self, frame: AudioFrame) {
        self.inner.lock().frames.push_back(frame);
        self.notify.notify_one();
    }

    /// Remove the oldest frame, waiting while the queue is empty.
    pub async fn pop(&self) -> (u64, AudioFrame) {
        loop {
            let notified = self.notify.notified();
            {
                let mut inner = self.inner.lock();
                if let Some(frame) = inner.frames.pop_front() {
                    return (inner.epoch, frame);
                }
            }
            notified.await;
        }
    }

    /// Discard every pending frame at once. Returns how many were dropped.
    pub fn flush(&self) -> usize {
        let mut inner = self.inner.lock();
        let dropped = inner.frames.len();
        inner.frames.clear();
        inner.epoch = inner.epoch.wrapping_add(1);
        dropped
    }

    /// Whether a frame popped in `epoch` is still deliverable.
    pub fn is_current(&self, epoch: u64) -> bool {
        self.inner.lock().epoch == epoch
    }

    pub fn len(&self) -> usize {
        self.inner.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_test::{assert_pending, assert_ready, task};

    fn frame(tag: u8) -> AudioFrame {
        AudioFrame::pcm(vec![tag; 4])
    }

    #[tokio::test]
    async fn test_outbound_fifo() {
        let queue = OutboundQueue::new();
        for tag in 0..3 {
            queue.push(frame(tag));
        }
        for tag in 0..3 {
            let (_, f) = queue.pop().await;
            assert_eq!(f.payload()[0], tag);
        }
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_outbound_flush_discards_all() {
        let queue = OutboundQueue::new();
        for tag in 0..5 {
            queue.push(frame(tag));
        }
        assert_eq!(queue.flush(), 5);
        assert!(queue.is_empty());

        queue.push(frame(9));
        let (epoch, f) = queue.pop().await;
        assert!(queue.is_current(epoch));
        assert_eq!(f.payload()[0], 9);
    }

    #[tokio::test]
    async fn test_popped_frame_is_void_after_flush() {
        let queue = OutboundQueue::new();
        queue.push(frame(1));
        let (epoch, _) = queue.pop().await;
        queue.flush();
        assert!(!queue.is_current(epoch));
    }

    #[tokio::test]
    async fn test_pop_waits_for_push() {
        let queue = Arc::new(OutboundQueue::new());
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.push(frame(7));
        let (_, f) = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(f.payload()[0], 7);
    }

    #[tokio::test]
    async fn test_upstream_producer_suspends_when_full() {
        let (tx, mut rx) = upstream_queue(2);
        tx.send(frame(0)).await.unwrap();
        tx.send(frame(1)).await.unwrap();

        let mut blocked = task::spawn(tx.send(frame(2)));
        assert_pending!(blocked.poll());

        assert_eq!(rx.recv().await.unwrap().payload()[0], 0);
        assert!(blocked.is_woken());
        assert_ready!(blocked.poll()).unwrap();
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let (tx, _rx) = upstream_queue(0);
        assert_eq!(tx.max_capacity(), 1);
    }
}
