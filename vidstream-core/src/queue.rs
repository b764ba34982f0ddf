//! Bounded, drop-on-full frame queue shared by two pipeline stages.
//!
//! The producer side ([`push`](BoundedFrameQueue::push)) never waits: when
//! the queue is full one frame is discarded according to the
//! [`OverflowPolicy`] and the event is counted. The consumer side
//! ([`pop`](BoundedFrameQueue::pop)) waits asynchronously until a frame is
//! available or the queue is closed.

use std::collections::VecDeque;
use std::pin::pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

// ── OverflowPolicy ───────────────────────────────────────────────

/// Which frame to discard when a push finds the queue full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Discard the incoming frame; queued frames are kept.
    #[default]
    DropNewest,
    /// Evict the oldest queued frame to make room for the incoming one.
    DropOldest,
}

// ── PushOutcome ──────────────────────────────────────────────────

/// Result of a non-blocking [`push`](BoundedFrameQueue::push).
#[derive(Debug, PartialEq, Eq)]
pub enum PushOutcome<T> {
    /// The frame was enqueued without loss.
    Queued,
    /// The queue was full and the incoming frame was discarded.
    DroppedNewest(T),
    /// The queue was full; the oldest frame was evicted and is returned.
    DroppedOldest(T),
    /// The queue is closed; the frame is handed back.
    Closed(T),
}

impl<T> PushOutcome<T> {
    /// `true` when a frame was lost to make this push succeed (or fail).
    pub fn is_drop(&self) -> bool {
        matches!(
            self,
            PushOutcome::DroppedNewest(_) | PushOutcome::DroppedOldest(_)
        )
    }
}

// ── BoundedFrameQueue ────────────────────────────────────────────

/// Fixed-capacity FIFO with a waiting consumer and a non-blocking producer.
///
/// Invariant: `len() <= capacity()` at all times.
#[derive(Debug)]
pub struct BoundedFrameQueue<T> {
    items: Mutex<VecDeque<T>>,
    capacity: usize,
    policy: OverflowPolicy,
    notify: Notify,
    closed: AtomicBool,
    dropped: AtomicU64,
}

impl<T> BoundedFrameQueue<T> {
    /// Create a queue holding at most `capacity` frames (minimum 1).
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            policy,
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueue `item` without waiting.
    pub fn push(&self, item: T) -> PushOutcome<T> {
        if self.is_closed() {
            return PushOutcome::Closed(item);
        }

        let outcome = {
            let mut items = self.lock();
            if items.len() < self.capacity {
                items.push_back(item);
                PushOutcome::Queued
            } else {
                match self.policy {
                    OverflowPolicy::DropNewest => PushOutcome::DroppedNewest(item),
                    OverflowPolicy::DropOldest => {
                        // capacity >= 1 so a full queue always has a head.
                        let evicted = items.pop_front();
                        items.push_back(item);
                        match evicted {
                            Some(old) => PushOutcome::DroppedOldest(old),
                            None => PushOutcome::Queued,
                        }
                    }
                }
            }
        };

        if outcome.is_drop() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        if !matches!(outcome, PushOutcome::DroppedNewest(_)) {
            self.notify.notify_one();
        }
        outcome
    }

    /// Wait for the next frame.
    ///
    /// Frames queued before [`close`](Self::close) are still handed out;
    /// `None` means the queue is closed and empty.
    pub async fn pop(&self) -> Option<T> {
        loop {
            let mut notified = pin!(self.notify.notified());
            // Register before checking so a close() racing with us still wakes us.
            notified.as_mut().enable();

            if let Some(item) = self.lock().pop_front() {
                return Some(item);
            }
            if self.is_closed() {
                return None;
            }

            notified.await;
        }
    }

    /// Take the next frame if one is ready.
    pub fn try_pop(&self) -> Option<T> {
        self.lock().pop_front()
    }

    /// Close the queue and wake every waiting consumer.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of frames currently queued.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Total frames discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<T>> {
        // A panic while holding the lock cannot leave the deque half-updated.
        self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn drain<T>(q: &BoundedFrameQueue<T>) -> Vec<T> {
        std::iter::from_fn(|| q.try_pop()).collect()
    }

    #[test]
    fn fifo_order() {
        let q = BoundedFrameQueue::new(4, OverflowPolicy::DropNewest);
        for i in 0..3 {
            assert_eq!(q.push(i), PushOutcome::Queued);
        }
        assert_eq!(drain(&q), vec![0, 1, 2]);
    }

    #[test]
    fn drop_newest_keeps_first_items() {
        let q = BoundedFrameQueue::new(3, OverflowPolicy::DropNewest);
        for i in 0..3 {
            q.push(i);
        }
        assert_eq!(q.push(3), PushOutcome::DroppedNewest(3));
        assert_eq!(q.push(4), PushOutcome::DroppedNewest(4));
        assert_eq!(q.len(), 3);
        assert_eq!(q.dropped(), 2);
        assert_eq!(drain(&q), vec![0, 1, 2]);
    }

    #[test]
    fn drop_oldest_keeps_most_recent_items() {
        let q = BoundedFrameQueue::new(3, OverflowPolicy::DropOldest);
        for i in 0..3 {
            q.push(i);
        }
        assert_eq!(q.push(3), PushOutcome::DroppedOldest(0));
        assert_eq!(q.push(4), PushOutcome::DroppedOldest(1));
        assert_eq!(q.len(), 3);
        assert_eq!(q.dropped(), 2);
        assert_eq!(drain(&q), vec![2, 3, 4]);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let q = BoundedFrameQueue::new(0, OverflowPolicy::DropNewest);
        assert_eq!(q.capacity(), 1);
        assert_eq!(q.push(1), PushOutcome::Queued);
        assert!(q.push(2).is_drop());
    }

    #[test]
    fn push_after_close_is_rejected() {
        let q = BoundedFrameQueue::new(2, OverflowPolicy::DropNewest);
        q.close();
        assert_eq!(q.push(7), PushOutcome::Closed(7));
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn pop_waits_for_push() {
        let q = Arc::new(BoundedFrameQueue::new(2, OverflowPolicy::DropNewest));
        let consumer = tokio::spawn({
            let q = Arc::clone(&q);
            async move { q.pop().await }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        q.push(42);

        let got = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .expect("consumer did not wake")
            .unwrap();
        assert_eq!(got, Some(42));
    }

    #[tokio::test]
    async fn close_wakes_blocked_consumer() {
        let q: Arc<BoundedFrameQueue<u32>> =
            Arc::new(BoundedFrameQueue::new(2, OverflowPolicy::DropNewest));
        let consumer = tokio::spawn({
            let q = Arc::clone(&q);
            async move { q.pop().await }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        q.close();

        let got = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .expect("close did not wake the consumer")
            .unwrap();
        assert_eq!(got, None);
    }

    #[tokio::test]
    async fn closed_queue_drains_before_ending() {
        let q = BoundedFrameQueue::new(4, OverflowPolicy::DropNewest);
        q.push(1);
        q.push(2);
        q.close();
        assert_eq!(q.pop().await, Some(1));
        assert_eq!(q.pop().await, Some(2));
        assert_eq!(q.pop().await, None);
    }
}
