//! Bounded hand-off between capture and classification.
//!
//! The capture side never blocks: frames that arrive while the queue is full
//! are dropped, and a sampling stride thins the stream before it reaches the
//! queue at all. The single dispatch worker blocks in `dequeue` until a frame
//! arrives or the broker is closed.
//!
//! Frames travel as `Arc<Frame>` so the capture side can publish the same
//! frame elsewhere without copying pixels.

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::frame::Frame;

pub const DEFAULT_QUEUE_CAPACITY: usize = 10;
pub const DEFAULT_FRAME_STRIDE: u32 = 3;

/// What happened to a frame offered to the broker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    Queued,
    /// Not on the sampling stride.
    Skipped,
    /// Queue full.
    Dropped,
    Closed,
}

/// Broker counters since construction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BrokerStats {
    pub offered: u64,
    pub queued: u64,
    pub skipped: u64,
    pub dropped: u64,
    pub dequeued: u64,
    pub pending: usize,
}

struct Queue {
    frames: VecDeque<Arc<Frame>>,
    closed: bool,
}

pub struct FrameBroker {
    queue: Mutex<Queue>,
    available: Condvar,
    capacity: AtomicUsize,
    stride: AtomicU64,
    offered: AtomicU64,
    queued: AtomicU64,
    skipped: AtomicU64,
    dropped: AtomicU64,
    dequeued: AtomicU64,
}

impl FrameBroker {
    pub fn new(capacity: usize, stride: u32) -> Self {
        let capacity = capacity.max(1);
        Self {
            queue: Mutex::new(Queue {
                frames: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            available: Condvar::new(),
            capacity: AtomicUsize::new(capacity),
            stride: AtomicU64::new(stride.max(1) as u64),
            offered: AtomicU64::new(0),
            queued: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            dequeued: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::SeqCst)
    }

    pub fn stride(&self) -> u32 {
        self.stride.load(Ordering::SeqCst) as u32
    }

    /// New capacity applies to the next enqueue; frames already queued stay.
    pub fn set_capacity(&self, capacity: usize) {
        self.capacity.store(capacity.max(1), Ordering::SeqCst);
    }

    pub fn set_stride(&self, stride: u32) {
        self.stride.store(stride.max(1) as u64, Ordering::SeqCst);
    }

    /// Offer a captured frame: apply the sampling stride, then enqueue.
    ///
    /// The first captured frame is always on the stride.
    pub fn submit(&self, frame: Arc<Frame>) -> SubmitOutcome {
        let index = self.offered.fetch_add(1, Ordering::SeqCst);
        if index % self.stride.load(Ordering::SeqCst) != 0 {
            self.skipped.fetch_add(1, Ordering::SeqCst);
            return SubmitOutcome::Skipped;
        }
        self.enqueue(frame)
    }

    /// Non-blocking enqueue. A full queue drops `frame`.
    pub fn enqueue(&self, frame: Arc<Frame>) -> SubmitOutcome {
        let mut queue = self.lock();
        if queue.closed {
            return SubmitOutcome::Closed;
        }
        if queue.frames.len() >= self.capacity() {
            drop(queue);
            self.dropped.fetch_add(1, Ordering::SeqCst);
            log::trace!("broker full; dropped frame {}", frame.sequence);
            return SubmitOutcome::Dropped;
        }
        queue.frames.push_back(frame);
        drop(queue);
        self.queued.fetch_add(1, Ordering::SeqCst);
        self.available.notify_one();
        SubmitOutcome::Queued
    }

    /// Block until a frame is available. `None` once the broker is closed.
    pub fn dequeue(&self) -> Option<Arc<Frame>> {
        let mut queue = self.lock();
        loop {
            if queue.closed {
                return None;
            }
            if let Some(frame) = queue.frames.pop_front() {
                self.dequeued.fetch_add(1, Ordering::SeqCst);
                return Some(frame);
            }
            queue = self
                .available
                .wait(queue)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like [`FrameBroker::dequeue`] but gives up after `timeout`.
    pub fn dequeue_timeout(&self, timeout: Duration) -> Option<Arc<Frame>> {
        let deadline = Instant::now() + timeout;
        let mut queue = self.lock();
        loop {
            if queue.closed {
                return None;
            }
            if let Some(frame) = queue.frames.pop_front() {
                self.dequeued.fetch_add(1, Ordering::SeqCst);
                return Some(frame);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, _) = self
                .available
                .wait_timeout(queue, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            queue = guard;
        }
    }

    /// Wake the dispatch worker and refuse further frames.
    pub fn close(&self) {
        let mut queue = self.lock();
        queue.closed = true;
        queue.frames.clear();
        drop(queue);
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> BrokerStats {
        BrokerStats {
            offered: self.offered.load(Ordering::SeqCst),
            queued: self.queued.load(Ordering::SeqCst),
            skipped: self.skipped.load(Ordering::SeqCst),
            dropped: self.dropped.load(Ordering::SeqCst),
            dequeued: self.dequeued.load(Ordering::SeqCst),
            pending: self.len(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for FrameBroker {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY, DEFAULT_FRAME_STRIDE)
    }
}
