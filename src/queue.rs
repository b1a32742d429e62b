//! Bounded ingestion queue.
//!
//! A mutex-guarded FIFO with a hard capacity. Inserts fail fast when the
//! queue is full or closed so the HTTP ingress can push backpressure onto
//! the crawlers instead of buffering without bound. Closing is one-way:
//! buffered items keep draining, new inserts are refused.

use crate::models::PageData;
use std::collections::VecDeque;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue is full")]
    Full,
    #[error("queue is closed")]
    Closed,
    #[error("queue is empty")]
    Empty,
    #[error("capacity should be greater than 0")]
    InvalidCapacity,
}

pub struct BoundedQueue {
    inner: Mutex<Inner>,
}

struct Inner {
    buf: VecDeque<PageData>,
    capacity: usize,
    closed: bool,
}

impl BoundedQueue {
    /// Create an empty queue with the given capacity.
    pub fn new(capacity: usize) -> Result<Self, QueueError> {
        if capacity == 0 {
            return Err(QueueError::InvalidCapacity);
        }
        Ok(Self {
            inner: Mutex::new(Inner {
                buf: VecDeque::with_capacity(capacity),
                capacity,
                closed: false,
            }),
        })
    }

    /// Append an item, failing if the queue is closed or at capacity.
    pub fn insert(&self, item: PageData) -> Result<(), QueueError> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(QueueError::Closed);
        }
        if inner.buf.len() >= inner.capacity {
            return Err(QueueError::Full);
        }
        inner.buf.push_back(item);
        Ok(())
    }

    /// Remove the oldest item. Draining continues after close.
    pub fn remove(&self) -> Result<PageData, QueueError> {
        self.lock().buf.pop_front().ok_or(QueueError::Empty)
    }

    pub fn len(&self) -> usize {
        self.lock().buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().buf.is_empty()
    }

    /// Stop accepting inserts. Idempotent.
    pub fn close(&self) {
        self.lock().closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock means a panic while holding it; the queue state is
        // a plain VecDeque and still coherent, so keep going.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
