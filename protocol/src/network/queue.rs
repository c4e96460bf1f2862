//! # Inbound Ballot Queue
//!
//! The bounded hand-off between network intake workers and the single
//! consensus owner. Workers push from any task; the state manager pops
//! from its run loop.
//!
//! Backpressure policy: when the queue is full, the oldest ballot whose
//! basis height is not the current height is dropped first. Ballots for
//! the current height are never dropped — if the queue is full of them,
//! it grows past its nominal capacity rather than lose a vote that could
//! complete the round. Drops are counted for the metrics observer.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Notify;

use crate::ballot::Ballot;

/// Bounded multi-producer, single-consumer ballot queue.
pub struct BallotQueue {
    inner: Mutex<VecDeque<Ballot>>,
    notify: Notify,
    capacity: usize,
    current_height: AtomicU64,
    dropped: AtomicU64,
}

impl BallotQueue {
    /// Creates a queue with the given nominal capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            capacity,
            current_height: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Updates the height the drop policy protects. Called by the
    /// consensus owner on every height advance.
    pub fn set_current_height(&self, height: u64) {
        self.current_height.store(height, Ordering::Relaxed);
    }

    /// Enqueues a ballot, applying the drop policy if the queue is full.
    ///
    /// Returns `false` if the incoming ballot itself was dropped.
    pub fn push(&self, ballot: Ballot) -> bool {
        let current = self.current_height.load(Ordering::Relaxed);
        let mut queue = self.inner.lock();

        if queue.len() >= self.capacity {
            if let Some(pos) = queue
                .iter()
                .position(|b| b.basis().height != current)
            {
                queue.remove(pos);
                self.dropped.fetch_add(1, Ordering::Relaxed);
            } else if ballot.basis().height != current {
                // Everything queued is for the current height and the
                // newcomer is not: the newcomer loses.
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return false;
            }
        }

        queue.push_back(ballot);
        drop(queue);
        self.notify.notify_one();
        true
    }

    /// Dequeues the oldest ballot without waiting.
    pub fn try_pop(&self) -> Option<Ballot> {
        self.inner.lock().pop_front()
    }

    /// Dequeues the oldest ballot, waiting until one arrives.
    pub async fn pop(&self) -> Ballot {
        loop {
            if let Some(ballot) = self.try_pop() {
                return ballot;
            }
            self.notify.notified().await;
        }
    }

    /// Number of queued ballots.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// `true` if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Total ballots dropped by the backpressure policy.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
