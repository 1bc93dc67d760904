//! The write-behind pipeline (§4.6): five independent lanes, each with a
//! buffer fed from the request path and a queue of batches drained by a
//! writer task spawned on demand. A lane's writer task exits once its queue
//! runs dry; the next scheduler tick respawns one if the buffer refilled.

pub mod peers;
pub mod snatches;
pub mod tokens;
pub mod torrents;
pub mod users;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

pub struct Lane<T> {
    buffer: Mutex<Vec<T>>,
    queue: Mutex<VecDeque<Vec<T>>>,
    active: AtomicBool,
}

impl<T> Lane<T> {
    pub fn new() -> Lane<T> {
        Lane {
            buffer: Mutex::new(Vec::new()),
            queue: Mutex::new(VecDeque::new()),
            active: AtomicBool::new(false),
        }
    }

    pub fn push(&self, record: T) {
        self.buffer.lock().push(record);
    }

    pub fn clear_buffer(&self) {
        self.buffer.lock().clear();
    }

    /// Moves the buffer into the queue if non-empty. Returns whether
    /// anything was enqueued.
    pub fn rotate(&self) -> bool {
        let mut buffer = self.buffer.lock();
        if buffer.is_empty() {
            return false;
        }
        let batch = std::mem::take(&mut *buffer);
        drop(buffer);
        self.queue.lock().push_back(batch);
        true
    }

    /// Same as `rotate`, but drops the oldest queued batch whenever the
    /// queue exceeds `max_batches` afterwards. Only the peer lane uses this
    /// (§4.6's backpressure quirk): everything else would rather stall than
    /// silently lose an update.
    pub fn rotate_with_cap(&self, max_batches: usize) -> bool {
        let enqueued = self.rotate();
        if enqueued {
            let mut queue = self.queue.lock();
            while queue.len() > max_batches {
                queue.pop_front();
            }
        }
        enqueued
    }

    /// Claims the right to run this lane's writer loop. Only one task may
    /// hold this at a time; returns false if another writer is already
    /// active.
    pub fn try_claim(&self) -> bool {
        self.active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn release(&self) {
        self.active.store(false, Ordering::Release);
    }

    pub fn pop_front(&self) -> Option<Vec<T>> {
        self.queue.lock().pop_front()
    }

    /// Puts a batch that failed to flush back at the head of the queue so
    /// the next writer attempt retries it first.
    pub fn requeue_front(&self, batch: Vec<T>) {
        self.queue.lock().push_front(batch);
    }
}

impl<T> Default for Lane<T> {
    fn default() -> Self {
        Lane::new()
    }
}

pub struct Lanes {
    pub users: Lane<users::UserUpdate>,
    pub torrents: Lane<torrents::TorrentUpdate>,
    pub snatches: Lane<snatches::SnatchRecord>,
    pub peers: Lane<peers::PeerRecord>,
    pub tokens: Lane<tokens::TokenUseRecord>,
}

impl Lanes {
    pub fn new() -> Lanes {
        Lanes {
            users: Lane::new(),
            torrents: Lane::new(),
            snatches: Lane::new(),
            peers: Lane::new(),
            tokens: Lane::new(),
        }
    }
}

impl Default for Lanes {
    fn default() -> Self {
        Lanes::new()
    }
}

/// Peer lane queue depth above which the oldest unwritten batch is dropped
/// rather than stalling the announce path.
pub const PEER_LANE_MAX_BATCHES: usize = 1000;
