use std::sync::atomic::{AtomicU8, Ordering};

/// Tracker-wide serving state, flipped by signal handling (§5). Announce
/// and scrape requests consult this before touching the state store.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Status {
    Open,
    Paused,
    Closing,
}

impl Status {
    fn to_u8(self) -> u8 {
        match self {
            Status::Open => 0,
            Status::Paused => 1,
            Status::Closing => 2,
        }
    }

    fn from_u8(v: u8) -> Status {
        match v {
            0 => Status::Open,
            1 => Status::Paused,
            _ => Status::Closing,
        }
    }
}

/// Atomic cell so every handler task can check tracker status without
/// taking any of the state-store locks.
pub struct StatusCell(AtomicU8);

impl StatusCell {
    pub fn new(initial: Status) -> StatusCell {
        StatusCell(AtomicU8::new(initial.to_u8()))
    }

    pub fn get(&self) -> Status {
        Status::from_u8(self.0.load(Ordering::Relaxed))
    }

    pub fn set(&self, status: Status) {
        self.0.store(status.to_u8(), Ordering::Relaxed);
    }
}

impl Default for StatusCell {
    fn default() -> Self {
        StatusCell::new(Status::Open)
    }
}
