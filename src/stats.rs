use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};

/// Process-wide counters. Aggregate exactness is not required across
/// concurrent announces, so every field is a relaxed atomic rather than
/// something guarded by a lock shared with the state store.
pub struct Stats {
    start_time: DateTime<Utc>,
    connections_opened: AtomicU64,
    requests: AtomicU64,
    announces_ok: AtomicU64,
    announces_failed: AtomicU64,
    scrapes: AtomicU64,
    bytes_received: AtomicU64,
    bytes_sent: AtomicU64,
}

impl Stats {
    pub fn uptime_secs(&self) -> i64 {
        (Utc::now() - self.start_time).num_seconds()
    }

    pub fn inc_connections_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_requests(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_announces_ok(&self) {
        self.announces_ok.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_announces_failed(&self) {
        self.announces_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_scrapes(&self) {
        self.scrapes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_bytes_received(&self, n: u64) {
        self.bytes_received.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_bytes_sent(&self, n: u64) {
        self.bytes_sent.fetch_add(n, Ordering::Relaxed);
    }

    /// Human-readable lines for the `get=stats` report action.
    pub fn report_lines(&self, seeders: u64, leechers: u64) -> String {
        format!(
            "uptime {}\n\
             requests {}\n\
             connections opened {}\n\
             announces ok {}\n\
             announces failed {}\n\
             scrapes {}\n\
             seeders {}\n\
             leechers {}\n\
             bytes received {}\n\
             bytes sent {}\n",
            self.uptime_secs(),
            self.requests.load(Ordering::Relaxed),
            self.connections_opened.load(Ordering::Relaxed),
            self.announces_ok.load(Ordering::Relaxed),
            self.announces_failed.load(Ordering::Relaxed),
            self.scrapes.load(Ordering::Relaxed),
            seeders,
            leechers,
            self.bytes_received.load(Ordering::Relaxed),
            self.bytes_sent.load(Ordering::Relaxed),
        )
    }
}

impl Default for Stats {
    fn default() -> Stats {
        Stats {
            start_time: Utc::now(),
            connections_opened: AtomicU64::new(0),
            requests: AtomicU64::new(0),
            announces_ok: AtomicU64::new(0),
            announces_failed: AtomicU64::new(0),
            scrapes: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
        }
    }
}
