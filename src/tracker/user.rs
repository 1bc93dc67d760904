use std::sync::atomic::{AtomicU32, Ordering};

use super::passkey::Passkey;

/// An account's tracker-relevant state, mirrored in memory from the
/// `users_main` table and kept current by the announce path and
/// control-plane actions.
pub struct User {
    pub id: u32,
    pub passkey: Passkey,
    /// May this user download at all.
    pub leech: bool,
    /// Suppress this user's IP from persisted peer records.
    pub protect: bool,
    pub deleted: bool,
    leeching: AtomicU32,
    seeding: AtomicU32,
}

impl User {
    pub fn new(id: u32, passkey: Passkey, leech: bool, protect: bool) -> User {
        User {
            id,
            passkey,
            leech,
            protect,
            deleted: false,
            leeching: AtomicU32::new(0),
            seeding: AtomicU32::new(0),
        }
    }

    pub fn leeching(&self) -> u32 {
        self.leeching.load(Ordering::Relaxed)
    }

    pub fn seeding(&self) -> u32 {
        self.seeding.load(Ordering::Relaxed)
    }

    pub fn inc_leeching(&self) {
        self.leeching.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec_leeching(&self) {
        self.leeching.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| Some(v.saturating_sub(1))).ok();
    }

    pub fn inc_seeding(&self) {
        self.seeding.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec_seeding(&self) {
        self.seeding.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| Some(v.saturating_sub(1))).ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_never_go_negative() {
        let user = User::new(1, Passkey([b'a'; 32]), true, false);
        user.dec_leeching();
        assert_eq!(user.leeching(), 0);
        user.inc_leeching();
        user.dec_leeching();
        assert_eq!(user.leeching(), 0);
    }
}
