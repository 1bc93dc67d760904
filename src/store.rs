//! Startup (and `SIGUSR1`-triggered) reconciliation of the in-memory state
//! store against the database (§4.1). Each `load_*` diffs the DB against
//! what's already in memory: existing keys are updated in place and
//! removed from a "survivors" set seeded with the current keys, new rows
//! are inserted, and whatever remains in "survivors" afterward has been
//! deleted upstream and is evicted here.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::Row;
use tracing::{info, warn};

use crate::tracker::del_reason::DelReasons;
use crate::tracker::info_hash::InfoHash;
use crate::tracker::passkey::Passkey;
use crate::tracker::status::Status;
use crate::tracker::torrent::{Freeleech, Torrent};
use crate::tracker::user::User;
use crate::tracker::whitelist::Whitelist;
use crate::tracker::Tracker;

pub async fn load_all(tracker: &Arc<Tracker>) -> Result<()> {
    let was_reload = !tracker.torrents.lock().is_empty();
    if was_reload {
        tracker.status.set(Status::Paused);
    }

    load_users(tracker).await?;
    info!("loaded {} users", tracker.users.lock().len());

    load_torrents(tracker).await?;
    info!("loaded {} torrents", tracker.torrents.lock().len());

    load_tokens(tracker).await?;
    load_whitelist(tracker).await?;
    info!(
        "loaded {} whitelist entries",
        tracker.whitelist.lock().len()
    );

    if was_reload {
        tracker.status.set(Status::Open);
    }

    Ok(())
}

async fn load_users(tracker: &Arc<Tracker>) -> Result<()> {
    let rows = sqlx::query(
        "SELECT ID, torrent_pass, can_leech, Visible, IP FROM users_main WHERE Enabled = '1'",
    )
    .fetch_all(&tracker.pool)
    .await
    .context("failed loading users")?;

    let mut users = tracker.users.lock();
    let mut passkey2id = tracker.passkey2id.lock();
    let mut survivors: HashSet<u32> = users.keys().copied().collect();

    for row in rows {
        let id: u32 = row.try_get("ID").context("users.ID")?;
        let passkey_raw: String = row.try_get("torrent_pass").context("users.torrent_pass")?;
        let can_leech: String = row.try_get("can_leech").unwrap_or_else(|_| "1".to_owned());
        let visible: String = row.try_get("Visible").unwrap_or_else(|_| "1".to_owned());
        let ip: String = row.try_get("IP").unwrap_or_default();

        let passkey: Passkey = match passkey_raw.parse() {
            Ok(p) => p,
            Err(_) => {
                warn!("skipping user {id}: malformed passkey");
                continue;
            }
        };

        let leech = can_leech == "1";
        let protect = visible == "0" || ip == "127.0.0.1";

        survivors.remove(&id);

        match users.get_mut(&id) {
            Some(user) => {
                user.leech = leech;
                user.protect = protect;
                user.deleted = false;
            }
            None => {
                users.insert(id, User::new(id, passkey, leech, protect));
            }
        }
        passkey2id.insert(passkey, id);
    }

    for id in survivors {
        if let Some(user) = users.remove(&id) {
            passkey2id.retain(|_, v| *v != id);
            warn!("evicted user {id}: no longer present in users_main");
            drop(user);
        }
    }

    Ok(())
}

async fn load_torrents(tracker: &Arc<Tracker>) -> Result<()> {
    let rows = sqlx::query("SELECT ID, info_hash, FreeTorrent, Snatched, Balance FROM torrents")
        .fetch_all(&tracker.pool)
        .await
        .context("failed loading torrents")?;

    let mut torrents = tracker.torrents.lock();
    let mut infohash2id = tracker.infohash2id.lock();
    let mut users = tracker.users.lock();
    let mut survivors: HashSet<u32> = torrents.keys().copied().collect();

    for row in rows {
        let id: u32 = row.try_get("ID").context("torrents.ID")?;
        let info_hash_raw: Vec<u8> = row.try_get("info_hash").context("torrents.info_hash")?;
        let free_torrent: i8 = row.try_get("FreeTorrent").unwrap_or(0);
        let snatched: i64 = row.try_get("Snatched").unwrap_or(0);
        let balance: i64 = row.try_get("Balance").unwrap_or(0);

        let info_hash = match InfoHash::try_from(info_hash_raw.as_slice()) {
            Ok(h) => h,
            Err(_) => {
                warn!("skipping torrent {id}: malformed info_hash");
                continue;
            }
        };

        survivors.remove(&id);

        match torrents.get_mut(&id) {
            Some(torrent) => {
                torrent.completed = snatched.max(0) as u64;
                torrent.balance = balance;
                torrent.freeleech = Freeleech::from_db_code(free_torrent);
            }
            None => {
                let mut torrent =
                    Torrent::new(id, info_hash, snatched.max(0) as u64, Freeleech::from_db_code(free_torrent));
                torrent.balance = balance;
                torrents.insert(id, torrent);
            }
        }
        infohash2id.insert(info_hash, id);
    }

    for id in survivors {
        if let Some(torrent) = torrents.remove(&id) {
            infohash2id.retain(|_, v| *v != id);
            for (_, peer) in torrent.seeders.iter().chain(torrent.leechers.iter()) {
                if let Some(user) = users.get(&peer.user_id) {
                    if peer.is_seeder() {
                        user.dec_seeding();
                    } else {
                        user.dec_leeching();
                    }
                }
            }
            warn!("evicted torrent {id}: no longer present in torrents table");
        }
    }

    Ok(())
}

async fn load_tokens(tracker: &Arc<Tracker>) -> Result<()> {
    let rows = sqlx::query(
        "SELECT UserID, TorrentID FROM users_freeleeches WHERE Expired = 0",
    )
    .fetch_all(&tracker.pool)
    .await
    .context("failed loading freeleech tokens")?;

    let mut torrents = tracker.torrents.lock();

    // Tokens are re-derived wholesale from the DB each reload; clear any
    // stale in-memory state first.
    for torrent in torrents.values_mut() {
        torrent.tokened_users.clear();
    }

    let mut loaded = 0;
    for row in rows {
        let user_id: u32 = row.try_get("UserID").context("users_freeleeches.UserID")?;
        let torrent_id: u32 = row.try_get("TorrentID").context("users_freeleeches.TorrentID")?;

        if let Some(torrent) = torrents.get_mut(&torrent_id) {
            torrent.tokened_users.insert(user_id);
            loaded += 1;
        }
    }
    info!("loaded {loaded} freeleech tokens");

    Ok(())
}

async fn load_whitelist(tracker: &Arc<Tracker>) -> Result<()> {
    let rows = sqlx::query("SELECT peer_id FROM xbt_client_whitelist")
        .fetch_all(&tracker.pool)
        .await
        .context("failed loading whitelist")?;

    let mut prefixes = Vec::with_capacity(rows.len());
    for row in rows {
        let prefix: Vec<u8> = row.try_get("peer_id").context("xbt_client_whitelist.peer_id")?;
        prefixes.push(prefix);
    }

    *tracker.whitelist.lock() = Whitelist::from_prefixes(prefixes);

    Ok(())
}

/// Used only by tests that want to assert the survivors-diff shape without
/// a database; kept here rather than in `del_reason` since it exercises
/// this module's eviction bookkeeping convention.
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn survivor_set_starts_as_every_existing_key() {
        let existing: HashMap<u32, ()> = HashMap::from([(1, ()), (2, ()), (3, ())]);
        let mut survivors: HashSet<u32> = existing.keys().copied().collect();
        survivors.remove(&1);
        survivors.remove(&2);
        assert_eq!(survivors, HashSet::from([3]));
    }

    #[test]
    fn del_reasons_default_is_empty() {
        let cache = DelReasons::new();
        assert_eq!(cache.get(&InfoHash([0; 20])), None);
    }
}
