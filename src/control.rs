//! Administrative control plane (§4.4). Every action takes the matching
//! store lock, mutates in place, and returns the literal text `success` —
//! including for an unknown action, which only gets a warning log.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use crate::tracker::del_reason::del_reason_label;
use crate::tracker::info_hash::InfoHash;
use crate::tracker::passkey::Passkey;
use crate::tracker::torrent::{Freeleech, Torrent};
use crate::tracker::user::User;
use crate::tracker::Tracker;

pub async fn dispatch(tracker: &Arc<Tracker>, params: &HashMap<String, String>) -> &'static str {
    let Some(action) = params.get("action").map(String::as_str) else {
        warn!("control action missing 'action' parameter");
        return "success";
    };

    match action {
        "change_passkey" => change_passkey(tracker, params),
        "add_torrent" => add_torrent(tracker, params),
        "update_torrent" => update_torrent(tracker, params),
        "update_torrents" => update_torrents(tracker, params),
        "add_token" => add_token(tracker, params),
        "remove_token" => remove_token(tracker, params),
        "delete_torrent" => delete_torrent(tracker, params),
        "add_user" => add_user(tracker, params),
        "remove_user" => remove_user(tracker, params),
        "remove_users" => remove_users(tracker, params),
        "update_user" => update_user(tracker, params),
        "add_whitelist" => add_whitelist(tracker, params),
        "remove_whitelist" => remove_whitelist(tracker, params),
        "edit_whitelist" => edit_whitelist(tracker, params),
        "update_announce_interval" => update_announce_interval(tracker, params),
        "info_torrent" => info_torrent(tracker, params),
        other => {
            warn!("unknown control action: {other}");
            "success"
        }
    }
}

fn hash_param(params: &HashMap<String, String>, key: &str) -> Option<InfoHash> {
    params
        .get(key)
        .and_then(|v| hex::decode_to_info_hash(v))
}

/// A minimal inline hex decoder for the control plane, which receives
/// info-hashes as plain hex rather than percent-encoded bytes.
mod hex {
    use crate::tracker::info_hash::InfoHash;

    pub fn decode_to_info_hash(s: &str) -> Option<InfoHash> {
        if s.len() != 40 {
            return None;
        }
        let mut bytes = [0u8; 20];
        for (i, chunk) in s.as_bytes().chunks_exact(2).enumerate() {
            let hi = (chunk[0] as char).to_digit(16)?;
            let lo = (chunk[1] as char).to_digit(16)?;
            bytes[i] = (hi * 16 + lo) as u8;
        }
        Some(InfoHash(bytes))
    }
}

fn change_passkey(tracker: &Arc<Tracker>, params: &HashMap<String, String>) -> &'static str {
    let (Some(old), Some(new)) = (params.get("oldpasskey"), params.get("newpasskey")) else {
        return "success";
    };
    let (Ok(old_key), Ok(new_key)) = (old.parse::<Passkey>(), new.parse::<Passkey>()) else {
        return "success";
    };

    let mut passkey2id = tracker.passkey2id.lock();
    match passkey2id.remove(&old_key) {
        Some(id) => {
            passkey2id.insert(new_key, id);
            if let Some(user) = tracker.users.lock().get_mut(&id) {
                user.passkey = new_key;
            }
        }
        None => warn!("change_passkey: old passkey not found"),
    }

    "success"
}

fn add_torrent(tracker: &Arc<Tracker>, params: &HashMap<String, String>) -> &'static str {
    let Some(id) = params.get("id").and_then(|v| v.parse::<u32>().ok()) else {
        return "success";
    };
    let Some(info_hash) = hash_param(params, "info_hash") else {
        return "success";
    };
    let freeleech = params
        .get("freetorrent")
        .and_then(|v| v.parse::<i8>().ok())
        .map(Freeleech::from_db_code)
        .unwrap_or(Freeleech::Normal);

    let mut torrents = tracker.torrents.lock();
    match torrents.get_mut(&id) {
        Some(torrent) => torrent.freeleech = freeleech,
        None => {
            torrents.insert(id, Torrent::new(id, info_hash, 0, freeleech));
            tracker.infohash2id.lock().insert(info_hash, id);
        }
    }

    "success"
}

fn update_torrent(tracker: &Arc<Tracker>, params: &HashMap<String, String>) -> &'static str {
    let Some(id) = params.get("id").and_then(|v| v.parse::<u32>().ok()) else {
        return "success";
    };
    let Some(freeleech) = params
        .get("freetorrent")
        .and_then(|v| v.parse::<i8>().ok())
        .map(Freeleech::from_db_code)
    else {
        return "success";
    };

    if let Some(torrent) = tracker.torrents.lock().get_mut(&id) {
        torrent.freeleech = freeleech;
    }

    "success"
}

/// `update_torrents` parses a packed binary list of 20-byte info-hashes
/// rather than a character string, per the open-question decision: a
/// trailing partial chunk is rejected with a warning instead of silently
/// truncated.
fn update_torrents(tracker: &Arc<Tracker>, params: &HashMap<String, String>) -> &'static str {
    let Some(blob) = params.get("info_hashes") else {
        return "success";
    };
    let Some(freeleech) = params
        .get("freetorrent")
        .and_then(|v| v.parse::<i8>().ok())
        .map(Freeleech::from_db_code)
    else {
        return "success";
    };

    let bytes = blob.as_bytes();
    if bytes.len() % 20 != 0 {
        warn!("update_torrents: info_hashes blob length {} is not a multiple of 20", bytes.len());
    }

    let infohash2id = tracker.infohash2id.lock();
    let mut torrents = tracker.torrents.lock();

    for chunk in bytes.chunks_exact(20) {
        let Ok(info_hash) = InfoHash::try_from(chunk) else {
            continue;
        };
        if let Some(&id) = infohash2id.get(&info_hash) {
            if let Some(torrent) = torrents.get_mut(&id) {
                torrent.freeleech = freeleech;
            }
        }
    }

    "success"
}

fn add_token(tracker: &Arc<Tracker>, params: &HashMap<String, String>) -> &'static str {
    warn!("add_token action removes the token it claims to add — mirroring upstream");
    remove_token(tracker, params)
}

fn remove_token(tracker: &Arc<Tracker>, params: &HashMap<String, String>) -> &'static str {
    let (Some(id), Some(user_id)) = (
        params.get("id").and_then(|v| v.parse::<u32>().ok()),
        params.get("userid").and_then(|v| v.parse::<u32>().ok()),
    ) else {
        return "success";
    };

    if let Some(torrent) = tracker.torrents.lock().get_mut(&id) {
        remove_token_from_torrent(torrent, user_id);
    }

    "success"
}

/// The actual mutation behind both `add_token` and `remove_token` (they
/// are, faithfully, the same operation — see the open-question decision).
fn remove_token_from_torrent(torrent: &mut Torrent, user_id: u32) {
    torrent.tokened_users.remove(&user_id);
}

fn delete_torrent(tracker: &Arc<Tracker>, params: &HashMap<String, String>) -> &'static str {
    let Some(id) = params.get("id").and_then(|v| v.parse::<u32>().ok()) else {
        return "success";
    };
    let reason_code = params.get("reason").and_then(|v| v.parse::<i32>().ok()).unwrap_or(0);

    let mut torrents = tracker.torrents.lock();
    if let Some(torrent) = torrents.remove(&id) {
        tracker.infohash2id.lock().retain(|_, v| *v != id);

        let users = tracker.users.lock();
        for (_, peer) in torrent.seeders.iter() {
            if let Some(user) = users.get(&peer.user_id) {
                user.dec_seeding();
            }
        }
        for (_, peer) in torrent.leechers.iter() {
            if let Some(user) = users.get(&peer.user_id) {
                user.dec_leeching();
            }
        }
        drop(users);

        tracker
            .del_reasons
            .lock()
            .insert(torrent.info_hash, reason_code, now());
        tracing::info!(
            "deleted torrent {id}: {}",
            del_reason_label(reason_code)
        );
    }

    "success"
}

fn add_user(tracker: &Arc<Tracker>, params: &HashMap<String, String>) -> &'static str {
    let (Some(id), Some(passkey)) = (
        params.get("id").and_then(|v| v.parse::<u32>().ok()),
        params.get("passkey").and_then(|v| v.parse::<Passkey>().ok()),
    ) else {
        return "success";
    };
    let leech = params.get("can_leech").map(|v| v == "1").unwrap_or(true);

    tracker
        .users
        .lock()
        .entry(id)
        .or_insert_with(|| User::new(id, passkey, leech, false));
    tracker.passkey2id.lock().insert(passkey, id);

    "success"
}

fn remove_user(tracker: &Arc<Tracker>, params: &HashMap<String, String>) -> &'static str {
    let Some(id) = params.get("id").and_then(|v| v.parse::<u32>().ok()) else {
        return "success";
    };
    remove_user_by_id(tracker, id);
    "success"
}

fn remove_user_by_id(tracker: &Arc<Tracker>, id: u32) {
    let mut users = tracker.users.lock();
    if let Some(user) = users.get_mut(&id) {
        user.deleted = true;
    }
    tracker.passkey2id.lock().retain(|_, v| *v != id);
}

/// `remove_users` parses a packed binary list of 32-byte passkeys (the
/// open-question decision: explicit byte slicing, never treated as a
/// character string).
fn remove_users(tracker: &Arc<Tracker>, params: &HashMap<String, String>) -> &'static str {
    let Some(blob) = params.get("passkeys") else {
        return "success";
    };

    let bytes = blob.as_bytes();
    if bytes.len() % 32 != 0 {
        warn!("remove_users: passkeys blob length {} is not a multiple of 32", bytes.len());
    }

    let ids: Vec<u32> = {
        let passkey2id = tracker.passkey2id.lock();
        bytes
            .chunks_exact(32)
            .filter_map(|chunk| std::str::from_utf8(chunk).ok())
            .filter_map(|s| s.parse::<Passkey>().ok())
            .filter_map(|pk| passkey2id.get(&pk).copied())
            .collect()
    };

    for id in ids {
        remove_user_by_id(tracker, id);
    }

    "success"
}

fn update_user(tracker: &Arc<Tracker>, params: &HashMap<String, String>) -> &'static str {
    let Some(id) = params.get("id").and_then(|v| v.parse::<u32>().ok()) else {
        return "success";
    };

    if let Some(user) = tracker.users.lock().get_mut(&id) {
        if let Some(leech) = params.get("can_leech") {
            user.leech = leech == "1";
        }
        if let Some(visible) = params.get("visible") {
            user.protect = visible == "0";
        }
    }

    "success"
}

fn add_whitelist(tracker: &Arc<Tracker>, params: &HashMap<String, String>) -> &'static str {
    if let Some(prefix) = params.get("peer_id") {
        tracker.whitelist.lock().add(prefix.as_bytes().to_vec());
    }
    "success"
}

fn remove_whitelist(tracker: &Arc<Tracker>, params: &HashMap<String, String>) -> &'static str {
    if let Some(prefix) = params.get("peer_id") {
        tracker.whitelist.lock().remove(prefix.as_bytes());
    }
    "success"
}

fn edit_whitelist(tracker: &Arc<Tracker>, params: &HashMap<String, String>) -> &'static str {
    if let (Some(old), Some(new)) = (params.get("peer_id_old"), params.get("peer_id_new")) {
        tracker
            .whitelist
            .lock()
            .edit(old.as_bytes(), new.as_bytes().to_vec());
    }
    "success"
}

fn update_announce_interval(tracker: &Arc<Tracker>, params: &HashMap<String, String>) -> &'static str {
    if let Some(interval) = params.get("interval").and_then(|v| v.parse::<u32>().ok()) {
        tracker.live.announce_interval.store(Arc::new(interval));
    }
    "success"
}

fn info_torrent(tracker: &Arc<Tracker>, params: &HashMap<String, String>) -> &'static str {
    if let Some(id) = params.get("id").and_then(|v| v.parse::<u32>().ok()) {
        if let Some(torrent) = tracker.torrents.lock().get(&id) {
            tracing::info!(
                "torrent {id}: seeders={} leechers={} completed={} balance={}",
                torrent.seeders.len(),
                torrent.leechers.len(),
                torrent.completed,
                torrent.balance,
            );
        }
    }
    "success"
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::info_hash::InfoHash;

    #[test]
    fn add_token_is_actually_a_removal() {
        // Pinning the upstream inversion (§9 open question): calling what
        // the action table calls "add_token" must remove an existing
        // token, never add one.
        let mut torrent = Torrent::new(1, InfoHash([0; 20]), 0, Freeleech::Normal);
        torrent.tokened_users.insert(42);

        remove_token_from_torrent(&mut torrent, 42);

        assert!(!torrent.tokened_users.contains(&42));
    }

    #[test]
    fn hex_decode_rejects_wrong_length() {
        assert!(hex::decode_to_info_hash("abcd").is_none());
    }

    #[test]
    fn hex_decode_accepts_40_hex_chars() {
        let hash = hex::decode_to_info_hash(&"ab".repeat(20)).unwrap();
        assert_eq!(hash.0, [0xab; 20]);
    }
}
