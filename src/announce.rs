//! The announce engine (C4, §4.2): the core per-request state machine. An
//! announce authenticates, classifies the peer transition, updates
//! accounting, projects a peer list, and enqueues persistence records —
//! all under the torrent lock for one atomic read-modify-write.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use crate::bencode::DictBuilder;
use crate::error::AnnounceError;
use crate::persistence::peers::{PeerRecord, PeerRecordKind};
use crate::persistence::{snatches, tokens, torrents, users};
use crate::tracker::info_hash::InfoHash;
use crate::tracker::passkey::Passkey;
use crate::tracker::peer::{is_invalid_ip, pack_ip_port, Peer};
use crate::tracker::peer_id::PeerId;
use crate::tracker::status::Status;
use crate::tracker::torrent::Freeleech;
use crate::tracker::Tracker;
use crate::utils::urlencoded_to_bytes;

#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub enum Event {
    #[default]
    Empty,
    Started,
    Completed,
    Stopped,
}

impl FromStr for Event {
    type Err = AnnounceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" => Ok(Event::Empty),
            "started" => Ok(Event::Started),
            "completed" => Ok(Event::Completed),
            "stopped" => Ok(Event::Stopped),
            _ => Err(AnnounceError::MalformedRequest),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Empty => write!(f, ""),
            Event::Started => write!(f, "started"),
            Event::Completed => write!(f, "completed"),
            Event::Stopped => write!(f, "stopped"),
        }
    }
}

struct Request {
    info_hash: InfoHash,
    peer_id: PeerId,
    port: u16,
    uploaded: u64,
    downloaded: u64,
    left: u64,
    corrupt: u64,
    event: Event,
    numwant: Option<usize>,
    ip_hint: Option<IpAddr>,
}

/// Splits a raw (still percent-encoded where applicable) query string into
/// key/value pairs without decoding — `info_hash`/`peer_id` need their own
/// byte-exact percent-decoding, and every other field is plain ASCII.
fn split_query(query: &str) -> impl Iterator<Item = (&str, &str)> {
    query.split('&').filter_map(|pair| {
        let mut parts = pair.splitn(2, '=');
        let key = parts.next()?;
        let value = parts.next().unwrap_or("");
        Some((key, value))
    })
}

fn parse(query: &str) -> Result<Request, AnnounceError> {
    let mut info_hash = None;
    let mut peer_id = None;
    let mut port = None;
    let mut uploaded = 0u64;
    let mut downloaded = 0u64;
    let mut left = 0u64;
    let mut corrupt = 0u64;
    let mut event = Event::Empty;
    let mut numwant = None;
    let mut compact_ok = false;
    let mut ip_hint = None;

    for (key, value) in split_query(query) {
        match key {
            "info_hash" => {
                info_hash = Some(InfoHash(urlencoded_to_bytes::<20>(value)?));
            }
            "peer_id" => {
                peer_id = Some(PeerId(urlencoded_to_bytes::<20>(value)?));
            }
            "port" => port = value.parse::<u16>().ok(),
            "uploaded" => uploaded = clamp_parse(value),
            "downloaded" => downloaded = clamp_parse(value),
            "left" => left = clamp_parse(value),
            "corrupt" => corrupt = clamp_parse(value),
            "event" => event = value.parse()?,
            "compact" => compact_ok = value == "1",
            "numwant" => numwant = value.parse::<usize>().ok(),
            "ip" | "ipv4" => ip_hint = value.parse::<IpAddr>().ok(),
            _ => {}
        }
    }

    if !compact_ok {
        return Err(AnnounceError::InvalidCompact);
    }

    Ok(Request {
        info_hash: info_hash.ok_or(AnnounceError::InvalidInfoHash)?,
        peer_id: peer_id.ok_or(AnnounceError::InvalidPeerId)?,
        port: port.ok_or(AnnounceError::MalformedRequest)?,
        uploaded,
        downloaded,
        left,
        corrupt,
        event,
        numwant,
        ip_hint,
    })
}

/// Non-negative numeric fields are clamped to 0 rather than rejected: a
/// negative or unparseable value is treated the same as absent.
fn clamp_parse(value: &str) -> u64 {
    value.parse::<i64>().map(|v| v.max(0) as u64).unwrap_or(0)
}

/// Where a peer currently lives, if anywhere, before this announce.
enum Location {
    None,
    Leecher,
    Seeder,
}

pub async fn handle(
    tracker: &Arc<Tracker>,
    passkey: Passkey,
    query: &str,
    remote_ip: IpAddr,
) -> Response {
    tracker.stats.inc_requests();
    match handle_inner(tracker, passkey, query, remote_ip) {
        Ok(body) => {
            tracker.stats.inc_announces_ok();
            (StatusCode::OK, body).into_response()
        }
        Err(e) => {
            tracker.stats.inc_announces_failed();
            e.into_response()
        }
    }
}

fn handle_inner(
    tracker: &Arc<Tracker>,
    passkey: Passkey,
    query: &str,
    remote_ip: IpAddr,
) -> Result<Vec<u8>, AnnounceError> {
    if tracker.status.get() != Status::Open {
        return Err(AnnounceError::TrackerUnavailable);
    }

    let req = parse(query)?;

    let user_id = *tracker
        .passkey2id
        .lock()
        .get(&passkey)
        .ok_or(AnnounceError::PasskeyNotFound)?;

    if !tracker.whitelist.lock().allows(&req.peer_id.0) {
        return Err(AnnounceError::NotWhitelisted);
    }

    let users_guard = tracker.users.lock();
    let user = users_guard
        .get(&user_id)
        .filter(|u| !u.deleted)
        .ok_or(AnnounceError::PasskeyNotFound)?;

    let torrent_id = *tracker
        .infohash2id
        .lock()
        .get(&req.info_hash)
        .ok_or(AnnounceError::TorrentNotFound)?;

    let mut torrents_guard = tracker.torrents.lock();
    let torrent = torrents_guard
        .get_mut(&torrent_id)
        .ok_or(AnnounceError::TorrentNotFound)?;

    let key = torrent.peer_key(req.peer_id, user_id);

    let ip = req.ip_hint.unwrap_or(remote_ip);
    let invalid_ip = is_invalid_ip(ip);
    let ip_port = pack_ip_port(ip, req.port);

    let location = if torrent.leechers.contains_key(&key) {
        Location::Leecher
    } else if torrent.seeders.contains_key(&key) {
        Location::Seeder
    } else {
        Location::None
    };

    let now = chrono::Utc::now().timestamp();
    let mut snatch_credited = false;
    let mut update_torrent = false;
    let mut peer_changed;
    let mut up_change = 0u64;
    let mut down_change = 0u64;
    let mut corrupt_change = 0u64;
    let mut token_used = false;

    // Peek the prior record without removing it: a same-map reuse below
    // mutates the existing `IndexMap` entry in place so its insertion-order
    // position (and so its place in the fair rotation) is preserved. Only
    // an actual map transition removes and reinserts.
    let prior: Option<Peer> = match location {
        Location::Leecher => torrent.leechers.get(&key).cloned(),
        Location::Seeder => torrent.seeders.get(&key).cloned(),
        Location::None => None,
    };

    let mut peer = match &prior {
        Some(p) => p.clone(),
        None => Peer {
            uploaded: 0,
            downloaded: 0,
            corrupt: 0,
            left: req.left,
            first_announced: now,
            last_announced: 0,
            announces: 0,
            port: req.port,
            ip,
            ip_port,
            invalid_ip,
            visible: false,
            user_id,
        },
    };

    let fresh = prior.is_none();

    if fresh || req.event == Event::Started {
        peer.uploaded = req.uploaded;
        peer.downloaded = req.downloaded;
        peer.corrupt = req.corrupt;
        peer.first_announced = now;
        peer.last_announced = 0;
        peer.announces = 1;
        peer_changed = true;
    } else {
        peer.announces += 1;
        peer_changed = false;

        if req.uploaded < peer.uploaded || req.downloaded < peer.downloaded {
            // Client restart: overwrite without crediting any delta.
            peer.uploaded = req.uploaded;
            peer.downloaded = req.downloaded;
            peer.corrupt = req.corrupt;
            peer_changed = true;
        } else {
            up_change = req.uploaded - peer.uploaded;
            down_change = req.downloaded - peer.downloaded;
            corrupt_change = req.corrupt.saturating_sub(peer.corrupt);
            peer.uploaded = req.uploaded;
            peer.downloaded = req.downloaded;
            peer.corrupt = req.corrupt;
            if up_change > 0 || down_change > 0 || corrupt_change > 0 {
                peer_changed = true;
            }
        }
    }

    peer.left = req.left;
    peer.port = req.port;
    peer.ip = ip;
    peer.ip_port = ip_port;
    peer.invalid_ip = invalid_ip;

    // Each of these can independently justify zeroing the download credit;
    // in particular a tokened user on a Free torrent must still consume
    // their token even though Free-ness alone already zeroes the change.
    let down_change_before_masking = down_change;

    if matches!(torrent.freeleech, Freeleech::Neutral) {
        up_change = 0;
        down_change = 0;
    }
    if matches!(torrent.freeleech, Freeleech::Free) {
        down_change = 0;
    }
    let tokened = torrent.tokened_users.contains(&user_id);
    if tokened && down_change_before_masking > 0 {
        down_change = 0;
        token_used = true;
    }

    torrent.balance += up_change as i64 - down_change as i64 - corrupt_change as i64;

    if up_change > 0 || down_change > 0 {
        users::enqueue(
            tracker,
            users::UserUpdate {
                user_id,
                uploaded: up_change,
                downloaded: down_change,
            },
        );
    }

    if token_used {
        torrent.tokened_users.remove(&user_id);
        tokens::enqueue(
            tracker,
            tokens::TokenUseRecord {
                user_id,
                torrent_id,
                downloaded: down_change_before_masking,
            },
        );
        tracker
            .site_client
            .notify_token_expired(user_id, torrent_id);
    }

    let was_leecher = matches!(location, Location::Leecher);
    let was_seeder = matches!(location, Location::Seeder);

    // A `completed` event always lands the peer in the seeder map; a
    // snatch is credited only on the leecher->seeder transition, never on
    // a fresh completed-seeder insert or a repeat completion (§4.2 table).
    if req.event == Event::Completed && was_leecher {
        snatch_credited = true;
    }
    let became_seeder = req.event == Event::Completed || req.left == 0;

    peer.visible = (peer.left == 0 || user.leech) && !peer.invalid_ip;

    if req.event == Event::Stopped {
        // Leave the peer out of both maps entirely.
        match location {
            Location::Leecher => {
                torrent.leechers.shift_remove(&key);
                user.dec_leeching();
            }
            Location::Seeder => {
                torrent.seeders.shift_remove(&key);
                user.dec_seeding();
            }
            Location::None => {}
        }
    } else if became_seeder {
        if was_seeder {
            // Same map: mutate the existing entry in place so its
            // position in the rotation isn't disturbed.
            if let Some(p) = torrent.seeders.get_mut(&key) {
                *p = peer.clone();
            }
        } else {
            if was_leecher {
                torrent.leechers.shift_remove(&key);
            }
            torrent.seeders.insert(key, peer.clone());
            user.inc_seeding();
        }
        if was_leecher {
            user.dec_leeching();
        }
    } else {
        if was_leecher {
            if let Some(p) = torrent.leechers.get_mut(&key) {
                *p = peer.clone();
            }
        } else {
            if was_seeder {
                torrent.seeders.shift_remove(&key);
            }
            torrent.leechers.insert(key, peer.clone());
            user.inc_leeching();
        }
        if was_seeder {
            user.dec_seeding();
        }
    }

    if snatch_credited {
        torrent.completed += 1;
        update_torrent = true;
        snatches::enqueue(
            tracker,
            snatches::SnatchRecord {
                user_id,
                torrent_id,
                timestamp: now,
                ip,
            },
        );
    }

    peer.last_announced = now;

    let kind = if peer_changed {
        PeerRecordKind::Heavy
    } else {
        PeerRecordKind::Light
    };
    crate::persistence::peers::enqueue(
        tracker,
        PeerRecord {
            user_id,
            torrent_id,
            peer_id: req.peer_id.0,
            kind,
            timespent: now.saturating_sub(peer.first_announced),
            announced: peer.announces,
            mtime: now,
            ip,
            port: req.port,
            uploaded: peer.uploaded,
            downloaded: peer.downloaded,
            corrupt: peer.corrupt,
            remaining: peer.left,
            upspeed: 0,
            downspeed: 0,
            user_agent: String::new(),
            active: req.event != Event::Stopped,
        },
    );

    if update_torrent || now - torrent.last_flushed > 3600 {
        torrent.last_flushed = now;
        torrents::enqueue(
            tracker,
            torrents::TorrentUpdate {
                torrent_id,
                seeders: torrent.seeders.len() as u32,
                leechers: torrent.leechers.len() as u32,
                snatched_delta: if snatch_credited { 1 } else { 0 },
                balance: torrent.balance,
            },
        );
    }

    let announce_interval = **tracker.live.announce_interval.load();
    let numwant = req
        .numwant
        .unwrap_or(tracker.config.numwant_limit)
        .min(tracker.config.numwant_limit);
    let numwant = if req.event == Event::Stopped {
        0
    } else if !user.leech && peer.left > 0 {
        0
    } else {
        numwant
    };

    let is_leecher_requester = peer.left > 0;
    let deleted_check = |uid: u32| users_guard.get(&uid).map(|u| u.deleted).unwrap_or(true);
    let peers_bytes = if req.event == Event::Stopped {
        Vec::new()
    } else {
        torrent.project_peers(user_id, peer.ip_port, is_leecher_requester, numwant, deleted_check)
    };

    let seeders = torrent.seeders.len() as i64;
    let leechers = torrent.leechers.len() as i64;
    let downloaded = torrent.completed as i64;

    if !user.leech && peer.left > 0 {
        return Err(AnnounceError::LeechingForbidden);
    }

    let mut builder = DictBuilder::new()
        .int("complete", seeders)
        .int("downloaded", downloaded)
        .int("incomplete", leechers)
        .int("interval", announce_interval as i64 + 600.min(seeders))
        .int("min interval", announce_interval as i64);

    builder = builder.bytes("peers", &peers_bytes);

    if invalid_ip {
        builder = builder.str("warning message", "Illegal character found in IPv6 address. IPv6 not supported");
        warn!("peer {user_id}/{torrent_id} announced an unusable address");
    }

    Ok(builder.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_valid_query() {
        let query = "info_hash=AAAAAAAAAAAAAAAAAAAA&peer_id=BBBBBBBBBBBBBBBBBBBB&port=6881&uploaded=0&downloaded=0&left=100&compact=1";
        let req = parse(query).unwrap();
        assert_eq!(req.port, 6881);
        assert_eq!(req.left, 100);
        assert_eq!(req.event, Event::Empty);
    }

    #[test]
    fn missing_compact_is_rejected() {
        let query = "info_hash=AAAAAAAAAAAAAAAAAAAA&peer_id=BBBBBBBBBBBBBBBBBBBB&port=1&left=0";
        assert!(matches!(parse(query), Err(AnnounceError::InvalidCompact)));
    }

    #[test]
    fn negative_cumulative_clamps_to_zero() {
        assert_eq!(clamp_parse("-5"), 0);
        assert_eq!(clamp_parse("5"), 5);
        assert_eq!(clamp_parse("garbage"), 0);
    }

    #[test]
    fn percent_encoded_info_hash_decodes() {
        let query = "info_hash=%00%01%02%03%04%05%06%07%08%09%0A%0B%0C%0D%0E%0F0123&peer_id=AAAAAAAAAAAAAAAAAAAA&port=1&left=0&compact=1";
        let req = parse(query).unwrap();
        assert_eq!(&req.info_hash.0[0..4], &[0, 1, 2, 3]);
    }
}
