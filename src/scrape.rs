//! Scrape (§4.3): swarm-size lookups for one or more info-hashes. Missing
//! hashes are silently omitted rather than erroring.

use std::sync::Arc;

use crate::bencode::DictBuilder;
use crate::tracker::info_hash::InfoHash;
use crate::tracker::Tracker;
use crate::utils::urlencoded_to_bytes;

pub fn handle(tracker: &Arc<Tracker>, query: &str) -> Vec<u8> {
    tracker.stats.inc_scrapes();

    let infohash2id = tracker.infohash2id.lock();
    let torrents = tracker.torrents.lock();

    let mut files = Vec::new();

    for (key, value) in query.split('&').filter_map(|pair| {
        let mut parts = pair.splitn(2, '=');
        Some((parts.next()?, parts.next().unwrap_or("")))
    }) {
        if key != "info_hash" {
            continue;
        }
        let Ok(bytes) = urlencoded_to_bytes::<20>(value) else {
            continue;
        };
        let info_hash = InfoHash(bytes);
        let Some(&id) = infohash2id.get(&info_hash) else {
            continue;
        };
        let Some(torrent) = torrents.get(&id) else {
            continue;
        };

        let entry = DictBuilder::new()
            .int("complete", torrent.seeders.len() as i64)
            .int("incomplete", torrent.leechers.len() as i64)
            .int("downloaded", torrent.completed as i64)
            .finish();

        files.push((info_hash, entry));
    }

    let mut files_dict = DictBuilder::new();
    for (info_hash, entry) in files {
        files_dict = files_dict.raw_dict_bytes_key(&info_hash.0, entry);
    }
    let files_bytes = files_dict.finish();

    DictBuilder::new().raw_dict("files", files_bytes).finish()
}
