//! `get=stats` / `get=user` reporting (§4.5). Never fails visibly: an
//! unrecognised `get` value just answers with the fixed invalid-action text.

use std::collections::HashMap;
use std::sync::Arc;

use crate::tracker::Tracker;

pub fn handle(tracker: &Arc<Tracker>, params: &HashMap<String, String>) -> String {
    match params.get("get").map(String::as_str) {
        Some("stats") => stats(tracker),
        Some("user") => user(tracker, params),
        _ => "Invalid action\n".to_owned(),
    }
}

fn stats(tracker: &Arc<Tracker>) -> String {
    let torrents = tracker.torrents.lock();
    let (seeders, leechers) = torrents
        .values()
        .fold((0u64, 0u64), |(s, l), t| {
            (s + t.seeders.len() as u64, l + t.leechers.len() as u64)
        });
    drop(torrents);

    tracker.stats.report_lines(seeders, leechers)
}

fn user(tracker: &Arc<Tracker>, params: &HashMap<String, String>) -> String {
    let Some(passkey) = params.get("key").and_then(|v| v.parse().ok()) else {
        return "Invalid action\n".to_owned();
    };

    let Some(&id) = tracker.passkey2id.lock().get(&passkey) else {
        return "Invalid action\n".to_owned();
    };

    let users = tracker.users.lock();
    let Some(user) = users.get(&id) else {
        return "Invalid action\n".to_owned();
    };

    format!("leeching {}\nseeding {}\n", user.leeching(), user.seeding())
}
