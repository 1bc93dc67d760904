//! Periodic ticks that flush the write-behind pipeline and, at a slower
//! cadence, reap stale peers and expired deletion-reason entries (§4.8, C6).

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::persistence::{peers, snatches, tokens, torrents, users};
use crate::site_client;
use crate::tracker::Tracker;

pub async fn handle(tracker: &Arc<Tracker>) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(
        tracker.config.schedule_interval.max(1),
    ));
    let mut since_reap = 0u64;

    loop {
        interval.tick().await;

        flush(tracker).await;

        since_reap += tracker.config.schedule_interval.max(1);
        if since_reap >= tracker.config.reap_peers_interval {
            since_reap = 0;
            reap(tracker);
        }
    }
}

/// Drains every persistence lane once. Exposed so the shutdown path can
/// flush pending writes without waiting for the next tick.
pub async fn flush(tracker: &Arc<Tracker>) {
    users::flush_tick(tracker).await;
    torrents::flush_tick(tracker).await;
    snatches::flush_tick(tracker).await;
    peers::flush_tick(tracker).await;
    tokens::flush_tick(tracker).await;
    site_client::flush_tick(tracker).await;
}

/// Drops peers that haven't announced within `peers_timeout`, decrementing
/// the owning user's counters, and records a zero-count torrent row for
/// any torrent whose maps went empty as a result. Then sweeps the
/// del-reasons cache.
fn reap(tracker: &Arc<Tracker>) {
    let now = Utc::now().timestamp();
    let timeout = tracker.config.peers_timeout;

    let users = tracker.users.lock();
    let mut torrents = tracker.torrents.lock();

    for torrent in torrents.values_mut() {
        let mut reaped_any = false;

        torrent.seeders.retain(|_, peer| {
            let stale = peer.last_announced + timeout < now;
            if stale {
                if let Some(user) = users.get(&peer.user_id) {
                    user.dec_seeding();
                }
                reaped_any = true;
            }
            !stale
        });

        torrent.leechers.retain(|_, peer| {
            let stale = peer.last_announced + timeout < now;
            if stale {
                if let Some(user) = users.get(&peer.user_id) {
                    user.dec_leeching();
                }
                reaped_any = true;
            }
            !stale
        });

        if reaped_any && torrent.seeders.is_empty() && torrent.leechers.is_empty() {
            torrents::enqueue(
                tracker,
                torrents::TorrentUpdate {
                    torrent_id: torrent.id,
                    seeders: 0,
                    leechers: 0,
                    snatched_delta: 0,
                    balance: torrent.balance,
                },
            );
            torrent.last_flushed = now;
        }
    }

    drop(torrents);
    drop(users);

    let dropped = tracker
        .del_reasons
        .lock()
        .sweep(now, tracker.config.del_reason_lifetime);
    if dropped > 0 {
        info!(dropped, "swept expired deletion-reason entries");
    }
}
