use std::sync::Arc;

use sqlx::{MySql, QueryBuilder};
use tracing::{error, info};

use crate::tracker::Tracker;

#[derive(Clone)]
pub struct TorrentUpdate {
    pub torrent_id: u32,
    pub seeders: u32,
    pub leechers: u32,
    pub snatched_delta: u64,
    pub balance: i64,
}

pub fn enqueue(tracker: &Tracker, update: TorrentUpdate) {
    tracker.persistence.torrents.push(update);
}

pub async fn flush_tick(tracker: &Arc<Tracker>) {
    if tracker.config.readonly {
        tracker.persistence.torrents.clear_buffer();
        return;
    }

    if tracker.persistence.torrents.rotate() {
        spawn_writer(tracker.clone());
    }
}

fn spawn_writer(tracker: Arc<Tracker>) {
    if !tracker.persistence.torrents.try_claim() {
        return;
    }

    tokio::spawn(async move {
        while let Some(batch) = tracker.persistence.torrents.pop_front() {
            let len = batch.len();
            match upsert(&tracker.pool, &batch).await {
                Ok(_) => info!("upserted {len} torrent deltas"),
                Err(e) => {
                    error!("failed to upsert {len} torrent deltas: {e}");
                    tracker.persistence.torrents.requeue_front(batch);
                    break;
                }
            }
        }
        tracker.persistence.torrents.release();
    });
}

async fn upsert(pool: &sqlx::MySqlPool, batch: &[TorrentUpdate]) -> Result<(), sqlx::Error> {
    if batch.is_empty() {
        return Ok(());
    }

    let mut qb: QueryBuilder<MySql> = QueryBuilder::new(
        "INSERT INTO torrents (ID, Seeders, Leechers, Snatched, Balance) ",
    );

    qb.push_values(batch, |mut b, t| {
        b.push_bind(t.torrent_id)
            .push_bind(t.seeders)
            .push_bind(t.leechers)
            .push_bind(t.snatched_delta)
            .push_bind(t.balance);
    });

    qb.push(
        " ON DUPLICATE KEY UPDATE \
          Seeders = VALUES(Seeders), \
          Leechers = VALUES(Leechers), \
          Snatched = Snatched + VALUES(Snatched), \
          Balance = VALUES(Balance), \
          last_action = IF(VALUES(Seeders) > 0, NOW(), last_action)",
    );

    qb.build().persistent(false).execute(pool).await?;

    // Garbage sweep: rows with an empty info_hash are placeholders that
    // should never have been persisted.
    sqlx::query("DELETE FROM torrents WHERE info_hash = ''")
        .execute(pool)
        .await?;

    Ok(())
}
