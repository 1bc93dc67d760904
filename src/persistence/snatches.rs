use std::net::IpAddr;
use std::sync::Arc;

use sqlx::{MySql, QueryBuilder};
use tracing::{error, info};

use crate::tracker::Tracker;

#[derive(Clone)]
pub struct SnatchRecord {
    pub user_id: u32,
    pub torrent_id: u32,
    pub timestamp: i64,
    pub ip: IpAddr,
}

pub fn enqueue(tracker: &Tracker, record: SnatchRecord) {
    tracker.persistence.snatches.push(record);
}

pub async fn flush_tick(tracker: &Arc<Tracker>) {
    if tracker.config.readonly {
        tracker.persistence.snatches.clear_buffer();
        return;
    }

    if tracker.persistence.snatches.rotate() {
        spawn_writer(tracker.clone());
    }
}

fn spawn_writer(tracker: Arc<Tracker>) {
    if !tracker.persistence.snatches.try_claim() {
        return;
    }

    tokio::spawn(async move {
        while let Some(batch) = tracker.persistence.snatches.pop_front() {
            let len = batch.len();
            match insert(&tracker.pool, &batch).await {
                Ok(_) => info!("inserted {len} snatches"),
                Err(e) => {
                    error!("failed to insert {len} snatches: {e}");
                    tracker.persistence.snatches.requeue_front(batch);
                    break;
                }
            }
        }
        tracker.persistence.snatches.release();
    });
}

async fn insert(pool: &sqlx::MySqlPool, batch: &[SnatchRecord]) -> Result<(), sqlx::Error> {
    if batch.is_empty() {
        return Ok(());
    }

    let mut qb: QueryBuilder<MySql> =
        QueryBuilder::new("INSERT INTO xbt_snatched (uid, fid, tstamp, IP) ");

    qb.push_values(batch, |mut b, s| {
        b.push_bind(s.user_id)
            .push_bind(s.torrent_id)
            .push_bind(s.timestamp)
            .push_bind(s.ip.to_string());
    });

    qb.build().persistent(false).execute(pool).await?;

    Ok(())
}
