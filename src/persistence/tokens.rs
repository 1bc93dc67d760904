use std::sync::Arc;

use sqlx::{MySql, QueryBuilder};
use tracing::{error, info};

use crate::tracker::Tracker;

#[derive(Clone)]
pub struct TokenUseRecord {
    pub user_id: u32,
    pub torrent_id: u32,
    pub downloaded: u64,
}

pub fn enqueue(tracker: &Tracker, record: TokenUseRecord) {
    tracker.persistence.tokens.push(record);
}

pub async fn flush_tick(tracker: &Arc<Tracker>) {
    if tracker.config.readonly {
        tracker.persistence.tokens.clear_buffer();
        return;
    }

    if tracker.persistence.tokens.rotate() {
        spawn_writer(tracker.clone());
    }
}

fn spawn_writer(tracker: Arc<Tracker>) {
    if !tracker.persistence.tokens.try_claim() {
        return;
    }

    tokio::spawn(async move {
        while let Some(batch) = tracker.persistence.tokens.pop_front() {
            let len = batch.len();
            match insert(&tracker.pool, &batch).await {
                Ok(_) => info!("inserted {len} token uses"),
                Err(e) => {
                    error!("failed to insert {len} token uses: {e}");
                    tracker.persistence.tokens.requeue_front(batch);
                    break;
                }
            }
        }
        tracker.persistence.tokens.release();
    });
}

async fn insert(pool: &sqlx::MySqlPool, batch: &[TokenUseRecord]) -> Result<(), sqlx::Error> {
    if batch.is_empty() {
        return Ok(());
    }

    let mut qb: QueryBuilder<MySql> =
        QueryBuilder::new("INSERT INTO users_freeleeches (UserID, TorrentID, Downloaded) ");

    qb.push_values(batch, |mut b, t| {
        b.push_bind(t.user_id)
            .push_bind(t.torrent_id)
            .push_bind(t.downloaded);
    });

    qb.build().persistent(false).execute(pool).await?;

    Ok(())
}
