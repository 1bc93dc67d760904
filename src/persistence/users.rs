use std::sync::Arc;

use sqlx::{MySql, QueryBuilder};
use tracing::{error, info};

use crate::tracker::Tracker;

/// A by-value snapshot of credited upload/download for one user. Additive:
/// two deltas for the same user sum, so out-of-order flush application is
/// safe (§5).
#[derive(Clone)]
pub struct UserUpdate {
    pub user_id: u32,
    pub uploaded: u64,
    pub downloaded: u64,
}

pub fn enqueue(tracker: &Tracker, update: UserUpdate) {
    tracker.persistence.users.push(update);
}

pub async fn flush_tick(tracker: &Arc<Tracker>) {
    if tracker.config.readonly {
        tracker.persistence.users.clear_buffer();
        return;
    }

    if tracker.persistence.users.rotate() {
        spawn_writer(tracker.clone());
    }
}

fn spawn_writer(tracker: Arc<Tracker>) {
    if !tracker.persistence.users.try_claim() {
        return;
    }

    tokio::spawn(async move {
        while let Some(batch) = tracker.persistence.users.pop_front() {
            let len = batch.len();
            match upsert(&tracker.pool, &batch).await {
                Ok(_) => info!("upserted {len} user deltas"),
                Err(e) => {
                    error!("failed to upsert {len} user deltas: {e}");
                    tracker.persistence.users.requeue_front(batch);
                    break;
                }
            }
        }
        tracker.persistence.users.release();
    });
}

async fn upsert(pool: &sqlx::MySqlPool, batch: &[UserUpdate]) -> Result<(), sqlx::Error> {
    if batch.is_empty() {
        return Ok(());
    }

    let mut qb: QueryBuilder<MySql> =
        QueryBuilder::new("INSERT INTO users_main (ID, Uploaded, Downloaded) ");

    qb.push_values(batch, |mut b, u| {
        b.push_bind(u.user_id)
            .push_bind(u.uploaded)
            .push_bind(u.downloaded);
    });

    qb.push(
        " ON DUPLICATE KEY UPDATE \
          Uploaded = Uploaded + VALUES(Uploaded), \
          Downloaded = Downloaded + VALUES(Downloaded)",
    );

    qb.build().persistent(false).execute(pool).await?;

    Ok(())
}
