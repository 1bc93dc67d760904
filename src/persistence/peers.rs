use std::net::IpAddr;
use std::sync::Arc;

use sqlx::{MySql, QueryBuilder};
use tracing::{error, info};

use super::PEER_LANE_MAX_BATCHES;
use crate::tracker::Tracker;

/// Which columns an announce actually changed. A "light" row only bumps
/// timespent/announce count; a "heavy" row rewrites everything including
/// byte counters, speeds, and the client's address. This is an explicit
/// tag rather than arity-sniffing a tuple shape.
#[derive(Clone, Copy, Eq, PartialEq)]
pub enum PeerRecordKind {
    Light,
    Heavy,
}

#[derive(Clone)]
pub struct PeerRecord {
    pub user_id: u32,
    pub torrent_id: u32,
    pub peer_id: [u8; 20],
    pub kind: PeerRecordKind,
    pub timespent: i64,
    pub announced: u32,
    pub mtime: i64,
    pub ip: IpAddr,
    pub port: u16,
    pub uploaded: u64,
    pub downloaded: u64,
    pub corrupt: u64,
    pub remaining: u64,
    pub upspeed: u64,
    pub downspeed: u64,
    pub user_agent: String,
    pub active: bool,
}

pub fn enqueue(tracker: &Tracker, record: PeerRecord) {
    tracker.persistence.peers.push(record);
}

pub async fn flush_tick(tracker: &Arc<Tracker>) {
    if tracker.config.readonly {
        tracker.persistence.peers.clear_buffer();
        return;
    }

    if tracker
        .persistence
        .peers
        .rotate_with_cap(PEER_LANE_MAX_BATCHES)
    {
        spawn_writer(tracker.clone());
    }
}

fn spawn_writer(tracker: Arc<Tracker>) {
    if !tracker.persistence.peers.try_claim() {
        return;
    }

    tokio::spawn(async move {
        while let Some(batch) = tracker.persistence.peers.pop_front() {
            let len = batch.len();
            match upsert(&tracker.pool, &batch).await {
                Ok(_) => info!("upserted {len} peer rows"),
                Err(e) => {
                    error!("failed to upsert {len} peer rows: {e}");
                    tracker.persistence.peers.requeue_front(batch);
                    break;
                }
            }
        }
        tracker.persistence.peers.release();
    });
}

async fn upsert(pool: &sqlx::MySqlPool, batch: &[PeerRecord]) -> Result<(), sqlx::Error> {
    if batch.is_empty() {
        return Ok(());
    }

    let (heavy, light): (Vec<_>, Vec<_>) = batch
        .iter()
        .partition(|r| r.kind == PeerRecordKind::Heavy);

    if !heavy.is_empty() {
        upsert_heavy(pool, &heavy).await?;
    }
    if !light.is_empty() {
        upsert_light(pool, &light).await?;
    }

    Ok(())
}

async fn upsert_heavy(pool: &sqlx::MySqlPool, batch: &[&PeerRecord]) -> Result<(), sqlx::Error> {
    let mut qb: QueryBuilder<MySql> = QueryBuilder::new(
        "INSERT INTO xbt_files_users \
         (uid, fid, peer_id, ip, port, uploaded, downloaded, upspeed, downspeed, \
          remaining, corrupt, timespent, announced, useragent, active, mtime) ",
    );

    qb.push_values(batch.iter(), |mut b, r| {
        b.push_bind(r.user_id)
            .push_bind(r.torrent_id)
            .push_bind(r.peer_id.to_vec())
            .push_bind(r.ip.to_string())
            .push_bind(r.port)
            .push_bind(r.uploaded)
            .push_bind(r.downloaded)
            .push_bind(r.upspeed)
            .push_bind(r.downspeed)
            .push_bind(r.remaining)
            .push_bind(r.corrupt)
            .push_bind(r.timespent)
            .push_bind(r.announced)
            .push_bind(r.user_agent.as_str())
            .push_bind(r.active)
            .push_bind(r.mtime);
    });

    qb.push(
        " ON DUPLICATE KEY UPDATE \
          ip = VALUES(ip), port = VALUES(port), \
          uploaded = VALUES(uploaded), downloaded = VALUES(downloaded), \
          upspeed = VALUES(upspeed), downspeed = VALUES(downspeed), \
          remaining = VALUES(remaining), corrupt = VALUES(corrupt), \
          timespent = VALUES(timespent), announced = VALUES(announced), \
          useragent = VALUES(useragent), active = VALUES(active), \
          mtime = VALUES(mtime)",
    );

    qb.build().persistent(false).execute(pool).await?;
    Ok(())
}

async fn upsert_light(pool: &sqlx::MySqlPool, batch: &[&PeerRecord]) -> Result<(), sqlx::Error> {
    let mut qb: QueryBuilder<MySql> = QueryBuilder::new(
        "INSERT INTO xbt_files_users (uid, fid, timespent, announced, peer_id, mtime) ",
    );

    qb.push_values(batch.iter(), |mut b, r| {
        b.push_bind(r.user_id)
            .push_bind(r.torrent_id)
            .push_bind(r.timespent)
            .push_bind(r.announced)
            .push_bind(r.peer_id.to_vec())
            .push_bind(r.mtime);
    });

    qb.push(
        " ON DUPLICATE KEY UPDATE \
          timespent = VALUES(timespent), announced = VALUES(announced), \
          mtime = VALUES(mtime), upspeed = 0, downspeed = 0",
    );

    qb.build().persistent(false).execute(pool).await?;
    Ok(())
}
