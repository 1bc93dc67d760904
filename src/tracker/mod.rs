pub mod del_reason;
pub mod info_hash;
pub mod passkey;
pub mod peer;
pub mod peer_id;
pub mod status;
pub mod torrent;
pub mod user;
pub mod whitelist;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use sqlx::mysql::MySqlPoolOptions;
use sqlx::MySqlPool;
use tracing::info;

use crate::config::{self, Config};
use crate::persistence::Lanes;
use crate::site_client::SiteClient;
use crate::stats::Stats;

use info_hash::InfoHash;
use passkey::Passkey;
use status::{Status, StatusCell};
use torrent::Torrent;
use user::User;
use whitelist::Whitelist;

/// The single source of truth during operation (§4.1). Every top-level map
/// has its own lock; lock order is users, then torrents, then whitelist,
/// to avoid deadlock when a single operation needs more than one (§5).
pub struct Tracker {
    pub config: Config,
    pub live: config::Live,
    pub status: StatusCell,
    pub pool: MySqlPool,
    pub stats: Stats,
    pub persistence: Lanes,
    pub site_client: SiteClient,
    pub users: Mutex<HashMap<u32, User>>,
    pub passkey2id: Mutex<HashMap<Passkey, u32>>,
    pub torrents: Mutex<HashMap<u32, Torrent>>,
    pub infohash2id: Mutex<HashMap<InfoHash, u32>>,
    pub whitelist: Mutex<Whitelist>,
    pub del_reasons: Mutex<del_reason::DelReasons>,
}

impl Tracker {
    /// Connects to the database and populates every in-memory map from it.
    /// This is the startup reconciliation path in §4.1; on first boot the
    /// "survivors" diff is trivially empty since every map starts empty.
    pub async fn bootstrap(config: Config) -> Result<Arc<Tracker>> {
        info!("connecting to database...");
        let pool = connect(&config).await?;
        info!("connected to database");

        let tracker = Arc::new(Tracker {
            live: config::Live::new(config.announce_interval),
            status: StatusCell::new(Status::Open),
            pool,
            stats: Stats::default(),
            persistence: Lanes::new(),
            site_client: SiteClient::new(),
            users: Mutex::new(HashMap::new()),
            passkey2id: Mutex::new(HashMap::new()),
            torrents: Mutex::new(HashMap::new()),
            infohash2id: Mutex::new(HashMap::new()),
            whitelist: Mutex::new(Whitelist::new()),
            del_reasons: Mutex::new(del_reason::DelReasons::new()),
            config,
        });

        crate::store::load_all(&tracker).await?;

        Ok(tracker)
    }
}

async fn connect(config: &Config) -> Result<MySqlPool> {
    MySqlPoolOptions::new()
        .min_connections(0)
        .max_connections(10)
        .connect(&config.mysql_url)
        .await
        .context("could not connect to the database")
}
