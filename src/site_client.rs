//! Batches token-expiry notifications for the external administrative site
//! (C3) and posts them as a single HTTP GET per batch.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{error, info};

use crate::tracker::Tracker;

const BUFFER_SOFT_LIMIT: usize = 350;

pub struct SiteClient {
    client: reqwest::Client,
    buffer: Mutex<String>,
    queue: Mutex<VecDeque<String>>,
    active: std::sync::atomic::AtomicBool,
}

impl SiteClient {
    pub fn new() -> SiteClient {
        SiteClient {
            client: reqwest::Client::new(),
            buffer: Mutex::new(String::new()),
            queue: Mutex::new(VecDeque::new()),
            active: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Records that `user_id` used a freeleech token on `torrent_id`.
    pub fn notify_token_expired(&self, user_id: u32, torrent_id: u32) {
        let mut buffer = self.buffer.lock();
        if !buffer.is_empty() {
            buffer.push(',');
        }
        buffer.push_str(&format!("{user_id}:{torrent_id}"));

        if buffer.len() > BUFFER_SOFT_LIMIT {
            let full = std::mem::take(&mut *buffer);
            drop(buffer);
            self.queue.lock().push_back(full);
        }
    }
}

impl Default for SiteClient {
    fn default() -> Self {
        SiteClient::new()
    }
}

pub async fn flush_tick(tracker: &Arc<Tracker>) {
    if tracker.config.readonly {
        tracker.site_client.buffer.lock().clear();
        tracker.site_client.queue.lock().clear();
        return;
    }

    let leftover = {
        let mut buffer = tracker.site_client.buffer.lock();
        if buffer.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut *buffer))
        }
    };
    if let Some(batch) = leftover {
        tracker.site_client.queue.lock().push_back(batch);
    }

    if tracker
        .site_client
        .active
        .compare_exchange(
            false,
            true,
            std::sync::atomic::Ordering::AcqRel,
            std::sync::atomic::Ordering::Acquire,
        )
        .is_err()
    {
        return;
    }

    let tracker = tracker.clone();
    tokio::spawn(async move {
        loop {
            let batch = {
                let mut queue = tracker.site_client.queue.lock();
                queue.front().cloned()
            };
            let Some(tokens) = batch else { break };

            let url = format!("https://{}/tools.php", tracker.config.site_host);
            let result = tracker
                .site_client
                .client
                .get(&url)
                .query(&[
                    ("key", tracker.config.site_password.as_str()),
                    ("type", "expiretoken"),
                    ("action", "ocelot"),
                    ("tokens", tokens.as_str()),
                ])
                .send()
                .await;

            match result {
                Ok(resp) if resp.status().is_success() => {
                    tracker.site_client.queue.lock().pop_front();
                    info!("site notified of expired tokens batch");
                }
                Ok(resp) => {
                    error!("site returned {} for expired tokens batch", resp.status());
                    break;
                }
                Err(e) => {
                    error!("failed to reach site: {e}");
                    break;
                }
            }
        }
        tracker
            .site_client
            .active
            .store(false, std::sync::atomic::Ordering::Release);
    });
}
