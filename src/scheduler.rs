use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::client::ResideoClient;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5 * 60);
const RETRY_DELAY: Duration = Duration::from_secs(60);

/// Background poll and proactive token refresh. Aborted on drop.
pub struct Maintenance {
    poll: JoinHandle<()>,
    token: JoinHandle<()>,
}

impl Maintenance {
    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for Maintenance {
    fn drop(&mut self) {
        self.poll.abort();
        self.token.abort();
    }
}

pub fn spawn_maintenance(client: ResideoClient, poll_interval: Duration) -> Maintenance {
    let poll_client = client.clone();
    let poll = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(poll_interval);
        loop {
            ticker.tick().await;
            if let Err(e) = poll_client.discover().await {
                warn!("scheduled poll failed: {e}");
            }
        }
    });

    let token = tokio::spawn(async move {
        loop {
            let Some(due) = client.token_refresh_due_at().await else {
                tokio::time::sleep(RETRY_DELAY).await;
                continue;
            };
            let wait = (due - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            debug!(due = %due, "next proactive token refresh");
            tokio::time::sleep(wait).await;

            if let Err(e) = client.refresh_token().await {
                warn!("proactive token refresh failed: {e}");
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }
    });

    Maintenance { poll, token }
}
