// ─── Server Status ───
// Reachability of the auth and world servers, measured by a plain TCP connect.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::core::error::LauncherResult;

pub const DEFAULT_AUTH_ADDR: &str = "127.0.0.1:3724";
pub const DEFAULT_WORLD_ADDR: &str = "127.0.0.1:8085";
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_COUNT_TIMEOUT: Duration = Duration::from_secs(3);
const CACHE_TTL: Duration = Duration::from_secs(10);
const DEFAULT_COUNT_TTL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerStatus {
    pub auth_online: bool,
    pub world_online: bool,
    /// Characters online; 0 while the world server is down.
    pub players_online: u32,
    pub checked_at: DateTime<Utc>,
}

impl ServerStatus {
    pub fn all_online(&self) -> bool {
        self.auth_online && self.world_online
    }
}

/// Source of the online player count, typically the characters database.
#[async_trait]
pub trait PlayerCounter: Send + Sync {
    async fn online_players(&self) -> LauncherResult<u32>;
}

pub struct ServerProbe {
    auth_addr: String,
    world_addr: String,
    timeout: Duration,
    cache: Mutex<Option<(Instant, ServerStatus)>>,
    counter: Option<Arc<dyn PlayerCounter>>,
    count_timeout: Duration,
    count_ttl: Duration,
    /// Last successful count, kept past its TTL as the fallback value.
    last_count: Mutex<Option<(Instant, u32)>>,
}

impl ServerProbe {
    pub fn new(auth_addr: impl Into<String>, world_addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            auth_addr: auth_addr.into(),
            world_addr: world_addr.into(),
            timeout,
            cache: Mutex::new(None),
            counter: None,
            count_timeout: DEFAULT_COUNT_TIMEOUT,
            count_ttl: DEFAULT_COUNT_TTL,
            last_count: Mutex::new(None),
        }
    }

    pub fn with_player_counter(mut self, counter: Arc<dyn PlayerCounter>) -> Self {
        self.counter = Some(counter);
        self
    }

    /// Override the count query timeout and how long a count is reused.
    pub fn with_count_limits(mut self, timeout: Duration, ttl: Duration) -> Self {
        self.count_timeout = timeout;
        self.count_ttl = ttl;
        self
    }

    /// Probes both servers at once. A result younger than ten seconds is
    /// returned as-is.
    pub async fn status(&self) -> ServerStatus {
        let mut cache = self.cache.lock().await;
        if let Some((at, status)) = cache.as_ref() {
            if at.elapsed() < CACHE_TTL {
                return status.clone();
            }
        }

        let (auth_online, world_online) = tokio::join!(
            is_reachable(&self.auth_addr, self.timeout),
            is_reachable(&self.world_addr, self.timeout)
        );
        let players_online = if world_online {
            self.players_online().await
        } else {
            0
        };
        let status = ServerStatus {
            auth_online,
            world_online,
            players_online,
            checked_at: Utc::now(),
        };
        *cache = Some((Instant::now(), status.clone()));
        status
    }

    /// Drop the cached result so the next call probes again.
    pub async fn invalidate(&self) {
        *self.cache.lock().await = None;
    }

    /// Fresh count if the cached one expired. A failed or slow query falls
    /// back to the last known count, or 0.
    async fn players_online(&self) -> u32 {
        let Some(counter) = &self.counter else {
            return 0;
        };

        let mut last = self.last_count.lock().await;
        if let Some((at, count)) = *last {
            if at.elapsed() < self.count_ttl {
                return count;
            }
        }
        let fallback = last.map_or(0, |(_, count)| count);

        match tokio::time::timeout(self.count_timeout, counter.online_players()).await {
            Ok(Ok(count)) => {
                debug!("Players online: {}", count);
                *last = Some((Instant::now(), count));
                count
            }
            Ok(Err(err)) => {
                warn!("Player count failed, using {}: {}", fallback, err);
                fallback
            }
            Err(_) => {
                warn!(
                    "Player count timed out after {:?}, using {}",
                    self.count_timeout, fallback
                );
                fallback
            }
        }
    }
}

impl Default for ServerProbe {
    fn default() -> Self {
        Self::new(DEFAULT_AUTH_ADDR, DEFAULT_WORLD_ADDR, DEFAULT_PROBE_TIMEOUT)
    }
}

async fn is_reachable(addr: &str, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            debug!("{} unreachable: {}", addr, e);
            false
        }
        Err(_) => {
            debug!("{} timed out after {:?}", addr, timeout);
            false
        }
    }
}
