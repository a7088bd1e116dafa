use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, aio::ConnectionManager};
use tracing::{debug, info};
use url::Url;

use super::CacheError;
use super::shared::SharedCache;

#[derive(Clone)]
pub struct RedisSharedCache {
    conn: ConnectionManager,
    prefix: String,
}

impl fmt::Debug for RedisSharedCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisSharedCache")
            .field("connection", &"ConnectionManager")
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl RedisSharedCache {
    pub async fn new(redis_url: &str) -> Result<Self, CacheError> {
        info!("Connecting to Redis cache at {}", redacted(redis_url));

        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;

        info!("Successfully connected to Redis cache");

        Ok(Self {
            conn,
            prefix: "stremthru:".to_string(),
        })
    }

    fn key(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }
}

/// The URL with any password masked, for logging.
fn redacted(redis_url: &str) -> String {
    match Url::parse(redis_url) {
        Ok(mut url) => {
            if url.password().is_some() {
                let _ = url.set_password(Some("***"));
            }
            url.to_string()
        }
        Err(_) => "<unparseable url>".to_string(),
    }
}

#[async_trait]
impl SharedCache for RedisSharedCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        debug!("Cache GET: {}", key);
        let mut conn = self.conn.clone();
        let data: Option<String> = conn.get(self.key(key)).await?;
        Ok(data)
    }

    async fn set(&self, key: &str, value: String, lifetime: Duration) -> Result<(), CacheError> {
        // SETEX has second granularity and rejects zero.
        let seconds = lifetime.as_secs_f64().ceil().max(1.0) as u64;
        debug!("Cache SET: {} (TTL: {}s)", key, seconds);
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(self.key(key), value, seconds).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        debug!("Cache DELETE: {}", key);
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(self.key(key)).await?;
        Ok(())
    }
}
