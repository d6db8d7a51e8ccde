//! Completion record sink
//!
//! A finished session produces one `CompletionRecord`. Where it ends up is
//! the store's business:
//! - `RedisSessionStore`: stored under a key with an expiry and published to
//!   a channel for whoever reports on completed interviews
//! - `LogSessionStore`: logged only, for running without Redis

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::session::summary::CompletionRecord;

/// Redis key constants
pub mod keys {
    /// Completion record key prefix (for polling)
    pub const SUMMARY_PREFIX: &str = "interview:summary:";

    /// Completion channel (for pub/sub)
    pub const COMPLETED_CHANNEL: &str = "interview:completed";
}

const SUMMARY_EXPIRY_SECS: u64 = 24 * 3600;
const CONNECT_ATTEMPTS: u32 = 5;
const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(3);

pub fn summary_key(session_id: &str) -> String {
    format!("{}{}", keys::SUMMARY_PREFIX, session_id)
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn persist(&self, record: &CompletionRecord) -> Result<()>;
}

pub struct RedisSessionStore {
    client: redis::Client,
    conn: Mutex<MultiplexedConnection>,
}

impl RedisSessionStore {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("Failed to create Redis client")?;
        let conn = get_connection_with_retry(&client).await?;
        info!("Connected to Redis at {}", redis_url);

        Ok(Self {
            client,
            conn: Mutex::new(conn),
        })
    }

    async fn reconnect(&self) -> Result<MultiplexedConnection> {
        let fresh = get_connection_with_retry(&self.client).await?;
        *self.conn.lock().await = fresh.clone();
        Ok(fresh)
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    /// Store with a 24-hour expiry, then publish to the completion channel
    async fn persist(&self, record: &CompletionRecord) -> Result<()> {
        let key = summary_key(&record.session_id);
        let json = serde_json::to_string(record)?;

        let mut conn = self.conn.lock().await.clone();
        if let Err(e) = conn
            .set_ex::<_, _, ()>(&key, &json, SUMMARY_EXPIRY_SECS)
            .await
        {
            warn!("Failed to store completion record: {}. Reconnecting...", e);
            conn = self.reconnect().await?;
            conn.set_ex::<_, _, ()>(&key, &json, SUMMARY_EXPIRY_SECS)
                .await
                .with_context(|| format!("Failed to store {}", key))?;
        }

        // Ignore errors; there may be no subscribers
        let _ = conn
            .publish::<_, _, ()>(keys::COMPLETED_CHANNEL, &json)
            .await;

        info!("Stored completion record {}", key);
        Ok(())
    }
}

/// Connect, retrying a bounded number of times
async fn get_connection_with_retry(client: &redis::Client) -> Result<MultiplexedConnection> {
    let mut attempt = 1;
    loop {
        match client.get_multiplexed_async_connection().await {
            Ok(conn) => return Ok(conn),
            Err(e) if attempt < CONNECT_ATTEMPTS => {
                warn!(
                    "Failed to connect to Redis (attempt {}/{}): {}. Retrying in {}s...",
                    attempt,
                    CONNECT_ATTEMPTS,
                    e,
                    CONNECT_RETRY_DELAY.as_secs()
                );
                attempt += 1;
                tokio::time::sleep(CONNECT_RETRY_DELAY).await;
            }
            Err(e) => return Err(e).context("Failed to connect to Redis"),
        }
    }
}

/// Store that only logs the record
#[derive(Debug, Default)]
pub struct LogSessionStore;

#[async_trait]
impl SessionStore for LogSessionStore {
    async fn persist(&self, record: &CompletionRecord) -> Result<()> {
        info!(
            "Session {} completed: score {:.1} ({}), {} submissions, {}/{} problems solved",
            record.session_id,
            record.overall_score,
            record.rating,
            record.total_submissions,
            record.problems_solved,
            record.problems_attempted
        );
        Ok(())
    }
}

#[cfg(test)]
pub mod testing {
    //! In-memory store for orchestrator tests

    use super::*;

    #[derive(Default)]
    pub struct MemorySessionStore {
        records: std::sync::Mutex<Vec<CompletionRecord>>,
    }

    impl MemorySessionStore {
        pub fn records(&self) -> Vec<CompletionRecord> {
            self.records.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SessionStore for MemorySessionStore {
        async fn persist(&self, record: &CompletionRecord) -> Result<()> {
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_key() {
        assert_eq!(summary_key("abc-123"), "interview:summary:abc-123");
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected() {
        assert!(RedisSessionStore::connect("not a url").await.is_err());
    }
}
