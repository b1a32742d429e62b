//! Redis-backed deduper.
//!
//! Signatures live in a single Redis SET. Every operation carries a short
//! timeout; on any failure the answer degrades per the fail-open contract
//! in the trait.

use super::Deduper;
use crate::config::Config;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info};

const SIGNATURE_SET_KEY: &str = "deduper_signatures";
const OP_TIMEOUT: Duration = Duration::from_secs(1);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

pub struct RedisDeduper {
    conn: ConnectionManager,
}

impl RedisDeduper {
    /// Connect and validate the connection with a PING. A failure here is a
    /// startup error; the caller decides whether that is fatal.
    pub async fn connect(config: &Config) -> anyhow::Result<Self> {
        let url = if config.redis_password.is_empty() {
            format!(
                "redis://{}:{}/{}",
                config.redis_host, config.redis_port, config.redis_db
            )
        } else {
            format!(
                "redis://:{}@{}:{}/{}",
                config.redis_password, config.redis_host, config.redis_port, config.redis_db
            )
        };

        let client = redis::Client::open(url)?;
        let mut conn = timeout(CONNECT_TIMEOUT, client.get_connection_manager()).await??;
        let _pong: String =
            timeout(CONNECT_TIMEOUT, redis::cmd("PING").query_async(&mut conn)).await??;

        info!(
            host = %config.redis_host,
            port = %config.redis_port,
            "connected to redis"
        );

        Ok(Self { conn })
    }
}

#[async_trait]
impl Deduper for RedisDeduper {
    async fn is_duplicate(&self, signature: &str) -> bool {
        let mut conn = self.conn.clone();
        match timeout(OP_TIMEOUT, conn.sismember::<_, _, bool>(SIGNATURE_SET_KEY, signature)).await
        {
            Ok(Ok(exists)) => exists,
            Ok(Err(err)) => {
                error!(error = %err, "redis duplicate check failed, assuming not duplicate");
                false
            }
            Err(_) => {
                error!("redis duplicate check timed out, assuming not duplicate");
                false
            }
        }
    }

    async fn store_signature(&self, signature: &str) {
        let mut conn = self.conn.clone();
        match timeout(OP_TIMEOUT, conn.sadd::<_, _, i64>(SIGNATURE_SET_KEY, signature)).await {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => error!(error = %err, "failed to store signature in redis"),
            Err(_) => error!("redis signature store timed out"),
        }
    }
}
