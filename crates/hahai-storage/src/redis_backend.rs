//! Redis存储后端
//!
//! 元数据存储与影像存储各自持有一个 `RedisStore`，可指向不同实例或不同库。

use crate::store::{Batch, BatchOp, BlobStore, KeyspaceOps, MetadataStore};
use async_trait::async_trait;
use hahai_core::{HahaiError, Result};
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use std::time::Duration;
use tracing::info;

fn store_err(e: redis::RedisError) -> HahaiError {
    HahaiError::Store(e.to_string())
}

fn millis(ttl: Duration) -> u64 {
    // PEXPIRE 不接受 0
    ttl.as_millis().clamp(1, u64::MAX as u128) as u64
}

/// Redis键值存储
#[derive(Clone)]
pub struct RedisStore {
    name: String,
    connection: ConnectionManager,
}

impl RedisStore {
    /// 建立连接并执行一次 PING
    pub async fn connect(name: &str, redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).map_err(store_err)?;
        let mut connection = ConnectionManager::new(client).await.map_err(store_err)?;

        let pong: String = redis::cmd("PING")
            .query_async(&mut connection)
            .await
            .map_err(store_err)?;
        info!("Connected to {} store ({})", name, pong);

        Ok(Self {
            name: name.to_string(),
            connection,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn conn(&self) -> ConnectionManager {
        self.connection.clone()
    }
}

#[async_trait]
impl KeyspaceOps for RedisStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        let count: i64 = redis::cmd("EXISTS")
            .arg(key)
            .query_async(&mut self.conn())
            .await
            .map_err(store_err)?;
        Ok(count > 0)
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut cmd = redis::cmd("DEL");
        for key in keys {
            cmd.arg(key);
        }
        let removed: u64 = cmd
            .query_async(&mut self.conn())
            .await
            .map_err(store_err)?;
        Ok(removed)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let applied: i64 = redis::cmd("PEXPIRE")
            .arg(key)
            .arg(millis(ttl))
            .query_async(&mut self.conn())
            .await
            .map_err(store_err)?;
        Ok(applied == 1)
    }

    async fn persist(&self, key: &str) -> Result<bool> {
        let cleared: i64 = redis::cmd("PERSIST")
            .arg(key)
            .query_async(&mut self.conn())
            .await
            .map_err(store_err)?;
        Ok(cleared == 1)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        // -2: 键不存在, -1: 无过期时间
        let remaining: i64 = redis::cmd("PTTL")
            .arg(key)
            .query_async(&mut self.conn())
            .await
            .map_err(store_err)?;
        Ok((remaining >= 0).then(|| Duration::from_millis(remaining as u64)))
    }

    async fn rename_nx(&self, from: &str, to: &str) -> Result<bool> {
        let renamed: i64 = redis::cmd("RENAMENX")
            .arg(from)
            .arg(to)
            .query_async(&mut self.conn())
            .await
            .map_err(store_err)?;
        Ok(renamed == 1)
    }
}

#[async_trait]
impl MetadataStore for RedisStore {
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        redis::cmd("HGETALL")
            .arg(key)
            .query_async(&mut self.conn())
            .await
            .map_err(store_err)
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        redis::cmd("SMEMBERS")
            .arg(key)
            .query_async(&mut self.conn())
            .await
            .map_err(store_err)
    }

    async fn get_value(&self, key: &str) -> Result<Option<String>> {
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut self.conn())
            .await
            .map_err(store_err)
    }

    async fn execute(&self, batch: Batch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in batch.into_ops() {
            match op {
                BatchOp::HSet { key, fields } => {
                    if fields.is_empty() {
                        continue;
                    }
                    let cmd = pipe.cmd("HSET").arg(&key);
                    for (field, value) in &fields {
                        cmd.arg(field).arg(value);
                    }
                    cmd.ignore();
                }
                BatchOp::Expire { key, ttl } => {
                    pipe.cmd("PEXPIRE").arg(&key).arg(millis(ttl)).ignore();
                }
                BatchOp::Persist { key } => {
                    pipe.cmd("PERSIST").arg(&key).ignore();
                }
                BatchOp::SAdd { key, member } => {
                    pipe.cmd("SADD").arg(&key).arg(&member).ignore();
                }
                BatchOp::SRem { key, member } => {
                    pipe.cmd("SREM").arg(&key).arg(&member).ignore();
                }
                BatchOp::Del { key } => {
                    pipe.cmd("DEL").arg(&key).ignore();
                }
                BatchOp::SetValue { key, value, ttl } => {
                    let cmd = pipe.cmd("SET").arg(&key).arg(&value);
                    if let Some(ttl) = ttl {
                        cmd.arg("PX").arg(millis(ttl));
                    }
                    cmd.ignore();
                }
            }
        }

        let _: () = pipe
            .query_async(&mut self.conn())
            .await
            .map_err(store_err)?;
        Ok(())
    }
}

#[async_trait]
impl BlobStore for RedisStore {
    async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut self.conn())
            .await
            .map_err(store_err)
    }

    async fn set_bytes(&self, key: &str, data: &[u8], ttl: Option<Duration>) -> Result<()> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(data);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(millis(ttl));
        }
        let _: () = cmd
            .query_async(&mut self.conn())
            .await
            .map_err(store_err)?;
        Ok(())
    }
}
