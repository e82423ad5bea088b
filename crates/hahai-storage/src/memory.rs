//! 内存存储后端
//!
//! 单进程部署与测试使用。过期采用惰性清理，时钟为 `tokio::time::Instant`，
//! 因此测试中可以通过暂停并推进时间来验证过期行为。

use crate::store::{Batch, BatchOp, BlobStore, KeyspaceOps, MetadataStore};
use async_trait::async_trait;
use hahai_core::{HahaiError, Result};
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

const WRONG_TYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

#[derive(Debug, Clone)]
enum Value {
    Hash(HashMap<String, String>),
    Set(BTreeSet<String>),
    Bytes(Vec<u8>),
    Text(String),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |exp| exp > now)
    }
}

/// 内存键值存储，同时实现元数据存储与影像存储接口
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 列出指定前缀下的有效键（已排序）
    pub async fn keys(&self, prefix: &str) -> Vec<String> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(key, entry)| key.starts_with(prefix) && entry.is_live(now))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// 清理已过期的键，返回清理数量
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        let purged = before - entries.len();
        if purged > 0 {
            debug!("Purged {} expired keys", purged);
        }
        purged
    }

    async fn read_live<T>(&self, key: &str, f: impl FnOnce(&Entry) -> Result<T>) -> Result<Option<T>> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => f(entry).map(Some),
            _ => Ok(None),
        }
    }
}

/// 从写锁内的映射中取有效条目，顺带移除已过期条目
fn live_entry_mut<'a>(
    entries: &'a mut HashMap<String, Entry>,
    key: &str,
    now: Instant,
) -> Option<&'a mut Entry> {
    if entries.get(key).is_some_and(|entry| !entry.is_live(now)) {
        entries.remove(key);
    }
    entries.get_mut(key)
}

/// 批处理的暂存视图：所有命令先作用于覆盖层，全部成功后才提交
struct Staging<'a> {
    base: &'a HashMap<String, Entry>,
    overlay: HashMap<String, Option<Entry>>,
    now: Instant,
}

impl<'a> Staging<'a> {
    fn new(base: &'a HashMap<String, Entry>, now: Instant) -> Self {
        Self {
            base,
            overlay: HashMap::new(),
            now,
        }
    }

    fn current(&self, key: &str) -> Option<Entry> {
        match self.overlay.get(key) {
            Some(staged) => staged.clone(),
            None => self
                .base
                .get(key)
                .filter(|entry| entry.is_live(self.now))
                .cloned(),
        }
    }

    fn apply(&mut self, op: BatchOp) -> Result<()> {
        match op {
            BatchOp::HSet { key, fields } => {
                let mut entry = self
                    .current(&key)
                    .unwrap_or_else(|| Entry::new(Value::Hash(HashMap::new())));
                match &mut entry.value {
                    Value::Hash(map) => map.extend(fields),
                    _ => return Err(HahaiError::Store(WRONG_TYPE.to_string())),
                }
                self.overlay.insert(key, Some(entry));
            }
            BatchOp::Expire { key, ttl } => {
                if let Some(mut entry) = self.current(&key) {
                    entry.expires_at = Some(self.now + ttl);
                    self.overlay.insert(key, Some(entry));
                }
            }
            BatchOp::Persist { key } => {
                if let Some(mut entry) = self.current(&key) {
                    entry.expires_at = None;
                    self.overlay.insert(key, Some(entry));
                }
            }
            BatchOp::SAdd { key, member } => {
                let mut entry = self
                    .current(&key)
                    .unwrap_or_else(|| Entry::new(Value::Set(BTreeSet::new())));
                match &mut entry.value {
                    Value::Set(set) => {
                        set.insert(member);
                    }
                    _ => return Err(HahaiError::Store(WRONG_TYPE.to_string())),
                }
                self.overlay.insert(key, Some(entry));
            }
            BatchOp::SRem { key, member } => {
                if let Some(mut entry) = self.current(&key) {
                    let now_empty = match &mut entry.value {
                        Value::Set(set) => {
                            set.remove(&member);
                            set.is_empty()
                        }
                        _ => return Err(HahaiError::Store(WRONG_TYPE.to_string())),
                    };
                    // 与Redis一致：集合为空即删除该键
                    self.overlay.insert(key, if now_empty { None } else { Some(entry) });
                }
            }
            BatchOp::Del { key } => {
                self.overlay.insert(key, None);
            }
            BatchOp::SetValue { key, value, ttl } => {
                let entry = Entry {
                    value: Value::Text(value),
                    expires_at: ttl.map(|ttl| self.now + ttl),
                };
                self.overlay.insert(key, Some(entry));
            }
        }
        Ok(())
    }

    fn into_overlay(self) -> HashMap<String, Option<Entry>> {
        self.overlay
    }
}

#[async_trait]
impl KeyspaceOps for MemoryStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.read_live(key, |_| Ok(())).await?.is_some())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let mut removed = 0;
        for key in keys {
            if let Some(entry) = entries.remove(key) {
                if entry.is_live(now) {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        match live_entry_mut(&mut entries, key, now) {
            Some(entry) => {
                entry.expires_at = Some(now + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn persist(&self, key: &str) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        match live_entry_mut(&mut entries, key, now) {
            Some(entry) => Ok(entry.expires_at.take().is_some()),
            None => Ok(false),
        }
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let now = Instant::now();
        let remaining = self
            .read_live(key, |entry| Ok(entry.expires_at.map(|exp| exp - now)))
            .await?;
        Ok(remaining.flatten())
    }

    async fn rename_nx(&self, from: &str, to: &str) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        if live_entry_mut(&mut entries, from, now).is_none() {
            return Err(HahaiError::Store(format!("ERR no such key: {}", from)));
        }
        if from == to || live_entry_mut(&mut entries, to, now).is_some() {
            return Ok(false);
        }
        if let Some(entry) = entries.remove(from) {
            entries.insert(to.to_string(), entry);
        }
        Ok(true)
    }
}

#[async_trait]
impl MetadataStore for MemoryStore {
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        let fields = self
            .read_live(key, |entry| match &entry.value {
                Value::Hash(map) => Ok(map.clone()),
                _ => Err(HahaiError::Store(WRONG_TYPE.to_string())),
            })
            .await?;
        Ok(fields.unwrap_or_default())
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        let members = self
            .read_live(key, |entry| match &entry.value {
                Value::Set(set) => Ok(set.iter().cloned().collect()),
                _ => Err(HahaiError::Store(WRONG_TYPE.to_string())),
            })
            .await?;
        Ok(members.unwrap_or_default())
    }

    async fn get_value(&self, key: &str) -> Result<Option<String>> {
        self.read_live(key, |entry| match &entry.value {
            Value::Text(text) => Ok(text.clone()),
            _ => Err(HahaiError::Store(WRONG_TYPE.to_string())),
        })
        .await
    }

    async fn execute(&self, batch: Batch) -> Result<()> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;

        let mut staging = Staging::new(&entries, now);
        for op in batch.into_ops() {
            staging.apply(op)?;
        }
        let overlay = staging.into_overlay();

        for (key, staged) in overlay {
            match staged {
                Some(entry) => {
                    entries.insert(key, entry);
                }
                None => {
                    entries.remove(&key);
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.read_live(key, |entry| match &entry.value {
            Value::Bytes(data) => Ok(data.clone()),
            _ => Err(HahaiError::Store(WRONG_TYPE.to_string())),
        })
        .await
    }

    async fn set_bytes(&self, key: &str, data: &[u8], ttl: Option<Duration>) -> Result<()> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Bytes(data.to_vec()),
                expires_at: ttl.map(|ttl| now + ttl),
            },
        );
        Ok(())
    }
}
