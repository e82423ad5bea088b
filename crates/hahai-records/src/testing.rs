//! 测试辅助：故障注入存储与样例数据

use crate::{BlobHandle, InternDirectory, MetadataHandle, RecordEngine};
use async_trait::async_trait;
use hahai_core::{
    HahaiError, ImageBlob, Intern, NewRecord, NewTempRecord, PredLabel, Prediction, Result,
};
use hahai_storage::{Batch, BlobStore, KeyspaceOps, MemoryStore, MetadataStore};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type RenameRule = Box<dyn Fn(&str, &str) -> bool + Send + Sync>;

/// 包装内存存储，按规则让指定操作失败
pub struct FaultyStore {
    pub inner: Arc<MemoryStore>,
    rename_rule: Mutex<Option<RenameRule>>,
    fail_batches: AtomicBool,
    fail_persist: AtomicBool,
    fail_set_bytes: Mutex<Option<String>>,
    fail_delete: AtomicBool,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MemoryStore::new()),
            rename_rule: Mutex::new(None),
            fail_batches: AtomicBool::new(false),
            fail_persist: AtomicBool::new(false),
            fail_set_bytes: Mutex::new(None),
            fail_delete: AtomicBool::new(false),
        }
    }

    /// 规则返回 true 时 `rename_nx(from, to)` 报存储错误
    pub fn fail_rename_when(&self, rule: impl Fn(&str, &str) -> bool + Send + Sync + 'static) {
        *self.rename_rule.lock().unwrap() = Some(Box::new(rule));
    }

    pub fn fail_batches(&self, fail: bool) {
        self.fail_batches.store(fail, Ordering::SeqCst);
    }

    pub fn fail_persist(&self, fail: bool) {
        self.fail_persist.store(fail, Ordering::SeqCst);
    }

    /// 键包含该片段时 `set_bytes` 失败
    pub fn fail_set_bytes_matching(&self, fragment: &str) {
        *self.fail_set_bytes.lock().unwrap() = Some(fragment.to_string());
    }

    pub fn fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    fn injected(op: &str, key: &str) -> HahaiError {
        HahaiError::Store(format!("injected {} failure on {}", op, key))
    }
}

#[async_trait]
impl KeyspaceOps for FaultyStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        self.inner.exists(key).await
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(Self::injected("delete", &keys.join(",")));
        }
        self.inner.delete(keys).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.inner.expire(key, ttl).await
    }

    async fn persist(&self, key: &str) -> Result<bool> {
        if self.fail_persist.load(Ordering::SeqCst) {
            return Err(Self::injected("persist", key));
        }
        self.inner.persist(key).await
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        self.inner.ttl(key).await
    }

    async fn rename_nx(&self, from: &str, to: &str) -> Result<bool> {
        let fail = self
            .rename_rule
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|rule| rule(from, to));
        if fail {
            return Err(Self::injected("rename", to));
        }
        self.inner.rename_nx(from, to).await
    }
}

#[async_trait]
impl MetadataStore for FaultyStore {
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        self.inner.hgetall(key).await
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        self.inner.smembers(key).await
    }

    async fn get_value(&self, key: &str) -> Result<Option<String>> {
        self.inner.get_value(key).await
    }

    async fn execute(&self, batch: Batch) -> Result<()> {
        if self.fail_batches.load(Ordering::SeqCst) {
            return Err(Self::injected("batch", "metadata"));
        }
        self.inner.execute(batch).await
    }
}

#[async_trait]
impl BlobStore for FaultyStore {
    async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.inner.get_bytes(key).await
    }

    async fn set_bytes(&self, key: &str, data: &[u8], ttl: Option<Duration>) -> Result<()> {
        let fail = self
            .fail_set_bytes
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|fragment| key.contains(fragment.as_str()));
        if fail {
            return Err(Self::injected("set", key));
        }
        self.inner.set_bytes(key, data, ttl).await
    }
}

/// 两个独立的内存存储及其上的引擎
pub struct Fixture {
    pub meta: Arc<FaultyStore>,
    pub blobs: Arc<FaultyStore>,
    pub engine: RecordEngine,
}

impl Fixture {
    pub fn new() -> Self {
        let meta = Arc::new(FaultyStore::new());
        let blobs = Arc::new(FaultyStore::new());
        let engine = RecordEngine::new(
            meta.clone() as MetadataHandle,
            blobs.clone() as BlobHandle,
        );
        Self { meta, blobs, engine }
    }

    pub fn directory(&self) -> &InternDirectory {
        self.engine.directory()
    }

    pub async fn with_interns(ids: &[&str]) -> Self {
        let fixture = Self::new();
        for id in ids {
            fixture
                .directory()
                .create_intern(&Intern::new(id, "Name", "Surname"))
                .await
                .unwrap();
        }
        fixture
    }

    /// 元数据存储中所有 record: 前缀键
    pub async fn record_meta_keys(&self) -> Vec<String> {
        self.meta.inner.keys("record:").await
    }

    pub async fn blob_keys(&self) -> Vec<String> {
        self.blobs.inner.keys("record:").await
    }
}

pub const XRAY: &[u8] = b"\xff\xd8xray-bytes";
pub const GRADCAM: &[u8] = b"\x89PNGgradcam-bytes";

pub fn temp_request(student_id: &str, ttl: Duration) -> NewTempRecord {
    NewTempRecord {
        student_id: student_id.to_string(),
        prediction: Prediction::new(PredLabel::Positive, 91.2).unwrap(),
        xray: ImageBlob::new(XRAY.to_vec(), "image/jpeg"),
        gradcam: ImageBlob::new(GRADCAM.to_vec(), "image/png"),
        ttl,
    }
}

pub fn record_request(student_id: &str, notes: &str) -> NewRecord {
    NewRecord {
        student_id: student_id.to_string(),
        notes: notes.to_string(),
        prediction: Prediction::new(PredLabel::Negative, 40.0).unwrap(),
        xray: ImageBlob::new(XRAY.to_vec(), "image/jpeg"),
        gradcam: ImageBlob::new(GRADCAM.to_vec(), "image/png"),
    }
}
