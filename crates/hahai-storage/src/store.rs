//! 存储接口定义
//!
//! 元数据存储（字段映射 + 集合索引）与影像存储（原始字节）是两个独立的键值存储，
//! 二者之间没有跨存储事务，唯一的原子原语是单键的 `rename_nx`。

use async_trait::async_trait;
use hahai_core::Result;
use std::collections::HashMap;
use std::time::Duration;

/// 两类存储共有的键空间操作
#[async_trait]
pub trait KeyspaceOps: Send + Sync {
    /// 键是否存在（已过期视为不存在）
    async fn exists(&self, key: &str) -> Result<bool>;

    /// 删除若干键，返回实际删除的数量
    async fn delete(&self, keys: &[String]) -> Result<u64>;

    /// 设置存活时间，键不存在时返回 false
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// 移除存活时间，键不存在或本无过期时间时返回 false
    async fn persist(&self, key: &str) -> Result<bool>;

    /// 剩余存活时间；键不存在或无过期时间时为 None
    async fn ttl(&self, key: &str) -> Result<Option<Duration>>;

    /// 非破坏性重命名：目标已存在时返回 false，源不存在时报错。
    /// 存活时间随键一起迁移。
    async fn rename_nx(&self, from: &str, to: &str) -> Result<bool>;
}

/// 元数据存储
#[async_trait]
pub trait MetadataStore: KeyspaceOps {
    /// 读取字段映射，键不存在时返回空映射
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>>;

    /// 读取集合成员
    async fn smembers(&self, key: &str) -> Result<Vec<String>>;

    /// 读取字符串值
    async fn get_value(&self, key: &str) -> Result<Option<String>>;

    /// 原子执行一批命令
    async fn execute(&self, batch: Batch) -> Result<()>;
}

/// 影像存储
#[async_trait]
pub trait BlobStore: KeyspaceOps {
    async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn set_bytes(&self, key: &str, data: &[u8], ttl: Option<Duration>) -> Result<()>;
}

/// 批处理中的单条命令
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOp {
    HSet { key: String, fields: Vec<(String, String)> },
    Expire { key: String, ttl: Duration },
    Persist { key: String },
    SAdd { key: String, member: String },
    SRem { key: String, member: String },
    Del { key: String },
    SetValue { key: String, value: String, ttl: Option<Duration> },
}

/// 元数据命令批，按加入顺序整体原子执行
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    ops: Vec<BatchOp>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hset(&mut self, key: &str, fields: Vec<(String, String)>) -> &mut Self {
        self.ops.push(BatchOp::HSet { key: key.to_string(), fields });
        self
    }

    pub fn expire(&mut self, key: &str, ttl: Duration) -> &mut Self {
        self.ops.push(BatchOp::Expire { key: key.to_string(), ttl });
        self
    }

    pub fn persist(&mut self, key: &str) -> &mut Self {
        self.ops.push(BatchOp::Persist { key: key.to_string() });
        self
    }

    pub fn sadd(&mut self, key: &str, member: &str) -> &mut Self {
        self.ops.push(BatchOp::SAdd {
            key: key.to_string(),
            member: member.to_string(),
        });
        self
    }

    pub fn srem(&mut self, key: &str, member: &str) -> &mut Self {
        self.ops.push(BatchOp::SRem {
            key: key.to_string(),
            member: member.to_string(),
        });
        self
    }

    pub fn del(&mut self, key: &str) -> &mut Self {
        self.ops.push(BatchOp::Del { key: key.to_string() });
        self
    }

    pub fn set_value(&mut self, key: &str, value: &str, ttl: Option<Duration>) -> &mut Self {
        self.ops.push(BatchOp::SetValue {
            key: key.to_string(),
            value: value.to_string(),
            ttl,
        });
        self
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_keeps_order() {
        let mut batch = Batch::new();
        batch
            .hset("record:1", vec![("notes".to_string(), "x".to_string())])
            .persist("record:1")
            .sadd("records", "1");

        assert_eq!(batch.ops().len(), 3);
        assert!(matches!(batch.ops()[0], BatchOp::HSet { .. }));
        assert!(matches!(batch.ops()[1], BatchOp::Persist { .. }));
        assert_eq!(
            batch.ops()[2],
            BatchOp::SAdd {
                key: "records".to_string(),
                member: "1".to_string()
            }
        );
    }
}
