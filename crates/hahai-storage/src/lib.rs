//! # HaHAI存储模块
//!
//! 元数据存储与影像存储的键空间抽象，以及内存、Redis两种后端。

pub mod keys;
pub mod memory;
pub mod redis_backend;
pub mod store;

pub use memory::MemoryStore;
pub use redis_backend::RedisStore;
pub use store::{Batch, BatchOp, BlobStore, KeyspaceOps, MetadataStore};
