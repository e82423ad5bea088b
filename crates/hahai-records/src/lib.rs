//! # HaHAI记录生命周期模块
//!
//! 管理分析记录从临时到永久的完整生命周期：
//! - 实习生目录：所有者校验与所有权索引
//! - 临时记录管理：推理完成后创建、所有者取消、存储层过期
//! - 记录提升：跨两个存储的重命名事务，失败时尽力回滚
//! - 永久记录存储：病例的增删查与索引列表

pub mod codec;
pub mod directory;
pub mod engine;
pub mod lifecycle;
pub mod permanent;
pub mod promotion;
pub mod temp;

#[cfg(test)]
mod testing;

use hahai_storage::{BlobStore, MetadataStore};
use std::sync::Arc;

/// 元数据存储句柄
pub type MetadataHandle = Arc<dyn MetadataStore>;
/// 影像存储句柄
pub type BlobHandle = Arc<dyn BlobStore>;

// 重新导出主要类型
pub use directory::InternDirectory;
pub use engine::RecordEngine;
pub use lifecycle::{RecordEvent, RecordState, RecordStateMachine};
pub use permanent::PermanentRecordStore;
pub use promotion::{PromotionOutcome, PromotionTransaction};
pub use temp::TempRecordManager;
