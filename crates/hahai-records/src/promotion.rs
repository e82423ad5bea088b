//! 记录提升事务
//!
//! 将临时记录（元数据 + 两张影像）迁移到永久命名空间。两个存储之间没有跨存储事务，
//! 每个键的迁移都依赖非破坏性重命名，顺序为先影像后元数据：
//!
//! 1. 读取临时元数据，不存在则 `TempNotFound`
//! 2. 校验所有者与临时状态
//! 3. 校验两张影像仍然存在
//! 4. 生成永久ID，依次重命名两张影像
//! 5. 重命名元数据
//! 6. 一个原子批处理内更新字段、移除过期时间、加入全局索引与所有者索引
//! 7. 移除两张影像的过期时间
//!
//! 第4-6步任一失败都会尝试把已迁移的键改回原名（只尝试一次）。回滚本身失败时记录
//! 会残留无索引引用的键，此时在 `hahai::reconcile` 目标上输出错误事件以便人工对账。

use crate::codec::{self, FIELD_CASE_ID, FIELD_IS_TEMP, FIELD_NOTES, FIELD_SAVED_AT};
use crate::directory::InternDirectory;
use crate::lifecycle::{RecordEvent, RecordState, RecordStateMachine};
use crate::{BlobHandle, MetadataHandle};
use hahai_core::utils::{generate_case_id, now_seconds};
use hahai_core::{HahaiError, ImageKind, Result};
use hahai_storage::keys::{image_key, record_key, ALL_RECORDS_KEY};
use hahai_storage::Batch;
use tracing::{error, info, warn};

/// 提升结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromotionOutcome {
    /// 全部步骤完成
    Committed { case_id: String },
    /// 中途失败，已迁移的键全部改回临时名称
    RolledBack { reason: String },
    /// 中途失败且无法完全恢复，需要人工对账
    Inconsistent {
        reason: String,
        orphaned_keys: Vec<String>,
    },
}

/// 一次成功的单键重命名
#[derive(Debug, Clone)]
struct Moved {
    from: String,
    to: String,
}

/// 记录提升事务
pub struct PromotionTransaction {
    meta: MetadataHandle,
    blobs: BlobHandle,
    lifecycle: RecordStateMachine,
}

impl PromotionTransaction {
    pub fn new(meta: MetadataHandle, blobs: BlobHandle) -> Self {
        Self {
            meta,
            blobs,
            lifecycle: RecordStateMachine::new(),
        }
    }

    /// 提升临时记录，返回新的永久病例ID
    ///
    /// 非 `Committed` 结果一律映射为 `PromotionFailed`。`Inconsistent` 时病例可能
    /// 已提交并可见（仅影像仍带过期时间），错误信息中带有该病例ID；
    /// 需要区分时使用 [`execute`](Self::execute)。
    pub async fn promote(&self, temp_id: &str, student_id: &str, notes: &str) -> Result<String> {
        match self.execute(temp_id, student_id, notes).await? {
            PromotionOutcome::Committed { case_id } => Ok(case_id),
            PromotionOutcome::RolledBack { reason } => Err(HahaiError::PromotionFailed(reason)),
            PromotionOutcome::Inconsistent {
                reason,
                orphaned_keys,
            } => Err(HahaiError::PromotionFailed(format!(
                "{}; manual reconciliation required for {}",
                reason,
                orphaned_keys.join(", ")
            ))),
        }
    }

    /// 执行提升。前置校验失败返回 `Err`，重命名阶段的失败以结果状态返回。
    pub async fn execute(&self, temp_id: &str, student_id: &str, notes: &str) -> Result<PromotionOutcome> {
        // 1. 读取临时元数据
        let temp_meta_key = record_key(temp_id);
        let fields = self.meta.hgetall(&temp_meta_key).await?;
        if fields.is_empty() {
            return Err(HahaiError::TempNotFound(format!("Temp record {} not found", temp_id)));
        }
        let record = codec::decode(temp_id, &fields)
            .map_err(|e| HahaiError::InvalidTempRecord(e.to_string()))?;

        // 2. 所有者与状态
        if record.student_id != student_id {
            return Err(HahaiError::Ownership(format!(
                "Temp record {} does not belong to {}",
                temp_id, student_id
            )));
        }
        self.lifecycle
            .transition(&RecordState::of(&record), &RecordEvent::Promote)
            .map_err(|_| {
                HahaiError::InvalidTempRecord(format!("Record {} is not a temp record", temp_id))
            })?;

        // 3. 影像必须完整
        for kind in ImageKind::ALL {
            if !self.blobs.exists(&image_key(temp_id, kind)).await? {
                return Err(HahaiError::InvalidTempRecord(format!(
                    "Temp record {} is missing {}",
                    temp_id, kind
                )));
            }
        }

        // 4. 迁移影像
        let case_id = generate_case_id();
        let mut moved_blobs: Vec<Moved> = Vec::with_capacity(2);
        for kind in ImageKind::ALL {
            let from = image_key(temp_id, kind);
            let to = image_key(&case_id, kind);
            match self.blobs.rename_nx(&from, &to).await {
                Ok(true) => moved_blobs.push(Moved { from, to }),
                Ok(false) => {
                    let reason = format!("destination {} already exists", to);
                    return Ok(self.roll_back(temp_id, &case_id, &moved_blobs, None, reason).await);
                }
                Err(e) => {
                    let reason = format!("failed to move {}: {}", from, e);
                    return Ok(self.roll_back(temp_id, &case_id, &moved_blobs, None, reason).await);
                }
            }
        }

        // 5. 迁移元数据
        let meta_move = Moved {
            from: temp_meta_key,
            to: record_key(&case_id),
        };
        match self.meta.rename_nx(&meta_move.from, &meta_move.to).await {
            Ok(true) => {}
            Ok(false) => {
                let reason = format!("destination {} already exists", meta_move.to);
                return Ok(self.roll_back(temp_id, &case_id, &moved_blobs, None, reason).await);
            }
            Err(e) => {
                let reason = format!("failed to move {}: {}", meta_move.from, e);
                return Ok(self.roll_back(temp_id, &case_id, &moved_blobs, None, reason).await);
            }
        }

        // 6. 提交：所有重命名成功后才翻转 is_temp 并加入索引
        let mut batch = Batch::new();
        batch
            .hset(
                &meta_move.to,
                vec![
                    (FIELD_CASE_ID.to_string(), case_id.clone()),
                    (FIELD_NOTES.to_string(), notes.to_string()),
                    (FIELD_IS_TEMP.to_string(), codec::flag(false)),
                    (FIELD_SAVED_AT.to_string(), now_seconds().timestamp().to_string()),
                ],
            )
            .persist(&meta_move.to)
            .sadd(ALL_RECORDS_KEY, &case_id);
        InternDirectory::stage_add_owned(&mut batch, student_id, &case_id);

        if let Err(e) = self.meta.execute(batch).await {
            let reason = format!("failed to commit {}: {}", meta_move.to, e);
            return Ok(self
                .roll_back(temp_id, &case_id, &moved_blobs, Some(&meta_move), reason)
                .await);
        }

        // 7. 影像永久保存
        let mut unpersisted = Vec::new();
        for moved in &moved_blobs {
            match self.blobs.persist(&moved.to).await {
                Ok(true) => {}
                // persist 返回 false 既可能是本无过期时间，也可能是键已消失
                Ok(false) => {
                    if !self.blobs.exists(&moved.to).await.unwrap_or(false) {
                        unpersisted.push(moved.to.clone());
                    }
                }
                Err(e) => {
                    warn!(case_id = %case_id, key = %moved.to, "Failed to persist image: {}", e);
                    unpersisted.push(moved.to.clone());
                }
            }
        }
        if !unpersisted.is_empty() {
            error!(
                target: "hahai::reconcile",
                temp_id = %temp_id,
                case_id = %case_id,
                orphaned_keys = ?unpersisted,
                "Promotion committed but images are still expiring; manual reconciliation required"
            );
            return Ok(PromotionOutcome::Inconsistent {
                reason: format!("record {} committed but its images could not be persisted", case_id),
                orphaned_keys: unpersisted,
            });
        }

        info!(
            temp_id = %temp_id,
            case_id = %case_id,
            student_id = %student_id,
            "Temp record promoted"
        );
        Ok(PromotionOutcome::Committed { case_id })
    }

    /// 把已迁移的键改回临时名称，每个键只尝试一次
    async fn roll_back(
        &self,
        temp_id: &str,
        case_id: &str,
        moved_blobs: &[Moved],
        moved_meta: Option<&Moved>,
        reason: String,
    ) -> PromotionOutcome {
        let mut orphaned_keys = Vec::new();

        if let Some(moved) = moved_meta {
            match self.meta.rename_nx(&moved.to, &moved.from).await {
                Ok(true) => {}
                Ok(false) => orphaned_keys.push(moved.to.clone()),
                Err(e) => {
                    warn!(key = %moved.to, "Metadata rollback failed: {}", e);
                    orphaned_keys.push(moved.to.clone());
                }
            }
        }

        for moved in moved_blobs.iter().rev() {
            match self.blobs.rename_nx(&moved.to, &moved.from).await {
                Ok(true) => {}
                Ok(false) => orphaned_keys.push(moved.to.clone()),
                Err(e) => {
                    warn!(key = %moved.to, "Image rollback failed: {}", e);
                    orphaned_keys.push(moved.to.clone());
                }
            }
        }

        if orphaned_keys.is_empty() {
            warn!(
                temp_id = %temp_id,
                case_id = %case_id,
                "Promotion rolled back: {}",
                reason
            );
            PromotionOutcome::RolledBack { reason }
        } else {
            error!(
                target: "hahai::reconcile",
                temp_id = %temp_id,
                case_id = %case_id,
                orphaned_keys = ?orphaned_keys,
                "Promotion rollback failed; manual reconciliation required: {}",
                reason
            );
            PromotionOutcome::Inconsistent {
                reason,
                orphaned_keys,
            }
        }
    }
}
