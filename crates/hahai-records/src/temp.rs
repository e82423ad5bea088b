//! 临时记录管理
//!
//! 推理完成后创建带存活时间的临时记录；所有者可以取消，否则由存储层过期清理。
//! 临时记录不进入任何索引。

use crate::codec;
use crate::directory::InternDirectory;
use crate::lifecycle::{RecordEvent, RecordState, RecordStateMachine};
use crate::{BlobHandle, MetadataHandle};
use hahai_core::utils::{generate_temp_id, now_seconds};
use hahai_core::{HahaiError, ImageKind, NewTempRecord, PatientRecord, Result};
use hahai_storage::keys::{image_key, record_key};
use hahai_storage::Batch;
use tracing::{debug, info, warn};

/// 临时记录管理器
pub struct TempRecordManager {
    meta: MetadataHandle,
    blobs: BlobHandle,
    directory: InternDirectory,
    lifecycle: RecordStateMachine,
}

impl TempRecordManager {
    pub fn new(meta: MetadataHandle, blobs: BlobHandle, directory: InternDirectory) -> Self {
        Self {
            meta,
            blobs,
            directory,
            lifecycle: RecordStateMachine::new(),
        }
    }

    /// 创建临时记录，返回 `temp-` 前缀的ID
    pub async fn create(&self, request: NewTempRecord) -> Result<String> {
        if request.ttl.is_zero() {
            return Err(HahaiError::Validation("temp record ttl must be positive".to_string()));
        }
        self.directory.ensure_owner(&request.student_id).await?;

        let temp_id = generate_temp_id();
        let record = PatientRecord {
            case_id: temp_id.clone(),
            student_id: request.student_id.clone(),
            notes: String::new(),
            pred_label: request.prediction.label,
            pred_accuracy: request.prediction.accuracy,
            created_at: now_seconds(),
            is_temp: true,
            saved_at: None,
            xray_content_type: request.xray.content_type.clone(),
            gradcam_content_type: request.gradcam.content_type.clone(),
        };

        let meta_key = record_key(&temp_id);
        let mut batch = Batch::new();
        batch
            .hset(&meta_key, codec::encode(&record))
            .expire(&meta_key, request.ttl);
        self.meta.execute(batch).await?;

        // 影像与元数据分别设置相同的存活时间，过期时刻可能有细微偏差
        for (kind, blob) in [
            (ImageKind::Xray, &request.xray),
            (ImageKind::Gradcam, &request.gradcam),
        ] {
            let key = image_key(&temp_id, kind);
            if let Err(e) = self.blobs.set_bytes(&key, &blob.data, Some(request.ttl)).await {
                warn!(temp_id = %temp_id, key = %key, "Failed to store temp image: {}", e);
                self.discard(&temp_id).await;
                return Err(e);
            }
        }

        info!(
            temp_id = %temp_id,
            student_id = %request.student_id,
            ttl_secs = request.ttl.as_secs(),
            "Temp record created"
        );
        Ok(temp_id)
    }

    /// 读取临时记录（仅限所有者）
    pub async fn get(&self, temp_id: &str, student_id: &str) -> Result<PatientRecord> {
        let record = self
            .load(temp_id)
            .await?
            .ok_or_else(|| HahaiError::TempNotFound(format!("Temp record {} not found", temp_id)))?;
        Self::check_owner(&record, student_id)?;
        self.check_transition(&record, RecordEvent::Promote)?;
        Ok(record)
    }

    /// 取消临时记录。记录已不存在时视为成功（已过期或已取消）。
    pub async fn cancel(&self, temp_id: &str, student_id: &str) -> Result<()> {
        let record = match self.load(temp_id).await? {
            Some(record) => record,
            None => {
                debug!(temp_id = %temp_id, "Cancel on absent temp record, nothing to do");
                return Ok(());
            }
        };
        Self::check_owner(&record, student_id)?;
        self.check_transition(&record, RecordEvent::Cancel)?;

        self.meta.delete(&[record_key(temp_id)]).await?;
        self.blobs.delete(&Self::image_keys(temp_id)).await?;

        info!(temp_id = %temp_id, student_id = %student_id, "Temp record cancelled");
        Ok(())
    }

    async fn load(&self, temp_id: &str) -> Result<Option<PatientRecord>> {
        let fields = self.meta.hgetall(&record_key(temp_id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        codec::decode(temp_id, &fields)
            .map(Some)
            .map_err(|e| HahaiError::InvalidTempRecord(e.to_string()))
    }

    fn check_owner(record: &PatientRecord, student_id: &str) -> Result<()> {
        if record.student_id != student_id {
            return Err(HahaiError::Ownership(format!(
                "Record {} does not belong to {}",
                record.case_id, student_id
            )));
        }
        Ok(())
    }

    fn check_transition(&self, record: &PatientRecord, event: RecordEvent) -> Result<()> {
        self.lifecycle
            .transition(&RecordState::of(record), &event)
            .map(|_| ())
            .map_err(|_| {
                HahaiError::InvalidTempRecord(format!("Record {} is not a temp record", record.case_id))
            })
    }

    fn image_keys(temp_id: &str) -> Vec<String> {
        ImageKind::ALL.iter().map(|kind| image_key(temp_id, *kind)).collect()
    }

    /// 创建失败后尽力清理已写入的键
    async fn discard(&self, temp_id: &str) {
        if let Err(e) = self.meta.delete(&[record_key(temp_id)]).await {
            warn!(temp_id = %temp_id, "Failed to discard temp metadata: {}", e);
        }
        if let Err(e) = self.blobs.delete(&Self::image_keys(temp_id)).await {
            warn!(temp_id = %temp_id, "Failed to discard temp images: {}", e);
        }
    }
}
