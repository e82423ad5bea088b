//! 永久记录存储
//!
//! 已提升（或直接创建）的病例。每条永久记录同时出现在全局索引与所有者索引中；
//! 读路径不信任索引，索引中已失效的条目直接跳过。

use crate::codec;
use crate::directory::InternDirectory;
use crate::{BlobHandle, MetadataHandle};
use hahai_core::utils::{generate_case_id, is_temp_id, now_seconds};
use hahai_core::{HahaiError, ImageKind, NewRecord, PatientRecord, Result};
use hahai_storage::keys::{image_key, record_key, ALL_RECORDS_KEY};
use hahai_storage::Batch;
use tracing::{error, info, warn};

/// 永久记录存储
pub struct PermanentRecordStore {
    meta: MetadataHandle,
    blobs: BlobHandle,
    directory: InternDirectory,
}

impl PermanentRecordStore {
    pub fn new(meta: MetadataHandle, blobs: BlobHandle, directory: InternDirectory) -> Self {
        Self {
            meta,
            blobs,
            directory,
        }
    }

    /// 直接创建永久记录（不经过临时阶段）
    pub async fn create(&self, request: NewRecord) -> Result<String> {
        self.directory.ensure_owner(&request.student_id).await?;

        let case_id = generate_case_id();
        let now = now_seconds();
        let record = PatientRecord {
            case_id: case_id.clone(),
            student_id: request.student_id.clone(),
            notes: request.notes,
            pred_label: request.prediction.label,
            pred_accuracy: request.prediction.accuracy,
            created_at: now,
            is_temp: false,
            saved_at: Some(now),
            xray_content_type: request.xray.content_type.clone(),
            gradcam_content_type: request.gradcam.content_type.clone(),
        };

        let mut batch = Batch::new();
        batch
            .hset(&record_key(&case_id), codec::encode(&record))
            .sadd(ALL_RECORDS_KEY, &case_id);
        InternDirectory::stage_add_owned(&mut batch, &request.student_id, &case_id);
        self.meta.execute(batch).await?;

        for (kind, blob) in [
            (ImageKind::Xray, &request.xray),
            (ImageKind::Gradcam, &request.gradcam),
        ] {
            let key = image_key(&case_id, kind);
            if let Err(e) = self.blobs.set_bytes(&key, &blob.data, None).await {
                warn!(case_id = %case_id, key = %key, "Failed to store image, removing record: {}", e);
                self.discard(&case_id, &request.student_id).await;
                return Err(e);
            }
        }

        info!(case_id = %case_id, student_id = %request.student_id, "Record created");
        Ok(case_id)
    }

    /// 读取永久记录；临时ID或临时记录视为不存在
    pub async fn get(&self, case_id: &str) -> Result<PatientRecord> {
        let not_found = || HahaiError::NotFound(format!("Record {} not found", case_id));
        if is_temp_id(case_id) {
            return Err(not_found());
        }

        let fields = self.meta.hgetall(&record_key(case_id)).await?;
        if fields.is_empty() {
            return Err(not_found());
        }
        let record = codec::decode(case_id, &fields)?;
        if record.is_temp {
            return Err(not_found());
        }
        Ok(record)
    }

    /// 全部永久记录，按病例ID升序
    pub async fn list(&self) -> Result<Vec<PatientRecord>> {
        let ids = self.meta.smembers(ALL_RECORDS_KEY).await?;
        self.load_all(ids).await
    }

    /// 某实习生拥有的永久记录，按病例ID升序
    pub async fn list_for_owner(&self, student_id: &str) -> Result<Vec<PatientRecord>> {
        self.directory.ensure_owner(student_id).await?;
        let ids = self.directory.list_owned(student_id).await?;
        self.load_all(ids).await
    }

    /// 删除永久记录。元数据与索引在一个批处理中移除，影像删除失败只记录日志。
    pub async fn delete(&self, case_id: &str) -> Result<()> {
        let record = self.get(case_id).await?;

        let mut batch = Batch::new();
        batch
            .del(&record_key(case_id))
            .srem(ALL_RECORDS_KEY, case_id);
        InternDirectory::stage_remove_owned(&mut batch, &record.student_id, case_id);
        self.meta.execute(batch).await?;

        if let Err(e) = self.blobs.delete(&Self::image_keys(case_id)).await {
            error!(case_id = %case_id, "Record deleted but its images could not be removed: {}", e);
        }

        info!(case_id = %case_id, student_id = %record.student_id, "Record deleted");
        Ok(())
    }

    async fn load_all(&self, mut ids: Vec<String>) -> Result<Vec<PatientRecord>> {
        ids.sort();
        let mut records = Vec::with_capacity(ids.len());
        for case_id in ids {
            match self.get(&case_id).await {
                Ok(record) => records.push(record),
                Err(HahaiError::NotFound(_)) => {
                    warn!(case_id = %case_id, "Index entry has no backing record, skipping");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(records)
    }

    fn image_keys(case_id: &str) -> Vec<String> {
        ImageKind::ALL.iter().map(|kind| image_key(case_id, *kind)).collect()
    }

    /// 创建失败后尽力移除元数据、索引与已写入的影像
    async fn discard(&self, case_id: &str, student_id: &str) {
        let mut batch = Batch::new();
        batch
            .del(&record_key(case_id))
            .srem(ALL_RECORDS_KEY, case_id);
        InternDirectory::stage_remove_owned(&mut batch, student_id, case_id);
        if let Err(e) = self.meta.execute(batch).await {
            error!(case_id = %case_id, "Failed to remove partially created record: {}", e);
        }
        if let Err(e) = self.blobs.delete(&Self::image_keys(case_id)).await {
            error!(case_id = %case_id, "Failed to remove partially written images: {}", e);
        }
    }
}
