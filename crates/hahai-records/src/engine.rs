//! 记录引擎
//!
//! 把目录、临时记录、提升事务和永久记录组合在同一对存储之上，提供统一入口

use crate::{
    codec,
    directory::InternDirectory,
    permanent::PermanentRecordStore,
    promotion::PromotionTransaction,
    temp::TempRecordManager,
    BlobHandle, MetadataHandle,
};
use hahai_core::{HahaiError, ImageBlob, ImageKind, Result};
use hahai_storage::keys::{image_key, record_key};

/// 记录引擎
pub struct RecordEngine {
    directory: InternDirectory,
    temp: TempRecordManager,
    promotion: PromotionTransaction,
    permanent: PermanentRecordStore,
    meta: MetadataHandle,
    blobs: BlobHandle,
}

impl RecordEngine {
    /// 在元数据存储与影像存储之上创建引擎
    pub fn new(meta: MetadataHandle, blobs: BlobHandle) -> Self {
        let directory = InternDirectory::new(meta.clone());
        Self {
            temp: TempRecordManager::new(meta.clone(), blobs.clone(), directory.clone()),
            promotion: PromotionTransaction::new(meta.clone(), blobs.clone()),
            permanent: PermanentRecordStore::new(meta.clone(), blobs.clone(), directory.clone()),
            directory,
            meta,
            blobs,
        }
    }

    pub fn directory(&self) -> &InternDirectory {
        &self.directory
    }

    pub fn temp_records(&self) -> &TempRecordManager {
        &self.temp
    }

    pub fn promotion(&self) -> &PromotionTransaction {
        &self.promotion
    }

    pub fn permanent_records(&self) -> &PermanentRecordStore {
        &self.permanent
    }

    /// 读取记录的一张影像，临时记录与永久记录均可
    pub async fn image(&self, case_id: &str, kind: ImageKind) -> Result<ImageBlob> {
        let not_found = || HahaiError::NotFound(format!("{} for record {} not found", kind, case_id));

        let fields = self.meta.hgetall(&record_key(case_id)).await?;
        if fields.is_empty() {
            return Err(not_found());
        }
        let record = codec::decode(case_id, &fields)?;

        let data = self
            .blobs
            .get_bytes(&image_key(case_id, kind))
            .await?
            .ok_or_else(not_found)?;
        Ok(ImageBlob::new(data, record.content_type(kind)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{record_request, temp_request, Fixture, GRADCAM, XRAY};
    use hahai_storage::KeyspaceOps;
    use std::time::Duration;

    #[tokio::test]
    async fn test_image_for_temp_and_permanent_records() {
        let fixture = Fixture::with_interns(&["S1"]).await;
        let temp_id = fixture
            .engine
            .temp_records()
            .create(temp_request("S1", Duration::from_secs(600)))
            .await
            .unwrap();

        let xray = fixture.engine.image(&temp_id, ImageKind::Xray).await.unwrap();
        assert_eq!(xray.data, XRAY);
        assert_eq!(xray.content_type, "image/jpeg");

        let case_id = fixture
            .engine
            .permanent_records()
            .create(record_request("S1", "n"))
            .await
            .unwrap();
        let gradcam = fixture.engine.image(&case_id, ImageKind::Gradcam).await.unwrap();
        assert_eq!(gradcam.data, GRADCAM);
        assert_eq!(gradcam.content_type, "image/png");
    }

    #[tokio::test]
    async fn test_image_not_found() {
        let fixture = Fixture::with_interns(&["S1"]).await;
        assert!(matches!(
            fixture.engine.image("missing", ImageKind::Xray).await,
            Err(HahaiError::NotFound(_))
        ));

        let case_id = fixture
            .engine
            .permanent_records()
            .create(record_request("S1", "n"))
            .await
            .unwrap();
        fixture
            .blobs
            .delete(&[image_key(&case_id, ImageKind::Xray)])
            .await
            .unwrap();
        assert!(matches!(
            fixture.engine.image(&case_id, ImageKind::Xray).await,
            Err(HahaiError::NotFound(_))
        ));
    }
}
