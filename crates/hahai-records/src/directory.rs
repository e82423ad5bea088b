//! 实习生目录
//!
//! 实习生的存在性校验，以及每个实习生拥有的永久病例集合。

use crate::MetadataHandle;
use hahai_core::{HahaiError, Intern, InternProfile, Result};
use hahai_storage::keys::{intern_key, intern_records_key, ALL_INTERNS_KEY};
use hahai_storage::Batch;
use tracing::info;

/// 实习生目录
#[derive(Clone)]
pub struct InternDirectory {
    meta: MetadataHandle,
}

impl InternDirectory {
    pub fn new(meta: MetadataHandle) -> Self {
        Self { meta }
    }

    pub async fn exists(&self, student_id: &str) -> Result<bool> {
        self.meta.exists(&intern_key(student_id)).await
    }

    /// 记录所有者必须是已登记的实习生
    pub async fn ensure_owner(&self, student_id: &str) -> Result<()> {
        if self.exists(student_id).await? {
            Ok(())
        } else {
            Err(HahaiError::InvalidOwner(format!("Intern {} not found", student_id)))
        }
    }

    /// 登记实习生（管理员操作）
    pub async fn create_intern(&self, intern: &Intern) -> Result<()> {
        intern.validate()?;

        if self.exists(&intern.student_id).await? {
            return Err(HahaiError::InternAlreadyExists(format!(
                "Intern {} already exists",
                intern.student_id
            )));
        }

        let mut batch = Batch::new();
        batch
            .hset(
                &intern_key(&intern.student_id),
                vec![
                    ("student_id".to_string(), intern.student_id.clone()),
                    ("name".to_string(), intern.name.clone()),
                    ("surname".to_string(), intern.surname.clone()),
                ],
            )
            .sadd(ALL_INTERNS_KEY, &intern.student_id);
        self.meta.execute(batch).await?;

        info!(student_id = %intern.student_id, "Intern created");
        Ok(())
    }

    pub async fn get_intern(&self, student_id: &str) -> Result<InternProfile> {
        let fields = self.meta.hgetall(&intern_key(student_id)).await?;
        if fields.is_empty() {
            return Err(HahaiError::InternNotFound(format!("Intern {} not found", student_id)));
        }

        let field = |name: &str| fields.get(name).cloned().unwrap_or_default();
        Ok(InternProfile {
            intern: Intern {
                student_id: fields
                    .get("student_id")
                    .cloned()
                    .unwrap_or_else(|| student_id.to_string()),
                name: field("name"),
                surname: field("surname"),
            },
            patient_records: self.list_owned(student_id).await?,
        })
    }

    /// 全部实习生，按学号排序；索引中已失效的条目直接跳过
    pub async fn list_interns(&self) -> Result<Vec<InternProfile>> {
        let mut student_ids = self.meta.smembers(ALL_INTERNS_KEY).await?;
        student_ids.sort();

        let mut interns = Vec::with_capacity(student_ids.len());
        for student_id in student_ids {
            match self.get_intern(&student_id).await {
                Ok(profile) => interns.push(profile),
                Err(HahaiError::InternNotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(interns)
    }

    /// 删除实习生；仍拥有病例时拒绝
    pub async fn delete_intern(&self, student_id: &str) -> Result<()> {
        if !self.exists(student_id).await? {
            return Err(HahaiError::InternNotFound(format!("Intern {} not found", student_id)));
        }

        let owned = self.list_owned(student_id).await?;
        if !owned.is_empty() {
            return Err(HahaiError::InternHasRecords(format!(
                "Intern {} has {} patient records; delete records first",
                student_id,
                owned.len()
            )));
        }

        let mut batch = Batch::new();
        batch
            .del(&intern_key(student_id))
            .del(&intern_records_key(student_id))
            .srem(ALL_INTERNS_KEY, student_id);
        self.meta.execute(batch).await?;

        info!(student_id = %student_id, "Intern deleted");
        Ok(())
    }

    /// 实习生拥有的永久病例ID（已排序）
    pub async fn list_owned(&self, student_id: &str) -> Result<Vec<String>> {
        let mut ids = self.meta.smembers(&intern_records_key(student_id)).await?;
        ids.sort();
        Ok(ids)
    }

    pub async fn add_owned_record(&self, student_id: &str, case_id: &str) -> Result<()> {
        let mut batch = Batch::new();
        Self::stage_add_owned(&mut batch, student_id, case_id);
        self.meta.execute(batch).await
    }

    pub async fn remove_owned_record(&self, student_id: &str, case_id: &str) -> Result<()> {
        let mut batch = Batch::new();
        Self::stage_remove_owned(&mut batch, student_id, case_id);
        self.meta.execute(batch).await
    }

    /// 把所有权索引的更新并入调用方的批处理，与记录本身一同提交
    pub fn stage_add_owned(batch: &mut Batch, student_id: &str, case_id: &str) {
        batch.sadd(&intern_records_key(student_id), case_id);
    }

    pub fn stage_remove_owned(batch: &mut Batch, student_id: &str, case_id: &str) {
        batch.srem(&intern_records_key(student_id), case_id);
    }
}
