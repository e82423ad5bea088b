//! 核心数据模型定义

use crate::error::{HahaiError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// 影像内容类型的兜底值
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// 实习生基本信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intern {
    pub student_id: String, // 由管理员分配的学号，视为不透明字符串
    pub name: String,
    pub surname: String,
}

impl Intern {
    pub fn new(student_id: &str, name: &str, surname: &str) -> Self {
        Self {
            student_id: student_id.to_string(),
            name: name.to_string(),
            surname: surname.to_string(),
        }
    }

    /// 校验必填字段
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("student_id", &self.student_id),
            ("name", &self.name),
            ("surname", &self.surname),
        ] {
            if value.trim().is_empty() {
                return Err(HahaiError::Validation(format!("{} must not be empty", field)));
            }
        }
        Ok(())
    }
}

/// 实习生档案（含其拥有的病例）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternProfile {
    #[serde(flatten)]
    pub intern: Intern,
    pub patient_records: Vec<String>, // 已排序的永久病例ID
}

/// 二分类预测结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredLabel {
    Positive,
    Negative,
}

impl PredLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PredLabel::Positive => "positive",
            PredLabel::Negative => "negative",
        }
    }
}

impl fmt::Display for PredLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PredLabel {
    type Err = HahaiError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "positive" => Ok(PredLabel::Positive),
            "negative" => Ok(PredLabel::Negative),
            other => Err(HahaiError::Validation(format!(
                "pred_label must be 'positive' or 'negative', got '{}'",
                other
            ))),
        }
    }
}

/// 推理结果：标签与置信度（0-100）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: PredLabel,
    pub accuracy: f64,
}

impl Prediction {
    pub fn new(label: PredLabel, accuracy: f64) -> Result<Self> {
        if !accuracy.is_finite() || !(0.0..=100.0).contains(&accuracy) {
            return Err(HahaiError::Validation(format!(
                "pred_accuracy must be within [0, 100], got {}",
                accuracy
            )));
        }
        Ok(Self { label, accuracy })
    }
}

/// 每条记录关联的两类影像
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Xray,
    Gradcam,
}

impl ImageKind {
    pub const ALL: [ImageKind; 2] = [ImageKind::Xray, ImageKind::Gradcam];

    /// 影像键的固定后缀
    pub fn suffix(&self) -> &'static str {
        match self {
            ImageKind::Xray => "xray",
            ImageKind::Gradcam => "gradcam",
        }
    }
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// 影像二进制数据及其内容类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBlob {
    pub data: Vec<u8>,
    pub content_type: String,
}

impl ImageBlob {
    pub fn new(data: Vec<u8>, content_type: &str) -> Self {
        let content_type = if content_type.trim().is_empty() {
            DEFAULT_CONTENT_TYPE
        } else {
            content_type
        };
        Self {
            data,
            content_type: content_type.to_string(),
        }
    }
}

/// 病例记录（临时阶段与永久阶段共用同一结构）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientRecord {
    pub case_id: String,
    pub student_id: String, // 所有者，创建后不可变
    pub notes: String,
    pub pred_label: PredLabel,
    pub pred_accuracy: f64,
    pub created_at: DateTime<Utc>,
    pub is_temp: bool,
    pub saved_at: Option<DateTime<Utc>>, // 仅在提升时设置
    pub xray_content_type: String,
    pub gradcam_content_type: String,
}

impl PatientRecord {
    pub fn content_type(&self, kind: ImageKind) -> &str {
        match kind {
            ImageKind::Xray => &self.xray_content_type,
            ImageKind::Gradcam => &self.gradcam_content_type,
        }
    }
}

/// 推理完成后创建临时记录的请求
#[derive(Debug, Clone)]
pub struct NewTempRecord {
    pub student_id: String,
    pub prediction: Prediction,
    pub xray: ImageBlob,
    pub gradcam: ImageBlob,
    pub ttl: Duration,
}

/// 绕过临时阶段直接创建永久记录的请求
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub student_id: String,
    pub notes: String,
    pub prediction: Prediction,
    pub xray: ImageBlob,
    pub gradcam: ImageBlob,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pred_label_parse() {
        assert_eq!("positive".parse::<PredLabel>().unwrap(), PredLabel::Positive);
        assert_eq!("negative".parse::<PredLabel>().unwrap(), PredLabel::Negative);
        assert!("maybe".parse::<PredLabel>().is_err());
        assert_eq!(
            serde_json::to_string(&PredLabel::Positive).unwrap(),
            "\"positive\""
        );
    }

    #[test]
    fn test_prediction_range() {
        assert!(Prediction::new(PredLabel::Positive, 0.0).is_ok());
        assert!(Prediction::new(PredLabel::Positive, 100.0).is_ok());
        assert!(Prediction::new(PredLabel::Negative, 100.1).is_err());
        assert!(Prediction::new(PredLabel::Negative, -1.0).is_err());
        assert!(Prediction::new(PredLabel::Negative, f64::NAN).is_err());
    }

    #[test]
    fn test_intern_validation() {
        assert!(Intern::new("S1", "Ana", "Petrovic").validate().is_ok());
        assert!(matches!(
            Intern::new("S1", " ", "Petrovic").validate(),
            Err(HahaiError::Validation(_))
        ));
    }

    #[test]
    fn test_blank_content_type_falls_back() {
        let blob = ImageBlob::new(vec![1, 2], "");
        assert_eq!(blob.content_type, DEFAULT_CONTENT_TYPE);
    }
}
