//! 记录字段映射编解码

use hahai_core::utils::from_unix_seconds;
use hahai_core::{HahaiError, PatientRecord, Result, DEFAULT_CONTENT_TYPE};
use std::collections::HashMap;

pub const FIELD_CASE_ID: &str = "case_id";
pub const FIELD_STUDENT_ID: &str = "student_id";
pub const FIELD_NOTES: &str = "notes";
pub const FIELD_PRED_LABEL: &str = "pred_label";
pub const FIELD_PRED_ACCURACY: &str = "pred_accuracy";
pub const FIELD_CREATED_AT: &str = "created_at";
pub const FIELD_IS_TEMP: &str = "is_temp";
pub const FIELD_SAVED_AT: &str = "saved_at";
pub const FIELD_XRAY_CONTENT_TYPE: &str = "xray_content_type";
pub const FIELD_GRADCAM_CONTENT_TYPE: &str = "gradcam_content_type";

pub fn flag(value: bool) -> String {
    if value { "1" } else { "0" }.to_string()
}

/// 编码为存储字段
pub fn encode(record: &PatientRecord) -> Vec<(String, String)> {
    let mut fields = vec![
        (FIELD_CASE_ID.to_string(), record.case_id.clone()),
        (FIELD_STUDENT_ID.to_string(), record.student_id.clone()),
        (FIELD_NOTES.to_string(), record.notes.clone()),
        (FIELD_PRED_LABEL.to_string(), record.pred_label.to_string()),
        (FIELD_PRED_ACCURACY.to_string(), record.pred_accuracy.to_string()),
        (FIELD_CREATED_AT.to_string(), record.created_at.timestamp().to_string()),
        (FIELD_IS_TEMP.to_string(), flag(record.is_temp)),
        (FIELD_XRAY_CONTENT_TYPE.to_string(), record.xray_content_type.clone()),
        (FIELD_GRADCAM_CONTENT_TYPE.to_string(), record.gradcam_content_type.clone()),
    ];
    if let Some(saved_at) = record.saved_at {
        fields.push((FIELD_SAVED_AT.to_string(), saved_at.timestamp().to_string()));
    }
    fields
}

/// 从存储字段解码。以存储键中的ID为准，字段缺失或格式错误时报 `Internal`。
pub fn decode(case_id: &str, fields: &HashMap<String, String>) -> Result<PatientRecord> {
    let malformed = |field: &str| {
        HahaiError::Internal(format!("record {} has a missing or malformed '{}' field", case_id, field))
    };

    let student_id = fields
        .get(FIELD_STUDENT_ID)
        .filter(|s| !s.is_empty())
        .cloned()
        .ok_or_else(|| malformed(FIELD_STUDENT_ID))?;
    let pred_label = fields
        .get(FIELD_PRED_LABEL)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| malformed(FIELD_PRED_LABEL))?;
    let pred_accuracy = fields
        .get(FIELD_PRED_ACCURACY)
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(|| malformed(FIELD_PRED_ACCURACY))?;
    let created_at = fields
        .get(FIELD_CREATED_AT)
        .and_then(|s| s.parse::<f64>().ok())
        .and_then(|secs| from_unix_seconds(secs as i64))
        .ok_or_else(|| malformed(FIELD_CREATED_AT))?;
    let is_temp = match fields.get(FIELD_IS_TEMP).map(String::as_str) {
        Some("1") | Some("true") => true,
        Some("0") | Some("false") | None => false,
        Some(_) => return Err(malformed(FIELD_IS_TEMP)),
    };
    let saved_at = match fields.get(FIELD_SAVED_AT) {
        Some(raw) => Some(
            raw.parse::<i64>()
                .ok()
                .and_then(from_unix_seconds)
                .ok_or_else(|| malformed(FIELD_SAVED_AT))?,
        ),
        None => None,
    };
    let content_type = |field: &str| {
        fields
            .get(field)
            .filter(|s| !s.is_empty())
            .cloned()
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string())
    };

    Ok(PatientRecord {
        case_id: case_id.to_string(),
        student_id,
        notes: fields.get(FIELD_NOTES).cloned().unwrap_or_default(),
        pred_label,
        pred_accuracy,
        created_at,
        is_temp,
        saved_at,
        xray_content_type: content_type(FIELD_XRAY_CONTENT_TYPE),
        gradcam_content_type: content_type(FIELD_GRADCAM_CONTENT_TYPE),
    })
}
