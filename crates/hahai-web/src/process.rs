//! 影像处理流程
//!
//! 上传 → 推理 → 解释图 → 临时记录；实习生随后保存（提升）或取消。

use crate::auth::InternSession;
use crate::error::ApiResult;
use crate::handlers::{multipart_error, read_image, RecordResponse};
use crate::server::AppState;
use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use hahai_core::{HahaiError, ImageBlob, ImageKind, NewTempRecord, PredLabel};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

/// 处理结果
#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    pub temp_id: String,
    pub pred_label: PredLabel,
    pub pred_accuracy: f64,
    pub xray_url: String,
    pub gradcam_url: String,
    pub expires_in_seconds: u64,
}

/// 保存请求
#[derive(Debug, Default, Deserialize)]
pub struct SaveRequest {
    #[serde(default)]
    pub notes: String,
}

pub async fn start_processing(
    session: InternSession,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let mut xray: Option<ImageBlob> = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() == Some("xray") {
            xray = Some(read_image(field).await?);
        } else {
            warn!("Ignoring unknown field: {}", field.name().unwrap_or(""));
        }
    }
    let xray = xray
        .filter(|blob| !blob.data.is_empty())
        .ok_or_else(|| HahaiError::Validation("Empty xray upload".to_string()))?;

    // 分析失败时不写入任何存储
    let prediction = state.analyzer.infer(&xray).await?;
    let gradcam = state.analyzer.explain(&xray, prediction.label).await?;

    let temp_id = state
        .engine
        .temp_records()
        .create(NewTempRecord {
            student_id: session.student_id.clone(),
            prediction,
            xray,
            gradcam,
            ttl: state.temp_ttl,
        })
        .await?;

    info!(
        temp_id = %temp_id,
        student_id = %session.student_id,
        label = %prediction.label,
        "Processing finished"
    );

    Ok(Json(ProcessResponse {
        xray_url: state.image_url(&temp_id, ImageKind::Xray),
        gradcam_url: state.image_url(&temp_id, ImageKind::Gradcam),
        temp_id,
        pred_label: prediction.label,
        pred_accuracy: prediction.accuracy,
        expires_in_seconds: state.temp_ttl.as_secs(),
    }))
}

pub async fn save_processing(
    session: InternSession,
    State(state): State<AppState>,
    Path(temp_id): Path<String>,
    request: Option<Json<SaveRequest>>,
) -> ApiResult<impl IntoResponse> {
    let notes = request.map(|Json(body)| body.notes).unwrap_or_default();

    let case_id = state
        .engine
        .promotion()
        .promote(&temp_id, &session.student_id, &notes)
        .await?;
    let record = state.engine.permanent_records().get(&case_id).await?;

    Ok((StatusCode::CREATED, Json(RecordResponse::new(&state, record))))
}

pub async fn cancel_processing(
    session: InternSession,
    State(state): State<AppState>,
    Path(temp_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state
        .engine
        .temp_records()
        .cancel(&temp_id, &session.student_id)
        .await?;
    Ok(Json(json!({ "status": "cancelled", "temp_id": temp_id })))
}
