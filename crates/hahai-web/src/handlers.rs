//! HTTP处理器：实习生目录与病例记录

use crate::auth::RequireAdmin;
use crate::error::ApiResult;
use crate::server::AppState;
use axum::{
    extract::{multipart::Field, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use hahai_core::{
    HahaiError, ImageBlob, ImageKind, Intern, NewRecord, PatientRecord, PredLabel, Prediction,
    DEFAULT_CONTENT_TYPE,
};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

/// 病例记录响应体
#[derive(Debug, Serialize)]
pub struct RecordResponse {
    pub case_id: String,
    pub student_id: String,
    pub notes: String,
    pub pred_label: PredLabel,
    pub pred_accuracy: f64,
    pub created_at: DateTime<Utc>,
    pub saved_at: Option<DateTime<Utc>>,
    pub xray_url: String,
    pub gradcam_url: String,
}

impl RecordResponse {
    pub fn new(state: &AppState, record: PatientRecord) -> Self {
        Self {
            xray_url: state.image_url(&record.case_id, ImageKind::Xray),
            gradcam_url: state.image_url(&record.case_id, ImageKind::Gradcam),
            case_id: record.case_id,
            student_id: record.student_id,
            notes: record.notes,
            pred_label: record.pred_label,
            pred_accuracy: record.pred_accuracy,
            created_at: record.created_at,
            saved_at: record.saved_at,
        }
    }
}

/// 健康检查
pub async fn ping() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

// ---- 实习生目录 ----

pub async fn create_intern(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Json(intern): Json<Intern>,
) -> ApiResult<impl IntoResponse> {
    state.engine.directory().create_intern(&intern).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "status": "created", "student_id": intern.student_id })),
    ))
}

pub async fn list_interns(
    _admin: RequireAdmin,
    State(state): State<AppState>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.engine.directory().list_interns().await?))
}

pub async fn get_intern(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(student_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.engine.directory().get_intern(&student_id).await?))
}

pub async fn delete_intern(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(student_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.engine.directory().delete_intern(&student_id).await?;
    Ok(Json(json!({ "status": "deleted", "student_id": student_id })))
}

// ---- 病例记录 ----

/// 读取上传字段的全部字节
pub(crate) async fn read_image(field: Field<'_>) -> ApiResult<ImageBlob> {
    let content_type = field
        .content_type()
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string();
    let data = field.bytes().await.map_err(multipart_error)?;
    Ok(ImageBlob::new(data.to_vec(), &content_type))
}

pub(crate) async fn read_text(field: Field<'_>) -> ApiResult<String> {
    Ok(field.text().await.map_err(multipart_error)?)
}

pub(crate) fn multipart_error(e: axum::extract::multipart::MultipartError) -> HahaiError {
    warn!("Multipart parsing error: {}", e);
    HahaiError::Validation(format!("Malformed multipart body: {}", e))
}

/// 直接上传创建永久记录
pub async fn create_record(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let mut student_id: Option<String> = None;
    let mut notes = String::new();
    let mut pred_label = PredLabel::Negative;
    let mut pred_accuracy = 50.0;
    let mut xray: Option<ImageBlob> = None;
    let mut gradcam: Option<ImageBlob> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "student_id" => student_id = Some(read_text(field).await?),
            "notes" => notes = read_text(field).await?,
            "pred_label" => pred_label = read_text(field).await?.trim().parse()?,
            "pred_accuracy" => {
                let raw = read_text(field).await?;
                pred_accuracy = raw.trim().parse::<f64>().map_err(|_| {
                    HahaiError::Validation(format!("Invalid pred_accuracy: {}", raw))
                })?;
            }
            "xray" => xray = Some(read_image(field).await?),
            "gradcam" => gradcam = Some(read_image(field).await?),
            _ => warn!("Ignoring unknown field: {}", name),
        }
    }

    let student_id = student_id
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| HahaiError::Validation("student_id is required".to_string()))?;
    let xray = xray
        .filter(|blob| !blob.data.is_empty())
        .ok_or_else(|| HahaiError::Validation("Empty xray upload".to_string()))?;
    let gradcam = gradcam.unwrap_or_else(|| ImageBlob::new(Vec::new(), DEFAULT_CONTENT_TYPE));

    let records = state.engine.permanent_records();
    let case_id = records
        .create(NewRecord {
            student_id,
            notes,
            prediction: Prediction::new(pred_label, pred_accuracy)?,
            xray,
            gradcam,
        })
        .await?;
    let record = records.get(&case_id).await?;

    Ok((StatusCode::CREATED, Json(RecordResponse::new(&state, record))))
}

pub async fn list_records(
    _admin: RequireAdmin,
    State(state): State<AppState>,
) -> ApiResult<impl IntoResponse> {
    let records = state.engine.permanent_records().list().await?;
    let body: Vec<RecordResponse> = records
        .into_iter()
        .map(|record| RecordResponse::new(&state, record))
        .collect();
    Ok(Json(body))
}

pub async fn list_records_for_intern(
    State(state): State<AppState>,
    Path(student_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let records = state
        .engine
        .permanent_records()
        .list_for_owner(&student_id)
        .await?;
    let body: Vec<RecordResponse> = records
        .into_iter()
        .map(|record| RecordResponse::new(&state, record))
        .collect();
    Ok(Json(body))
}

pub async fn get_record(
    State(state): State<AppState>,
    Path(case_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let record = state.engine.permanent_records().get(&case_id).await?;
    Ok(Json(RecordResponse::new(&state, record)))
}

pub async fn delete_record(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(case_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.engine.permanent_records().delete(&case_id).await?;
    info!(case_id = %case_id, "Record deleted via API");
    Ok(Json(json!({ "status": "deleted", "case_id": case_id })))
}

pub async fn get_xray(
    State(state): State<AppState>,
    Path(case_id): Path<String>,
) -> ApiResult<Response> {
    image_response(&state, &case_id, ImageKind::Xray).await
}

pub async fn get_gradcam(
    State(state): State<AppState>,
    Path(case_id): Path<String>,
) -> ApiResult<Response> {
    image_response(&state, &case_id, ImageKind::Gradcam).await
}

async fn image_response(state: &AppState, case_id: &str, kind: ImageKind) -> ApiResult<Response> {
    let image = state.engine.image(case_id, kind).await?;
    Ok(([(header::CONTENT_TYPE, image.content_type)], image.data).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::ADMIN_HEADER;
    use crate::testing::{body_bytes, body_json, request, Part, TestApp, ADMIN_SECRET};

    fn upload(student_id: &str) -> Vec<Part> {
        vec![
            Part::text("student_id", student_id),
            Part::text("notes", "direct"),
            Part::text("pred_label", "positive"),
            Part::text("pred_accuracy", "77.5"),
            Part::file("xray", "image/jpeg", b"xray-bytes"),
            Part::file("gradcam", "image/png", b"gradcam-bytes"),
        ]
    }

    #[tokio::test]
    async fn test_ping() {
        let app = TestApp::new().await;
        let response = app.send(request("GET", "/api/v1/ping").empty()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_intern_crud() {
        let app = TestApp::new().await;
        let admin = |method: &str, uri: &str| request(method, uri).header(ADMIN_HEADER, ADMIN_SECRET);

        let intern = json!({ "student_id": "S1", "name": "Ana", "surname": "Petrovic" });
        let response = app.send(admin("POST", "/api/v1/interns").json(&intern)).await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app.send(admin("POST", "/api/v1/interns").json(&intern)).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let blank = json!({ "student_id": "S2", "name": "", "surname": "X" });
        let response = app.send(admin("POST", "/api/v1/interns").json(&blank)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app.send(admin("GET", "/api/v1/interns/S1").empty()).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["name"], "Ana");
        assert_eq!(body["patient_records"], json!([]));

        let response = app.send(admin("GET", "/api/v1/interns").empty()).await;
        assert_eq!(body_json(response).await.as_array().unwrap().len(), 1);

        let response = app.send(request("GET", "/api/v1/interns").empty()).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app.send(admin("DELETE", "/api/v1/interns/S1").empty()).await;
        assert_eq!(response.status(), StatusCode::OK);
        let response = app.send(admin("GET", "/api/v1/interns/S1").empty()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_record_upload_and_read() {
        let app = TestApp::new().await;
        app.seed_intern("S1").await;

        let response = app.send(request("POST", "/api/v1/records").multipart(&upload("S1"))).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        let case_id = body["case_id"].as_str().unwrap().to_string();
        assert_eq!(body["student_id"], "S1");
        assert_eq!(body["pred_label"], "positive");
        assert_eq!(body["pred_accuracy"], 77.5);
        assert_eq!(body["xray_url"], format!("/api/v1/records/{}/xray", case_id));

        let response = app
            .send(request("GET", &format!("/api/v1/records/{}", case_id)).empty())
            .await;
        assert_eq!(body_json(response).await["notes"], "direct");

        let response = app
            .send(request("GET", &format!("/api/v1/records/{}/gradcam", case_id)).empty())
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        assert_eq!(body_bytes(response).await, b"gradcam-bytes".to_vec());

        let response = app.send(request("GET", "/api/v1/records/intern/S1").empty()).await;
        assert_eq!(body_json(response).await.as_array().unwrap().len(), 1);
        let response = app.send(request("GET", "/api/v1/records/intern/ghost").empty()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_record_upload_validation() {
        let app = TestApp::new().await;
        app.seed_intern("S1").await;

        let missing_xray = vec![Part::text("student_id", "S1")];
        let response = app.send(request("POST", "/api/v1/records").multipart(&missing_xray)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let mut bad_accuracy = upload("S1");
        bad_accuracy[3] = Part::text("pred_accuracy", "140");
        let response = app.send(request("POST", "/api/v1/records").multipart(&bad_accuracy)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app.send(request("POST", "/api/v1/records").multipart(&upload("ghost"))).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_record_admin_routes() {
        let app = TestApp::new().await;
        app.seed_intern("S1").await;
        let response = app.send(request("POST", "/api/v1/records").multipart(&upload("S1"))).await;
        let case_id = body_json(response).await["case_id"].as_str().unwrap().to_string();

        let response = app.send(request("GET", "/api/v1/records").empty()).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let response = app
            .send(request("GET", "/api/v1/records").header(ADMIN_HEADER, ADMIN_SECRET).empty())
            .await;
        assert_eq!(body_json(response).await.as_array().unwrap().len(), 1);

        // 仍拥有病例的实习生不能删除
        let response = app
            .send(request("DELETE", "/api/v1/interns/S1").header(ADMIN_HEADER, ADMIN_SECRET).empty())
            .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let uri = format!("/api/v1/records/{}", case_id);
        let response = app
            .send(request("DELETE", &uri).header(ADMIN_HEADER, ADMIN_SECRET).empty())
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let response = app.send(request("GET", &uri).empty()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body_json(response).await["detail"].is_string());
    }
}
