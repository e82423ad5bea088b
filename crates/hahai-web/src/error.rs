//! HTTP错误映射

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use hahai_core::HahaiError;
use serde_json::json;
use tracing::error;

/// 包装核心错误，转换为HTTP响应
#[derive(Debug)]
pub struct ApiError(pub HahaiError);

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            HahaiError::Validation(_) => StatusCode::BAD_REQUEST,
            HahaiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            HahaiError::Forbidden(_) | HahaiError::Ownership(_) => StatusCode::FORBIDDEN,
            HahaiError::NotFound(_)
            | HahaiError::TempNotFound(_)
            | HahaiError::InternNotFound(_)
            | HahaiError::InvalidOwner(_) => StatusCode::NOT_FOUND,
            HahaiError::InternAlreadyExists(_)
            | HahaiError::InternHasRecords(_)
            | HahaiError::InvalidTempRecord(_) => StatusCode::CONFLICT,
            HahaiError::Analysis(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<HahaiError> for ApiError {
    fn from(err: HahaiError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), "Request failed: {}", self.0);
        }

        let body = Json(json!({ "detail": self.0.to_string() }));
        (status, body).into_response()
    }
}
