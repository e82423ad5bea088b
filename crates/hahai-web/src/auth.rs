//! 认证与授权
//!
//! 两种调用者：
//! - 管理员：请求头 `X-RFZO` 携带共享密钥
//! - 实习生：登录后获得不透明会话令牌，以 `Authorization: Bearer <token>` 提交

use crate::error::{ApiError, ApiResult};
use crate::server::AppState;
use axum::{
    extract::{FromRequestParts, State},
    http::{header, request::Parts},
    response::IntoResponse,
    Json,
};
use hahai_core::utils::generate_session_token;
use hahai_core::{HahaiError, Result};
use hahai_records::{InternDirectory, MetadataHandle};
use hahai_storage::keys::intern_session_key;
use hahai_storage::Batch;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{info, warn};

/// 管理员密钥请求头
pub const ADMIN_HEADER: &str = "X-RFZO";

/// 未配置时的占位值
const PLACEHOLDER_SECRET: &str = "CHANGE_ME";

/// 管理员共享密钥校验
#[derive(Debug, Clone)]
pub struct AdminGuard {
    secret: String,
}

impl AdminGuard {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    pub fn check(&self, provided: Option<&str>) -> Result<()> {
        let provided = match provided {
            Some(value) if !value.is_empty() => value,
            _ => return Err(HahaiError::Unauthorized("Missing X-RFZO header".to_string())),
        };
        if self.secret.is_empty() || self.secret == PLACEHOLDER_SECRET {
            return Err(HahaiError::Config(
                "Server misconfigured: admin secret not set".to_string(),
            ));
        }
        if provided != self.secret {
            return Err(HahaiError::Forbidden("Invalid RFZO".to_string()));
        }
        Ok(())
    }
}

/// 实习生会话服务
pub struct SessionService {
    meta: MetadataHandle,
    directory: InternDirectory,
    ttl: Duration,
}

impl SessionService {
    pub fn new(meta: MetadataHandle, directory: InternDirectory, ttl: Duration) -> Self {
        Self {
            meta,
            directory,
            ttl,
        }
    }

    /// 为已登记的实习生签发会话令牌
    pub async fn login(&self, student_id: &str) -> Result<String> {
        if !self.directory.exists(student_id).await? {
            return Err(HahaiError::Forbidden("Unknown student_id".to_string()));
        }

        let token = generate_session_token();
        let mut batch = Batch::new();
        batch.set_value(&intern_session_key(&token), student_id, Some(self.ttl));
        self.meta.execute(batch).await?;

        info!(student_id = %student_id, "Intern session created");
        Ok(token)
    }

    /// 解析令牌对应的学号
    pub async fn resolve(&self, token: &str) -> Result<String> {
        self.meta
            .get_value(&intern_session_key(token))
            .await?
            .ok_or_else(|| HahaiError::Unauthorized("Invalid or expired session".to_string()))
    }
}

/// 管理员访问凭证（提取器）
#[derive(Debug, Clone, Copy)]
pub struct RequireAdmin;

#[axum::async_trait]
impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> ApiResult<Self> {
        let provided = parts
            .headers
            .get(ADMIN_HEADER)
            .and_then(|value| value.to_str().ok());
        state.admin.check(provided).map_err(|e| {
            warn!(path = %parts.uri.path(), "Admin check failed: {}", e);
            ApiError(e)
        })?;
        Ok(RequireAdmin)
    }
}

/// 已登录的实习生（提取器）
#[derive(Debug, Clone)]
pub struct InternSession {
    pub student_id: String,
}

#[axum::async_trait]
impl FromRequestParts<AppState> for InternSession {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> ApiResult<Self> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| HahaiError::Unauthorized("Missing bearer token".to_string()))?;

        let student_id = state.sessions.resolve(token).await?;
        Ok(InternSession { student_id })
    }
}

/// 登录请求
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub student_id: String,
}

/// 登录响应
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
}

/// 实习生登录处理器
pub async fn intern_login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    info!("Login attempt for intern: {}", request.student_id);

    match state.sessions.login(&request.student_id).await {
        Ok(token) => Ok(Json(LoginResponse { token })),
        Err(e) => {
            warn!("Login failed: {}", e);
            Err(e.into())
        }
    }
}

/// 管理员连通性检查
pub async fn admin_ping(_admin: RequireAdmin) -> impl IntoResponse {
    Json(json!({ "status": "ok", "role": "admin" }))
}
