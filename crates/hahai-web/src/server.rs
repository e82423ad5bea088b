//! Web服务器

use crate::analysis::Analyzer;
use crate::auth::{admin_ping, intern_login, AdminGuard, SessionService};
use crate::handlers::{
    create_intern, create_record, delete_intern, delete_record, get_gradcam, get_intern,
    get_record, get_xray, list_interns, list_records, list_records_for_intern, ping,
};
use crate::process::{cancel_processing, save_processing, start_processing};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use hahai_core::{HahaiError, Result};
use hahai_records::RecordEngine;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

/// 上传影像的请求体上限
const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// 请求处理器共享的状态
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RecordEngine>,
    pub sessions: Arc<SessionService>,
    pub admin: Arc<AdminGuard>,
    pub analyzer: Arc<dyn Analyzer>,
    /// 临时记录存活时间
    pub temp_ttl: Duration,
    /// API路由前缀（无结尾斜杠），用于生成影像链接
    pub api_prefix: String,
}

impl AppState {
    /// 记录影像的访问路径
    pub fn image_url(&self, case_id: &str, kind: hahai_core::ImageKind) -> String {
        format!("{}/records/{}/{}", self.api_prefix, case_id, kind)
    }
}

pub struct WebServer {
    addr: SocketAddr,
    app: Router,
}

impl WebServer {
    pub fn new(addr: SocketAddr, state: AppState) -> Self {
        Self {
            addr,
            app: create_app(state),
        }
    }

    /// 运行直到 `shutdown` 完成
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!("Starting web server on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| HahaiError::Internal(format!("Web server failed: {}", e)))?;

        info!("Web server stopped");
        Ok(())
    }
}

/// 构建完整的路由
pub fn create_app(state: AppState) -> Router {
    let router = if state.api_prefix.is_empty() {
        api_routes()
    } else {
        Router::new().nest(&state.api_prefix, api_routes())
    };

    router
        .with_state(state)
        // 全局中间件
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                )
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
}

/// API 路由
fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/ping", get(ping))
        .route("/admin/ping", get(admin_ping))
        .route("/auth/intern/login", post(intern_login))
        // 实习生目录（管理员）
        .route("/interns", post(create_intern).get(list_interns))
        .route("/interns/:student_id", get(get_intern).delete(delete_intern))
        // 病例记录
        .route("/records", post(create_record).get(list_records))
        .route("/records/intern/:student_id", get(list_records_for_intern))
        .route("/records/:case_id", get(get_record).delete(delete_record))
        .route("/records/:case_id/xray", get(get_xray))
        .route("/records/:case_id/gradcam", get(get_gradcam))
        // 影像处理流程（实习生）
        .route("/process", post(start_processing))
        .route("/process/:temp_id", axum::routing::delete(cancel_processing))
        .route("/process/:temp_id/save", post(save_processing))
}
