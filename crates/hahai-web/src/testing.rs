//! 测试辅助：内存存储上的完整应用、请求构造与桩分析服务

use crate::analysis::Analyzer;
use crate::auth::{AdminGuard, SessionService};
use crate::server::{create_app, AppState};
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, request::Builder, Request},
    response::Response,
    Router,
};
use hahai_core::{HahaiError, ImageBlob, Intern, PredLabel, Prediction, Result};
use hahai_records::{BlobHandle, MetadataHandle, RecordEngine};
use hahai_storage::MemoryStore;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

pub const ADMIN_SECRET: &str = "test-admin-secret";
const BOUNDARY: &str = "hahai-test-boundary";

/// 固定返回阳性结果的分析服务
pub struct StubAnalyzer {
    fail: bool,
}

impl StubAnalyzer {
    pub const OVERLAY: &'static [u8] = b"\x89PNGoverlay";

    pub fn new() -> Self {
        Self { fail: false }
    }

    pub fn failing() -> Self {
        Self { fail: true }
    }
}

#[async_trait]
impl Analyzer for StubAnalyzer {
    async fn infer(&self, _image: &ImageBlob) -> Result<Prediction> {
        if self.fail {
            return Err(HahaiError::Analysis("model unavailable".to_string()));
        }
        Prediction::new(PredLabel::Positive, 91.2)
    }

    async fn explain(&self, _image: &ImageBlob, _label: PredLabel) -> Result<ImageBlob> {
        Ok(ImageBlob::new(Self::OVERLAY.to_vec(), "image/png"))
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub meta: Arc<MemoryStore>,
    pub blobs: Arc<MemoryStore>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::build(ADMIN_SECRET, Arc::new(StubAnalyzer::new()))
    }

    pub async fn with_admin_secret(secret: &str) -> Self {
        Self::build(secret, Arc::new(StubAnalyzer::new()))
    }

    pub async fn with_analyzer(analyzer: Arc<dyn Analyzer>) -> Self {
        Self::build(ADMIN_SECRET, analyzer)
    }

    fn build(secret: &str, analyzer: Arc<dyn Analyzer>) -> Self {
        let meta = Arc::new(MemoryStore::new());
        let blobs = Arc::new(MemoryStore::new());
        let meta_handle: MetadataHandle = meta.clone();
        let blob_handle: BlobHandle = blobs.clone();

        let engine = Arc::new(RecordEngine::new(meta_handle.clone(), blob_handle));
        let sessions = SessionService::new(
            meta_handle,
            engine.directory().clone(),
            Duration::from_secs(3600),
        );
        let state = AppState {
            engine,
            sessions: Arc::new(sessions),
            admin: Arc::new(AdminGuard::new(secret)),
            analyzer,
            temp_ttl: Duration::from_secs(600),
            api_prefix: "/api/v1".to_string(),
        };

        Self {
            router: create_app(state.clone()),
            state,
            meta,
            blobs,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn seed_intern(&self, student_id: &str) {
        self.state
            .engine
            .directory()
            .create_intern(&Intern::new(student_id, "Name", "Surname"))
            .await
            .unwrap();
    }

    pub async fn login(&self, student_id: &str) -> String {
        self.state.sessions.login(student_id).await.unwrap()
    }

    pub async fn blob_keys(&self) -> Vec<String> {
        self.blobs.keys("record:").await
    }
}

/// 请求构造
pub struct TestRequest {
    builder: Builder,
}

pub fn request(method: &str, uri: &str) -> TestRequest {
    TestRequest {
        builder: Request::builder().method(method).uri(uri),
    }
}

impl TestRequest {
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.builder = self.builder.header(name, value);
        self
    }

    pub fn bearer(self, token: &str) -> Self {
        self.header(header::AUTHORIZATION.as_str(), &format!("Bearer {}", token))
    }

    pub fn empty(self) -> Request<Body> {
        self.builder.body(Body::empty()).unwrap()
    }

    pub fn json(self, value: &Value) -> Request<Body> {
        self.builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(value.to_string()))
            .unwrap()
    }

    pub fn multipart(self, parts: &[Part]) -> Request<Body> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            match &part.content_type {
                Some(content_type) => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}.bin\"\r\nContent-Type: {}\r\n\r\n",
                            part.name, part.name, content_type
                        )
                        .as_bytes(),
                    );
                }
                None => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", part.name)
                            .as_bytes(),
                    );
                }
            }
            body.extend_from_slice(&part.data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

        self.builder
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }
}

/// multipart 表单中的一个字段
pub struct Part {
    name: String,
    content_type: Option<String>,
    data: Vec<u8>,
}

impl Part {
    pub fn text(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            content_type: None,
            data: value.as_bytes().to_vec(),
        }
    }

    pub fn file(name: &str, content_type: &str, data: &[u8]) -> Self {
        Self {
            name: name.to_string(),
            content_type: Some(content_type.to_string()),
            data: data.to_vec(),
        }
    }
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
