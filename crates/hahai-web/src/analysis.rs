//! 影像分析服务连接器
//!
//! 推理与 Grad-CAM 叠加图由外部分析服务生成，这里只定义接口和HTTP客户端。

use async_trait::async_trait;
use hahai_core::config::AnalysisConfig;
use hahai_core::{HahaiError, ImageBlob, PredLabel, Prediction, Result};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// 分析服务接口
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// 对X光影像进行二分类推理
    async fn infer(&self, image: &ImageBlob) -> Result<Prediction>;

    /// 生成与推理标签对应的解释叠加图
    async fn explain(&self, image: &ImageBlob, label: PredLabel) -> Result<ImageBlob>;
}

/// `/predict` 的响应体
#[derive(Debug, Deserialize)]
struct PredictResponse {
    pred_label: PredLabel,
    pred_accuracy: f64,
}

/// 基于HTTP的分析服务客户端
pub struct RemoteAnalyzer {
    client: reqwest::Client,
    endpoint: String,
    gradcam_content_type: String,
}

impl RemoteAnalyzer {
    pub fn new(config: &AnalysisConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| HahaiError::Config(format!("Failed to build analysis client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            gradcam_content_type: config.gradcam_content_type.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path)
    }

    async fn post_image(&self, url: &str, image: &ImageBlob) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, image.content_type.as_str())
            .body(image.data.clone())
            .send()
            .await
            .map_err(|e| {
                warn!(url = %url, "Analysis request failed: {}", e);
                HahaiError::Analysis(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(HahaiError::Analysis(format!("{} returned {}", url, status)));
        }
        Ok(response)
    }
}

#[async_trait]
impl Analyzer for RemoteAnalyzer {
    async fn infer(&self, image: &ImageBlob) -> Result<Prediction> {
        let url = self.url("predict");
        let body: PredictResponse = self
            .post_image(&url, image)
            .await?
            .json()
            .await
            .map_err(|e| HahaiError::Analysis(format!("Malformed prediction: {}", e)))?;

        debug!(label = %body.pred_label, accuracy = body.pred_accuracy, "Inference finished");
        Prediction::new(body.pred_label, body.pred_accuracy)
            .map_err(|e| HahaiError::Analysis(e.to_string()))
    }

    async fn explain(&self, image: &ImageBlob, label: PredLabel) -> Result<ImageBlob> {
        let url = format!("{}?label={}", self.url("explain"), label);
        let bytes = self
            .post_image(&url, image)
            .await?
            .bytes()
            .await
            .map_err(|e| HahaiError::Analysis(e.to_string()))?;

        if bytes.is_empty() {
            return Err(HahaiError::Analysis("Empty explanation image".to_string()));
        }
        Ok(ImageBlob::new(bytes.to_vec(), &self.gradcam_content_type))
    }
}
