//! 配置管理
//!
//! 默认值、可选配置文件与 `HAHAI_` 前缀环境变量依次叠加

use crate::error::{HahaiError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

/// 系统完整配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// 服务器配置
    pub server: ServerConfig,
    /// 存储配置
    pub storage: StorageConfig,
    /// 记录生命周期配置
    pub records: RecordsConfig,
    /// 认证配置
    pub auth: AuthConfig,
    /// 影像分析服务配置
    pub analysis: AnalysisConfig,
    /// 日志配置
    pub logging: LoggingConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// API路由前缀
    pub api_prefix: String,
}

/// 存储后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Redis,
}

/// 存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// 元数据存储连接串
    pub metadata_url: String,
    /// 影像存储连接串
    pub blob_url: String,
}

/// 记录生命周期配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordsConfig {
    /// 临时记录存活时间（秒）
    pub temp_ttl_secs: u64,
}

/// 认证配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// 管理员共享密钥，通过 X-RFZO 请求头提交
    pub admin_secret: String,
    /// 实习生会话存活时间（秒）
    pub session_ttl_secs: u64,
}

/// 影像分析服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub endpoint: String,
    pub timeout_secs: u64,
    pub gradcam_content_type: String,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Settings {
    /// 加载配置：默认值 → 配置文件（可选）→ 环境变量
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let defaults = Config::try_from(&Settings::default())
            .map_err(|e| HahaiError::Config(e.to_string()))?;

        let mut builder = Config::builder().add_source(defaults);
        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path));
        }
        let settings = builder
            .add_source(
                Environment::with_prefix("HAHAI")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .map_err(|e| HahaiError::Config(e.to_string()))?;

        let settings: Settings = settings
            .try_deserialize()
            .map_err(|e| HahaiError::Config(format!("Failed to deserialize configuration: {}", e)))?;
        settings.validate()?;

        match config_path {
            Some(path) => info!("Configuration loaded from: {}", path),
            None => info!("Configuration loaded from defaults and environment"),
        }
        Ok(settings)
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(HahaiError::Config("server.port must not be 0".to_string()));
        }
        if self.records.temp_ttl_secs == 0 {
            return Err(HahaiError::Config("records.temp_ttl_secs must be positive".to_string()));
        }
        if self.auth.session_ttl_secs == 0 {
            return Err(HahaiError::Config("auth.session_ttl_secs must be positive".to_string()));
        }
        if self.storage.backend == StorageBackend::Redis
            && (self.storage.metadata_url.is_empty() || self.storage.blob_url.is_empty())
        {
            return Err(HahaiError::Config(
                "storage.metadata_url and storage.blob_url are required for the redis backend".to_string(),
            ));
        }
        Ok(())
    }

    pub fn temp_ttl(&self) -> Duration {
        Duration::from_secs(self.records.temp_ttl_secs)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.auth.session_ttl_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            api_prefix: "/api/v1".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            metadata_url: "redis://localhost:6379/0".to_string(),
            blob_url: "redis://localhost:6379/1".to_string(),
        }
    }
}

impl Default for RecordsConfig {
    fn default() -> Self {
        Self { temp_ttl_secs: 10 * 60 }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            admin_secret: String::new(),
            session_ttl_secs: 12 * 60 * 60,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:9000".to_string(),
            timeout_secs: 30,
            gradcam_content_type: "image/png".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
