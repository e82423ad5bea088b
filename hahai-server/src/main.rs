//! HaHAI服务器主程序

use anyhow::Context;
use clap::Parser;
use hahai_core::config::StorageBackend;
use hahai_core::Settings;
use hahai_records::{BlobHandle, MetadataHandle, RecordEngine};
use hahai_storage::{MemoryStore, RedisStore};
use hahai_web::{AdminGuard, AppState, RemoteAnalyzer, SessionService, WebServer};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// 内存后端清理过期键的间隔
const PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// HaHAI服务器命令行参数
#[derive(Parser, Debug)]
#[command(name = "hahai-server")]
#[command(about = "HaHAI 影像分析与病例记录服务器")]
struct Args {
    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 监听地址（覆盖配置）
    #[arg(long)]
    host: Option<String>,

    /// 服务器端口（覆盖配置）
    #[arg(short, long)]
    port: Option<u16>,

    /// 日志级别（覆盖配置）
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut settings = Settings::load(args.config.as_deref()).context("加载配置失败")?;
    if let Some(host) = args.host {
        settings.server.host = host;
    }
    if let Some(port) = args.port {
        settings.server.port = port;
    }

    // 初始化日志
    let level = args.log_level.unwrap_or_else(|| settings.logging.level.clone());
    let filter = EnvFilter::try_new(&level).with_context(|| format!("无效的日志级别: {}", level))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("启动HaHAI服务器...");

    let (meta, blobs) = build_stores(&settings).await?;
    let engine = Arc::new(RecordEngine::new(meta.clone(), blobs));
    let sessions = SessionService::new(meta, engine.directory().clone(), settings.session_ttl());
    let analyzer = RemoteAnalyzer::new(&settings.analysis).context("创建分析服务客户端失败")?;

    if settings.auth.admin_secret.is_empty() || settings.auth.admin_secret == "CHANGE_ME" {
        warn!("Admin secret is not configured; admin routes will answer 500");
    }

    let state = AppState {
        engine,
        sessions: Arc::new(sessions),
        admin: Arc::new(AdminGuard::new(settings.auth.admin_secret.clone())),
        analyzer: Arc::new(analyzer),
        temp_ttl: settings.temp_ttl(),
        api_prefix: settings.server.api_prefix.trim_end_matches('/').to_string(),
    };

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .with_context(|| {
            format!("无效的监听地址: {}:{}", settings.server.host, settings.server.port)
        })?;

    info!("HaHAI服务器配置:");
    info!("  监听地址: {}", addr);
    info!("  API前缀: {}", settings.server.api_prefix);
    info!("  存储后端: {:?}", settings.storage.backend);
    info!("  临时记录存活时间: {}s", settings.records.temp_ttl_secs);
    info!("  分析服务: {}", settings.analysis.endpoint);

    let server = WebServer::new(addr, state);
    if let Err(e) = server.run(shutdown_signal()).await {
        error!("服务器运行失败: {}", e);
        return Err(e.into());
    }

    Ok(())
}

/// 根据配置构建元数据存储与影像存储
async fn build_stores(settings: &Settings) -> anyhow::Result<(MetadataHandle, BlobHandle)> {
    match settings.storage.backend {
        StorageBackend::Memory => {
            warn!("Using in-memory stores; all data is lost on restart");
            let meta = Arc::new(MemoryStore::new());
            let blobs = Arc::new(MemoryStore::new());
            spawn_purger(vec![meta.clone(), blobs.clone()]);
            let meta: MetadataHandle = meta;
            let blobs: BlobHandle = blobs;
            Ok((meta, blobs))
        }
        StorageBackend::Redis => {
            let meta = RedisStore::connect("metadata", &settings.storage.metadata_url)
                .await
                .context("连接元数据存储失败")?;
            let blobs = RedisStore::connect("blob", &settings.storage.blob_url)
                .await
                .context("连接影像存储失败")?;
            let meta: MetadataHandle = Arc::new(meta);
            let blobs: BlobHandle = Arc::new(blobs);
            Ok((meta, blobs))
        }
    }
}

/// 定期清理内存后端中已过期但未被访问的键
fn spawn_purger(stores: Vec<Arc<MemoryStore>>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            for store in &stores {
                let purged = store.purge_expired().await;
                if purged > 0 {
                    debug!(purged, "Purged expired keys");
                }
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("收到关闭信号，正在停止服务器...");
}
