//! # HaHAI Web模块
//!
//! HTTP接口层：实习生目录、病例记录、影像处理流程，以及管理员密钥与实习生会话认证。
//! 业务规则全部位于记录引擎，本层只负责请求解析与响应映射。

pub mod analysis;
pub mod auth;
pub mod error;
pub mod handlers;
pub mod process;
pub mod server;

#[cfg(test)]
mod testing;

pub use analysis::{Analyzer, RemoteAnalyzer};
pub use auth::{AdminGuard, SessionService};
pub use error::{ApiError, ApiResult};
pub use server::{AppState, WebServer};
