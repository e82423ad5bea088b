//! 错误定义模块

use thiserror::Error;

/// 系统统一错误类型
#[derive(Error, Debug)]
pub enum HahaiError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("存储错误: {0}")]
    Store(String),

    #[error("网络错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("验证错误: {0}")]
    Validation(String),

    #[error("未认证: {0}")]
    Unauthorized(String),

    #[error("无访问权限: {0}")]
    Forbidden(String),

    /// 实习生不存在，无法作为记录所有者
    #[error("无效的所有者: {0}")]
    InvalidOwner(String),

    /// 调用者不是目标记录的所有者
    #[error("所有权错误: {0}")]
    Ownership(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("临时记录未找到: {0}")]
    TempNotFound(String),

    /// 临时记录格式错误、已被提升或缺少影像
    #[error("无效的临时记录: {0}")]
    InvalidTempRecord(String),

    #[error("记录提升失败: {0}")]
    PromotionFailed(String),

    #[error("实习生已存在: {0}")]
    InternAlreadyExists(String),

    #[error("实习生未找到: {0}")]
    InternNotFound(String),

    #[error("实习生仍拥有病例记录: {0}")]
    InternHasRecords(String),

    #[error("影像分析错误: {0}")]
    Analysis(String),

    #[error("系统内部错误: {0}")]
    Internal(String),

    #[error("无效状态转换: 从 {from} 到 {event}")]
    InvalidStateTransition { from: String, event: String },
}

/// 系统统一结果类型
pub type Result<T> = std::result::Result<T, HahaiError>;
