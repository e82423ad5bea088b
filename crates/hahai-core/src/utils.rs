//! 通用工具函数

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

/// 临时记录ID的保留前缀
pub const TEMP_ID_PREFIX: &str = "temp-";

/// 生成临时记录ID，形如 `temp-<32位十六进制>`
pub fn generate_temp_id() -> String {
    format!("{}{}", TEMP_ID_PREFIX, Uuid::new_v4().simple())
}

/// 生成永久病例ID（与临时ID同一随机空间，不带前缀）
pub fn generate_case_id() -> String {
    Uuid::new_v4().to_string()
}

/// 生成实习生会话令牌
pub fn generate_session_token() -> String {
    Uuid::new_v4().to_string()
}

/// 判断ID是否带有临时前缀
pub fn is_temp_id(id: &str) -> bool {
    id.len() > TEMP_ID_PREFIX.len() && id.starts_with(TEMP_ID_PREFIX)
}

/// 当前时间截断到秒，与存储中的时间戳精度一致
pub fn now_seconds() -> DateTime<Utc> {
    from_unix_seconds(Utc::now().timestamp()).unwrap_or_else(Utc::now)
}

pub fn from_unix_seconds(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}
