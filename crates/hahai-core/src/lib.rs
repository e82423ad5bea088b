//! # HaHAI Core
//!
//! 影像分析系统的核心模块，提供基础数据结构、错误定义、标识符生成和配置。

pub mod config;
pub mod error;
pub mod models;
pub mod utils;

pub use config::Settings;
pub use error::{HahaiError, Result};
pub use models::*;
