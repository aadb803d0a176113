//! Cache-Control 策略。
//!
//! 文件名中带内容哈希的构建产物可以永久缓存，其余文件每次都需要重新校验。
//! 默认策略可以被一个固定字符串或一个按文件计算的函数覆盖。

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;

pub const IMMUTABLE: &str = "public, max-age=31536000, immutable";
pub const MUST_REVALIDATE: &str = "public, max-age=0, must-revalidate";

lazy_static! {
    static ref HASHED_NAME: Regex = Regex::new(r"[.-][a-f0-9]{8,}\.").unwrap();
}

/// 自定义策略函数的输入
#[derive(Debug, Clone, Copy)]
pub struct CacheControlInput<'a> {
    pub file_path: &'a Path,
    /// 不带点的扩展名，没有扩展名时为空串
    pub extension: &'a str,
    pub is_hashed: bool,
}

pub type CacheControlFn = dyn Fn(&CacheControlInput<'_>) -> Option<String> + Send + Sync;

#[derive(Clone, Default)]
pub enum CacheControl {
    #[default]
    Default,
    Literal(String),
    /// 返回 `None` 时回落到默认策略
    Custom(Arc<CacheControlFn>),
}

impl fmt::Debug for CacheControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheControl::Default => write!(f, "Default"),
            CacheControl::Literal(s) => f.debug_tuple("Literal").field(s).finish(),
            CacheControl::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

impl CacheControl {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&CacheControlInput<'_>) -> Option<String> + Send + Sync + 'static,
    {
        CacheControl::Custom(Arc::new(f))
    }

    /// 配置文件中的可选字面量
    pub fn from_config(value: Option<&str>) -> Self {
        match value {
            Some(s) => CacheControl::Literal(s.to_string()),
            None => CacheControl::Default,
        }
    }

    /// 计算 `file_path` 的 `Cache-Control` 头值。`file_path` 应为未加编码后缀的原文件。
    pub fn resolve(&self, file_path: &Path) -> String {
        let extension = file_path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        let is_hashed = is_hashed_asset(file_path);
        match self {
            CacheControl::Literal(value) => value.clone(),
            CacheControl::Custom(f) => {
                let input = CacheControlInput {
                    file_path,
                    extension,
                    is_hashed,
                };
                f(&input).unwrap_or_else(|| default_policy(is_hashed).to_string())
            }
            CacheControl::Default => default_policy(is_hashed).to_string(),
        }
    }
}

fn default_policy(is_hashed: bool) -> &'static str {
    if is_hashed {
        IMMUTABLE
    } else {
        MUST_REVALIDATE
    }
}

/// 文件名中是否带有 `.` 或 `-` 分隔的、不少于 8 位的小写十六进制串
pub fn is_hashed_asset(file_path: &Path) -> bool {
    file_path
        .file_name()
        .and_then(|n| n.to_str())
        .map_or(false, |name| HASHED_NAME.is_match(name))
}
