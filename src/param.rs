// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 协议参数与常量模块
//!
//! 该模块定义了静态资源服务遵循的 HTTP 协议相关常量和数据结构，包括：
//! - 响应中会用到的 HTTP 状态码及其原因短语（Reason Phrase）。
//! - 封闭的扩展名到 MIME 类型映射表。
//! - HTTP 方法、版本及内容编码的强类型枚举。

use lazy_static::lazy_static;
use std::collections::HashMap;
use std::fmt;

/// 服务器名称标识，用于 HTTP 响应头的 `Server` 字段
pub const SERVER_NAME: &str = "assetserve";

/// HTTP 协议规定的换行符（Carriage Return Line Feed）
pub const CRLF: &str = "\r\n";

/// 未知扩展名时使用的兜底类型
pub const OCTET_STREAM: &str = "application/octet-stream";

lazy_static! {
    /// HTTP 状态码与其对应的标准原因短语映射表。
    ///
    /// 参考标准：[RFC 9110: HTTP Semantics](https://www.rfc-editor.org/rfc/rfc9110.html)。
    pub static ref STATUS_CODES: HashMap<u16, &'static str> = {
        let mut map = HashMap::new();
        // 2xx: 成功响应
        map.insert(200, "OK");
        map.insert(204, "No Content");
        map.insert(206, "Partial Content");

        // 3xx: 重定向
        map.insert(301, "Moved Permanently");
        map.insert(302, "Found");
        map.insert(304, "Not Modified");

        // 4xx: 客户端错误
        map.insert(400, "Bad Request");
        map.insert(403, "Forbidden");
        map.insert(404, "Not Found");
        map.insert(405, "Method Not Allowed");
        map.insert(413, "Content Too Large");
        map.insert(416, "Range Not Satisfiable");

        // 5xx: 服务端错误
        map.insert(500, "Internal Server Error");
        map.insert(501, "Not Implemented");
        map.insert(503, "Service Unavailable");
        map
    };
}

lazy_static! {
    /// 文件后缀名到 MIME 类型的映射表。
    ///
    /// 这是一个封闭的表：构建产物只会出现这些类型，其余一律按二进制流处理。
    /// 字符集后缀由 [`content_type_for`] 统一追加，表内不写 charset。
    pub static ref MIME_TYPES: HashMap<&'static str, &'static str> = {
        let mut map = HashMap::new();
        map.insert("js", "text/javascript");
        map.insert("mjs", "text/javascript");
        map.insert("cjs", "text/javascript");
        map.insert("ts", "text/plain");
        map.insert("css", "text/css");
        map.insert("html", "text/html");
        map.insert("json", "application/json");
        map.insert("map", "application/json");
        map.insert("svg", "image/svg+xml");
        map.insert("png", "image/png");
        map.insert("jpg", "image/jpeg");
        map.insert("jpeg", "image/jpeg");
        map.insert("gif", "image/gif");
        map.insert("webp", "image/webp");
        map.insert("ico", "image/x-icon");
        map.insert("txt", "text/plain");
        map.insert("wasm", "application/wasm");
        map.insert("woff", "font/woff");
        map.insert("woff2", "font/woff2");
        map.insert("ttf", "font/ttf");
        map.insert("otf", "font/otf");
        map
    };
}

/// 查表得到裸 MIME 类型，未知扩展名返回 `application/octet-stream`。
pub fn mime_for_extension(extension: &str) -> &'static str {
    MIME_TYPES.get(extension).copied().unwrap_or(OCTET_STREAM)
}

/// 为文本类与 JSON 类型追加 `; charset=utf-8`。
pub fn ensure_charset(mime: &str) -> String {
    if mime.starts_with("text/") || mime == "application/json" {
        format!("{}; charset=utf-8", mime)
    } else {
        mime.to_string()
    }
}

/// 根据扩展名计算最终的 `Content-Type` 头值。
pub fn content_type_for(extension: &str) -> String {
    ensure_charset(mime_for_extension(extension))
}

/// 支持的 HTTP 协议版本
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HttpVersion {
    /// HTTP/1.0 版本
    V1_0,
    /// HTTP/1.1 版本
    V1_1,
}

/// 标准 HTTP 请求方法
#[derive(Debug, Clone, PartialEq)]
pub enum HttpRequestMethod {
    Get,
    Head,
    Options,
    Post,
    Put,
    Patch,
    Delete,
    /// 其余合法的方法名（如 TRACE、CONNECT），保留大写原文
    Extension(String),
}

impl HttpRequestMethod {
    /// 静态资源引擎只处理可缓存的安全方法
    pub fn is_get_or_head(&self) -> bool {
        matches!(self, HttpRequestMethod::Get | HttpRequestMethod::Head)
    }
}

/// 预压缩变体所对应的内容编码。identity 用 `None` 表示。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HttpEncoding {
    /// GNU zip 压缩
    Gzip,
    /// Brotli 压缩
    Br,
}

impl HttpEncoding {
    /// 预压缩文件相对原文件追加的后缀
    pub fn file_suffix(&self) -> &'static str {
        match *self {
            HttpEncoding::Gzip => ".gz",
            HttpEncoding::Br => ".br",
        }
    }
}

impl fmt::Display for HttpVersion {
    /// 将枚举格式化为 HTTP 报文中的版本字符串
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HttpVersion::V1_0 => write!(f, "1.0"),
            HttpVersion::V1_1 => write!(f, "1.1"),
        }
    }
}

impl fmt::Display for HttpRequestMethod {
    /// 将枚举格式化为 HTTP 标准大写方法名
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HttpRequestMethod::Get => write!(f, "GET"),
            HttpRequestMethod::Head => write!(f, "HEAD"),
            HttpRequestMethod::Options => write!(f, "OPTIONS"),
            HttpRequestMethod::Post => write!(f, "POST"),
            HttpRequestMethod::Put => write!(f, "PUT"),
            HttpRequestMethod::Patch => write!(f, "PATCH"),
            HttpRequestMethod::Delete => write!(f, "DELETE"),
            HttpRequestMethod::Extension(ref name) => write!(f, "{}", name),
        }
    }
}

impl fmt::Display for HttpEncoding {
    /// 将枚举格式化为 `Content-Encoding` 头所使用的标识符
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HttpEncoding::Gzip => write!(f, "gzip"),
            HttpEncoding::Br => write!(f, "br"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_scripts() {
        assert_eq!(content_type_for("js"), "text/javascript; charset=utf-8");
        assert_eq!(content_type_for("mjs"), "text/javascript; charset=utf-8");
        assert_eq!(content_type_for("cjs"), "text/javascript; charset=utf-8");
        assert_eq!(content_type_for("ts"), "text/plain; charset=utf-8");
    }

    #[test]
    fn test_content_type_json_family() {
        assert_eq!(content_type_for("json"), "application/json; charset=utf-8");
        assert_eq!(content_type_for("map"), "application/json; charset=utf-8");
    }

    #[test]
    fn test_content_type_binary_has_no_charset() {
        assert_eq!(content_type_for("png"), "image/png");
        assert_eq!(content_type_for("jpeg"), "image/jpeg");
        assert_eq!(content_type_for("wasm"), "application/wasm");
        assert_eq!(content_type_for("woff2"), "font/woff2");
        assert_eq!(content_type_for("svg"), "image/svg+xml");
    }

    #[test]
    fn test_content_type_unknown() {
        assert_eq!(content_type_for("exe"), "application/octet-stream");
        assert_eq!(content_type_for(""), "application/octet-stream");
        // 扩展名大小写敏感
        assert_eq!(content_type_for("JS"), "application/octet-stream");
    }

    #[test]
    fn test_method_filter() {
        assert!(HttpRequestMethod::Get.is_get_or_head());
        assert!(HttpRequestMethod::Head.is_get_or_head());
        assert!(!HttpRequestMethod::Post.is_get_or_head());
        assert!(!HttpRequestMethod::Options.is_get_or_head());
    }

    #[test]
    fn test_encoding_display_and_suffix() {
        assert_eq!(HttpEncoding::Br.to_string(), "br");
        assert_eq!(HttpEncoding::Gzip.to_string(), "gzip");
        assert_eq!(HttpEncoding::Br.file_suffix(), ".br");
        assert_eq!(HttpEncoding::Gzip.file_suffix(), ".gz");
    }
}
