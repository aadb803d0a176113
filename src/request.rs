// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 请求处理模块
//!
//! 负责将 TCP 流中读取的原始字节解析为不可变的 `Request` 描述符：
//! 1. 请求行（Request-Line）的解析（方法、路径、版本）。
//! 2. 全部标头（Headers）按小写名称收集到映射表中。
//! 3. 内容协商（Content Negotiation）相关的编码解析。
//!
//! Range、条件请求等标头在这里只保留原始字符串，语义交给静态资源引擎处理。

use crate::{exception::Exception, param::*};
use log::error;
use std::collections::HashMap;

/// 表示一个完整的 HTTP 请求元数据。
///
/// 每个连接构造一次，之后不再修改。不包含请求体。
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP 请求方法
    method: HttpRequestMethod,
    /// 原始请求目标（包含查询字符串，未解码）
    path: String,
    /// HTTP 协议版本
    version: HttpVersion,
    /// 小写标头名到值的映射；重复标头按逗号合并
    headers: HashMap<String, String>,
    /// 客户端接受的内容编码（按出现顺序，已剔除 q=0）
    accept_encoding: Vec<HttpEncoding>,
}

impl Request {
    /// 从原始字节缓冲区尝试构建 `Request` 实例。
    ///
    /// 缓冲区可以包含报文头之后的请求体，解析只看到第一个空行为止。
    ///
    /// # 参数
    /// * `buffer` - 从网络 Socket 读取的原始数据。
    /// * `id` - 连接 ID，用于在多线程环境下追踪日志。
    pub fn try_from(buffer: &[u8], id: u128) -> Result<Self, Exception> {
        let request_string = match std::str::from_utf8(buffer) {
            Ok(string) => string,
            Err(_) => {
                error!("[ID{}]无法解析HTTP请求", id);
                return Err(Exception::RequestIsNotUtf8);
            }
        };

        let head = match request_string.find("\r\n\r\n") {
            Some(end) => &request_string[..end],
            None => request_string.trim_end_matches(CRLF),
        };
        let mut request_lines = head.split(CRLF);

        // 1. 解析请求行 (e.g., "GET /index.html HTTP/1.1")
        let request_line = request_lines.next().unwrap_or("");
        let first_line_parts: Vec<&str> = request_line.split(' ').collect();
        if first_line_parts.len() != 3 || first_line_parts[1].is_empty() {
            error!("[ID{}]HTTP请求行格式不正确：{}", id, request_line);
            return Err(Exception::MalformedRequest);
        }

        let method_str = first_line_parts[0].to_uppercase();
        let method = match method_str.as_str() {
            "GET" => HttpRequestMethod::Get,
            "HEAD" => HttpRequestMethod::Head,
            "OPTIONS" => HttpRequestMethod::Options,
            "POST" => HttpRequestMethod::Post,
            "PUT" => HttpRequestMethod::Put,
            "PATCH" => HttpRequestMethod::Patch,
            "DELETE" => HttpRequestMethod::Delete,
            other if is_token(other) => HttpRequestMethod::Extension(other.to_string()),
            _ => {
                error!("[ID{}]不支持的HTTP请求方法：{}", id, &method_str);
                return Err(Exception::UnSupportedRequestMethod);
            }
        };

        let version_str = first_line_parts[2].to_uppercase();
        let version = match version_str.as_str() {
            "HTTP/1.1" => HttpVersion::V1_1,
            "HTTP/1.0" => HttpVersion::V1_0,
            _ => {
                error!("[ID{}]不支持的HTTP协议版本：{}", id, &version_str);
                return Err(Exception::UnsupportedHttpVersion);
            }
        };

        let path = first_line_parts[1].to_string();

        // 2. 收集标头，名称统一转为小写
        let mut headers: HashMap<String, String> = HashMap::new();
        for line in request_lines {
            let Some((name, value)) = line.split_once(':') else {
                error!("[ID{}]忽略格式不正确的标头：{}", id, line);
                continue;
            };
            let name = name.trim().to_lowercase();
            let value = value.trim();
            headers
                .entry(name)
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(value);
                })
                .or_insert_with(|| value.to_string());
        }

        // 3. 解析 Accept-Encoding 标头
        let accept_encoding = headers
            .get("accept-encoding")
            .map(|value| parse_accept_encoding(value))
            .unwrap_or_default();

        Ok(Self {
            method,
            path,
            version,
            headers,
            accept_encoding,
        })
    }
}

/// 方法名必须是 RFC 9110 中的 token
fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b))
}

/// 解析 `Accept-Encoding`，只识别预压缩变体可能用到的 br 与 gzip。
///
/// 显式标注 `q=0` 的编码视为拒绝。
fn parse_accept_encoding(value: &str) -> Vec<HttpEncoding> {
    let mut encodings = vec![];
    for item in value.split(',') {
        let mut params = item.split(';');
        let coding = params.next().unwrap_or("").trim().to_lowercase();
        let refused = params.any(|p| {
            p.trim()
                .strip_prefix("q=")
                .and_then(|q| q.trim().parse::<f32>().ok())
                .map_or(false, |q| q <= 0.0)
        });
        if refused {
            continue;
        }
        let encoding = match coding.as_str() {
            "br" => HttpEncoding::Br,
            "gzip" | "x-gzip" => HttpEncoding::Gzip,
            _ => continue,
        };
        if !encodings.contains(&encoding) {
            encodings.push(encoding);
        }
    }
    encodings
}

// --- Getter 访问器实现 ---

impl Request {
    /// 获取 HTTP 协议版本
    pub fn version(&self) -> &HttpVersion {
        &self.version
    }

    /// 获取原始请求路径（含查询参数）
    pub fn path(&self) -> &str {
        &self.path
    }

    /// 获取请求方法
    pub fn method(&self) -> HttpRequestMethod {
        self.method.clone()
    }

    /// 按名称（大小写不敏感）读取标头
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    /// 获取客户端支持的压缩算法列表
    pub fn accept_encoding(&self) -> &[HttpEncoding] {
        &self.accept_encoding
    }

    pub fn accepts(&self, encoding: HttpEncoding) -> bool {
        self.accept_encoding.contains(&encoding)
    }

    pub fn host(&self) -> &str {
        self.header("host").unwrap_or("localhost")
    }

    pub fn user_agent(&self) -> &str {
        self.header("user-agent").unwrap_or("")
    }

    pub fn if_none_match(&self) -> Option<&str> {
        self.header("if-none-match")
    }

    pub fn if_modified_since(&self) -> Option<&str> {
        self.header("if-modified-since")
    }

    pub fn range(&self) -> Option<&str> {
        self.header("range")
    }

    pub fn if_range(&self) -> Option<&str> {
        self.header("if-range")
    }
}
