// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Exception 模块
//!
//! 该模块定义了服务在请求处理、配置加载以及开发期重建过程中可能出现的各类异常。
//!
//! 每个变体都对应了特定的处理路径：请求类异常会被上层转化为对应的 HTTP 状态码，
//! 重建与监听类异常只记录日志，不会让宿主进程退出。

use std::fmt;

/// 服务运行过程中发生的异常类型。
#[derive(Debug, Clone, PartialEq)]
pub enum Exception {
    /// 客户端发送的请求字节流无法解析为合法的 UTF-8 字符串。
    RequestIsNotUtf8,
    /// 请求行格式不正确或报文头未结束。
    MalformedRequest,
    /// 客户端使用了服务器无法识别的 HTTP 方法。
    UnSupportedRequestMethod,
    /// 客户端使用了服务器不支持的 HTTP 协议版本。
    UnsupportedHttpVersion,
    /// 资源不存在，或请求路径越出了根目录。两者对外不可区分，统一对应 `404 Not Found`。
    FileNotFound,
    /// 静态资源引擎只接受 GET 与 HEAD，对应 `405 Method Not Allowed`。
    MethodNotAllowed,
    /// 配置文件存在但内容非法。
    InvalidConfig(String),
    /// 底层 I/O 失败（绑定端口、读写磁盘等）。
    Io(String),
    /// 无法建立文件监听。
    WatchFailed(String),
    /// 应用处理器构建失败。
    BuildFailed(String),
}

use Exception::*;

impl fmt::Display for Exception {
    /// 根据错误类型写入人类可读的描述文本。
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestIsNotUtf8 => write!(f, "Request bytes can't be parsed in UTF-8"),
            MalformedRequest => write!(f, "Malformed request"),
            UnSupportedRequestMethod => write!(f, "Unsupported request method"),
            UnsupportedHttpVersion => write!(f, "Unsupported HTTP version"),
            FileNotFound => write!(f, "File not found (404)"),
            MethodNotAllowed => write!(f, "Method not allowed (405)"),
            InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            Io(msg) => write!(f, "I/O error: {}", msg),
            WatchFailed(msg) => write!(f, "Couldn't watch files: {}", msg),
            BuildFailed(msg) => write!(f, "Build failed: {}", msg),
        }
    }
}

impl std::error::Error for Exception {}

impl From<std::io::Error> for Exception {
    fn from(e: std::io::Error) -> Self {
        Io(e.to_string())
    }
}

impl Exception {
    /// 该异常在写回客户端时对应的状态码
    pub fn status_code(&self) -> u16 {
        match self {
            RequestIsNotUtf8 | MalformedRequest | UnSupportedRequestMethod
            | UnsupportedHttpVersion => 400,
            FileNotFound => 404,
            MethodNotAllowed => 405,
            _ => 500,
        }
    }
}
