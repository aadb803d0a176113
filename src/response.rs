//! # 响应计划
//!
//! `Response` 在写出任何字节之前就完全确定了状态码、标头与响应体来源。
//! 响应体来源三选一：无、内存字节、文件（整体或闭区间）。
//! 文件体在写出阶段才打开，按 `chunk_size` 分块发送。

use crate::{
    exception::Exception,
    fs::FileSystem,
    param::*,
    range::ByteSpan,
    util::HtmlBuilder,
    validator::http_date,
};

use bytes::Bytes;
use log::{debug, error};
use std::{io, path::PathBuf, time::SystemTime};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// 响应体来源
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Empty,
    Bytes(Bytes),
    File {
        path: PathBuf,
        span: Option<ByteSpan>,
    },
}

#[derive(Debug, Clone)]
pub struct Response {
    status_code: u16,
    information: String,
    /// 保持插入顺序；同名标头只保留一个
    headers: Vec<(String, String)>,
    body: Body,
}

impl Response {
    pub fn new(code: u16) -> Self {
        let mut response = Self {
            status_code: 200,
            information: "OK".to_string(),
            headers: vec![],
            body: Body::Empty,
        };
        response.set_code(code);
        response
    }

    /// 设置状态码；未登记的状态码使用空原因短语
    pub fn set_code(&mut self, code: u16) -> &mut Self {
        self.status_code = code;
        self.information = match STATUS_CODES.get(&code) {
            Some(&info) => info.to_string(),
            None => {
                error!("未登记的状态码：{}", code);
                String::new()
            }
        };
        self
    }

    /// 设置标头，同名（大小写不敏感）时覆盖
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        let value = value.into();
        match self
            .headers
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            Some(entry) => entry.1 = value,
            None => self.headers.push((name.to_string(), value)),
        }
        self
    }

    pub fn set_body(&mut self, body: Body) -> &mut Self {
        self.body = body;
        self
    }

    /// 带 HTML 正文的完整响应
    pub fn html(code: u16, html: String) -> Self {
        let mut response = Self::new(code);
        let bytes = Bytes::from(html);
        response
            .set_header("Content-Type", "text/html; charset=utf-8")
            .set_header("Content-Length", bytes.len().to_string())
            .set_body(Body::Bytes(bytes));
        response
    }

    /// 带 JSON 正文的完整响应
    pub fn json(code: u16, json: String) -> Self {
        let mut response = Self::new(code);
        let bytes = Bytes::from(json);
        response
            .set_header("Content-Type", "application/json; charset=utf-8")
            .set_header("Content-Length", bytes.len().to_string())
            .set_body(Body::Bytes(bytes));
        response
    }

    /// 状态码页面
    pub fn from_status_code(code: u16) -> Self {
        let page = match code {
            404 => HtmlBuilder::from_status_code(404, Some("<p>你指定的资源无法找到。</p>")),
            405 => HtmlBuilder::from_status_code(
                405,
                Some("<p>静态资源只支持GET与HEAD方法。</p>"),
            ),
            500 => HtmlBuilder::from_status_code(500, Some("<p>服务器出现了一个内部错误。</p>")),
            _ => HtmlBuilder::from_status_code(code, None),
        };
        let mut response = Self::html(code, page.build());
        if code == 405 {
            response.set_header("Allow", "GET, HEAD");
        }
        response
    }

    /// 把异常映射为对应状态码的页面
    pub fn from_exception(e: &Exception) -> Self {
        Self::from_status_code(e.status_code())
    }

    /// HEAD 请求：保留全部标头（包括 Content-Length），丢弃响应体
    pub fn into_head(mut self) -> Self {
        self.body = Body::Empty;
        self
    }
}

impl Response {
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn information(&self) -> &str {
        &self.information
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.body, Body::File { .. })
    }

    /// 状态行与全部标头，附加 Date、Server 与 Connection
    pub fn head_bytes(&self) -> Vec<u8> {
        let mut head = format!(
            "HTTP/1.1 {} {}{}",
            self.status_code, self.information, CRLF
        );
        for (name, value) in &self.headers {
            head.push_str(&[name.as_str(), ": ", value.as_str(), CRLF].concat());
        }
        if self.status_code != 304 && self.header("Content-Length").is_none() {
            head.push_str(&["Content-Length: 0", CRLF].concat());
        }
        head.push_str(&["Date: ", &http_date(SystemTime::now()), CRLF].concat());
        head.push_str(&["Server: ", SERVER_NAME, CRLF].concat());
        head.push_str(&["Connection: close", CRLF, CRLF].concat());
        head.into_bytes()
    }

    /// 写出整个响应。
    ///
    /// 标头发出后的读写失败无法挽回，只能返回错误由调用方断开连接。
    pub async fn write_to<W>(
        &self,
        stream: &mut W,
        fs: &dyn FileSystem,
        chunk_size: usize,
        id: u128,
    ) -> io::Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        // 先打开文件，失败时还来得及改发 500
        let reader = match &self.body {
            Body::File { path, span } => match fs.read_stream(path, *span) {
                Ok(reader) => Some(reader),
                Err(e) => {
                    error!("[ID{}]无法打开文件{}: {}", id, path.display(), e);
                    let fallback = Self::from_status_code(500);
                    stream.write_all(&fallback.head_bytes()).await?;
                    if let Body::Bytes(bytes) = &fallback.body {
                        stream.write_all(bytes).await?;
                    }
                    stream.flush().await?;
                    return Ok(0);
                }
            },
            _ => None,
        };

        stream.write_all(&self.head_bytes()).await?;

        let mut total_sent = 0u64;
        match (&self.body, reader) {
            (Body::Bytes(bytes), _) => {
                stream.write_all(bytes).await?;
                total_sent = bytes.len() as u64;
            }
            (Body::File { .. }, Some(mut reader)) => {
                let mut buffer = vec![0u8; chunk_size.max(1)];
                loop {
                    let n = reader.read(&mut buffer).await?;
                    if n == 0 {
                        break;
                    }
                    stream.write_all(&buffer[..n]).await?;
                    total_sent += n as u64;
                }
                let expected = self
                    .header("Content-Length")
                    .and_then(|v| v.parse::<u64>().ok());
                if expected.map_or(false, |len| len != total_sent) {
                    // 文件在 stat 之后被截断，连接由调用方关闭
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("body ended after {} bytes", total_sent),
                    ));
                }
            }
            _ => {}
        }
        stream.flush().await?;
        debug!("[ID{}]响应发送完成，正文{}字节", id, total_sent);
        Ok(total_sent)
    }
}
