// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 静态资源引擎
//!
//! 给定根目录与请求描述符，生成完整的响应计划：
//! 1. 安全地解析磁盘路径（见 [`crate::resolve`]）；
//! 2. 协商预压缩变体（`.br` 优先于 `.gz`）；
//! 3. 计算 ETag / Last-Modified 并按固定顺序评估条件请求；
//! 4. 产出 304、206、416 或 200。
//!
//! 引擎本身不持有状态，每个请求都重新 stat。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, warn};

use crate::{
    cache_control::CacheControl,
    exception::Exception,
    fs::{FileStat, FileSystem},
    param::{content_type_for, HttpEncoding, HttpRequestMethod},
    range::{parse_range, unsatisfied_range},
    request::Request,
    resolve::{contained, resolve_path, ResolvedPath},
    response::{Body, Response},
    validator::{http_date, not_modified_since, parse_http_date, weak_etag},
};

/// 协商后的磁盘文件
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAsset {
    /// 按请求名称拼出的原文件路径，决定 Content-Type 与 Cache-Control
    pub path: PathBuf,
    /// 实际发送的文件（已规范化），可能是 `.br` / `.gz` 变体
    pub encoded_path: PathBuf,
    pub encoding: Option<HttpEncoding>,
    pub stat: FileStat,
    pub content_type: String,
}

pub struct StaticFiles {
    root: PathBuf,
    fs: Arc<dyn FileSystem>,
    cache_control: CacheControl,
    directory_index: Option<String>,
}

impl StaticFiles {
    pub fn new(root: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            root: root.into(),
            fs,
            cache_control: CacheControl::Default,
            directory_index: None,
        }
    }

    pub fn with_cache_control(mut self, cache_control: CacheControl) -> Self {
        self.cache_control = cache_control;
        self
    }

    /// 请求目录时改为发送目录下的该文件；未设置时目录按不存在处理
    pub fn with_directory_index(mut self, index: Option<&str>) -> Self {
        self.directory_index = index.map(str::to_string);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 对外契约：引擎接手时返回响应计划，否则返回 `None` 交给下游处理器。
    pub fn serve(&self, request: &Request, id: u128) -> Option<Response> {
        self.handle(request, id).ok()
    }

    /// 与 [`serve`](Self::serve) 相同，但保留拒绝原因（404 或 405）。
    pub fn handle(&self, request: &Request, id: u128) -> Result<Response, Exception> {
        let method = request.method();
        if !method.is_get_or_head() {
            debug!("[ID{}]静态资源引擎不处理{}请求", id, method);
            return Err(Exception::MethodNotAllowed);
        }
        let head_only = method == HttpRequestMethod::Head;

        let asset = self.resolve_asset(request, id)?;
        let etag = weak_etag(&asset.stat, asset.encoding);
        let last_modified = http_date(asset.stat.modified);
        let size = asset.stat.size;

        let mut response = Response::new(200);
        response
            .set_header("Content-Type", asset.content_type.as_str())
            .set_header("Cache-Control", self.cache_control.resolve(&asset.path))
            .set_header("ETag", etag.as_str())
            .set_header("Last-Modified", last_modified.as_str())
            .set_header("Accept-Ranges", "bytes");
        if let Some(encoding) = asset.encoding {
            response
                .set_header("Content-Encoding", encoding.to_string())
                .set_header("Vary", "Accept-Encoding");
        }

        // 条件请求：If-None-Match 优先，存在时忽略 If-Modified-Since
        let if_none_match = request.if_none_match();
        if if_none_match == Some(etag.as_str()) {
            debug!("[ID{}]ETag命中，返回304", id);
            response.set_code(304);
            return Ok(response);
        }
        if if_none_match.is_none() {
            let since = request.if_modified_since().and_then(parse_http_date);
            if since.map_or(false, |since| not_modified_since(&asset.stat, since)) {
                debug!("[ID{}]If-Modified-Since命中，返回304", id);
                response.set_code(304);
                return Ok(response);
            }
        }

        let range_allowed = asset.encoding.is_none()
            && request.if_range().map_or(true, |v| v == etag || v == last_modified);
        if let (Some(range), true) = (request.range(), range_allowed) {
            let Some(span) = parse_range(range, size) else {
                debug!("[ID{}]无法满足的Range请求：{}，文件大小{}", id, range, size);
                response
                    .set_code(416)
                    .set_header("Content-Range", unsatisfied_range(size))
                    .set_header("Content-Length", "0");
                return Ok(response);
            };
            debug!("[ID{}]处理Range请求: {}", id, span.content_range(size));
            response
                .set_code(206)
                .set_header("Content-Range", span.content_range(size))
                .set_header("Content-Length", span.len().to_string());
            if !head_only {
                response.set_body(Body::File {
                    path: asset.encoded_path,
                    span: Some(span),
                });
            }
            return Ok(response);
        }

        response.set_header("Content-Length", size.to_string());
        if !head_only {
            response.set_body(Body::File {
                path: asset.encoded_path,
                span: None,
            });
        }
        Ok(response)
    }

    /// 路径解析与编码协商。失败时一律为 [`Exception::FileNotFound`]。
    ///
    /// 文件名相关的判断使用请求中的名称，符号链接只在读取时跟随。
    pub fn resolve_asset(&self, request: &Request, id: u128) -> Result<ResolvedAsset, Exception> {
        let ResolvedPath {
            root,
            requested: mut path,
            mut canonical,
        } = resolve_path(self.fs.as_ref(), &self.root, request.path(), id)?;

        let stat = self.stat(&canonical, id)?;
        if stat.is_dir {
            let Some(index) = &self.directory_index else {
                debug!("[ID{}]请求的路径是目录：{}", id, path.display());
                return Err(Exception::FileNotFound);
            };
            // 索引文件本身也可能是指向根目录之外的符号链接
            path = path.join(index);
            canonical = contained(self.fs.as_ref(), &root, &path).ok_or_else(|| {
                debug!("[ID{}]目录索引不可用：{}", id, path.display());
                Exception::FileNotFound
            })?;
        }

        let (encoded_path, encoding) = self.negotiate(&root, &path, canonical, request, id);
        let stat = self.stat(&encoded_path, id)?;
        if !stat.is_file {
            debug!("[ID{}]不是普通文件：{}", id, encoded_path.display());
            return Err(Exception::FileNotFound);
        }

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        Ok(ResolvedAsset {
            content_type: content_type_for(extension),
            path,
            encoded_path,
            encoding,
            stat,
        })
    }

    /// 按 br、gzip 的顺序查找 `{path}.br` / `{path}.gz`，越出根目录的变体视为不存在
    fn negotiate(
        &self,
        root: &Path,
        path: &Path,
        canonical: PathBuf,
        request: &Request,
        id: u128,
    ) -> (PathBuf, Option<HttpEncoding>) {
        for encoding in [HttpEncoding::Br, HttpEncoding::Gzip] {
            if !request.accepts(encoding) {
                continue;
            }
            let mut candidate = path.as_os_str().to_os_string();
            candidate.push(encoding.file_suffix());
            let candidate = PathBuf::from(candidate);
            if !self.fs.exists(&candidate) {
                continue;
            }
            match contained(self.fs.as_ref(), root, &candidate) {
                Some(variant) => return (variant, Some(encoding)),
                None => warn!("[ID{}]忽略越出根目录的预压缩变体：{}", id, candidate.display()),
            }
        }
        (canonical, None)
    }

    fn stat(&self, path: &Path, id: u128) -> Result<FileStat, Exception> {
        self.fs.stat(path).map_err(|e| {
            debug!("[ID{}]无法获取{}的元数据: {}", id, path.display(), e);
            Exception::FileNotFound
        })
    }
}
