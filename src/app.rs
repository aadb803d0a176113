//! # 应用处理器
//!
//! 静态资源引擎拒绝的请求交给应用处理器：
//! - 开发模式下由 [`RouteTable`] 处理，它由编排器在约定目录变化时重新扫描得到；
//! - 生产模式下由 [`ClientShell`] 处理，它根据打包清单输出客户端外壳页面。

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde_derive::Deserialize;
use serde_json::json;

use crate::{
    exception::Exception,
    param::HttpRequestMethod,
    request::Request,
    resolve::decode_pathname,
    response::Response,
    util::HtmlBuilder,
};

/// 处理静态资源引擎没有接手的请求
pub trait AppHandler: Send + Sync {
    fn handle(&self, request: &Request, id: u128) -> Response;
}

/// 一条约定式路由：URL 模式与定义它的文件
#[derive(Debug, Clone, PartialEq)]
pub struct RouteRecord {
    /// 形如 `/blog/:slug`
    pub path: String,
    pub file_path: PathBuf,
}

/// 开发模式的路由表，每次重建都从磁盘重新扫描
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    pages: Vec<RouteRecord>,
    api: Vec<RouteRecord>,
    server_entry: Option<PathBuf>,
}

impl RouteTable {
    /// 扫描页面目录（`.vue`）与接口目录（`.ts` / `.js`）。
    ///
    /// 目录不存在视为空；两个文件映射到同一路由时构建失败。
    pub fn scan(pages_dir: &Path, api_dir: &Path, server_entry: &Path) -> Result<Self, Exception> {
        let pages = scan_routes(pages_dir, "/", &["vue"])?;
        let api = scan_routes(api_dir, "/api/", &["ts", "js"])?;
        let server_entry = server_entry.is_file().then(|| server_entry.to_path_buf());
        debug!(
            "路由扫描完成：{}个页面，{}个接口，服务端入口{}",
            pages.len(),
            api.len(),
            if server_entry.is_some() { "存在" } else { "不存在" }
        );
        Ok(Self {
            pages,
            api,
            server_entry,
        })
    }

    pub fn pages(&self) -> &[RouteRecord] {
        &self.pages
    }

    pub fn api(&self) -> &[RouteRecord] {
        &self.api
    }

    pub fn server_entry(&self) -> Option<&Path> {
        self.server_entry.as_deref()
    }

    pub fn find_page(&self, path: &str) -> Option<(&RouteRecord, Vec<(String, String)>)> {
        find_route(&self.pages, path)
    }

    pub fn find_api(&self, path: &str) -> Option<(&RouteRecord, Vec<(String, String)>)> {
        find_route(&self.api, path)
    }
}

impl AppHandler for RouteTable {
    fn handle(&self, request: &Request, id: u128) -> Response {
        let Some(path) = decode_pathname(request.path()) else {
            return Response::from_status_code(400);
        };
        let method = request.method();

        // 接口路由接受任意方法
        if let Some((route, params)) = self.find_api(&path) {
            debug!("[ID{}]命中接口路由：{}", id, route.path);
            let params: BTreeMap<_, _> = params.into_iter().collect();
            let body = json!({
                "route": route.path,
                "file": route.file_path.display().to_string(),
                "method": method.to_string(),
                "params": params,
            });
            let response = Response::json(200, body.to_string());
            return if method == HttpRequestMethod::Head {
                response.into_head()
            } else {
                response
            };
        }

        if !method.is_get_or_head() {
            return Response::from_status_code(405);
        }

        let response = match self.find_page(&path) {
            Some((route, _)) => {
                debug!("[ID{}]命中页面路由：{}", id, route.path);
                let rows: Vec<(String, String)> = self
                    .pages
                    .iter()
                    .map(|r| (r.path.clone(), r.file_path.display().to_string()))
                    .collect();
                let title = format!("{} ({})", route.path, route.file_path.display());
                let mut response = Response::html(200, HtmlBuilder::listing(&title, &rows).build());
                response.set_header("Cache-Control", "no-cache");
                response
            }
            None => Response::from_status_code(404),
        };
        if method == HttpRequestMethod::Head {
            response.into_head()
        } else {
            response
        }
    }
}

fn scan_routes(dir: &Path, prefix: &str, extensions: &[&str]) -> Result<Vec<RouteRecord>, Exception> {
    let mut files = vec![];
    walk_dir(dir, &mut files).map_err(|e| {
        Exception::BuildFailed(format!("无法扫描目录{}：{}", dir.display(), e))
    })?;

    let mut routes: Vec<RouteRecord> = vec![];
    for file_path in files {
        let has_extension = file_path
            .extension()
            .and_then(|e| e.to_str())
            .map_or(false, |e| extensions.contains(&e));
        if !has_extension {
            continue;
        }
        let Some(path) = to_route_path(dir, &file_path, prefix) else {
            warn!("忽略无法转换为路由的文件：{}", file_path.display());
            continue;
        };
        if let Some(existing) = routes.iter().find(|r| r.path == path) {
            return Err(Exception::BuildFailed(format!(
                "路由{}同时由{}与{}定义",
                path,
                existing.file_path.display(),
                file_path.display()
            )));
        }
        routes.push(RouteRecord { path, file_path });
    }
    routes.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(routes)
}

fn walk_dir(dir: &Path, files: &mut Vec<PathBuf>) -> io::Result<()> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    for entry in entries {
        let path = entry?.path();
        let metadata = fs::metadata(&path)?;
        if metadata.is_dir() {
            walk_dir(&path, files)?;
        } else if metadata.is_file() {
            files.push(path);
        }
    }
    Ok(())
}

/// `blog/[slug].vue` → `/blog/:slug`，`index` 段被省略
fn to_route_path(base: &Path, file_path: &Path, prefix: &str) -> Option<String> {
    let relative = file_path.strip_prefix(base).ok()?.with_extension("");
    let mut segments = vec![];
    for component in relative.components() {
        let segment = component.as_os_str().to_str()?;
        if segment == "index" {
            continue;
        }
        segments.push(dynamic_segment(segment));
    }
    Some(format!("{}{}", prefix, segments.join("/")))
}

fn dynamic_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    let mut rest = segment;
    while let Some(open) = rest.find('[') {
        let Some(close) = rest[open..].find(']').map(|c| open + c) else {
            break;
        };
        if close == open + 1 {
            out.push_str(&rest[..=close]);
            rest = &rest[close + 1..];
            continue;
        }
        out.push_str(&rest[..open]);
        out.push(':');
        out.push_str(&rest[open + 1..close]);
        rest = &rest[close + 1..];
    }
    out.push_str(rest);
    out
}

fn find_route<'a>(
    routes: &'a [RouteRecord],
    path: &str,
) -> Option<(&'a RouteRecord, Vec<(String, String)>)> {
    // 静态路由优先于动态路由
    routes
        .iter()
        .filter(|r| !r.path.contains(':'))
        .chain(routes.iter().filter(|r| r.path.contains(':')))
        .find_map(|r| match_route(&r.path, path).map(|params| (r, params)))
}

/// 逐段匹配，`:name` 段匹配任意非空段
pub fn match_route(pattern: &str, path: &str) -> Option<Vec<(String, String)>> {
    let path = if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path
    };
    let pattern_segments: Vec<&str> = pattern.split('/').collect();
    let path_segments: Vec<&str> = path.split('/').collect();
    if pattern_segments.len() != path_segments.len() {
        return None;
    }

    let mut params = vec![];
    for (expected, actual) in pattern_segments.iter().zip(path_segments.iter()) {
        match expected.strip_prefix(':') {
            Some(name) if !actual.is_empty() => params.push((name.to_string(), actual.to_string())),
            Some(_) => return None,
            None if expected == actual => {}
            None => return None,
        }
    }
    Some(params)
}

#[derive(Debug, Deserialize)]
struct ManifestChunk {
    file: Option<String>,
    src: Option<String>,
    #[serde(rename = "isEntry", default)]
    is_entry: bool,
    #[serde(default)]
    css: Vec<String>,
}

const CLIENT_ENTRY_SUFFIX: &str = "entry-client.ts";

/// 生产模式的兜底处理器：对所有 GET/HEAD 返回引用客户端入口的外壳页面
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientShell {
    script_src: Option<String>,
    css: Vec<String>,
}

impl ClientShell {
    /// 依次尝试 `.vite/manifest.json` 与 `manifest.json`，都不存在时外壳页面不引用任何脚本
    pub fn from_manifest(client_dir: &Path) -> Result<Self, Exception> {
        let candidates = [
            client_dir.join(".vite").join("manifest.json"),
            client_dir.join("manifest.json"),
        ];
        let Some(manifest_path) = candidates.iter().find(|p| p.is_file()) else {
            warn!("未找到打包清单，外壳页面将不引用客户端入口");
            return Ok(Self::default());
        };
        let text = fs::read_to_string(manifest_path)?;
        Self::from_manifest_str(&text).map_err(|e| match e {
            Exception::InvalidConfig(msg) => {
                Exception::InvalidConfig(format!("{}: {}", manifest_path.display(), msg))
            }
            other => other,
        })
    }

    pub fn from_manifest_str(text: &str) -> Result<Self, Exception> {
        let manifest: BTreeMap<String, ManifestChunk> =
            serde_json::from_str(text).map_err(|e| Exception::InvalidConfig(e.to_string()))?;

        let entry = manifest
            .iter()
            .find(|(key, _)| key.ends_with(CLIENT_ENTRY_SUFFIX))
            .map(|(_, chunk)| chunk)
            .or_else(|| {
                manifest.values().find(|chunk| {
                    chunk.is_entry
                        && chunk
                            .src
                            .as_deref()
                            .map_or(false, |src| src.ends_with(CLIENT_ENTRY_SUFFIX))
                })
            });

        Ok(match entry {
            Some(chunk) => Self {
                script_src: chunk.file.as_ref().map(|f| format!("/{}", f)),
                css: chunk.css.clone(),
            },
            None => {
                warn!("打包清单中没有客户端入口");
                Self::default()
            }
        })
    }

    pub fn script_src(&self) -> Option<&str> {
        self.script_src.as_deref()
    }

    pub fn css(&self) -> &[String] {
        &self.css
    }
}

impl AppHandler for ClientShell {
    fn handle(&self, request: &Request, _id: u128) -> Response {
        let method = request.method();
        if !method.is_get_or_head() {
            return Response::from_status_code(405);
        }
        let html = HtmlBuilder::shell("app", self.script_src(), &self.css).build();
        let response = Response::html(200, html);
        if method == HttpRequestMethod::Head {
            response.into_head()
        } else {
            response
        }
    }
}
