// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 监听与分发
//!
//! 接受 TCP 连接，读取请求头，交给站点（[`Dispatch`]）生成响应计划后写回。
//! 每个连接只处理一个请求，响应总是带 `Connection: close`。
//!
//! 三种站点对应三个命令：
//! - [`ProductionSite`]：构建产物静态资源，未命中时输出客户端外壳页面；
//! - [`DevSite`]：public 目录静态资源，未命中时交给编排器当前的路由表；
//! - [`StaticOnly`]：只有静态资源，拒绝时返回 404 / 405 页面。

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Notify;

use crate::{
    app::{AppHandler, ClientShell, RouteTable},
    exception::Exception,
    fs::FileSystem,
    orchestrator::RebuildHandle,
    param::HttpRequestMethod,
    request::Request,
    response::Response,
    static_files::StaticFiles,
};

/// 请求头的最大长度
pub const MAX_HEAD_SIZE: usize = 8192;

/// 为一个已解析的请求给出响应计划
pub trait Dispatch: Send + Sync {
    fn dispatch(&self, request: &Request, id: u128) -> Response;
}

pub struct ProductionSite {
    assets: StaticFiles,
    shell: ClientShell,
}

impl ProductionSite {
    pub fn new(assets: StaticFiles, shell: ClientShell) -> Self {
        Self { assets, shell }
    }
}

impl Dispatch for ProductionSite {
    fn dispatch(&self, request: &Request, id: u128) -> Response {
        match self.assets.serve(request, id) {
            Some(response) => response,
            None => self.shell.handle(request, id),
        }
    }
}

pub struct DevSite {
    public: Option<StaticFiles>,
    routes: Arc<RebuildHandle<RouteTable>>,
}

impl DevSite {
    pub fn new(public: Option<StaticFiles>, routes: Arc<RebuildHandle<RouteTable>>) -> Self {
        Self { public, routes }
    }
}

impl Dispatch for DevSite {
    fn dispatch(&self, request: &Request, id: u128) -> Response {
        if let Some(response) = self.public.as_ref().and_then(|p| p.serve(request, id)) {
            return response;
        }
        // 每个请求取一次快照，重建发布不影响正在处理的请求
        self.routes.current_handler().handle(request, id)
    }
}

pub struct StaticOnly {
    assets: StaticFiles,
}

impl StaticOnly {
    pub fn new(assets: StaticFiles) -> Self {
        Self { assets }
    }
}

impl Dispatch for StaticOnly {
    fn dispatch(&self, request: &Request, id: u128) -> Response {
        match self.assets.handle(request, id) {
            Ok(response) => response,
            Err(e) => {
                warn!("[ID{}]请求的路径：{} 无法提供，{}", id, request.path(), e);
                let response = Response::from_exception(&e);
                if request.method() == HttpRequestMethod::Head {
                    response.into_head()
                } else {
                    response
                }
            }
        }
    }
}

/// 连接计数与停机标志，供管理控制台读取
#[derive(Debug, Default)]
pub struct ServerState {
    active_connections: AtomicU32,
    served_requests: AtomicU64,
    shutdown: AtomicBool,
    notify: Notify,
}

impl ServerState {
    pub fn active_connections(&self) -> u32 {
        self.active_connections.load(Ordering::SeqCst)
    }

    pub fn served_requests(&self) -> u64 {
        self.served_requests.load(Ordering::SeqCst)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// 通知主循环停止接受新连接，已建立的连接继续处理完
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    /// 等待所有连接处理完毕，最多等待 `timeout`
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.active_connections() > 0 {
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        true
    }
}

pub struct Server {
    listener: TcpListener,
    site: Arc<dyn Dispatch>,
    fs: Arc<dyn FileSystem>,
    chunk_size: usize,
    state: Arc<ServerState>,
}

impl Server {
    pub async fn bind(
        addr: SocketAddr,
        site: Arc<dyn Dispatch>,
        fs: Arc<dyn FileSystem>,
        chunk_size: usize,
    ) -> Result<Self, Exception> {
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            error!("无法绑定地址：{}，错误：{}", addr, e);
            Exception::Io(format!("{}: {}", addr, e))
        })?;
        info!("地址{}绑定完成", addr);
        Ok(Self {
            listener,
            site,
            fs,
            chunk_size,
            state: Arc::new(ServerState::default()),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn state(&self) -> Arc<ServerState> {
        Arc::clone(&self.state)
    }

    /// 主事件循环，收到停机请求后返回
    pub async fn run(self) {
        let mut id: u128 = 0;
        loop {
            if self.state.is_shutting_down() {
                info!("主循环接收到停机指令，正在退出...");
                break;
            }

            let (mut stream, addr) = tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        error!("接受连接失败：{}", e);
                        continue;
                    }
                },
                _ = self.state.notify.notified() => continue,
            };
            debug!("[ID{}]TCP连接已建立：{}", id, addr);

            let site = Arc::clone(&self.site);
            let fs = Arc::clone(&self.fs);
            let state = Arc::clone(&self.state);
            let chunk_size = self.chunk_size;
            tokio::spawn(async move {
                state.active_connections.fetch_add(1, Ordering::SeqCst);
                if handle_connection(&mut stream, id, site.as_ref(), fs.as_ref(), chunk_size)
                    .await
                    .is_some()
                {
                    state.served_requests.fetch_add(1, Ordering::SeqCst);
                }
                state.active_connections.fetch_sub(1, Ordering::SeqCst);
            });
            id += 1;
        }
    }
}

enum ReadOutcome {
    Head(Vec<u8>),
    Closed,
    TooLarge,
}

async fn read_head<S>(stream: &mut S) -> io::Result<ReadOutcome>
where
    S: AsyncRead + Unpin,
{
    let mut buffer = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            // 对端提前关闭时尽量解析已经收到的部分
            return Ok(if buffer.is_empty() {
                ReadOutcome::Closed
            } else {
                ReadOutcome::Head(buffer)
            });
        }
        buffer.extend_from_slice(&chunk[..n]);
        if buffer.windows(4).any(|w| w == b"\r\n\r\n") {
            return Ok(ReadOutcome::Head(buffer));
        }
        if buffer.len() > MAX_HEAD_SIZE {
            return Ok(ReadOutcome::TooLarge);
        }
    }
}

/// 处理单个连接上的一个请求，返回实际写出的响应状态码
pub async fn handle_connection<S>(
    stream: &mut S,
    id: u128,
    site: &dyn Dispatch,
    fs: &dyn FileSystem,
    chunk_size: usize,
) -> Option<u16>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let buffer = match read_head(stream).await {
        Ok(ReadOutcome::Head(buffer)) => buffer,
        Ok(ReadOutcome::Closed) => {
            debug!("[ID{}]客户端未发送数据即关闭连接", id);
            return None;
        }
        Ok(ReadOutcome::TooLarge) => {
            warn!("[ID{}]请求头超过{}字节，返回413", id, MAX_HEAD_SIZE);
            let response = Response::from_status_code(413);
            return write_response(stream, &response, id, fs, chunk_size).await;
        }
        Err(e) => {
            error!("[ID{}]读取TCPStream时遇到错误: {}", id, e);
            return None;
        }
    };
    debug!("[ID{}]HTTP请求接收完毕", id);

    let start_time = Instant::now();
    let request = match Request::try_from(&buffer, id) {
        Ok(request) => request,
        Err(e) => {
            warn!("[ID{}]解析HTTP请求失败: {}", id, e);
            let response = Response::from_exception(&e);
            return write_response(stream, &response, id, fs, chunk_size).await;
        }
    };

    let response = site.dispatch(&request, id);
    debug!(
        "[ID{}]HTTP响应构建完成，服务端用时{}ms。",
        id,
        start_time.elapsed().as_millis()
    );

    info!(
        "[ID{}] {}, {}, {}, {}, {}, {}, ",
        id,
        request.version(),
        request.path(),
        request.method(),
        response.status_code(),
        response.information(),
        request.user_agent(),
    );

    write_response(stream, &response, id, fs, chunk_size).await
}

async fn write_response<S>(
    stream: &mut S,
    response: &Response,
    id: u128,
    fs: &dyn FileSystem,
    chunk_size: usize,
) -> Option<u16>
where
    S: AsyncWrite + Unpin,
{
    if let Err(e) = response.write_to(stream, fs, chunk_size, id).await {
        error!("[ID{}]发送响应失败: {}", id, e);
        return None;
    }
    let _ = stream.shutdown().await;
    Some(response.status_code())
}
