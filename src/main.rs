// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # assetserve
//!
//! 前端应用工具链的本地服务端：
//! - `dev`：public 目录静态资源 + 约定式路由表，路由文件变化时自动重建；
//! - `start`：构建产物静态资源（哈希文件永久缓存、预压缩协商、Range），兜底输出客户端外壳页面；
//! - `serve <dir>`：任意目录的静态文件服务；
//! - `compress <dir>`：离线生成 `.br` / `.gz` 变体。
//!
//! 运行期间可在标准输入中使用 `stop` / `status` / `help` 指令。

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use log::{error, info, warn, LevelFilter};
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Config as LogConfig, Root};
use log4rs::encode::pattern::PatternEncoder;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::runtime::Builder;

use assetserve::{
    cache_control::CacheControl,
    config::{Config, DEFAULT_DEV_PORT, DEFAULT_START_PORT},
    orchestrator::{self, RebuildHandle, WatchScope},
    precompress,
    server::{DevSite, Dispatch, ProductionSite, Server, ServerState, StaticOnly},
    watch::FileWatcher,
    ClientShell, Exception, FileSystem, LocalFs, RouteTable, StaticFiles,
};

#[derive(Parser, Debug)]
#[command(name = "assetserve", version, about = "静态资源服务与开发期热重建")]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, global = true, default_value = "config/development.toml")]
    config: String,

    /// 覆盖配置中的端口
    #[arg(short, long, global = true)]
    port: Option<u16>,

    /// 覆盖配置中的项目根目录
    #[arg(short, long, global = true)]
    root: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 启动开发服务
    Dev,
    /// 运行构建产物
    Start,
    /// 以静态文件服务器方式提供一个目录
    Serve { dir: PathBuf },
    /// 为目录下的文件生成预压缩变体
    Compress { dir: PathBuf },
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    let mut config = match Config::from_toml(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("无法载入配置文件{}：{}", cli.config, e);
            std::process::exit(1);
        }
    };
    info!("配置文件已载入");
    if let Some(root) = &cli.root {
        config.set_root(root);
    }
    if let Some(port) = cli.port {
        config.set_port(port);
    }

    let runtime = match Builder::new_multi_thread()
        .worker_threads(config.worker_threads())
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("无法创建异步运行时：{}", e);
            std::process::exit(1);
        }
    };

    let result = runtime.block_on(run(cli.command, config));
    // 控制台任务阻塞在标准输入上，不等待它
    runtime.shutdown_timeout(Duration::from_secs(1));
    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

/// 优先使用 YAML 配置，失败时退回到 Info 级别的控制台输出
fn init_logging() {
    let Err(e) = log4rs::init_file("config/log4rs.yaml", Default::default()) else {
        return;
    };
    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{d(%Y-%m-%d %H:%M:%S)} {h({l})} {m}{n}",
        )))
        .build();
    let config = LogConfig::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(LevelFilter::Info));
    match config.map(log4rs::init_config) {
        Ok(Ok(_)) => warn!("无法载入config/log4rs.yaml（{}），使用默认控制台日志", e),
        Ok(Err(err)) => eprintln!("无法初始化日志：{}", err),
        Err(err) => eprintln!("无法初始化日志：{}", err),
    }
}

async fn run(command: Command, mut config: Config) -> Result<(), Exception> {
    // 文件监视给出的是绝对路径，根目录先规范化
    let root = std::fs::canonicalize(config.root()).map_err(|e| {
        Exception::InvalidConfig(format!("根目录{}不可用：{}", config.root().display(), e))
    })?;
    config.set_root(&root.to_string_lossy());
    info!("项目根目录: {}", root.display());

    let fs: Arc<dyn FileSystem> = Arc::new(LocalFs);
    let mut rebuild: Option<Arc<RebuildHandle<RouteTable>>> = None;
    let mut _watcher: Option<FileWatcher> = None;

    let (site, default_port): (Arc<dyn Dispatch>, u16) = match command {
        Command::Compress { dir } => {
            let report = tokio::task::spawn_blocking(move || precompress::compress_dir(&dir))
                .await
                .map_err(|e| Exception::Io(e.to_string()))??;
            println!("{}", report);
            return Ok(());
        }
        Command::Dev => {
            let scope = WatchScope::new(&root)
                .dir(config.pages_dir())
                .dir(config.api_dir())
                .file(config.server_entry());
            let (watcher, events) = FileWatcher::new(&scope)?;
            _watcher = Some(watcher);

            let (pages, api, entry) = (config.pages_dir(), config.api_dir(), config.server_entry());
            let builder = move || {
                let (pages, api, entry) = (pages.clone(), api.clone(), entry.clone());
                async move {
                    tokio::task::spawn_blocking(move || RouteTable::scan(&pages, &api, &entry))
                        .await
                        .map_err(|e| Exception::BuildFailed(e.to_string()))?
                }
            };
            let handle = Arc::new(orchestrator::start(events, scope, builder, config.debounce()).await?);
            let routes = handle.current_handler();
            info!("路由表就绪：{}个页面，{}个接口", routes.pages().len(), routes.api().len());

            let public_dir = config.public_dir();
            let public = public_dir.is_dir().then(|| {
                StaticFiles::new(public_dir, Arc::clone(&fs))
                    .with_cache_control(CacheControl::Literal("no-cache".to_string()))
            });
            rebuild = Some(Arc::clone(&handle));
            (Arc::new(DevSite::new(public, handle)), DEFAULT_DEV_PORT)
        }
        Command::Start => {
            let client_dir = config.client_dir();
            if !client_dir.is_dir() {
                return Err(Exception::InvalidConfig(format!(
                    "未找到构建产物{}，请先构建客户端",
                    client_dir.display()
                )));
            }
            let shell = ClientShell::from_manifest(&client_dir)?;
            let assets = StaticFiles::new(client_dir, Arc::clone(&fs))
                .with_cache_control(CacheControl::from_config(config.cache_control()))
                .with_directory_index(config.directory_index());
            (Arc::new(ProductionSite::new(assets, shell)), DEFAULT_START_PORT)
        }
        Command::Serve { dir } => {
            let dir = if dir.is_absolute() { dir } else { root.join(dir) };
            let assets = StaticFiles::new(dir, Arc::clone(&fs))
                .with_cache_control(CacheControl::from_config(config.cache_control()))
                .with_directory_index(config.directory_index().or(Some("index.html")));
            (Arc::new(StaticOnly::new(assets)), DEFAULT_START_PORT)
        }
    };

    let port = config.port_or(default_port);
    let address = match config.local() {
        true => Ipv4Addr::new(127, 0, 0, 1),
        false => Ipv4Addr::new(0, 0, 0, 0),
    };
    let server = Server::bind(
        SocketAddr::V4(SocketAddrV4::new(address, port)),
        site,
        fs,
        config.chunk_size(),
    )
    .await?;
    info!("服务端已启动: http://{}:{}", address, port);

    let state = server.state();
    tokio::spawn(admin_console(Arc::clone(&state), rebuild.clone()));

    server.run().await;

    if !state.wait_idle(Duration::from_secs(5)).await {
        warn!("仍有{}个连接未处理完，强制退出", state.active_connections());
    }
    if let Some(rebuild) = rebuild {
        rebuild.stop().await;
    }
    info!("服务端已停止");
    Ok(())
}

/// 交互式管理控制台
async fn admin_console(state: Arc<ServerState>, rebuild: Option<Arc<RebuildHandle<RouteTable>>>) {
    let stdin = tokio::io::stdin();
    let mut reader = BufReader::new(stdin);
    let mut input = String::new();
    loop {
        input.clear();
        match reader.read_line(&mut input).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let cmd = input.trim();
        match cmd {
            "stop" => {
                state.request_shutdown();
                println!("停机指令已激活，服务器将在处理完当前连接后关闭...");
                break;
            }
            "help" => {
                println!("== assetserve Help ==");
                println!("stop   - 发出停机信号");
                println!("status - 查看当前服务器运行状态");
                println!("help   - 显示此帮助信息");
                println!("====================");
            }
            "status" => {
                println!("== assetserve 状态 ==");
                println!("当前活跃连接数: {}", state.active_connections());
                println!("已处理请求数: {}", state.served_requests());
                if let Some(rebuild) = &rebuild {
                    println!("重建统计: {}", rebuild.stats());
                }
                println!("====================");
            }
            "" => {}
            _ => {
                println!("无效的命令：{}", cmd);
            }
        }
    }
}
