use serde_derive::Deserialize;
use serde_derive::Serialize;

use log::warn;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::exception::Exception;

pub const DEFAULT_DEV_PORT: u16 = 5173;
pub const DEFAULT_START_PORT: u16 = 4173;

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
    root: String,
    port: Option<u16>,
    local: bool,
    worker_threads: usize,
    chunk_size: usize,
    #[serde(rename = "static")]
    static_files: StaticConfig,
    dev: DevConfig,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct StaticConfig {
    client_dir: String,
    cache_control: Option<String>,
    directory_index: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct DevConfig {
    debounce_ms: u64,
    pages_dir: String,
    api_dir: String,
    server_entry: String,
    public_dir: String,
}

fn default_chunk_size() -> usize {
    262144 // 256KB
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: ".".to_string(),
            port: None,
            local: true,
            worker_threads: 0,
            chunk_size: default_chunk_size(),
            static_files: StaticConfig::default(),
            dev: DevConfig::default(),
        }
    }
}

impl Default for StaticConfig {
    fn default() -> Self {
        Self {
            client_dir: "dist/client".to_string(),
            cache_control: None,
            directory_index: None,
        }
    }
}

impl Default for DevConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 50,
            pages_dir: "app/pages".to_string(),
            api_dir: "server/routes/api".to_string(),
            server_entry: "server/index.ts".to_string(),
            public_dir: "public".to_string(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default().normalized()
    }

    /// 从 TOML 文件加载配置。文件不存在时使用默认配置，内容非法时报错。
    pub fn from_toml(filename: &str) -> Result<Self, Exception> {
        let str_val = match fs::read_to_string(filename) {
            Ok(s) => s,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("配置文件{}不存在，使用默认配置", filename);
                return Ok(Config::new());
            }
            Err(e) => return Err(Exception::Io(format!("{}: {}", filename, e))),
        };
        Self::from_toml_str(&str_val)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, Exception> {
        let raw_config: Config =
            toml::from_str(text).map_err(|e| Exception::InvalidConfig(e.to_string()))?;
        Ok(raw_config.normalized())
    }

    fn normalized(mut self) -> Self {
        if self.worker_threads == 0 {
            self.worker_threads = num_cpus::get();
        }
        if self.chunk_size == 0 {
            warn!("chunk_size被设置为0，将改为默认值{}", default_chunk_size());
            self.chunk_size = default_chunk_size();
        }
        if self.dev.debounce_ms == 0 {
            warn!("debounce_ms被设置为0，将改为50ms");
            self.dev.debounce_ms = 50;
        }
        self
    }

    pub fn set_root(&mut self, root: &str) {
        self.root = root.to_string();
    }

    pub fn set_port(&mut self, port: u16) {
        self.port = Some(port);
    }

    pub fn set_directory_index(&mut self, index: Option<&str>) {
        self.static_files.directory_index = index.map(str::to_string);
    }
}

impl Config {
    pub fn root(&self) -> &Path {
        Path::new(&self.root)
    }

    /// 配置的端口；未配置时使用各命令自己的默认端口
    pub fn port_or(&self, default: u16) -> u16 {
        self.port.unwrap_or(default)
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    pub fn local(&self) -> bool {
        self.local
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn client_dir(&self) -> PathBuf {
        self.root().join(&self.static_files.client_dir)
    }

    pub fn cache_control(&self) -> Option<&str> {
        self.static_files.cache_control.as_deref()
    }

    pub fn directory_index(&self) -> Option<&str> {
        self.static_files.directory_index.as_deref()
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.dev.debounce_ms)
    }

    pub fn pages_dir(&self) -> PathBuf {
        self.root().join(&self.dev.pages_dir)
    }

    pub fn api_dir(&self) -> PathBuf {
        self.root().join(&self.dev.api_dir)
    }

    pub fn server_entry(&self) -> PathBuf {
        self.root().join(&self.dev.server_entry)
    }

    pub fn public_dir(&self) -> PathBuf {
        self.root().join(&self.dev.public_dir)
    }
}
