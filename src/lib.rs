pub mod app;
pub mod cache_control;
pub mod config;
pub mod exception;
pub mod fs;
pub mod orchestrator;
pub mod param;
pub mod precompress;
pub mod range;
pub mod request;
pub mod resolve;
pub mod response;
pub mod server;
pub mod static_files;
pub mod util;
pub mod validator;
pub mod watch;

pub use app::{AppHandler, ClientShell, RouteTable};
pub use cache_control::CacheControl;
pub use config::Config;
pub use exception::Exception;
pub use fs::{FileStat, FileSystem, LocalFs};
pub use orchestrator::{RebuildHandle, WatchEvent, WatchKind, WatchScope};
pub use param::{HttpEncoding, HttpRequestMethod, HttpVersion};
pub use range::ByteSpan;
pub use request::Request;
pub use response::{Body, Response};
pub use static_files::StaticFiles;
pub use util::HtmlBuilder;
