//! 文件系统抽象。
//!
//! 静态资源引擎只通过这里的 trait 访问磁盘：存在性检查、元数据、规范化路径
//! 以及按字节区间打开读取流。每个请求都会重新 stat，不缓存任何元数据。

use std::io::{self, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::range::ByteSpan;

/// 读取流的统一类型
pub type BodyReader = Box<dyn AsyncRead + Send + Unpin>;

/// 一次 stat 的结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FileStat {
    pub size: u64,
    pub modified: SystemTime,
    pub is_file: bool,
    pub is_dir: bool,
}

impl FileStat {
    /// 修改时间距 Unix 纪元的纳秒数，纪元之前为负
    pub fn mtime_nanos(&self) -> i128 {
        match self.modified.duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_nanos() as i128,
            Err(e) => -(e.duration().as_nanos() as i128),
        }
    }

    /// 向下取整到毫秒
    pub fn mtime_millis(&self) -> i64 {
        self.mtime_nanos().div_euclid(1_000_000) as i64
    }
}

#[cfg_attr(test, mockall::automock)]
pub trait FileSystem: Send + Sync {
    fn exists(&self, path: &Path) -> bool;

    fn stat(&self, path: &Path) -> io::Result<FileStat>;

    /// 解析符号链接与 `..` 后的绝对路径；路径不存在时报错
    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf>;

    /// 打开读取流。`span` 为 `None` 时读取整个文件，否则只读取闭区间内的字节。
    fn read_stream(&self, path: &Path, span: Option<ByteSpan>) -> io::Result<BodyReader>;
}

/// 本地磁盘实现
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFs;

impl FileSystem for LocalFs {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn stat(&self, path: &Path) -> io::Result<FileStat> {
        let metadata = std::fs::metadata(path)?;
        Ok(FileStat {
            size: metadata.len(),
            modified: metadata.modified()?,
            is_file: metadata.is_file(),
            is_dir: metadata.is_dir(),
        })
    }

    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        std::fs::canonicalize(path)
    }

    fn read_stream(&self, path: &Path, span: Option<ByteSpan>) -> io::Result<BodyReader> {
        let mut file = std::fs::File::open(path)?;
        match span {
            Some(span) => {
                file.seek(SeekFrom::Start(span.start))?;
                let file = tokio::fs::File::from_std(file);
                Ok(Box::new(file.take(span.len())))
            }
            None => Ok(Box::new(tokio::fs::File::from_std(file))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn test_mtime_millis_floors() {
        let stat = FileStat {
            size: 0,
            modified: UNIX_EPOCH + Duration::from_nanos(1_700_000_000_123_999_999),
            is_file: true,
            is_dir: false,
        };
        assert_eq!(stat.mtime_millis(), 1_700_000_000_123);
    }

    #[test]
    fn test_mtime_millis_before_epoch_floors_downward() {
        let stat = FileStat {
            size: 0,
            modified: UNIX_EPOCH - Duration::from_micros(1500),
            is_file: true,
            is_dir: false,
        };
        assert_eq!(stat.mtime_nanos(), -1_500_000);
        assert_eq!(stat.mtime_millis(), -2);
    }

    #[test]
    fn test_local_stat() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"0123456789").unwrap();
        let stat = LocalFs.stat(file.path()).unwrap();
        assert_eq!(stat.size, 10);
        assert!(stat.is_file);
        assert!(!stat.is_dir);
    }

    #[tokio::test]
    async fn test_local_read_span() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"0123456789").unwrap();

        let mut reader = LocalFs
            .read_stream(file.path(), Some(ByteSpan { start: 3, end: 6 }))
            .unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"3456");

        let mut reader = LocalFs.read_stream(file.path(), None).unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"0123456789");
    }
}
