//! 预压缩：为目录下的可压缩文件生成 `.br` 与 `.gz` 兄弟文件。
//!
//! 静态资源引擎只做协商不做压缩，变体文件由这里离线产出。

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use brotli::enc::{self, backward_references::BrotliEncoderParams};
use flate2::{write::GzEncoder, Compression};
use log::{debug, info, warn};

use crate::param::{mime_for_extension, HttpEncoding};
use crate::util::format_file_size;

/// 小于该大小的文件不压缩
pub const MIN_COMPRESS_SIZE: u64 = 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompressReport {
    pub scanned: usize,
    pub compressed: usize,
    pub skipped: usize,
    pub variants_written: usize,
    pub original_bytes: u64,
    pub gzip_bytes: u64,
    pub brotli_bytes: u64,
}

impl fmt::Display for CompressReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "扫描{}个文件，压缩{}个，跳过{}个，写出{}个变体；原始{}，gzip {}，brotli {}",
            self.scanned,
            self.compressed,
            self.skipped,
            self.variants_written,
            format_file_size(self.original_bytes),
            format_file_size(self.gzip_bytes),
            format_file_size(self.brotli_bytes),
        )
    }
}

pub fn compress(data: &[u8], encoding: HttpEncoding) -> io::Result<Vec<u8>> {
    match encoding {
        HttpEncoding::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
            encoder.write_all(data)?;
            encoder.finish()
        }
        HttpEncoding::Br => {
            let params = BrotliEncoderParams::default();
            let mut output = Vec::new();
            enc::BrotliCompress(&mut io::Cursor::new(data), &mut output, &params)?;
            Ok(output)
        }
    }
}

pub fn should_skip_compression(mime_type: &str) -> bool {
    let skip_types = [
        "image/jpeg",
        "image/png",
        "image/gif",
        "image/webp",
        "image/avif",
        "image/x-icon",
        "video/",
        "audio/",
        "application/zip",
        "application/gzip",
        "font/woff",
        "font/woff2",
    ];
    skip_types.iter().any(|t| mime_type.starts_with(t))
}

/// 递归处理 `dir`。压缩后不比原文件小的变体不写出，避免协商到更大的文件。
pub fn compress_dir(dir: &Path) -> io::Result<CompressReport> {
    let mut files = vec![];
    collect_files(dir, &mut files)?;

    let mut report = CompressReport::default();
    for path in files {
        report.scanned += 1;
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if extension == "gz" || extension == "br" {
            report.skipped += 1;
            continue;
        }
        if should_skip_compression(mime_for_extension(extension)) {
            debug!("跳过已压缩格式：{}", path.display());
            report.skipped += 1;
            continue;
        }
        let data = fs::read(&path)?;
        if (data.len() as u64) < MIN_COMPRESS_SIZE {
            report.skipped += 1;
            continue;
        }

        report.compressed += 1;
        report.original_bytes += data.len() as u64;
        for encoding in [HttpEncoding::Gzip, HttpEncoding::Br] {
            let output = compress(&data, encoding)?;
            let mut variant = path.as_os_str().to_os_string();
            variant.push(encoding.file_suffix());
            let variant = PathBuf::from(variant);
            if output.len() >= data.len() {
                warn!("{}压缩后没有变小，不写出{}", path.display(), variant.display());
                continue;
            }
            match encoding {
                HttpEncoding::Gzip => report.gzip_bytes += output.len() as u64,
                HttpEncoding::Br => report.brotli_bytes += output.len() as u64,
            }
            fs::write(&variant, &output)?;
            report.variants_written += 1;
            debug!(
                "{} -> {}，{}字节 -> {}字节",
                path.display(),
                variant.display(),
                data.len(),
                output.len()
            );
        }
    }
    info!("预压缩完成：{}", report);
    Ok(report)
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_files(&entry.path(), files)?;
        } else if file_type.is_file() {
            files.push(entry.path());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn sample_text() -> Vec<u8> {
        "export const greeting = 'hello world';\n".repeat(200).into_bytes()
    }

    #[test]
    fn test_compress_gzip_round_trip() {
        let data = sample_text();
        let compressed = compress(&data, HttpEncoding::Gzip).unwrap();
        assert!(compressed.len() < data.len());
        let mut decoded = Vec::new();
        GzDecoder::new(&compressed[..]).read_to_end(&mut decoded).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_compress_brotli_round_trip() {
        let data = sample_text();
        let compressed = compress(&data, HttpEncoding::Br).unwrap();
        assert!(compressed.len() < data.len());
        let mut decoded = Vec::new();
        brotli::BrotliDecompress(&mut io::Cursor::new(compressed), &mut decoded).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_should_skip_compression() {
        assert!(should_skip_compression("image/png"));
        assert!(should_skip_compression("video/mp4"));
        assert!(should_skip_compression("font/woff2"));
        assert!(!should_skip_compression("text/javascript"));
        assert!(!should_skip_compression("image/svg+xml"));
    }

    #[test]
    fn test_compress_dir() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("assets")).unwrap();
        fs::write(root.join("assets/app.js"), sample_text()).unwrap();
        fs::write(root.join("assets/tiny.css"), "a{}").unwrap();
        fs::write(root.join("logo.png"), vec![7u8; 4096]).unwrap();

        let report = compress_dir(root).unwrap();
        assert_eq!(report.scanned, 3);
        assert_eq!(report.compressed, 1);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.variants_written, 2);
        assert!(root.join("assets/app.js.gz").is_file());
        assert!(root.join("assets/app.js.br").is_file());
        assert!(!root.join("assets/tiny.css.gz").exists());
        assert!(!root.join("logo.png.gz").exists());

        // 再次运行时已有的变体被跳过，原文件重新生成变体
        let again = compress_dir(root).unwrap();
        assert_eq!(again.scanned, 5);
        assert_eq!(again.compressed, 1);
        assert_eq!(again.skipped, 4);
    }
}
