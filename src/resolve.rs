//! 请求路径到磁盘路径的安全映射。
//!
//! 根目录与拼接后的路径都先规范化（展开 `..` 与符号链接），
//! 结果必须等于根目录或位于根目录之下，否则按不存在处理。
//! 引擎实际读取的每个文件（包括预压缩变体）都要通过 [`contained`]。
//! 这是唯一的目录遍历防线。

use std::path::{Component, Path, PathBuf};

use log::{debug, warn};
use percent_encoding::percent_decode_str;

use crate::exception::Exception;
use crate::fs::FileSystem;

/// 去掉查询串与片段后百分号解码，得到 URL 的 pathname
pub fn decode_pathname(raw: &str) -> Option<String> {
    let end = raw.find(|c| c == '?' || c == '#').unwrap_or(raw.len());
    let pathname = &raw[..end];
    let decoded = percent_decode_str(pathname).decode_utf8().ok()?;
    if decoded.contains('\0') {
        return None;
    }
    Some(decoded.into_owned())
}

/// 一次成功的路径解析。
///
/// 文件名相关的判断（Content-Type、哈希文件名、预压缩变体）都基于 `requested`，
/// 它只做词法上的 `.`/`..` 处理，不跟随符号链接；`canonical` 只用于包含检查与读取。
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPath {
    /// 规范化后的根目录
    pub root: PathBuf,
    pub requested: PathBuf,
    pub canonical: PathBuf,
}

/// 将请求路径解析为根目录内已存在的文件或目录。
///
/// 失败一律返回 [`Exception::FileNotFound`]，不区分不存在与越界。
pub fn resolve_path(
    fs: &dyn FileSystem,
    root: &Path,
    raw_path: &str,
    id: u128,
) -> Result<ResolvedPath, Exception> {
    let pathname = decode_pathname(raw_path).ok_or_else(|| {
        warn!("[ID{}]无法解码请求路径：{}", id, raw_path);
        Exception::FileNotFound
    })?;

    let root = fs.canonicalize(root).map_err(|e| {
        warn!("[ID{}]无法规范化根目录{}：{}", id, root.display(), e);
        Exception::FileNotFound
    })?;

    // 去掉一个前导 '/'；剩余部分若仍是绝对路径会整体替换根目录，交给包含检查拒绝
    let relative = pathname.strip_prefix('/').unwrap_or(&pathname);
    let requested = join_lexically(&root, relative);

    let canonical = fs.canonicalize(&requested).map_err(|_| {
        debug!("[ID{}]路径不存在：{}", id, requested.display());
        Exception::FileNotFound
    })?;
    if !is_within(&root, &canonical) {
        warn!("[ID{}]拒绝越出根目录的路径：{}", id, raw_path);
        return Err(Exception::FileNotFound);
    }

    Ok(ResolvedPath {
        root,
        requested,
        canonical,
    })
}

/// 规范化 `path`，结果等于 `root` 或位于其下时返回规范化路径。
///
/// `root` 必须已经规范化。预压缩变体与目录索引同样要经过这里。
pub fn contained(fs: &dyn FileSystem, root: &Path, path: &Path) -> Option<PathBuf> {
    let resolved = fs.canonicalize(path).ok()?;
    is_within(root, &resolved).then_some(resolved)
}

fn is_within(root: &Path, resolved: &Path) -> bool {
    resolved == root || resolved.starts_with(root)
}

fn join_lexically(root: &Path, relative: &str) -> PathBuf {
    let mut joined = root.to_path_buf();
    for component in Path::new(relative).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                joined.pop();
            }
            other => joined.push(other),
        }
    }
    joined
}
