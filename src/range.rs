//! `Range` 请求头解析（RFC 9110 §14.2 的单区间子集）。
//!
//! 只接受 `bytes=<start>-<end>` 形式，两端均可省略但不能同时省略；
//! 多区间、非 bytes 单位一律视为无法满足。

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref RANGE_PATTERN: Regex = Regex::new(r"^bytes=(\d*)-(\d*)$").unwrap();
}

/// 文件内的闭区间 `[start, end]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteSpan {
    pub start: u64,
    pub end: u64,
}

impl ByteSpan {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Content-Range` 头值
    pub fn content_range(&self, size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, size)
    }
}

/// 416 响应使用的 `Content-Range` 头值
pub fn unsatisfied_range(size: u64) -> String {
    format!("bytes */{}", size)
}

/// 解析 `Range` 头。返回 `None` 表示应当以 416 拒绝。
///
/// - `bytes=-N` 取最后 N 个字节，N 为 0 时拒绝；
/// - 起点大于终点、起点不小于文件大小时拒绝；
/// - 终点超出文件末尾时截断到 `size - 1`。
pub fn parse_range(header: &str, size: u64) -> Option<ByteSpan> {
    let captures = RANGE_PATTERN.captures(header)?;
    let start_raw = captures.get(1).map_or("", |m| m.as_str());
    let end_raw = captures.get(2).map_or("", |m| m.as_str());

    if start_raw.is_empty() && end_raw.is_empty() {
        return None;
    }

    // 有符号运算：空文件时 size - 1 为 -1
    let last = size as i128 - 1;
    let (start, end) = if start_raw.is_empty() {
        let suffix = end_raw.parse::<u64>().ok()? as i128;
        if suffix <= 0 {
            return None;
        }
        ((size as i128 - suffix).max(0), last)
    } else {
        let start = start_raw.parse::<u64>().ok()? as i128;
        let end = if end_raw.is_empty() {
            last
        } else {
            end_raw.parse::<u64>().ok()? as i128
        };
        (start, end)
    };

    if start > end || start < 0 || end < 0 {
        return None;
    }
    if start >= size as i128 {
        return None;
    }
    Some(ByteSpan {
        start: start as u64,
        end: end.min(last) as u64,
    })
}
