//! 缓存校验器：弱 ETag 与 HTTP 日期。

use std::time::SystemTime;

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::fs::FileStat;
use crate::param::HttpEncoding;

/// `W/"<size>-<floor(mtime ms)>[-<encoding>]"`
///
/// 编码参与计算，切换 `Accept-Encoding` 不会命中另一个变体的条件请求。
pub fn weak_etag(stat: &FileStat, encoding: Option<HttpEncoding>) -> String {
    let tag = match encoding {
        Some(e) => format!("{}-{}-{}", stat.size, stat.mtime_millis(), e),
        None => format!("{}-{}", stat.size, stat.mtime_millis()),
    };
    format!("W/\"{}\"", tag)
}

/// IMF-fixdate，例如 `Tue, 15 Nov 1994 08:12:31 GMT`
pub fn http_date(time: SystemTime) -> String {
    let date: DateTime<Utc> = time.into();
    date.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// 解析 HTTP 日期，返回 Unix 毫秒。
///
/// 依次尝试 RFC 2822（覆盖 IMF-fixdate）、RFC 850 与 asctime 三种格式。
pub fn parse_http_date(value: &str) -> Option<i64> {
    let value = value.trim();
    if let Ok(date) = DateTime::parse_from_rfc2822(value) {
        return Some(date.timestamp_millis());
    }
    for format in ["%A, %d-%b-%y %H:%M:%S GMT", "%a %b %e %H:%M:%S %Y"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc().timestamp_millis());
        }
    }
    None
}

/// 文件在 `since` 之后是否未被修改（按未截断的修改时间比较）
pub fn not_modified_since(stat: &FileStat, since_millis: i64) -> bool {
    stat.mtime_nanos() <= since_millis as i128 * 1_000_000
}
