use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use assetserve::{Body, CacheControl, LocalFs, Request, Response, StaticFiles};
use proptest::prelude::*;
use tempfile::TempDir;

const MTIME_SECS: u64 = 1_700_000_000;
const LAST_MODIFIED: &str = "Tue, 14 Nov 2023 22:13:20 GMT";

fn write_file(root: &Path, name: &str, content: &[u8]) {
    let path = root.join(name);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, content).unwrap();
    // 整秒的修改时间，便于用 Last-Modified 回填 If-Modified-Since
    File::options()
        .write(true)
        .open(&path)
        .unwrap()
        .set_modified(UNIX_EPOCH + Duration::from_secs(MTIME_SECS))
        .unwrap();
}

fn hundred_bytes() -> Vec<u8> {
    (0..100u8).collect()
}

fn fixture() -> (TempDir, StaticFiles) {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write_file(root, "app.a1b2c3d4.js", b"console.log('hashed')");
    write_file(root, "app.js", b"console.log('plain')");
    write_file(root, "data.bin", &hundred_bytes());
    write_file(root, "index.html", b"<h1>home</h1>");
    write_file(root, "docs/index.html", b"<h1>docs</h1>");
    write_file(root, "bundle.js", b"identity body");
    write_file(root, "bundle.js.br", b"brotli body!");
    write_file(root, "bundle.js.gz", b"gzip body");
    let engine = StaticFiles::new(root, Arc::new(LocalFs));
    (dir, engine)
}

fn request(method: &str, path: &str, headers: &[(&str, &str)]) -> Request {
    let mut text = format!("{} {} HTTP/1.1\r\nHost: localhost\r\n", method, path);
    for (name, value) in headers {
        text.push_str(&format!("{}: {}\r\n", name, value));
    }
    text.push_str("\r\n");
    Request::try_from(text.as_bytes(), 0).unwrap()
}

fn serve(engine: &StaticFiles, method: &str, path: &str, headers: &[(&str, &str)]) -> Response {
    engine
        .serve(&request(method, path, headers), 0)
        .unwrap_or_else(|| panic!("{} {} was declined", method, path))
}

/// 写出完整响应并返回 (报文头, 响应体)
fn render(response: &Response) -> (String, Vec<u8>) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let mut out: Vec<u8> = Vec::new();
    runtime
        .block_on(response.write_to(&mut out, &LocalFs, 7, 0))
        .unwrap();
    let split = out.windows(4).position(|w| w == b"\r\n\r\n").unwrap() + 4;
    let head = String::from_utf8_lossy(&out[..split]).to_string();
    (head, out[split..].to_vec())
}

#[test]
fn test_hashed_asset_is_immutable() {
    let (_dir, engine) = fixture();
    let response = serve(&engine, "GET", "/app.a1b2c3d4.js", &[]);
    assert_eq!(response.status_code(), 200);
    assert_eq!(
        response.header("Cache-Control"),
        Some("public, max-age=31536000, immutable")
    );
    assert_eq!(response.header("Content-Type"), Some("text/javascript; charset=utf-8"));

    let response = serve(&engine, "GET", "/app.js", &[]);
    assert_eq!(
        response.header("Cache-Control"),
        Some("public, max-age=0, must-revalidate")
    );
}

#[test]
fn test_cache_control_overrides() {
    let (dir, _) = fixture();
    let literal = StaticFiles::new(dir.path(), Arc::new(LocalFs))
        .with_cache_control(CacheControl::Literal("no-store".to_string()));
    assert_eq!(
        serve(&literal, "GET", "/app.a1b2c3d4.js", &[]).header("Cache-Control"),
        Some("no-store")
    );

    let custom = StaticFiles::new(dir.path(), Arc::new(LocalFs)).with_cache_control(
        CacheControl::custom(|input| (input.extension == "html").then(|| "no-cache".to_string())),
    );
    assert_eq!(
        serve(&custom, "GET", "/index.html", &[]).header("Cache-Control"),
        Some("no-cache")
    );
    assert_eq!(
        serve(&custom, "GET", "/app.js", &[]).header("Cache-Control"),
        Some("public, max-age=0, must-revalidate")
    );
}

#[test]
fn test_full_body_and_validators() {
    let (_dir, engine) = fixture();
    let response = serve(&engine, "GET", "/data.bin", &[]);
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.header("ETag"), Some("W/\"100-1700000000000\""));
    assert_eq!(response.header("Last-Modified"), Some(LAST_MODIFIED));
    assert_eq!(response.header("Accept-Ranges"), Some("bytes"));
    assert_eq!(response.header("Content-Length"), Some("100"));
    assert_eq!(response.header("Content-Type"), Some("application/octet-stream"));

    let (head, body) = render(&response);
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert_eq!(body, hundred_bytes());
}

#[test]
fn test_serving_twice_is_stable() {
    let (_dir, engine) = fixture();
    let first = serve(&engine, "GET", "/app.js", &[]);
    let second = serve(&engine, "GET", "/app.js", &[]);
    assert_eq!(first.header("ETag"), second.header("ETag"));
    assert_eq!(first.header("Last-Modified"), second.header("Last-Modified"));
}

#[test]
fn test_if_none_match_gives_304_for_get_and_head() {
    let (_dir, engine) = fixture();
    let etag = serve(&engine, "GET", "/app.js", &[])
        .header("ETag")
        .unwrap()
        .to_string();

    for method in ["GET", "HEAD"] {
        let response = serve(&engine, method, "/app.js", &[("If-None-Match", etag.as_str())]);
        assert_eq!(response.status_code(), 304);
        assert_eq!(*response.body(), Body::Empty);
        assert_eq!(response.header("ETag"), Some(etag.as_str()));
        let (head, body) = render(&response);
        assert!(!head.contains("Content-Length"));
        assert!(body.is_empty());
    }
}

#[test]
fn test_if_none_match_takes_precedence_over_if_modified_since() {
    let (_dir, engine) = fixture();
    let response = serve(
        &engine,
        "GET",
        "/app.js",
        &[("If-None-Match", "W/\"0-0\""), ("If-Modified-Since", LAST_MODIFIED)],
    );
    assert_eq!(response.status_code(), 200);
}

#[test]
fn test_if_modified_since() {
    let (_dir, engine) = fixture();
    let response = serve(&engine, "GET", "/app.js", &[("If-Modified-Since", LAST_MODIFIED)]);
    assert_eq!(response.status_code(), 304);

    let earlier = serve(
        &engine,
        "GET",
        "/app.js",
        &[("If-Modified-Since", "Tue, 14 Nov 2023 22:13:19 GMT")],
    );
    assert_eq!(earlier.status_code(), 200);

    let garbage = serve(&engine, "GET", "/app.js", &[("If-Modified-Since", "yesterday")]);
    assert_eq!(garbage.status_code(), 200);
}

#[test]
fn test_suffix_range() {
    let (_dir, engine) = fixture();
    let response = serve(&engine, "GET", "/data.bin", &[("Range", "bytes=-10")]);
    assert_eq!(response.status_code(), 206);
    assert_eq!(response.header("Content-Range"), Some("bytes 90-99/100"));
    assert_eq!(response.header("Content-Length"), Some("10"));
    let (_, body) = render(&response);
    assert_eq!(body, (90..100u8).collect::<Vec<_>>());
}

#[test]
fn test_open_ended_and_clamped_ranges() {
    let (_dir, engine) = fixture();
    let response = serve(&engine, "GET", "/data.bin", &[("Range", "bytes=95-")]);
    assert_eq!(response.header("Content-Range"), Some("bytes 95-99/100"));

    let response = serve(&engine, "GET", "/data.bin", &[("Range", "bytes=50-1000")]);
    assert_eq!(response.header("Content-Range"), Some("bytes 50-99/100"));
    assert_eq!(render(&response).1.len(), 50);
}

#[test]
fn test_unsatisfiable_ranges() {
    let (_dir, engine) = fixture();
    for range in ["bytes=100-120", "bytes=5-2", "bytes=-0", "bytes=-", "bytes=0-1,5-6", "items=0-1"] {
        let response = serve(&engine, "GET", "/data.bin", &[("Range", range)]);
        assert_eq!(response.status_code(), 416, "{}", range);
        assert_eq!(response.header("Content-Range"), Some("bytes */100"), "{}", range);
        let (head, body) = render(&response);
        assert!(head.contains("Content-Length: 0\r\n"));
        assert!(body.is_empty());
    }
}

#[test]
fn test_if_range() {
    let (_dir, engine) = fixture();
    let etag = serve(&engine, "GET", "/data.bin", &[])
        .header("ETag")
        .unwrap()
        .to_string();

    let matching = serve(
        &engine,
        "GET",
        "/data.bin",
        &[("Range", "bytes=0-9"), ("If-Range", etag.as_str())],
    );
    assert_eq!(matching.status_code(), 206);

    let by_date = serve(
        &engine,
        "GET",
        "/data.bin",
        &[("Range", "bytes=0-9"), ("If-Range", LAST_MODIFIED)],
    );
    assert_eq!(by_date.status_code(), 206);

    let stale = serve(
        &engine,
        "GET",
        "/data.bin",
        &[("Range", "bytes=0-9"), ("If-Range", "W/\"1-1\"")],
    );
    assert_eq!(stale.status_code(), 200);
    assert_eq!(stale.header("Content-Range"), None);
    assert_eq!(render(&stale).1.len(), 100);
}

#[test]
fn test_precompressed_negotiation() {
    let (_dir, engine) = fixture();

    let response = serve(&engine, "GET", "/bundle.js", &[("Accept-Encoding", "gzip, deflate, br")]);
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.header("Content-Encoding"), Some("br"));
    assert_eq!(response.header("Vary"), Some("Accept-Encoding"));
    assert_eq!(response.header("Content-Type"), Some("text/javascript; charset=utf-8"));
    assert_eq!(response.header("ETag"), Some("W/\"12-1700000000000-br\""));
    assert_eq!(response.header("Content-Length"), Some("12"));
    assert_eq!(render(&response).1, b"brotli body!");

    let response = serve(&engine, "GET", "/bundle.js", &[("Accept-Encoding", "gzip")]);
    assert_eq!(response.header("Content-Encoding"), Some("gzip"));
    assert_eq!(render(&response).1, b"gzip body");

    let response = serve(&engine, "GET", "/bundle.js", &[("Accept-Encoding", "br;q=0, gzip")]);
    assert_eq!(response.header("Content-Encoding"), Some("gzip"));

    let response = serve(&engine, "GET", "/bundle.js", &[]);
    assert_eq!(response.header("Content-Encoding"), None);
    assert_eq!(response.header("Vary"), None);
    assert_eq!(render(&response).1, b"identity body");
}

#[test]
fn test_no_ranges_over_encoded_variants() {
    let (_dir, engine) = fixture();
    let response = serve(
        &engine,
        "GET",
        "/bundle.js",
        &[("Accept-Encoding", "br"), ("Range", "bytes=0-1")],
    );
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.header("Content-Range"), None);
    assert_eq!(render(&response).1, b"brotli body!");
}

#[test]
fn test_head_advertises_length_without_body() {
    let (_dir, engine) = fixture();
    let response = serve(&engine, "HEAD", "/data.bin", &[]);
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.header("Content-Length"), Some("100"));
    assert_eq!(*response.body(), Body::Empty);
    let (head, body) = render(&response);
    assert!(head.contains("Content-Length: 100\r\n"));
    assert!(body.is_empty());

    let response = serve(&engine, "HEAD", "/data.bin", &[("Range", "bytes=0-9")]);
    assert_eq!(response.status_code(), 206);
    assert_eq!(response.header("Content-Length"), Some("10"));
    assert_eq!(*response.body(), Body::Empty);
}

#[test]
fn test_declines() {
    let (dir, engine) = fixture();
    fs::write(dir.path().parent().unwrap().join("outside.txt"), "secret").ok();

    for path in ["/missing.js", "/../outside.txt", "/%2e%2e/outside.txt", "/docs", "/"] {
        assert!(engine.serve(&request("GET", path, &[]), 0).is_none(), "{}", path);
    }
    for method in ["POST", "PUT", "DELETE", "OPTIONS"] {
        assert!(engine.serve(&request(method, "/app.js", &[]), 0).is_none());
    }
}

#[test]
fn test_directory_index() {
    let (dir, _) = fixture();
    let engine = StaticFiles::new(dir.path(), Arc::new(LocalFs)).with_directory_index(Some("index.html"));

    let response = serve(&engine, "GET", "/", &[]);
    assert_eq!(response.header("Content-Type"), Some("text/html; charset=utf-8"));
    assert_eq!(render(&response).1, b"<h1>home</h1>");

    let response = serve(&engine, "GET", "/docs/", &[]);
    assert_eq!(render(&response).1, b"<h1>docs</h1>");

    fs::create_dir_all(dir.path().join("empty")).unwrap();
    assert!(engine.serve(&request("GET", "/empty/", &[]), 0).is_none());
}

#[cfg(unix)]
#[test]
fn test_symlink_out_of_root_is_declined() {
    let (dir, engine) = fixture();
    let outside = tempfile::NamedTempFile::new().unwrap();
    std::os::unix::fs::symlink(outside.path(), dir.path().join("link.txt")).unwrap();
    assert!(engine.serve(&request("GET", "/link.txt", &[]), 0).is_none());
}

#[cfg(unix)]
#[test]
fn test_encoded_variant_outside_root_is_ignored() {
    let (dir, engine) = fixture();
    let outside = tempfile::tempdir().unwrap();
    let secret = outside.path().join("secret.txt");
    fs::write(&secret, "TOP SECRET OUTSIDE ROOT").unwrap();
    std::os::unix::fs::symlink(&secret, dir.path().join("app.js.br")).unwrap();

    // 只接受 br：回退到原文件
    let response = serve(&engine, "GET", "/app.js", &[("Accept-Encoding", "br")]);
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.header("Content-Encoding"), None);
    assert_eq!(render(&response).1, b"console.log('plain')");

    // 同时接受 gzip：落到下一个编码
    write_file(dir.path(), "app.js.gz", b"gzip of app.js");
    let response = serve(&engine, "GET", "/app.js", &[("Accept-Encoding", "br, gzip")]);
    assert_eq!(response.header("Content-Encoding"), Some("gzip"));
    assert_eq!(render(&response).1, b"gzip of app.js");
}

#[cfg(unix)]
#[test]
fn test_symlink_alias_uses_requested_name() {
    let (dir, engine) = fixture();
    std::os::unix::fs::symlink(dir.path().join("app.a1b2c3d4.js"), dir.path().join("latest.js"))
        .unwrap();

    let response = serve(&engine, "GET", "/latest.js", &[]);
    assert_eq!(response.status_code(), 200);
    assert_eq!(
        response.header("Cache-Control"),
        Some("public, max-age=0, must-revalidate")
    );
    assert_eq!(response.header("Content-Type"), Some("text/javascript; charset=utf-8"));
    assert_eq!(render(&response).1, b"console.log('hashed')");

    // 变体按别名查找
    write_file(dir.path(), "latest.js.br", b"brotli of latest");
    let response = serve(&engine, "GET", "/latest.js", &[("Accept-Encoding", "br")]);
    assert_eq!(response.header("Content-Encoding"), Some("br"));
    assert_eq!(render(&response).1, b"brotli of latest");

    // 目标文件名的变体不会被别名借用
    fs::remove_file(dir.path().join("latest.js.br")).unwrap();
    write_file(dir.path(), "app.a1b2c3d4.js.br", b"brotli of hashed");
    let response = serve(&engine, "GET", "/latest.js", &[("Accept-Encoding", "br")]);
    assert_eq!(response.header("Content-Encoding"), None);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_whole_range_equals_full_body(content in proptest::collection::vec(any::<u8>(), 1..2048)) {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "blob.bin", &content);
        let engine = StaticFiles::new(dir.path(), Arc::new(LocalFs));
        let size = content.len();

        let full = serve(&engine, "GET", "/blob.bin", &[]);
        let range = format!("bytes=0-{}", size - 1);
        let ranged = serve(&engine, "GET", "/blob.bin", &[("Range", range.as_str())]);

        prop_assert_eq!(full.status_code(), 200);
        prop_assert_eq!(ranged.status_code(), 206);
        prop_assert_eq!(full.header("Content-Range"), None);
        let expected = format!("bytes 0-{}/{}", size - 1, size);
        prop_assert_eq!(ranged.header("Content-Range"), Some(expected.as_str()));
        prop_assert_eq!(render(&full).1, render(&ranged).1);
    }

    #[test]
    fn prop_out_of_bounds_start_is_416(start in 100u64..10_000, extra in 0u64..100) {
        let (_dir, engine) = fixture();
        let range = format!("bytes={}-{}", start, start + extra);
        let response = serve(&engine, "GET", "/data.bin", &[("Range", range.as_str())]);
        prop_assert_eq!(response.status_code(), 416);
        prop_assert_eq!(response.header("Content-Range"), Some("bytes */100"));
    }

    #[test]
    fn prop_reversed_range_is_416(start in 1u64..100, back in 1u64..100) {
        prop_assume!(back <= start);
        let (_dir, engine) = fixture();
        let range = format!("bytes={}-{}", start, start - back);
        let response = serve(&engine, "GET", "/data.bin", &[("Range", range.as_str())]);
        prop_assert_eq!(response.status_code(), 416);
    }
}
