//! Content-serving scenarios: small files, ranges, indexes, listings,
//! traversal, conditional requests, and compression opt-in.

use crate::prelude::*;

#[tokio::test]
async fn small_file_without_accept_encoding() {
    let server = TestServer::start().await;

    let resp = get_once(server.addr, "/small.txt", &[]).await;
    assert_eq!(resp.status, 200);
    assert_eq!(resp.header("Content-Length"), Some("3000"));
    assert_eq!(resp.header("Content-Type"), Some("text/plain"));
    assert_eq!(resp.header("Content-Encoding"), None);
    assert_eq!(resp.body, "hello\n".repeat(500).into_bytes());

    server.stop().await;
}

#[tokio::test]
async fn range_on_big_file() {
    let server = TestServer::start().await;

    let resp = get_once(server.addr, "/big.bin", &["Range: bytes=0-65535"]).await;
    assert_eq!(resp.status, 206);
    assert_eq!(resp.header("Content-Length"), Some("65536"));
    assert_eq!(
        resp.header("Content-Range"),
        Some(format!("bytes 0-65535/{}", 1024 * 1024).as_str())
    );
    assert_eq!(resp.body, big_contents()[..65536]);

    server.stop().await;
}

#[tokio::test]
async fn directory_with_index_serves_it() {
    let server = TestServer::start().await;

    let resp = get_once(server.addr, "/subdir/", &[]).await;
    assert_eq!(resp.status, 200);
    assert_eq!(resp.header("Content-Type"), Some("text/html"));
    assert_eq!(resp.body, b"<html>welcome</html>");

    server.stop().await;
}

#[tokio::test]
async fn directory_without_index_lists_children() {
    let server = TestServer::start().await;

    let resp = get_once(server.addr, "/listing/", &[]).await;
    assert_eq!(resp.status, 200);
    assert_eq!(resp.header("Content-Type"), Some("text/html"));

    let html = String::from_utf8(resp.body).unwrap();
    assert!(html.contains("notes.txt"));
    assert!(!html.contains(".hidden"));

    server.stop().await;
}

#[tokio::test]
async fn traversal_never_escapes_the_root() {
    let server = TestServer::start().await;

    for path in [
        "/../etc/passwd",
        "/../../../../etc/passwd",
        "/%2e%2e/%2e%2e/etc/passwd",
        "/subdir/../../outside",
    ] {
        let resp = get_once(server.addr, path, &[]).await;
        assert_eq!(resp.status, 404, "path {path} must not resolve");
    }

    server.stop().await;
}

#[tokio::test]
async fn head_matches_get() {
    let server = TestServer::start().await;

    let get = get_once(server.addr, "/small.txt", &[]).await;
    let head = {
        let mut client = Client::connect(server.addr).await;
        client.request("HEAD", "/small.txt", &[]).await
    };

    assert_eq!(head.status, 200);
    assert_eq!(head.header("Content-Length"), get.header("Content-Length"));
    assert_eq!(head.header("Content-Type"), get.header("Content-Type"));
    assert_eq!(head.header("Last-Modified"), get.header("Last-Modified"));
    assert!(head.body.is_empty());

    server.stop().await;
}

#[tokio::test]
async fn deflate_is_opt_in() {
    let server = TestServer::start().await;

    // Opted in: the repetitive fixture compresses, so deflate is served
    let resp = get_once(server.addr, "/small.txt", &["Accept-Encoding: deflate"]).await;
    assert_eq!(resp.status, 200);
    assert_eq!(resp.header("Content-Encoding"), Some("deflate"));
    assert!(resp.body.len() < 3000);

    let mut inflated = Vec::new();
    std::io::Read::read_to_end(
        &mut flate2::read::ZlibDecoder::new(&resp.body[..]),
        &mut inflated,
    )
    .unwrap();
    assert_eq!(inflated, "hello\n".repeat(500).into_bytes());

    // Not opted in: identity, always
    let resp = get_once(server.addr, "/small.txt", &["Accept-Encoding: gzip"]).await;
    assert_eq!(resp.header("Content-Encoding"), None);
    assert_eq!(resp.body.len(), 3000);

    server.stop().await;
}

#[tokio::test]
async fn conditional_get_returns_304() {
    let server = TestServer::start().await;

    let first = get_once(server.addr, "/small.txt", &[]).await;
    let last_modified = first.header("Last-Modified").unwrap().to_string();

    let conditional = format!("If-Modified-Since: {last_modified}");
    let resp = get_once(server.addr, "/small.txt", &[conditional.as_str()]).await;
    assert_eq!(resp.status, 304);
    assert_eq!(resp.header("Content-Length"), None);
    assert!(resp.body.is_empty());

    // An older validator still gets the full file
    let resp = get_once(
        server.addr,
        "/small.txt",
        &["If-Modified-Since: Sun, 06 Nov 1994 08:49:37 GMT"],
    )
    .await;
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body.len(), 3000);

    server.stop().await;
}

#[tokio::test]
async fn range_grid_on_a_1000_byte_file() {
    let server = TestServer::start().await;

    let resp = get_once(server.addr, "/onekilo.bin", &["Range: bytes=0-99"]).await;
    assert_eq!(resp.status, 206);
    assert_eq!(resp.body.len(), 100);

    let resp = get_once(server.addr, "/onekilo.bin", &["Range: bytes=900-"]).await;
    assert_eq!(resp.status, 206);
    assert_eq!(resp.body.len(), 100);
    assert_eq!(resp.header("Content-Range"), Some("bytes 900-999/1000"));

    let resp = get_once(server.addr, "/onekilo.bin", &["Range: bytes=2000-3000"]).await;
    assert_eq!(resp.status, 416);

    let resp = get_once(server.addr, "/onekilo.bin", &[]).await;
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body.len(), 1000);

    server.stop().await;
}

#[tokio::test]
async fn missing_paths_are_404() {
    let server = TestServer::start().await;

    let resp = get_once(server.addr, "/no-such-file.txt", &[]).await;
    assert_eq!(resp.status, 404);
    assert_eq!(resp.header("Content-Type"), Some("text/html"));

    server.stop().await;
}

#[tokio::test]
async fn query_strings_are_ignored_for_resolution() {
    let server = TestServer::start().await;

    let resp = get_once(server.addr, "/small.txt?version=3&cache=no", &[]).await;
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body.len(), 3000);

    server.stop().await;
}

#[tokio::test]
async fn standard_headers_are_present() {
    let server = TestServer::start().await;

    let resp = get_once(server.addr, "/small.txt", &[]).await;
    assert_eq!(resp.header("Server"), Some("loft"));
    assert!(resp.header("Date").unwrap().ends_with("GMT"));
    assert!(resp.header("Expires").unwrap().ends_with("GMT"));
    assert!(resp.header("Last-Modified").unwrap().ends_with("GMT"));

    server.stop().await;
}
