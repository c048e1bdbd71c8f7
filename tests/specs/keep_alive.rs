//! Connection lifecycle: keep-alive reuse, pipelining, close semantics,
//! idle reaping, and method handling.

use std::time::Duration;

use crate::prelude::*;

#[tokio::test]
async fn two_requests_on_one_connection() {
    let server = TestServer::start().await;
    let mut client = Client::connect(server.addr).await;

    let a = client.get("/a.txt", &[]).await;
    assert_eq!(a.status, 200);
    assert_eq!(a.body, b"first file\n");

    let b = client.get("/b.txt", &[]).await;
    assert_eq!(b.status, 200);
    assert_eq!(b.body, b"second file\n");

    server.stop().await;
}

#[tokio::test]
async fn pipelined_requests_answer_in_order() {
    let server = TestServer::start().await;
    let mut client = Client::connect(server.addr).await;

    client
        .send("GET /a.txt HTTP/1.1\r\nHost: t\r\n\r\nGET /b.txt HTTP/1.1\r\nHost: t\r\n\r\n")
        .await;

    let first = client.read_response().await;
    let second = client.read_response().await;
    assert_eq!(first.body, b"first file\n");
    assert_eq!(second.body, b"second file\n");

    server.stop().await;
}

#[tokio::test]
async fn connection_close_is_honored() {
    let server = TestServer::start().await;
    let mut client = Client::connect(server.addr).await;

    let resp = client.get("/a.txt", &["Connection: close"]).await;
    assert_eq!(resp.status, 200);
    assert!(resp.head.contains("Connection: close\r\n"));

    // The server closes; nothing further arrives
    assert!(client.read_to_close().await.is_empty());

    server.stop().await;
}

#[tokio::test]
async fn http10_defaults_to_close() {
    let server = TestServer::start().await;
    let mut client = Client::connect(server.addr).await;

    client.send("GET /a.txt HTTP/1.0\r\n\r\n").await;
    let resp = client.read_response().await;
    assert_eq!(resp.status, 200);
    assert!(resp.head.contains("Connection: close\r\n"));
    assert!(client.read_to_close().await.is_empty());

    server.stop().await;
}

#[tokio::test]
async fn idle_connection_is_reaped_after_the_timeout() {
    let server = TestServer::start_with_keep_alive(1).await;
    let mut client = Client::connect(server.addr).await;

    let resp = client.get("/a.txt", &[]).await;
    assert_eq!(resp.status, 200);
    assert!(resp.head.contains("Connection: keep-alive\r\n"));

    // Idle well past the 1-second keep-alive; the reaper closes us
    tokio::time::sleep(Duration::from_millis(3500)).await;
    assert!(client.read_to_close().await.is_empty());

    server.stop().await;
}

#[tokio::test]
async fn active_connection_survives_the_timeout_window() {
    let server = TestServer::start_with_keep_alive(2).await;
    let mut client = Client::connect(server.addr).await;

    // Keep requesting for longer than the timeout; activity re-arms the
    // deadline each time
    for _ in 0..5 {
        let resp = client.get("/a.txt", &[]).await;
        assert_eq!(resp.status, 200);
        tokio::time::sleep(Duration::from_millis(700)).await;
    }

    server.stop().await;
}

#[tokio::test]
async fn post_gets_405_and_close() {
    let server = TestServer::start().await;
    let mut client = Client::connect(server.addr).await;

    client
        .send("POST /a.txt HTTP/1.1\r\nHost: t\r\nContent-Length: 0\r\n\r\n")
        .await;
    let resp = client.read_response().await;
    assert_eq!(resp.status, 405);
    assert!(resp.head.contains("Connection: close\r\n"));
    assert!(client.read_to_close().await.is_empty());

    server.stop().await;
}

#[tokio::test]
async fn malformed_requests_drop_the_connection() {
    let server = TestServer::start().await;
    let mut client = Client::connect(server.addr).await;

    client.send("NONSENSE\r\n\r\n").await;
    // No response at all: the connection just closes
    assert!(client.read_to_close().await.is_empty());

    server.stop().await;
}

#[tokio::test]
async fn many_concurrent_connections_are_served() {
    let server = TestServer::start().await;

    let mut tasks = Vec::new();
    for _ in 0..20 {
        let addr = server.addr;
        tasks.push(tokio::spawn(async move {
            let resp = get_once(addr, "/small.txt", &[]).await;
            assert_eq!(resp.status, 200);
            resp.body.len()
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap(), 3000);
    }

    server.stop().await;
}
