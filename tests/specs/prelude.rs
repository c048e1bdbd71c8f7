//! Shared helpers: fixture trees, an in-process server, and a raw HTTP
//! client that reads exactly one response at a time.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use loft_core::config::{ServerConfig, ThreadsConfig};
use loft_server::Server;

/// A running server plus the fixture tree it serves.
pub struct TestServer {
    pub addr: SocketAddr,
    _dir: tempfile::TempDir,
    shutdown: Arc<Notify>,
    run: JoinHandle<()>,
}

impl TestServer {
    /// Start a server over a fresh fixture tree:
    /// ```text
    /// small.txt        "hello\n" x 500 (3000 B)
    /// a.txt, b.txt
    /// big.bin          1 MiB of patterned bytes
    /// onekilo.bin      1000 B
    /// subdir/index.html
    /// listing/notes.txt, listing/.hidden
    /// ```
    pub async fn start() -> Self {
        Self::start_with_keep_alive(15).await
    }

    pub async fn start_with_keep_alive(keep_alive_timeout: u64) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        std::fs::create_dir(&root).unwrap();
        std::fs::write(root.join("small.txt"), "hello\n".repeat(500)).unwrap();
        std::fs::write(root.join("a.txt"), b"first file\n").unwrap();
        std::fs::write(root.join("b.txt"), b"second file\n").unwrap();
        std::fs::write(root.join("big.bin"), big_contents()).unwrap();
        std::fs::write(root.join("onekilo.bin"), vec![0xabu8; 1000]).unwrap();
        std::fs::create_dir(root.join("subdir")).unwrap();
        std::fs::write(root.join("subdir/index.html"), b"<html>welcome</html>").unwrap();
        std::fs::create_dir(root.join("listing")).unwrap();
        std::fs::write(root.join("listing/notes.txt"), b"notes").unwrap();
        std::fs::write(root.join("listing/.hidden"), b"secret").unwrap();

        let config = ServerConfig {
            root_path: root.clone(),
            index_html: "index.html".to_string(),
            keep_alive_timeout,
            listen: "127.0.0.1:0".parse().unwrap(),
            threads: ThreadsConfig {
                count: 2,
                max_fd: 64,
            },
        };
        let server = Server::startup(&config).await.unwrap();
        let addr = server.local_addr().unwrap();
        let shutdown = server.shutdown_notify();
        let run = tokio::spawn(server.run());

        Self {
            addr,
            _dir: dir,
            shutdown,
            run,
        }
    }

    pub async fn stop(self) {
        self.shutdown.notify_one();
        self.run.await.unwrap();
    }
}

/// 1 MiB of deterministic bytes.
pub fn big_contents() -> Vec<u8> {
    (0..1024 * 1024).map(|i| (i % 251) as u8).collect()
}

/// One parsed HTTP response.
pub struct Response {
    pub status: u16,
    pub head: String,
    pub body: Vec<u8>,
}

impl Response {
    /// Case-insensitive single-header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        let prefix = format!("{}:", name.to_ascii_lowercase());
        self.head.lines().find_map(|line| {
            line.to_ascii_lowercase()
                .starts_with(&prefix)
                .then(|| line[prefix.len()..].trim())
        })
    }
}

/// Raw HTTP client over one TCP connection.
pub struct Client {
    stream: TcpStream,
    buf: Vec<u8>,
    last_method_was_head: bool,
}

impl Client {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        Self {
            stream,
            buf: Vec::new(),
            last_method_was_head: false,
        }
    }

    pub async fn send(&mut self, raw: &str) {
        self.stream.write_all(raw.as_bytes()).await.unwrap();
    }

    /// GET `path` with optional extra header lines (no trailing CRLF).
    pub async fn get(&mut self, path: &str, extra: &[&str]) -> Response {
        self.request("GET", path, extra).await
    }

    pub async fn request(&mut self, method: &str, path: &str, extra: &[&str]) -> Response {
        let mut raw = format!("{method} {path} HTTP/1.1\r\nHost: test\r\n");
        for line in extra {
            raw.push_str(line);
            raw.push_str("\r\n");
        }
        raw.push_str("\r\n");
        self.last_method_was_head = method.eq_ignore_ascii_case("HEAD");
        self.send(&raw).await;
        self.read_response().await
    }

    /// Read exactly one response, leaving any pipelined remainder
    /// buffered for the next call.
    pub async fn read_response(&mut self) -> Response {
        let head_end = loop {
            if let Some(i) = self.buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break i + 4;
            }
            assert!(
                self.read_some().await > 0,
                "connection closed before a full response head"
            );
        };

        let head = String::from_utf8(self.buf[..head_end].to_vec()).unwrap();
        let content_length: usize = if self.last_method_was_head {
            0
        } else {
            head.lines()
                .find_map(|l| {
                    l.to_ascii_lowercase()
                        .strip_prefix("content-length:")
                        .map(|v| v.trim().parse().unwrap())
                })
                .unwrap_or(0)
        };

        while self.buf.len() < head_end + content_length {
            assert!(
                self.read_some().await > 0,
                "connection closed mid-body ({} of {} body bytes)",
                self.buf.len() - head_end,
                content_length
            );
        }

        let body = self.buf[head_end..head_end + content_length].to_vec();
        self.buf.drain(..head_end + content_length);

        let status = head
            .split_whitespace()
            .nth(1)
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        Response { status, head, body }
    }

    /// Read until the server closes the connection; returns the raw tail
    /// (possibly empty).
    pub async fn read_to_close(&mut self) -> Vec<u8> {
        loop {
            let mut chunk = [0u8; 4096];
            match self.stream.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => self.buf.extend_from_slice(&chunk[..n]),
            }
        }
        std::mem::take(&mut self.buf)
    }

    async fn read_some(&mut self) -> usize {
        let mut chunk = [0u8; 4096];
        let n = self.stream.read(&mut chunk).await.unwrap_or(0);
        self.buf.extend_from_slice(&chunk[..n]);
        n
    }
}

/// Convenience: one-shot GET on a fresh connection.
pub async fn get_once(addr: SocketAddr, path: &str, extra: &[&str]) -> Response {
    let mut client = Client::connect(addr).await;
    client.get(path, extra).await
}
