//! Fake implementations for driver tests: small `sh` scripts honoring the
//! process contract, run from a temporary directory.

#![allow(dead_code)]

use std::path::Path;

use capcompat_driver::{Driver, DriverConfig};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

pub const ALICE: &str = "did:key:z6Mkk89bC3JrVqKie71YEcc5M1SMVxuCgNx6zLZ8SYJsxALi";

/// Write `impl.sh` into a fresh directory and bind a driver running it.
pub fn fake_impl(script: &str, configure: impl FnOnce(DriverConfig) -> DriverConfig) -> (TempDir, Driver) {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("impl.sh"), script).expect("write impl.sh");
    let config = configure(DriverConfig::new("sh impl.sh"));
    let driver = Driver::new(dir.path(), config).expect("driver");
    (dir, driver)
}

/// A server that prints its service record and then stays up.
pub fn server_script(id: &str, url: &str) -> String {
    format!("echo '{{\"id\":\"{id}\",\"url\":\"{url}\"}}'\nexec sleep 30\n")
}

/// A client that records its arguments and prints `file`.
pub fn replay_script(file: &str) -> String {
    format!("printf '%s\\n' \"$@\" > args.txt\ncat {file}\n")
}

pub fn recorded_args(dir: &Path) -> Option<Vec<String>> {
    std::fs::read_to_string(dir.join("args.txt"))
        .ok()
        .map(|s| s.lines().map(String::from).collect())
}

/// Accept one HTTP request, answer with `status`, and report its request line.
pub async fn control_endpoint(status: &'static str) -> (u16, oneshot::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("local addr").port();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        let mut request = Vec::new();
        let mut chunk = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut chunk).await.expect("read");
            if n == 0 {
                break;
            }
            request.extend_from_slice(&chunk[..n]);
        }

        let request = String::from_utf8_lossy(&request);
        let _ = tx.send(request.lines().next().unwrap_or_default().to_string());

        let response =
            format!("HTTP/1.1 {status}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
        socket.write_all(response.as_bytes()).await.expect("write");
        let _ = socket.shutdown().await;
    });

    (port, rx)
}
