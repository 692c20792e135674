//! Minimal HTTP health endpoint: `GET /status`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use oled_core::DisplayHandle;

/// Upper bound on request header lines read per connection.
const MAX_HEADER_LINES: usize = 64;

/// Status line and JSON body for a request path.
pub fn route(method: &str, path: &str, display_connected: bool) -> (&'static str, String) {
    if method == "GET" && path == "/status" {
        let body = json!({
            "status": "running",
            "displayConnected": display_connected,
            "version": env!("CARGO_PKG_VERSION"),
            "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        });
        ("200 OK", body.to_string())
    } else {
        ("404 Not Found", json!({ "error": "not found" }).to_string())
    }
}

/// Serves the endpoint until `running` turns false.
pub struct StatusServer {
    listener: TcpListener,
    display: DisplayHandle,
    running: Arc<AtomicBool>,
}

impl StatusServer {
    pub fn new(listener: TcpListener, display: DisplayHandle, running: Arc<AtomicBool>) -> Self {
        Self {
            listener,
            display,
            running,
        }
    }

    pub async fn run(self) {
        if let Ok(addr) = self.listener.local_addr() {
            info!("status endpoint on http://{addr}/status");
        }

        while self.running.load(Ordering::SeqCst) {
            let accept = tokio::select! {
                result = self.listener.accept() => result,
                _ = wait_for_stop(&self.running) => break,
            };

            let (stream, peer) = match accept {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("accept error: {e}");
                    continue;
                }
            };

            let connected = self.display.is_connected();
            tokio::spawn(async move {
                if let Err(e) = respond(stream, connected).await {
                    debug!("status request from {peer} failed: {e}");
                }
            });
        }
        info!("status endpoint stopped");
    }
}

async fn respond(stream: TcpStream, display_connected: bool) -> std::io::Result<()> {
    let mut stream = BufReader::new(stream);

    let mut request_line = String::new();
    stream.read_line(&mut request_line).await?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default();
    let target = parts.next().unwrap_or_default();
    let path = target.split('?').next().unwrap_or_default();

    // Skip headers; the endpoint takes no body.
    let mut header = String::new();
    for _ in 0..MAX_HEADER_LINES {
        header.clear();
        if stream.read_line(&mut header).await? == 0 || header.trim_end().is_empty() {
            break;
        }
    }

    let (status, body) = route(method, path, display_connected);
    debug!("{method} {path} -> {status}");
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let stream = stream.get_mut();
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

/// Resolves when `running` becomes false.
pub(crate) async fn wait_for_stop(running: &Arc<AtomicBool>) {
    loop {
        if !running.load(Ordering::SeqCst) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
