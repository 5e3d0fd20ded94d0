// src/server.rs
//! Minimal HTTP/1.1 read surface for the current fix
//!
//! One request per connection. Routes:
//! - `GET /api/gps`: the fix as JSON
//! - `GET /`: `index.html` from the static directory

use crate::{error::Result, gps::FixQuery};
use std::{
    io,
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
};
use tracing::{debug, error, info, warn};

const MAX_HEADER_LINES: usize = 64;
const MAX_REQUEST_BYTES: u64 = 64 * 1024;
/// Time a client gets to send its request line and headers
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Pause after a failed accept (e.g. out of file descriptors)
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl Response {
    fn new(status: u16, content_type: &'static str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            content_type,
            body: body.into(),
        }
    }

    fn text(status: u16, body: &str) -> Self {
        Self::new(status, "text/plain; charset=utf-8", body)
    }

    fn reason(&self) -> &'static str {
        match self.status {
            200 => "OK",
            204 => "No Content",
            400 => "Bad Request",
            404 => "Not Found",
            405 => "Method Not Allowed",
            _ => "Internal Server Error",
        }
    }

    /// Serialize status line, headers and body
    pub fn to_bytes(&self) -> Vec<u8> {
        let head = format!(
            "HTTP/1.1 {} {}\r\n\
             Content-Type: {}\r\n\
             Content-Length: {}\r\n\
             Access-Control-Allow-Origin: *\r\n\
             Access-Control-Allow-Methods: GET, OPTIONS\r\n\
             Access-Control-Allow-Headers: *\r\n\
             Cache-Control: no-store\r\n\
             Connection: close\r\n\r\n",
            self.status,
            self.reason(),
            self.content_type,
            self.body.len()
        );
        let mut bytes = head.into_bytes();
        bytes.extend_from_slice(&self.body);
        bytes
    }
}

/// Answer one request
pub async fn route<Q: FixQuery>(method: &str, target: &str, query: &Q, static_dir: &Path) -> Response {
    let path = target.split('?').next().unwrap_or(target);

    match (method, path) {
        ("OPTIONS", _) => Response::new(204, "text/plain", Vec::new()),
        ("GET", "/api/gps") => match serde_json::to_vec(&query.get_fix()) {
            Ok(body) => Response::new(200, "application/json", body),
            Err(e) => {
                error!("failed to serialize fix: {}", e);
                Response::text(500, "internal error")
            }
        },
        ("GET", "/") | ("GET", "/index.html") => {
            let index = static_dir.join("index.html");
            match tokio::fs::read(&index).await {
                Ok(body) => Response::new(200, "text/html; charset=utf-8", body),
                Err(e) => {
                    debug!("no index page at {}: {}", index.display(), e);
                    Response::text(404, "not found")
                }
            }
        }
        ("GET", _) => Response::text(404, "not found"),
        _ => Response::text(405, "method not allowed"),
    }
}

/// Accept connections forever, one task per client.
pub async fn serve<Q>(listener: TcpListener, query: Q, static_dir: PathBuf) -> Result<()>
where
    Q: FixQuery + Clone + Send + Sync + 'static,
{
    info!("query server listening on {}", listener.local_addr()?);

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let query = query.clone();
                let static_dir = static_dir.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, &query, &static_dir, REQUEST_TIMEOUT).await {
                        debug!("client {} error: {}", addr, e);
                    }
                });
            }
            Err(e) => {
                warn!("failed to accept connection: {}", e);
                tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
            }
        }
    }
}

async fn handle_client<Q: FixQuery>(
    stream: TcpStream,
    query: &Q,
    static_dir: &Path,
    request_timeout: Duration,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader).take(MAX_REQUEST_BYTES);

    let request_line = match tokio::time::timeout(request_timeout, read_request(&mut reader)).await {
        Ok(request) => request?,
        Err(_) => {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no request before timeout").into());
        }
    };
    let Some(request_line) = request_line else {
        return Ok(());
    };

    let mut parts = request_line.split_whitespace();
    let response = match (parts.next(), parts.next()) {
        (Some(method), Some(target)) => {
            debug!("{} {}", method, target);
            route(method, target, query, static_dir).await
        }
        _ => Response::text(400, "bad request"),
    };

    writer.write_all(&response.to_bytes()).await?;
    writer.shutdown().await?;
    Ok(())
}

/// Read the request line and drain the headers. `None` if the client closed
/// without sending anything.
async fn read_request<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<Option<String>> {
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).await? == 0 {
        return Ok(None);
    }

    // Nothing in the headers changes the answer
    let mut header = String::new();
    for _ in 0..MAX_HEADER_LINES {
        header.clear();
        if reader.read_line(&mut header).await? == 0 || header.trim().is_empty() {
            break;
        }
    }

    Ok(Some(request_line))
}
