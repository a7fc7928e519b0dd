//! Plain HTTP interception.
//!
//! The proxy answers every observed request itself with a synthetic
//! `200 OK` ("Request logged and forwarded"): monitoring mode, no real
//! upstream forwarding. The exchange still produces a full record with the
//! request line, headers, body and resolved destination.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use url::Url;

use crate::engine::filter::MethodFilter;
use crate::net::{self, MetricsCollector};
use crate::record::{ExchangeRecord, Outcome, RequestRecorder};

/// Upper bound on the request line plus headers. Bodies are bounded only by
/// their own framing.
pub const MAX_HEAD_BYTES: usize = 64 * 1024;

/// Parsed request line and headers, plus any body bytes that arrived in the
/// same reads.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: String,
    pub target: String,
    pub version: String,
    /// Keys case-preserved, in wire order.
    pub headers: Vec<(String, String)>,
    pub leftover: Vec<u8>,
}

impl RequestHead {
    /// Case-insensitive header lookup (first match wins).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_length(&self) -> Option<usize> {
        self.header("content-length")
            .and_then(|v| v.trim().parse().ok())
    }

    pub fn is_connect(&self) -> bool {
        self.method.eq_ignore_ascii_case("CONNECT")
    }

    fn header_map(&self) -> HashMap<String, String> {
        self.headers.iter().cloned().collect()
    }
}

/// Read from the socket until the end of the header block, then parse.
///
/// Returns `Ok(None)` when the peer closes before sending a full head or
/// the head is malformed or oversized; the caller answers 400 in that case.
pub async fn read_request_head(stream: &mut TcpStream) -> std::io::Result<Option<RequestHead>> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 4096];

    let head_end = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find_head_end(&buf) {
            break pos;
        }
        if buf.len() > MAX_HEAD_BYTES {
            return Ok(None);
        }
    };

    Ok(parse_head(&buf[..head_end]).map(|mut head| {
        head.leftover = buf[head_end + 4..].to_vec();
        head
    }))
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn parse_head(head: &[u8]) -> Option<RequestHead> {
    let text = String::from_utf8_lossy(head);
    let mut lines = text.split("\r\n");

    let request_line = lines.next()?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next()?.to_string();
    let target = parts.next()?.to_string();
    let version = parts.next().unwrap_or("HTTP/1.1").to_string();

    let mut headers = Vec::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }

    Some(RequestHead {
        method,
        target,
        version,
        headers,
        leftover: Vec::new(),
    })
}

/// Handles plain HTTP requests arriving on the listener.
pub struct HttpInterceptor {
    filter: MethodFilter,
    recorder: Arc<dyn RequestRecorder>,
}

impl HttpInterceptor {
    pub fn new(filter: MethodFilter, recorder: Arc<dyn RequestRecorder>) -> Self {
        Self { filter, recorder }
    }

    pub async fn handle(&self, mut stream: TcpStream, head: RequestHead, peer: SocketAddr) {
        let metrics = MetricsCollector::start();

        let mut record = ExchangeRecord::new(head.method.clone(), head.target.clone());
        record.headers = head.header_map();
        record.source = peer.to_string();

        if !self.filter.allows(&head.method) {
            tracing::info!(method = %head.method, target = %head.target, "Method rejected by filter");
            record.outcome = Outcome::Rejected;
            record.elapsed_ms = Some(elapsed_ms(&metrics));
            self.recorder.record(record);
            let _ = write_response(
                &mut stream,
                "403 Forbidden",
                "Method not allowed by filter\n",
            )
            .await;
            return;
        }

        metrics.add_received(head.leftover.len() as u64);
        let body = match read_body(&mut stream, &head, &metrics).await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(error = %e, peer = %peer, "Request stream error");
                record.outcome = Outcome::StreamError;
                record.body = String::from_utf8_lossy(&head.leftover).into_owned();
                record.bytes_received = metrics.bytes_received();
                self.recorder.record(record);
                let _ = write_response(
                    &mut stream,
                    "500 Internal Server Error",
                    "Internal Server Error\n",
                )
                .await;
                return;
            }
        };
        record.body = String::from_utf8_lossy(&body).into_owned();

        // Best-effort destination enrichment; the record survives failure.
        if let Some((host, port)) = destination_of(&head) {
            match net::resolve(&host).await {
                Ok(ip) => record.destination = format!("{ip}:{port}"),
                Err(e) => {
                    tracing::debug!(host = %host, error = %e, "Destination resolution failed")
                }
            }
        }

        let response_bytes =
            match write_response(&mut stream, "200 OK", "Request logged and forwarded").await {
                Ok(n) => n,
                Err(e) => {
                    tracing::warn!(error = %e, peer = %peer, "Failed to write response");
                    0
                }
            };
        metrics.add_sent(response_bytes as u64);

        record.outcome = Outcome::Logged;
        record.elapsed_ms = Some(elapsed_ms(&metrics));
        record.bytes_sent = metrics.bytes_sent();
        record.bytes_received = metrics.bytes_received();
        self.recorder.record(record);
    }
}

async fn read_body(
    stream: &mut TcpStream,
    head: &RequestHead,
    metrics: &MetricsCollector,
) -> std::io::Result<Vec<u8>> {
    let mut body = head.leftover.clone();

    // Without a Content-Length the body is whatever arrived with the head;
    // the proxy never blocks waiting for bytes the client did not frame.
    let Some(content_length) = head.content_length() else {
        return Ok(body);
    };

    while body.len() < content_length {
        let mut chunk = vec![0u8; (content_length - body.len()).min(16 * 1024)];
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            // Client framed less than it announced; keep what arrived.
            break;
        }
        metrics.add_received(n as u64);
        body.extend_from_slice(&chunk[..n]);
    }

    body.truncate(content_length);
    Ok(body)
}

/// Host and port the client was aiming at: absolute-form proxy targets
/// carry it in the URL, origin-form requests in the Host header.
fn destination_of(head: &RequestHead) -> Option<(String, u16)> {
    if head.target.starts_with("http://") || head.target.starts_with("https://") {
        let url = Url::parse(&head.target).ok()?;
        let host = url.host_str()?.to_string();
        let port = url.port_or_known_default().unwrap_or(80);
        return Some((host, port));
    }

    let host_header = head.header("host")?;
    match host_header.rsplit_once(':') {
        Some((host, port)) => {
            let port = port.parse().ok()?;
            Some((host.to_string(), port))
        }
        None => Some((host_header.to_string(), 80)),
    }
}

pub async fn write_response(
    stream: &mut TcpStream,
    status: &str,
    body: &str,
) -> std::io::Result<usize> {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await?;
    stream.flush().await?;
    Ok(response.len())
}

fn elapsed_ms(metrics: &MetricsCollector) -> u64 {
    metrics.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_request_line_and_headers() {
        let head = parse_head(b"GET /index.html HTTP/1.1\r\nHost: example.com\r\nX-Trace: abc")
            .expect("head must parse");
        assert_eq!(head.method, "GET");
        assert_eq!(head.target, "/index.html");
        assert_eq!(head.version, "HTTP/1.1");
        assert_eq!(head.header("host"), Some("example.com"));
        assert_eq!(head.header("HOST"), Some("example.com"));
        assert_eq!(head.header("x-trace"), Some("abc"));
        assert!(!head.is_connect());
    }

    #[test]
    fn header_keys_preserve_case() {
        let head = parse_head(b"GET / HTTP/1.1\r\nX-CuStOm: v").unwrap();
        assert_eq!(head.headers[0].0, "X-CuStOm");
    }

    #[test]
    fn connect_is_classified() {
        let head = parse_head(b"CONNECT example.com:443 HTTP/1.1\r\nHost: example.com:443").unwrap();
        assert!(head.is_connect());
        assert_eq!(head.target, "example.com:443");
    }

    #[test]
    fn empty_or_garbage_head_is_rejected() {
        assert!(parse_head(b"").is_none());
        assert!(parse_head(b"NOT-A-REQUEST").is_none());
    }

    #[test]
    fn content_length_is_optional() {
        let head = parse_head(b"POST /x HTTP/1.1\r\nHost: h").unwrap();
        assert_eq!(head.content_length(), None);
        let head = parse_head(b"POST /x HTTP/1.1\r\nContent-Length: 42").unwrap();
        assert_eq!(head.content_length(), Some(42));
    }

    #[test]
    fn destination_prefers_absolute_form_url() {
        let head = parse_head(b"GET http://example.com:8080/p HTTP/1.1\r\nHost: other.org").unwrap();
        assert_eq!(destination_of(&head), Some(("example.com".into(), 8080)));
    }

    #[test]
    fn destination_falls_back_to_host_header() {
        let head = parse_head(b"GET /p HTTP/1.1\r\nHost: example.com").unwrap();
        assert_eq!(destination_of(&head), Some(("example.com".into(), 80)));

        let head = parse_head(b"GET /p HTTP/1.1\r\nHost: example.com:8443").unwrap();
        assert_eq!(destination_of(&head), Some(("example.com".into(), 8443)));

        let head = parse_head(b"GET /p HTTP/1.1\r\n").unwrap();
        assert_eq!(destination_of(&head), None);
    }
}
