//! CONNECT tunneling.
//!
//! The tunnel is a transparent byte splice: no TLS termination, no content
//! inspection. The proxy only observes connection-level metadata (target,
//! resolved IP, per-direction byte counts, elapsed time).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::engine::http::{write_response, RequestHead};
use crate::net::{self, MetricsCollector};
use crate::record::{ExchangeRecord, Outcome, RequestRecorder};

/// Handles CONNECT requests by splicing bytes between client and origin.
pub struct TunnelInterceptor {
    recorder: Arc<dyn RequestRecorder>,
    connect_timeout: Duration,
}

impl TunnelInterceptor {
    pub fn new(recorder: Arc<dyn RequestRecorder>, connect_timeout: Duration) -> Self {
        Self {
            recorder,
            connect_timeout,
        }
    }

    pub async fn handle(&self, mut client: TcpStream, head: RequestHead, peer: SocketAddr) {
        let metrics = MetricsCollector::start();
        let target = head.target.clone();
        let (host, port) = match parse_target(&target) {
            Some(pair) => pair,
            None => {
                tracing::warn!(target = %target, peer = %peer, "Malformed CONNECT target");
                let _ =
                    write_response(&mut client, "400 Bad Request", "Malformed CONNECT target\n")
                        .await;
                return;
            }
        };

        let mut record = ExchangeRecord::new("CONNECT", target.clone());
        record.source = peer.to_string();

        tracing::debug!(target = %target, peer = %peer, "CONNECT request");

        let mut origin = match timeout(
            self.connect_timeout,
            TcpStream::connect((host.as_str(), port)),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                tracing::warn!(target = %target, error = %e, "Origin dial failed");
                self.fail_dial(client, record, &metrics).await;
                return;
            }
            Err(_) => {
                tracing::warn!(target = %target, timeout_ms = self.connect_timeout.as_millis() as u64, "Origin dial timed out");
                self.fail_dial(client, record, &metrics).await;
                return;
            }
        };

        // The dialed peer gives us the resolved IP without a second lookup.
        record.destination = match origin.peer_addr() {
            Ok(addr) => addr.to_string(),
            Err(_) => match net::resolve(&host).await {
                Ok(ip) => format!("{ip}:{port}"),
                Err(_) => record.destination,
            },
        };

        if let Err(e) = client
            .write_all(b"HTTP/1.1 200 Connection Established\r\n\r\n")
            .await
        {
            tracing::warn!(peer = %peer, error = %e, "Failed to confirm tunnel");
            record.outcome = Outcome::StreamError;
            record.elapsed_ms = Some(metrics.elapsed().as_millis() as u64);
            self.recorder.record(record);
            return;
        }

        // Bytes the client pipelined after the CONNECT head belong to the
        // tunnel and must reach the origin before the relay starts.
        if !head.leftover.is_empty() {
            if let Err(e) = origin.write_all(&head.leftover).await {
                tracing::warn!(target = %target, error = %e, "Failed to forward early tunnel bytes");
                record.outcome = Outcome::StreamError;
                record.elapsed_ms = Some(metrics.elapsed().as_millis() as u64);
                self.recorder.record(record);
                return;
            }
            metrics.add_sent(head.leftover.len() as u64);
        }

        record.outcome = match splice(client, origin, &metrics).await {
            Ok(()) => Outcome::Tunneled,
            Err(e) => {
                tracing::debug!(target = %target, error = %e, "Tunnel closed on error");
                Outcome::StreamError
            }
        };

        record.elapsed_ms = Some(metrics.elapsed().as_millis() as u64);
        record.bytes_sent = metrics.bytes_sent();
        record.bytes_received = metrics.bytes_received();

        tracing::info!(
            target = %target,
            bytes_sent = record.bytes_sent,
            bytes_received = record.bytes_received,
            elapsed_ms = record.elapsed_ms,
            "Tunnel closed"
        );
        self.recorder.record(record);
    }

    async fn fail_dial(
        &self,
        mut client: TcpStream,
        mut record: ExchangeRecord,
        metrics: &MetricsCollector,
    ) {
        record.outcome = Outcome::DialFailed;
        record.elapsed_ms = Some(metrics.elapsed().as_millis() as u64);
        self.recorder.record(record);
        let _ = write_response(&mut client, "502 Bad Gateway", "Tunnel origin unreachable\n").await;
    }
}

fn parse_target(target: &str) -> Option<(String, u16)> {
    match target.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => {
            Some((host.to_string(), port.parse().ok()?))
        }
        Some(_) => None,
        None if !target.is_empty() => Some((target.to_string(), 443)),
        None => None,
    }
}

/// Relay bytes between client and origin until either side closes.
///
/// When one side reaches EOF its peer's write half is shut down eagerly so
/// the other direction can drain instead of dangling. Each relayed chunk is
/// counted into the shared metrics.
async fn splice(
    mut client: TcpStream,
    mut origin: TcpStream,
    metrics: &MetricsCollector,
) -> std::io::Result<()> {
    let (mut client_read, mut client_write) = client.split();
    let (mut origin_read, mut origin_write) = origin.split();

    let client_to_origin = async {
        let mut buf = vec![0u8; 16 * 1024];
        loop {
            let n = client_read.read(&mut buf).await?;
            if n == 0 {
                let _ = origin_write.shutdown().await;
                break;
            }
            origin_write.write_all(&buf[..n]).await?;
            metrics.add_sent(n as u64);
        }
        Ok::<(), std::io::Error>(())
    };

    let origin_to_client = async {
        let mut buf = vec![0u8; 16 * 1024];
        loop {
            let n = origin_read.read(&mut buf).await?;
            if n == 0 {
                let _ = client_write.shutdown().await;
                break;
            }
            client_write.write_all(&buf[..n]).await?;
            metrics.add_received(n as u64);
        }
        Ok::<(), std::io::Error>(())
    };

    tokio::try_join!(client_to_origin, origin_to_client)?;
    Ok(())
}
