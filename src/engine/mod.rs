//! The proxy/interception engine.
//!
//! [`ProxyEngine::start`] binds the listener and spawns the accept loop;
//! every accepted connection runs in its own task, classified by its first
//! request line as plain HTTP or a CONNECT tunnel. The returned
//! [`EngineHandle`] drives graceful shutdown: flush the recorder, force-close
//! tracked connections, stop the listener.

pub mod filter;
pub mod http;
pub mod registry;
pub mod tunnel;

pub use filter::MethodFilter;
pub use registry::{ConnectionRegistry, TrackedConnection};

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{Result, SpyError};
use crate::record::RequestRecorder;
use http::{read_request_head, write_response, HttpInterceptor};
use tunnel::TunnelInterceptor;

/// Only one engine may be active per process; a second `start` returns
/// `SpyError::AlreadyRunning` instead of silently piling up listeners.
static ACTIVE: AtomicBool = AtomicBool::new(false);

pub struct ProxyEngine;

impl ProxyEngine {
    /// Bind the listener and start accepting connections.
    ///
    /// Returns once the socket is bound, which is the readiness signal the
    /// CLI uses to persist the PID record.
    pub async fn start(config: Config, recorder: Arc<dyn RequestRecorder>) -> Result<EngineHandle> {
        if ACTIVE.swap(true, Ordering::SeqCst) {
            tracing::warn!("Monitoring is already active");
            return Err(SpyError::AlreadyRunning);
        }

        let addr = format!("{}:{}", config.proxy.host, config.proxy.port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(listener) => listener,
            Err(source) => {
                ACTIVE.store(false, Ordering::SeqCst);
                return Err(SpyError::Bind { addr, source });
            }
        };
        let local_addr = listener.local_addr()?;

        let registry = Arc::new(ConnectionRegistry::new());
        let dispatcher = Arc::new(Dispatcher {
            http: HttpInterceptor::new(
                MethodFilter::new(&config.proxy.allowed_methods),
                recorder.clone(),
            ),
            tunnel: TunnelInterceptor::new(
                recorder.clone(),
                Duration::from_millis(config.proxy.connect_timeout_ms),
            ),
            https_tunneling: config.proxy.https_tunneling,
        });

        let accept_token = CancellationToken::new();
        let accept_task = tokio::spawn(accept_loop(
            listener,
            accept_token.clone(),
            registry.clone(),
            dispatcher,
        ));

        tracing::info!(addr = %local_addr, "HTTP monitoring started");

        Ok(EngineHandle {
            inner: Arc::new(EngineInner {
                local_addr,
                registry,
                recorder,
                save_path: config.output.save_path,
                accept_token,
                accept_task: Mutex::new(Some(accept_task)),
                shut_down: AtomicBool::new(false),
            }),
        })
    }
}

/// Handle to a running engine, used for introspection and shutdown.
#[derive(Clone)]
pub struct EngineHandle {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    local_addr: SocketAddr,
    registry: Arc<ConnectionRegistry>,
    recorder: Arc<dyn RequestRecorder>,
    save_path: PathBuf,
    accept_token: CancellationToken,
    accept_task: Mutex<Option<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl EngineHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    /// Process identifier exposed for the external PID record.
    pub fn pid(&self) -> u32 {
        std::process::id()
    }

    pub fn connection_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Flush records, force-close tracked connections, stop the listener.
    ///
    /// Idempotent: the second and later calls return Ok without effect.
    /// A flush failure is surfaced, but connections and the listener are
    /// torn down regardless so shutdown never hangs on a full disk.
    /// Exchanges still in flight are dropped by design.
    pub async fn shutdown(&self) -> Result<()> {
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        tracing::info!("Gracefully shutting down");

        let flush_result = self.inner.recorder.flush(&self.inner.save_path).await;
        if let Err(ref e) = flush_result {
            tracing::error!(error = %e, "Failed to flush records during shutdown");
        }

        self.inner.registry.close_all();
        self.inner.accept_token.cancel();
        if let Some(task) = self.inner.accept_task.lock().await.take() {
            let _ = task.await;
        }

        ACTIVE.store(false, Ordering::SeqCst);
        tracing::info!("HTTP monitoring stopped");

        flush_result.map_err(Into::into)
    }
}

struct Dispatcher {
    http: HttpInterceptor,
    tunnel: TunnelInterceptor,
    https_tunneling: bool,
}

async fn accept_loop(
    listener: TcpListener,
    token: CancellationToken,
    registry: Arc<ConnectionRegistry>,
    dispatcher: Arc<Dispatcher>,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        let conn = registry.register(peer);
                        let registry = registry.clone();
                        let dispatcher = dispatcher.clone();
                        tokio::spawn(async move {
                            tokio::select! {
                                _ = conn.token.cancelled() => {
                                    tracing::debug!(peer = %conn.peer, "Connection force-closed");
                                }
                                _ = handle_connection(stream, peer, &dispatcher) => {}
                            }
                            registry.deregister(conn.id);
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to accept connection");
                    }
                }
            }
        }
    }
    // Dropping the listener here closes the listening socket.
}

async fn handle_connection(mut stream: TcpStream, peer: SocketAddr, dispatcher: &Dispatcher) {
    let head = match read_request_head(&mut stream).await {
        Ok(Some(head)) => head,
        Ok(None) => {
            let _ = write_response(&mut stream, "400 Bad Request", "Malformed request\n").await;
            return;
        }
        Err(e) => {
            tracing::warn!(peer = %peer, error = %e, "Error reading request");
            let _ = write_response(
                &mut stream,
                "500 Internal Server Error",
                "Internal Server Error\n",
            )
            .await;
            return;
        }
    };

    if head.is_connect() {
        if dispatcher.https_tunneling {
            dispatcher.tunnel.handle(stream, head, peer).await;
        } else {
            // Explicit policy: tunneling off means CONNECT is refused, never
            // silently accepted. No origin connection is opened.
            tracing::info!(target = %head.target, "CONNECT rejected, tunneling disabled");
            let _ = write_response(
                &mut stream,
                "501 Not Implemented",
                "CONNECT tunneling is disabled\n",
            )
            .await;
        }
    } else {
        dispatcher.http.handle(stream, head, peer).await;
    }
}
