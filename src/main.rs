use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

use httpspy::config::{self, Config};
use httpspy::engine::ProxyEngine;
use httpspy::error::{Result, SpyError};
use httpspy::record::LogBook;

#[derive(Parser, Debug)]
#[command(name = "httpspy")]
#[command(about = "CLI tool for HTTP and HTTPS traffic monitoring", long_about = None)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (TOML/JSON/YAML)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    /// Start the monitoring proxy (default)
    Run {
        /// Listen port override
        #[arg(short, long)]
        port: Option<u16>,

        /// Comma-separated allow-list of HTTP methods (empty = allow all)
        #[arg(long, value_name = "METHODS")]
        methods: Option<String>,

        /// Print a one-line notice for each completed exchange
        #[arg(long)]
        echo: bool,

        /// Refuse CONNECT requests instead of tunneling them
        #[arg(long)]
        no_https: bool,

        /// Where to save records on shutdown (.json, .csv or .txt)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Stop a running instance, saving its buffered records
    Stop,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("httpspy={log_level}").parse().unwrap()),
        )
        .init();

    let mut config = match &args.config {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            config::load_from_path(path)?
        }
        None => config::load_from_env_or_file()?,
    };

    match args.command.unwrap_or(Command::Run {
        port: None,
        methods: None,
        echo: false,
        no_https: false,
        output: None,
    }) {
        Command::Run {
            port,
            methods,
            echo,
            no_https,
            output,
        } => {
            if let Some(port) = port {
                config.proxy.port = port;
            }
            if let Some(methods) = methods {
                config.proxy.allowed_methods = methods
                    .split(',')
                    .map(|m| m.trim().to_string())
                    .filter(|m| !m.is_empty())
                    .collect();
            }
            if echo {
                config.proxy.echo = true;
            }
            if no_https {
                config.proxy.https_tunneling = false;
            }
            if let Some(output) = output {
                config.output.save_path = output;
            }
            run_monitor(config).await
        }
        Command::Stop => stop_monitor(&config),
    }
}

async fn run_monitor(config: Config) -> Result<()> {
    let recorder = Arc::new(LogBook::new(config.proxy.echo));
    let pid_file = config.output.pid_file.clone();

    let handle = match ProxyEngine::start(config, recorder).await {
        Ok(handle) => handle,
        Err(SpyError::AlreadyRunning) => {
            warn!("Monitoring is already active, nothing to do");
            return Ok(());
        }
        Err(e) => {
            error!("Failed to start monitoring: {e}");
            return Err(e);
        }
    };

    // PID record for the external stop path.
    if let Err(e) = std::fs::write(&pid_file, handle.pid().to_string()) {
        warn!(path = %pid_file.display(), error = %e, "Failed to write PID file");
    }

    info!(
        "Monitoring on {} (pid {}), press Ctrl+C to stop",
        handle.local_addr(),
        handle.pid()
    );

    shutdown_signal().await;

    let result = handle.shutdown().await;
    if let Err(ref e) = result {
        error!("Shutdown reported an error: {e}");
    }

    if pid_file.exists() {
        if let Err(e) = std::fs::remove_file(&pid_file) {
            warn!(path = %pid_file.display(), error = %e, "Failed to remove PID file");
        } else {
            info!("PID file removed");
        }
    }

    result
}

/// Signal the instance recorded in the PID file. SIGTERM runs the same
/// flush-then-exit sequence as Ctrl+C in the target process.
fn stop_monitor(config: &Config) -> Result<()> {
    let pid_file = &config.output.pid_file;
    let contents = std::fs::read_to_string(pid_file).map_err(|e| {
        error!(
            "No running instance found (cannot read {}): {e}",
            pid_file.display()
        );
        SpyError::Io(e)
    })?;

    let pid: i32 = contents.trim().parse().map_err(|_| {
        SpyError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Invalid PID file contents: {contents:?}"),
        ))
    })?;

    info!("Stopping HTTP monitoring (pid {pid})");
    nix::sys::signal::kill(
        nix::unistd::Pid::from_raw(pid),
        nix::sys::signal::Signal::SIGTERM,
    )
    .map_err(|e| SpyError::Io(std::io::Error::from(e)))?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}
