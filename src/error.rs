use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpyError {
    #[error("Failed to bind listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Monitoring is already active in this process")]
    AlreadyRunning,

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Recorder error: {0}")]
    Recorder(#[from] RecorderError),

    #[error("Resolution error: {0}")]
    Resolve(#[from] ResolveError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Persistence failures raised when flushing buffered records to disk.
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("Serialization failed: {0}")]
    Serialize(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("No address found for host: {0}")]
    NoAddress(String),

    #[error("Lookup failed for {host}: {source}")]
    Lookup {
        host: String,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, SpyError>;
