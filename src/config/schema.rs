use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Allowed HTTP methods; an empty list means every method is accepted.
    #[serde(default, alias = "allowedmethods")]
    pub allowed_methods: Vec<String>,
    #[serde(default = "default_https_tunneling", alias = "httpstunneling")]
    pub https_tunneling: bool,
    /// Print a one-line notice for every completed exchange.
    #[serde(default)]
    pub echo: bool,
    #[serde(default = "default_connect_timeout", alias = "connecttimeoutms")]
    pub connect_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputConfig {
    // The aliases match the lowercased keys figment's Env provider emits.
    #[serde(default = "default_save_path", alias = "savepath")]
    pub save_path: PathBuf,
    #[serde(default = "default_pid_file", alias = "pidfile")]
    pub pid_file: PathBuf,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            allowed_methods: Vec::new(),
            https_tunneling: default_https_tunneling(),
            echo: false,
            connect_timeout_ms: default_connect_timeout(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            save_path: default_save_path(),
            pid_file: default_pid_file(),
        }
    }
}

// Default value functions
fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8089
}

fn default_https_tunneling() -> bool {
    true
}

fn default_connect_timeout() -> u64 {
    10_000
}

fn default_save_path() -> PathBuf {
    PathBuf::from("logs/exchanges.json")
}

fn default_pid_file() -> PathBuf {
    PathBuf::from("httpspy.pid")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = Config::default();
        assert_eq!(config.proxy.port, 8089);
        assert_eq!(config.proxy.host, "127.0.0.1");
        assert!(config.proxy.allowed_methods.is_empty());
        assert!(config.proxy.https_tunneling);
        assert!(!config.proxy.echo);
        assert_eq!(config.proxy.connect_timeout_ms, 10_000);
        assert_eq!(config.output.save_path, PathBuf::from("logs/exchanges.json"));
    }
}
