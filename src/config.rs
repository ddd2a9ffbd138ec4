//! Daemon configuration.
//!
//! A single TOML file (default `contextd.toml`, overridable via
//! `CONTEXTD_CONFIG`) loaded at startup, with individual fields overridable
//! by environment variables. Missing the file entirely is not fatal — the
//! daemon falls back to [`Config::default`] for local/dev runs, matching the
//! teacher's `AresConfigManager`/`Config::from_env` split. A *present* file
//! missing a required field is fatal, with a message naming the field.

use serde::Deserialize;
use std::path::Path;

/// Environment variable naming the config file path.
pub const CONFIG_PATH_ENV: &str = "CONTEXTD_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "contextd.toml";

/// Top-level daemon configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub store: StoreConfig,
    pub embedder: EmbedderConfig,
    pub logging: LoggingConfig,
    pub prefetch: PrefetchConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7420,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Secret used to verify bearer JWTs. Required in a present config file;
    /// falls back to an insecure development default otherwise.
    pub jwt_secret: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "development-secret-change-in-production".to_string(),
        }
    }
}

/// Which `Store` backend the daemon constructs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    Memory,
    Local,
    Grpc,
}

impl Default for VectorBackend {
    fn default() -> Self {
        VectorBackend::Memory
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: VectorBackend,
    /// Data directory for the `local` (ares-vector) backend.
    pub data_dir: Option<String>,
    /// `gRPC` backend endpoint, when `backend = "grpc"`.
    pub grpc_endpoint: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: VectorBackend::default(),
            data_dir: None,
            grpc_endpoint: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderKind {
    Hash,
    #[cfg(feature = "local-embeddings")]
    Fastembed,
}

impl Default for EmbedderKind {
    fn default() -> Self {
        EmbedderKind::Hash
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbedderConfig {
    pub kind: EmbedderKind,
    pub dimensions: usize,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            kind: EmbedderKind::default(),
            dimensions: 256,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Console,
}

impl Default for LogFormat {
    fn default() -> Self {
        LogFormat::Json
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PrefetchConfig {
    pub enabled: bool,
    pub max_parallel: usize,
    pub timeout_ms: u64,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_parallel: 3,
            timeout_ms: 2000,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            store: StoreConfig::default(),
            embedder: EmbedderConfig::default(),
            logging: LoggingConfig::default(),
            prefetch: PrefetchConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the file named by `CONTEXTD_CONFIG` (default
    /// `contextd.toml`), then apply environment variable overrides. A
    /// missing file falls back to defaults; a present-but-unparsable file is
    /// an error naming the problem.
    pub fn load() -> Result<Self, String> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = if Path::new(&path).exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| format!("failed to read config file '{path}': {e}"))?;
            toml::from_str(&text)
                .map_err(|e| format!("failed to parse config file '{path}': {e}"))?
        } else {
            Config::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("CONTEXTD_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("CONTEXTD_PORT") {
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }
        if let Ok(secret) = std::env::var("CONTEXTD_JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let Ok(dir) = std::env::var("CONTEXTD_DATA_DIR") {
            self.store.data_dir = Some(dir);
        }
        if let Ok(backend) = std::env::var("CONTEXTD_VECTOR_BACKEND") {
            self.store.backend = match backend.to_lowercase().as_str() {
                "local" => VectorBackend::Local,
                "grpc" => VectorBackend::Grpc,
                _ => VectorBackend::Memory,
            };
        }
        if let Ok(format) = std::env::var("CONTEXTD_LOG_FORMAT") {
            self.logging.format = match format.to_lowercase().as_str() {
                "console" => LogFormat::Console,
                _ => LogFormat::Json,
            };
        }
    }

    /// The bind address derived from `server.host`/`server.port`.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_binds_to_documented_default() {
        let config = Config::default();
        assert_eq!(config.bind_addr(), "127.0.0.1:7420");
    }

    #[test]
    fn missing_file_falls_back_to_default_without_erroring() {
        // SAFETY: test-only env mutation, no concurrent config loads in this process.
        unsafe {
            std::env::set_var(CONFIG_PATH_ENV, "/nonexistent/contextd.toml");
        }
        let config = Config::load().expect("missing file must not be fatal");
        assert_eq!(config.server.port, 7420);
        unsafe {
            std::env::remove_var(CONFIG_PATH_ENV);
        }
    }

    #[test]
    fn env_override_wins_over_default() {
        unsafe {
            std::env::set_var(CONFIG_PATH_ENV, "/nonexistent/contextd.toml");
            std::env::set_var("CONTEXTD_PORT", "9001");
        }
        let config = Config::load().expect("load should succeed");
        assert_eq!(config.server.port, 9001);
        unsafe {
            std::env::remove_var(CONFIG_PATH_ENV);
            std::env::remove_var("CONTEXTD_PORT");
        }
    }
}
