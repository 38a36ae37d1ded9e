/// Server Configuration
///
/// Configuration is read from environment variables, after a `.env` file in
/// the working directory has been loaded. Every value has a default so the
/// server starts with no configuration at all.
///
/// Environment Variables:
/// - SERVER_NAME: Name reported to MCP clients (default: "ofac_party_service")
/// - SERVER_VERSION: Version reported to MCP clients (default: crate version)
/// - MCP_TRANSPORT_MODE: "stdio", "http", or "both" (default: "http")
/// - HOST / PORT: HTTP bind address (default: "0.0.0.0" / 10000)
/// - DB_FILE: SQLite sanctions database (default: "ofac_demo.db")
/// - BASE_URL: REST API base used by the MCP tools (default: "http://127.0.0.1:{PORT}")
/// - LOG_DIR / LOG_FILE_NAME: log file location (default: "logs/ofac_party_service.log")
/// - WORKER_THREADS: actix worker count (default: CPU count, max 16)
/// - KEEP_ALIVE_SECS: HTTP keep-alive (default: 65)
/// - API_TIMEOUT_SECS: MCP tool HTTP timeout (default: 10)

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::core::error::ConfigError;

pub const DEFAULT_SERVER_NAME: &str = "ofac_party_service";
pub const DEFAULT_PORT: u16 = 10000;
pub const DEFAULT_DB_FILE: &str = "ofac_demo.db";
pub const DEFAULT_LOG_DIR: &str = "logs";
pub const DEFAULT_LOG_FILE_NAME: &str = "ofac_party_service.log";
const DEFAULT_KEEP_ALIVE_SECS: u64 = 65;
const DEFAULT_API_TIMEOUT_SECS: u64 = 10;
const MAX_DEFAULT_WORKERS: usize = 16;

/// Which MCP transports the process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    /// Line-delimited JSON-RPC over stdin/stdout only.
    Stdio,
    /// Combined REST API + MCP HTTP/SSE listener only.
    Http,
    /// STDIO in the background and HTTP in the foreground.
    Both,
}

impl FromStr for TransportMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stdio" => Ok(Self::Stdio),
            "http" => Ok(Self::Http),
            "both" => Ok(Self::Both),
            other => Err(ConfigError::Invalid {
                key: "MCP_TRANSPORT_MODE",
                message: format!("'{}' must be 'stdio', 'http', or 'both'", other),
            }),
        }
    }
}

/// Resolved process configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_name: String,
    pub server_version: String,
    pub transport: TransportMode,
    pub host: String,
    pub port: u16,
    pub db_file: PathBuf,
    pub base_url: String,
    pub log_dir: PathBuf,
    pub log_file_name: String,
    pub workers: usize,
    pub keep_alive: Duration,
    pub api_timeout: Duration,
}

impl ServerConfig {
    /// Load configuration from the process environment.
    ///
    /// A `.env` file is loaded first; variables already present in the
    /// environment are never overridden by it.
    pub fn from_env() -> Result<Self, ConfigError> {
        load_dotenv(dotenvy::dotenv().map(|_| ()))?;
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// Blank values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = parse_or(&get, "PORT", DEFAULT_PORT)?;
        if port == 0 {
            return Err(ConfigError::Invalid {
                key: "PORT",
                message: "port must be between 1 and 65535".to_string(),
            });
        }

        let transport = match get("MCP_TRANSPORT_MODE") {
            Some(raw) => raw.parse()?,
            None => TransportMode::Http,
        };

        let base_url = match lookup("BASE_URL") {
            Some(raw) if raw.trim().is_empty() => {
                return Err(ConfigError::Invalid {
                    key: "BASE_URL",
                    message: "must not be empty".to_string(),
                });
            }
            Some(raw) => raw.trim().trim_end_matches('/').to_string(),
            None => format!("http://127.0.0.1:{}", port),
        };

        let workers = match get("WORKER_THREADS") {
            Some(_) => parse_or(&get, "WORKER_THREADS", 1usize)?.max(1),
            None => num_cpus::get().clamp(1, MAX_DEFAULT_WORKERS),
        };

        Ok(Self {
            server_name: get("SERVER_NAME").unwrap_or_else(|| DEFAULT_SERVER_NAME.to_string()),
            server_version: get("SERVER_VERSION")
                .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
            transport,
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            db_file: PathBuf::from(get("DB_FILE").unwrap_or_else(|| DEFAULT_DB_FILE.to_string())),
            base_url,
            log_dir: PathBuf::from(get("LOG_DIR").unwrap_or_else(|| DEFAULT_LOG_DIR.to_string())),
            log_file_name: get("LOG_FILE_NAME")
                .unwrap_or_else(|| DEFAULT_LOG_FILE_NAME.to_string()),
            workers,
            keep_alive: Duration::from_secs(parse_or(
                &get,
                "KEEP_ALIVE_SECS",
                DEFAULT_KEEP_ALIVE_SECS,
            )?),
            api_timeout: Duration::from_secs(parse_or(
                &get,
                "API_TIMEOUT_SECS",
                DEFAULT_API_TIMEOUT_SECS,
            )?),
        })
    }

    /// Endpoint for single-party lookups: `{BASE_URL}/ofacParty`.
    pub fn api_endpoint(&self) -> String {
        format!("{}/ofacParty", self.base_url)
    }

    /// Endpoint for party searches: `{BASE_URL}/ofacParty/search`.
    pub fn search_endpoint(&self) -> String {
        format!("{}/search", self.api_endpoint())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// A missing `.env` is the normal case; anything else is a config error.
fn load_dotenv(result: Result<(), dotenvy::Error>) -> Result<(), ConfigError> {
    match result {
        Err(e) if !e.not_found() => Err(ConfigError::Invalid {
            key: ".env",
            message: e.to_string(),
        }),
        _ => Ok(()),
    }
}

fn parse_or<G, T>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
            key,
            message: format!("'{}': {}", raw, e),
        }),
        None => Ok(default),
    }
}
