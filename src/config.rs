use std::env;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use crate::error::{AppError, Result};

#[derive(Clone)]
pub struct Config {
    pub server_addr: SocketAddr,
    pub block_loopback: bool,
    pub state_file: PathBuf,
    pub monitor: Option<MonitorTarget>,
}

/// A page the binary should start watching on its own.
#[derive(Clone)]
pub struct MonitorTarget {
    pub url: String,
    pub interval: Duration,
    pub keywords: Vec<String>,
    pub relay_url: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load environment variables from .env file if it exists
        dotenv::dotenv().ok();

        // Load server configuration with defaults
        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("PORT").unwrap_or_else(|_| "3000".to_string());
        let port = port.parse::<u16>().map_err(|e| AppError::ConfigError(format!("Invalid port: {}", e)))?;
        let ip = IpAddr::from_str(&host).map_err(|e| AppError::ConfigError(format!("Invalid host address: {}", e)))?;

        let server_addr = SocketAddr::new(ip, port);

        let block_loopback = env::var("BLOCK_LOOPBACK")
            .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let state_file = env::var("STATE_FILE")
            .unwrap_or_else(|_| "bidwatch_state.json".to_string())
            .into();

        let monitor = match env::var("MONITOR_URL") {
            Ok(url) => {
                let interval_ms = env::var("MONITOR_INTERVAL_MS").unwrap_or_else(|_| "300000".to_string());
                let interval_ms = interval_ms
                    .parse::<u64>()
                    .map_err(|e| AppError::ConfigError(format!("Invalid MONITOR_INTERVAL_MS: {}", e)))?;
                let keywords = env::var("MONITOR_KEYWORDS")
                    .map(|raw| parse_keywords(&raw))
                    .unwrap_or_default();
                Some(MonitorTarget {
                    url,
                    interval: Duration::from_millis(interval_ms),
                    keywords,
                    relay_url: env::var("RELAY_URL").ok(),
                })
            }
            Err(_) => None,
        };

        Ok(Config {
            server_addr,
            block_loopback,
            state_file,
            monitor,
        })
    }
}

/// Split a comma-separated keyword list, dropping empty entries.
pub fn parse_keywords(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect()
}
