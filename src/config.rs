// src/config.rs
use crate::error::ConfigError;
use log::warn;
use std::net::SocketAddr;
use std::time::Duration;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3030";
const DEFAULT_BACKEND_URL: &str = "http://localhost:8000/api";
const DEFAULT_MARKET_URL: &str = "https://api.polygon.io";
const DEFAULT_REFRESH_SECS: u64 = 60;
const DEFAULT_SESSION_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub backend_url: String,
    pub market_url: String,
    pub market_api_key: String,
    pub session_secret: String,
    pub refresh_interval: Duration,
    pub session_ttl_hours: i64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_raw = get("STOCKER_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_raw.parse().map_err(|_| ConfigError::Invalid {
            key: "STOCKER_BIND_ADDR",
            value: bind_raw.clone(),
        })?;

        let market_api_key = get("POLYGON_API_KEY").ok_or(ConfigError::Missing("POLYGON_API_KEY"))?;

        let session_secret = match get("STOCKER_SESSION_SECRET") {
            Some(secret) => secret,
            None => {
                warn!("STOCKER_SESSION_SECRET not set; sessions will not survive a restart");
                uuid::Uuid::new_v4().to_string()
            }
        };

        let refresh_secs = parse_or("STOCKER_REFRESH_SECS", get("STOCKER_REFRESH_SECS"), DEFAULT_REFRESH_SECS)?;
        if refresh_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "STOCKER_REFRESH_SECS",
                value: "0".to_string(),
            });
        }

        Ok(Config {
            bind_addr,
            backend_url: trim_base(get("STOCKER_BACKEND_URL").unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string())),
            market_url: trim_base(get("POLYGON_BASE_URL").unwrap_or_else(|| DEFAULT_MARKET_URL.to_string())),
            market_api_key,
            session_secret,
            refresh_interval: Duration::from_secs(refresh_secs),
            session_ttl_hours: parse_or(
                "STOCKER_SESSION_TTL_HOURS",
                get("STOCKER_SESSION_TTL_HOURS"),
                DEFAULT_SESSION_TTL_HOURS,
            )?,
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    key: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

fn trim_base(url: String) -> String {
    url.trim_end_matches('/').to_string()
}
