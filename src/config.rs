//! Configuration management for the sync daemon

use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub annotations: AnnotationsConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnnotationsConfig {
    /// Annotation collection endpoint of the library's circulation server
    pub base_url: String,
    /// Bearer token, when the server wants one
    pub token: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// DRM device ID stamped on records created here
    pub device_id: Option<String>,
    /// Whether the account allows annotation sync at all
    pub enabled: bool,
    pub tombstone_retention_days: i64,
    pub position_post_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3100,
            },
            database: DatabaseConfig {
                url: "sqlite:./libros-sync.db".to_string(),
            },
            annotations: AnnotationsConfig {
                base_url: "http://localhost:3000/annotations/".to_string(),
                token: None,
                timeout_secs: 30,
            },
            sync: SyncConfig::default(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            device_id: None,
            enabled: true,
            tombstone_retention_days: 90,
            position_post_interval_secs: 15,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
                port: env::var("SERVER_PORT")
                    .unwrap_or_else(|_| "3100".to_string())
                    .parse()
                    .unwrap_or(3100),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite:./libros-sync.db".to_string()),
            },
            annotations: AnnotationsConfig {
                base_url: env::var("ANNOTATIONS_URL")?,
                token: env::var("ANNOTATIONS_TOKEN").ok().filter(|t| !t.is_empty()),
                timeout_secs: parse_or("ANNOTATIONS_TIMEOUT_SECS", 30),
            },
            sync: SyncConfig {
                device_id: env::var("DEVICE_ID").ok().filter(|d| !d.is_empty()),
                enabled: env::var("SYNC_ENABLED")
                    .map(|v| !matches!(v.to_lowercase().as_str(), "0" | "false" | "no" | "off"))
                    .unwrap_or(true),
                tombstone_retention_days: parse_or("TOMBSTONE_RETENTION_DAYS", 90),
                position_post_interval_secs: parse_or("POSITION_POST_INTERVAL_SECS", 15),
            },
        })
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
