use crate::error::{Error, Result};
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;

pub const DEFAULT_SNAPSHOT_BUCKET: &str = "test-attempts";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotStoreConfig {
    /// Every snapshot is stored inline in the attempt record.
    Disabled,
    Filesystem { root: PathBuf },
    Http { endpoint: String, token: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: String,
    /// Without a database URL the service keeps everything in process memory.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub snapshot_store: SnapshotStoreConfig,
    pub snapshot_bucket: String,
    pub snapshot_inline_max_bytes: Option<usize>,
    pub log_format: LogFormat,
}

pub static CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let snapshot_store = match env::var("SNAPSHOT_STORE")
            .unwrap_or_else(|_| "none".to_string())
            .to_lowercase()
            .as_str()
        {
            "none" | "" => SnapshotStoreConfig::Disabled,
            "fs" => SnapshotStoreConfig::Filesystem {
                root: PathBuf::from(get_env("SNAPSHOT_STORE_DIR")?),
            },
            "http" => SnapshotStoreConfig::Http {
                endpoint: get_env("SNAPSHOT_STORE_URL")?,
                token: env::var("SNAPSHOT_STORE_TOKEN").ok(),
            },
            other => {
                return Err(Error::Config(format!(
                    "Invalid value for SNAPSHOT_STORE: {} (expected none, fs or http)",
                    other
                )))
            }
        };

        let log_format = match env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Ok(Self {
            server_address: get_env("SERVER_ADDRESS")?,
            database_url: env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),
            db_max_connections: get_env_parse_or("DB_MAX_CONNECTIONS", 20)?,
            snapshot_store,
            snapshot_bucket: env::var("SNAPSHOT_BUCKET")
                .unwrap_or_else(|_| DEFAULT_SNAPSHOT_BUCKET.to_string()),
            snapshot_inline_max_bytes: get_env_parse_opt("SNAPSHOT_INLINE_MAX_BYTES")?,
            log_format,
        })
    }
}

fn get_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Config(format!("Missing environment variable: {}", name)))
}

fn get_env_parse_opt<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e))),
        Err(_) => Ok(None),
    }
}

fn get_env_parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    Ok(get_env_parse_opt(name)?.unwrap_or(default))
}

pub fn init_config() -> Result<()> {
    let config = Config::from_env()?;
    CONFIG
        .set(config)
        .map_err(|_| Error::Config("Configuration has already been initialized".to_string()))?;
    Ok(())
}

pub fn get_config() -> &'static Config {
    CONFIG
        .get()
        .expect("Configuration has not been initialized")
}
