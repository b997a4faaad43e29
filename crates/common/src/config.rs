use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::ConfigError;

const DEFAULT_REDIS_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_DYNAMODB_TIMEOUT_MS: u64 = 2_000;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub service_name: String,
    pub server_host: String,
    pub server_port: u16,
    pub log_level: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            service_name: env::var("SERVICE_NAME").unwrap_or_else(|_| "auth-service".to_string()),
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: parse_var("SERVER_PORT", 8080)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

/// Connection parameters for the Redis session store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub db: i64,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Upper bound for a single command, connection setup included.
    pub timeout: Duration,
    pub key_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            db: 0,
            username: None,
            password: None,
            timeout: Duration::from_millis(DEFAULT_REDIS_TIMEOUT_MS),
            key_prefix: "session:".to_string(),
        }
    }
}

impl RedisConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            host: env::var("REDIS_HOST").unwrap_or(defaults.host),
            port: parse_var("REDIS_PORT", defaults.port)?,
            db: parse_var("REDIS_DB", defaults.db)?,
            username: optional_var("REDIS_USERNAME"),
            password: optional_var("REDIS_PASSWORD"),
            timeout: Duration::from_millis(parse_var("REDIS_TIMEOUT_MS", DEFAULT_REDIS_TIMEOUT_MS)?),
            key_prefix: env::var("REDIS_KEY_PREFIX").unwrap_or(defaults.key_prefix),
        })
    }

    pub fn address(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.db)
    }
}

/// Table and endpoint for the DynamoDB session store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DynamoConfig {
    pub table_name: String,
    pub region: String,
    /// Overrides the regional endpoint, e.g. for DynamoDB Local.
    pub endpoint_url: Option<String>,
    /// Upper bound for a single operation, retries included.
    pub timeout: Duration,
}

impl Default for DynamoConfig {
    fn default() -> Self {
        Self {
            table_name: "session_store".to_string(),
            region: "us-east-1".to_string(),
            endpoint_url: None,
            timeout: Duration::from_millis(DEFAULT_DYNAMODB_TIMEOUT_MS),
        }
    }
}

impl DynamoConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            table_name: optional_var("DYNAMODB_TABLE_NAME").unwrap_or(defaults.table_name),
            region: optional_var("AWS_REGION").unwrap_or(defaults.region),
            endpoint_url: optional_var("DYNAMODB_ENDPOINT_URL"),
            timeout: Duration::from_millis(parse_var("DYNAMODB_TIMEOUT_MS", DEFAULT_DYNAMODB_TIMEOUT_MS)?),
        })
    }
}

/// Which session store backs the auth layer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum StorageConfig {
    #[default]
    Memory,
    Redis(RedisConfig),
    DynamoDb(DynamoConfig),
}

impl StorageConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let kind = env::var("AUTH_STORAGE").unwrap_or_else(|_| "memory".to_string());
        Self::from_kind(&kind)
    }

    fn from_kind(kind: &str) -> Result<Self, ConfigError> {
        match kind.trim().to_ascii_lowercase().as_str() {
            "memory" | "in-memory" => Ok(Self::Memory),
            "redis" => Ok(Self::Redis(RedisConfig::from_env()?)),
            "dynamodb" | "dynamo" => Ok(Self::DynamoDb(DynamoConfig::from_env()?)),
            _ => Err(ConfigError::invalid("AUTH_STORAGE", kind)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Redis(_) => "redis",
            Self::DynamoDb(_) => "dynamodb",
        }
    }
}

/// Reads and parses `key`, falling back to `default` when unset.
pub fn parse_var<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::invalid(key, raw)),
        Err(_) => Ok(default),
    }
}

/// Reads `key`, treating unset and blank values alike.
pub fn optional_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}
