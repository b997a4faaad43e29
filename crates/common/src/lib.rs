// Shared plumbing: configuration, errors, Redis client, time helpers
pub mod cache;
pub mod config;
pub mod errors;
pub mod time;

pub use cache::RedisCache;
pub use config::{AppConfig, DynamoConfig, RedisConfig, StorageConfig};
pub use errors::{CacheError, ConfigError};
