//! Session persistence.
//!
//! [`SessionStore`] is the capability every backend offers: put, get, delete
//! and an atomic replace used by token refresh. [`Store`] selects one of the
//! concrete variants from [`StorageConfig`] at startup and dispatches
//! statically.
//!
//! | Variant | Scope | Expiry |
//! |---------|-------|--------|
//! | [`MemoryStore`] | single process, lost on restart | checked on read |
//! | [`RedisStore`] | shared across processes | native `PSETEX` |
//! | [`DynamoStore`] | shared across processes | `expires_at` checked on read, native TTL sweep |

pub mod dynamo;
pub mod memory;
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{ConfigError, StorageConfig};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::jwt::ClaimsMap;

pub use self::dynamo::DynamoStore;
pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// Authoritative server-side record for one issued token.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SessionRecord {
    pub claims: ClaimsMap,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new(claims: ClaimsMap, issued_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            claims,
            issued_at,
            expires_at: common::time::deadline(issued_at, ttl),
        }
    }

    /// A record is valid iff `now < expires_at`.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    pub fn lifetime(&self) -> Duration {
        common::time::remaining(self.issued_at, self.expires_at)
    }
}

/// Token-keyed session persistence shared by all in-flight requests.
///
/// Implementations must be safe to call concurrently and must never expose a
/// partially written record. A miss (unknown, deleted or expired token) is
/// `Ok(None)`; `Err` is reserved for the store failing to answer.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Inserts or overwrites the record for `token`; it stops being readable
    /// once `ttl` has elapsed.
    async fn put(&self, token: &str, record: &SessionRecord, ttl: Duration) -> StoreResult<()>;

    async fn get(&self, token: &str) -> StoreResult<Option<SessionRecord>>;

    /// Removes `token`. Deleting an absent token succeeds.
    async fn delete(&self, token: &str) -> StoreResult<()>;

    /// Stores `record` under `new_token` and removes `old_token`, as one
    /// step with respect to other callers.
    ///
    /// Returns `Ok(false)` and leaves `new_token` unreadable when
    /// `old_token` was already gone, so a revoked or already rotated session
    /// is never revived. At no point is neither token readable.
    async fn replace(
        &self,
        old_token: &str,
        new_token: &str,
        record: &SessionRecord,
        ttl: Duration,
    ) -> StoreResult<bool>;

    /// Round trip to the backend, for health reporting.
    async fn ping(&self) -> StoreResult<()>;
}

/// The configured session store.
#[derive(Clone)]
pub enum Store {
    Memory(MemoryStore),
    Redis(RedisStore),
    DynamoDb(DynamoStore),
}

impl Store {
    pub fn memory() -> Self {
        Self::Memory(MemoryStore::new())
    }

    /// Builds the store selected by `config`. Does not contact the backend.
    pub async fn from_config(config: &StorageConfig) -> Result<Self, ConfigError> {
        match config {
            StorageConfig::Memory => Ok(Self::memory()),
            StorageConfig::Redis(redis) => RedisStore::new(redis)
                .map(Self::Redis)
                .map_err(|e| ConfigError::invalid("REDIS_HOST", e.to_string())),
            StorageConfig::DynamoDb(dynamo) => Ok(Self::DynamoDb(DynamoStore::connect(dynamo).await)),
        }
    }

    /// One-time backend setup, run at startup. Creates the DynamoDB table
    /// when it is missing; the other stores need nothing.
    pub async fn prepare(&self) -> StoreResult<()> {
        match self {
            Self::DynamoDb(s) => s.ensure_table().await,
            Self::Memory(_) | Self::Redis(_) => Ok(()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Memory(_) => "memory",
            Self::Redis(_) => "redis",
            Self::DynamoDb(_) => "dynamodb",
        }
    }

    pub fn as_memory(&self) -> Option<&MemoryStore> {
        match self {
            Self::Memory(store) => Some(store),
            Self::Redis(_) | Self::DynamoDb(_) => None,
        }
    }
}

#[async_trait]
impl SessionStore for Store {
    async fn put(&self, token: &str, record: &SessionRecord, ttl: Duration) -> StoreResult<()> {
        match self {
            Self::Memory(s) => s.put(token, record, ttl).await,
            Self::Redis(s) => s.put(token, record, ttl).await,
            Self::DynamoDb(s) => s.put(token, record, ttl).await,
        }
    }

    async fn get(&self, token: &str) -> StoreResult<Option<SessionRecord>> {
        let record = match self {
            Self::Memory(s) => s.get(token).await?,
            Self::Redis(s) => s.get(token).await?,
            Self::DynamoDb(s) => s.get(token).await?,
        };

        // Native expiry can lag by a few milliseconds; the record's own
        // deadline wins.
        let now = common::time::now();
        Ok(record.filter(|r| r.is_active_at(now)))
    }

    async fn delete(&self, token: &str) -> StoreResult<()> {
        match self {
            Self::Memory(s) => s.delete(token).await,
            Self::Redis(s) => s.delete(token).await,
            Self::DynamoDb(s) => s.delete(token).await,
        }
    }

    async fn replace(
        &self,
        old_token: &str,
        new_token: &str,
        record: &SessionRecord,
        ttl: Duration,
    ) -> StoreResult<bool> {
        match self {
            Self::Memory(s) => s.replace(old_token, new_token, record, ttl).await,
            Self::Redis(s) => s.replace(old_token, new_token, record, ttl).await,
            Self::DynamoDb(s) => s.replace(old_token, new_token, record, ttl).await,
        }
    }

    async fn ping(&self) -> StoreResult<()> {
        match self {
            Self::Memory(s) => s.ping().await,
            Self::Redis(s) => s.ping().await,
            Self::DynamoDb(s) => s.ping().await,
        }
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Store::{}", self.name())
    }
}
