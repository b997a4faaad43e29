use std::time::Duration;

use async_trait::async_trait;
use common::{CacheError, RedisCache, RedisConfig};

use super::{SessionRecord, SessionStore, StoreResult};

/// Session store backed by Redis.
///
/// Records are JSON under `key_prefix + token` and expire natively.
/// `replace` runs as one server-side script, so a token deleted by a
/// concurrent logout can never be swapped for a fresh one. Every
/// call is bounded by the configured timeout and reports an unreachable
/// server as [`StoreError::Unavailable`](crate::StoreError::Unavailable).
#[derive(Clone)]
pub struct RedisStore {
    cache: RedisCache,
    key_prefix: String,
}

impl RedisStore {
    pub fn new(config: &RedisConfig) -> Result<Self, CacheError> {
        Ok(Self::with_cache(RedisCache::new(config)?, config.key_prefix.clone()))
    }

    pub fn with_cache(cache: RedisCache, key_prefix: impl Into<String>) -> Self {
        Self {
            cache,
            key_prefix: key_prefix.into(),
        }
    }

    fn key(&self, token: &str) -> String {
        format!("{}{}", self.key_prefix, token)
    }
}

#[async_trait]
impl SessionStore for RedisStore {
    async fn put(&self, token: &str, record: &SessionRecord, ttl: Duration) -> StoreResult<()> {
        if ttl.is_zero() {
            return self.delete(token).await;
        }
        self.cache.set_json_px(&self.key(token), record, ttl).await?;
        Ok(())
    }

    async fn get(&self, token: &str) -> StoreResult<Option<SessionRecord>> {
        Ok(self.cache.get_json(&self.key(token)).await?)
    }

    async fn delete(&self, token: &str) -> StoreResult<()> {
        self.cache.delete(&self.key(token)).await?;
        Ok(())
    }

    async fn replace(
        &self,
        old_token: &str,
        new_token: &str,
        record: &SessionRecord,
        ttl: Duration,
    ) -> StoreResult<bool> {
        if ttl.is_zero() {
            self.delete(old_token).await?;
            return Ok(false);
        }
        Ok(self
            .cache
            .replace_json_px(&self.key(old_token), &self.key(new_token), record, ttl)
            .await?)
    }

    async fn ping(&self) -> StoreResult<()> {
        self.cache.ping().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use serde_json::json;
    use tokio::net::TcpListener;

    async fn unreachable_store() -> RedisStore {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        RedisStore::new(&RedisConfig {
            port,
            timeout: Duration::from_millis(200),
            ..RedisConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_key_prefix() {
        let store = RedisStore::new(&RedisConfig::default()).unwrap();
        assert_eq!(store.key("abc"), "session:abc");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_unavailable() {
        let store = unreachable_store().await;
        let claims = json!({"username": "alice"}).as_object().cloned().unwrap();
        let record = SessionRecord::new(claims, common::time::now(), Duration::from_secs(60));

        assert!(matches!(
            store.put("t1", &record, Duration::from_secs(60)).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(matches!(store.get("t1").await, Err(StoreError::Unavailable(_))));
        assert!(matches!(store.delete("t1").await, Err(StoreError::Unavailable(_))));
        assert!(matches!(store.ping().await, Err(StoreError::Unavailable(_))));
    }
}
