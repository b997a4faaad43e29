use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use serde::{de::DeserializeOwned, Serialize};

use crate::config::RedisConfig;
use crate::errors::CacheError;

// Drops KEYS[1] and, only if it existed, writes ARGV[1] under KEYS[2] with a
// PX of ARGV[2]. Returns 1 on swap, 0 when the old key was already gone.
const REPLACE_SCRIPT: &str = r"
if redis.call('DEL', KEYS[1]) == 1 then
  redis.call('PSETEX', KEYS[2], ARGV[2], ARGV[1])
  return 1
end
return 0
";

/// Async Redis client shared by every request.
///
/// No I/O happens on construction. The multiplexed connection is opened on
/// first use and thrown away after a connection-level failure, so the next
/// command reconnects once the server is reachable again. Each call, waiting
/// for an in-flight reconnect included, is bounded by `timeout`.
#[derive(Clone)]
pub struct RedisCache {
    client: Client,
    conn: Arc<Mutex<Option<MultiplexedConnection>>>,
    // Held only while dialing, so one caller reconnects and the rest wait
    connecting: Arc<tokio::sync::Mutex<()>>,
    timeout: Duration,
}

impl RedisCache {
    pub fn new(config: &RedisConfig) -> Result<Self, CacheError> {
        let info = ConnectionInfo {
            addr: ConnectionAddr::Tcp(config.host.clone(), config.port),
            redis: RedisConnectionInfo {
                db: config.db,
                username: config.username.clone(),
                password: config.password.clone(),
                ..Default::default()
            },
        };
        let client = Client::open(info)?;

        Ok(Self {
            client,
            conn: Arc::new(Mutex::new(None)),
            connecting: Arc::new(tokio::sync::Mutex::new(())),
            timeout: config.timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn cached(&self) -> Option<MultiplexedConnection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn reset(&self) {
        self.conn.lock().unwrap_or_else(|e| e.into_inner()).take();
    }

    async fn connection(&self) -> Result<MultiplexedConnection, CacheError> {
        if let Some(conn) = self.cached() {
            return Ok(conn);
        }

        let _dialing = self.connecting.lock().await;
        // Someone else may have reconnected while we waited
        if let Some(conn) = self.cached() {
            return Ok(conn);
        }

        let conn = self.client.get_multiplexed_async_connection().await?;
        tracing::debug!("Redis connection established");
        *self.conn.lock().unwrap_or_else(|e| e.into_inner()) = Some(conn.clone());
        Ok(conn)
    }

    // Runs one command against a live connection under the configured timeout
    async fn run<T, F, Fut>(&self, op: F) -> Result<T, CacheError>
    where
        F: FnOnce(MultiplexedConnection) -> Fut,
        Fut: Future<Output = redis::RedisResult<T>>,
    {
        let attempt = async {
            let conn = self.connection().await?;
            op(conn).await.map_err(|e| {
                if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() {
                    tracing::warn!("Redis connection lost: {}", e);
                    self.reset();
                }
                CacheError::from(e)
            })
        };

        match tokio::time::timeout(self.timeout, attempt).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!("Redis call timed out after {:?}", self.timeout);
                self.reset();
                Err(CacheError::Unavailable(format!(
                    "timed out after {:?}",
                    self.timeout
                )))
            }
        }
    }

// Get cached value
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        let key = key.to_string();
        let value: Option<String> = self.run(|mut conn| async move { conn.get(key).await }).await?;

        match value {
            Some(v) => Ok(Some(serde_json::from_str(&v)?)),
            None => Ok(None),
        }
    }

    // Set cached value with a millisecond TTL
    pub async fn set_json_px<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let key = key.to_string();
        let serialized = serde_json::to_string(value)?;
        let millis = ttl_millis(ttl);

        self.run(|mut conn| async move { conn.pset_ex(key, serialized, millis).await })
            .await
    }

    /// Moves `old_key` to `new_key` with a fresh value and TTL in one atomic
    /// step. Returns `false` and writes nothing when `old_key` no longer
    /// exists.
    pub async fn replace_json_px<T: Serialize>(
        &self,
        old_key: &str,
        new_key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        let (old_key, new_key) = (old_key.to_string(), new_key.to_string());
        let serialized = serde_json::to_string(value)?;
        let millis = ttl_millis(ttl);

        let swapped: i64 = self
            .run(|mut conn| async move {
                redis::Script::new(REPLACE_SCRIPT)
                    .key(old_key)
                    .key(new_key)
                    .arg(serialized)
                    .arg(millis)
                    .invoke_async(&mut conn)
                    .await
            })
            .await?;

        Ok(swapped == 1)
    }

    // Delete cached value; deleting a missing key is not an error
    pub async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let key = key.to_string();
        self.run(|mut conn| async move { conn.del(key).await }).await
    }

    pub async fn ping(&self) -> Result<(), CacheError> {
        let pong: String = self
            .run(|mut conn| async move { redis::cmd("PING").query_async(&mut conn).await })
            .await?;

        if pong == "PONG" {
            Ok(())
        } else {
            Err(CacheError::Unavailable(format!("unexpected PING reply: {}", pong)))
        }
    }
}

// PSETEX rejects a zero expiry; callers drop the key instead.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tokio::net::TcpListener;

    fn config_for(port: u16) -> RedisConfig {
        RedisConfig {
            port,
            timeout: Duration::from_millis(200),
            ..RedisConfig::default()
        }
    }

    #[test]
    fn test_ttl_millis_never_zero() {
        assert_eq!(ttl_millis(Duration::ZERO), 1);
        assert_eq!(ttl_millis(Duration::from_secs(2)), 2_000);
        assert_eq!(ttl_millis(Duration::MAX), u64::MAX);
    }

    #[tokio::test]
    async fn test_construction_does_not_connect() {
        // Nothing listens on the discard port; construction must still succeed
        assert!(RedisCache::new(&config_for(9)).is_ok());
    }

    #[tokio::test]
    async fn test_refused_connection_is_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let cache = RedisCache::new(&config_for(port)).unwrap();
        let err = cache.get_json::<String>("missing").await.unwrap_err();
        assert!(err.is_unavailable());
    }

    async fn silent_server() -> u16 {
        // Accepts connections but never answers
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        port
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let cache = RedisCache::new(&config_for(silent_server().await)).unwrap();
        let started = Instant::now();
        let err = cache.ping().await.unwrap_err();

        assert!(err.is_unavailable());
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_concurrent_calls_do_not_queue_during_outage() {
        let cache = RedisCache::new(&config_for(silent_server().await)).unwrap();

        let mut handles = Vec::new();
        for i in 0..10 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                let started = Instant::now();
                let result = cache.get_json::<String>(&format!("key-{}", i)).await;
                (result, started.elapsed())
            }));
        }

        for handle in handles {
            let (result, elapsed) = handle.await.unwrap();
            assert!(result.unwrap_err().is_unavailable());
            // Each call gets its own 200ms budget, not a place in line
            assert!(elapsed < Duration::from_millis(600), "call took {:?}", elapsed);
        }
    }
}
