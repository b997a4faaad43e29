use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use super::{SessionRecord, SessionStore, StoreResult};

// Cap for TTLs the monotonic clock cannot represent
const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

#[derive(Clone)]
struct Entry {
    record: SessionRecord,
    deadline: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.deadline <= now
    }
}

/// In-process session store.
///
/// Sessions live in a sharded map, so requests only contend when their
/// tokens hash to the same shard. Expired entries are dropped when read or
/// by [`purge_expired`](Self::purge_expired). Clones share the same map.
#[derive(Clone, Default)]
pub struct MemoryStore {
    sessions: Arc<DashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes every expired session and returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.sessions.len())
    }

    /// Number of stored sessions, expired ones not yet purged included.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn put(&self, token: &str, record: &SessionRecord, ttl: Duration) -> StoreResult<()> {
        if ttl.is_zero() {
            self.sessions.remove(token);
            return Ok(());
        }

        let now = Instant::now();
        let deadline = now.checked_add(ttl).unwrap_or(now + MAX_TTL);
        let entry = Entry {
            record: record.clone(),
            deadline,
        };
        self.sessions.insert(token.to_string(), entry);
        Ok(())
    }

    async fn get(&self, token: &str) -> StoreResult<Option<SessionRecord>> {
        let now = Instant::now();
        let found = self.sessions.get(token).map(|entry| entry.clone());

        match found {
            Some(entry) if !entry.is_expired(now) => Ok(Some(entry.record)),
            Some(_) => {
                // A concurrent put may have refreshed it since; only drop stale
                self.sessions.remove_if(token, |_, entry| entry.is_expired(now));
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, token: &str) -> StoreResult<()> {
        self.sessions.remove(token);
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
            self.sessions.remove(old_token);
            return Ok(false);
        }
        if old_token == new_token {
            let live = self.get(old_token).await?.is_some();
            if live {
                self.put(new_token, record, ttl).await?;
            }
            return Ok(live);
        }

        // New first so the session is never missing; the removal decides who won
        self.put(new_token, record, ttl).await?;
        match self.sessions.remove(old_token) {
            Some((_, entry)) if !entry.is_expired(Instant::now()) => Ok(true),
            _ => {
                self.sessions.remove(new_token);
                Ok(false)
            }
        }
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
