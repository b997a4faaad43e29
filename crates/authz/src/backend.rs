use std::time::Duration;

use common::{ConfigError, StorageConfig};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AuthError, JwtError, StoreError};
use crate::jwt::{ClaimsMap, JwtCodec};
use crate::settings::AuthSettings;
use crate::store::{SessionRecord, SessionStore, Store};

/// The authenticated caller, exactly as the claims were handed to
/// [`AuthBackend::create_token`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(ClaimsMap);

impl Identity {
    pub fn new(claims: ClaimsMap) -> Self {
        Self(claims)
    }

    pub fn claims(&self) -> &ClaimsMap {
        &self.0
    }

    pub fn into_claims(self) -> ClaimsMap {
        self.0
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Reads the claims back into the application's user type.
    pub fn to_user<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.0.clone()))
    }
}

/// A freshly issued token and the lifetime of its session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    pub lifetime: Duration,
}

/// Issues, validates, refreshes and revokes session tokens.
///
/// The store is authoritative: a token with a good signature and a future
/// `exp` is still rejected once its session record is gone. Every
/// validation failure is reported as [`AuthError::Unauthenticated`]; the
/// finer reason only reaches the logs.
#[derive(Clone)]
pub struct AuthBackend {
    codec: JwtCodec,
    store: Store,
    expiration: Duration,
}

impl AuthBackend {
    pub fn new(settings: &AuthSettings, store: Store) -> Self {
        Self {
            codec: JwtCodec::new(settings),
            store,
            expiration: settings.expiration(),
        }
    }

    pub async fn from_config(settings: &AuthSettings, storage: &StorageConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(settings, Store::from_config(storage).await?))
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn default_expiration(&self) -> Duration {
        self.expiration
    }

    /// Signs `claims` and records the session. `expiration` defaults to the
    /// configured lifetime.
    ///
    /// Fails if the claims are not a JSON object or the session could not be
    /// stored; a token is only returned once it can be validated.
    pub async fn create_token<C>(&self, claims: &C, expiration: Option<Duration>) -> Result<String, AuthError>
    where
        C: Serialize + ?Sized,
    {
        let claims = match serde_json::to_value(claims) {
            Ok(Value::Object(map)) => map,
            _ => return Err(JwtError::InvalidClaims.into()),
        };
        let expiration = expiration.unwrap_or(self.expiration);

        let token = self.codec.encode(&claims, expiration)?;
        let record = SessionRecord::new(claims, common::time::now(), expiration);

        if let Err(e) = self.store.put(&token, &record, expiration).await {
            tracing::error!("Failed to store session on {} store: {}", self.store.name(), e);
            return Err(e.into());
        }

        tracing::debug!("Issued session token expiring at {}", record.expires_at);
        Ok(token)
    }

    pub async fn validate_token(&self, token: &str) -> Result<Identity, AuthError> {
        let record = self.session(token).await?;
        Ok(Identity::new(record.claims))
    }

    /// Revokes `token`. Never fails from the caller's point of view; a store
    /// outage is logged for operators.
    pub async fn invalidate_token(&self, token: &str) {
        match self.store.delete(token).await {
            Ok(()) => tracing::debug!("Session invalidated"),
            Err(e) => tracing::error!("Failed to invalidate session on {} store: {}", self.store.name(), e),
        }
    }

    /// Swaps `token` for a fresh one carrying the same claims and the same
    /// lifetime as the original session. The old token is revoked.
    pub async fn refresh_token(&self, token: &str) -> Result<String, AuthError> {
        Ok(self.refresh_session(token).await?.token)
    }

    /// [`refresh_token`](Self::refresh_token), also reporting the lifetime
    /// of the new session.
    ///
    /// Fails if the session was revoked or rotated by someone else between
    /// the lookup and the swap; only one concurrent refresh of a token wins.
    pub async fn refresh_session(&self, token: &str) -> Result<IssuedToken, AuthError> {
        let record = self.session(token).await?;
        let lifetime = record.lifetime();

        let new_token = self.codec.encode(&record.claims, lifetime).map_err(|e| {
            tracing::error!("Failed to sign refreshed token: {}", e);
            AuthError::Unauthenticated
        })?;
        let new_record = SessionRecord::new(record.claims, common::time::now(), lifetime);

        let swapped = self
            .store
            .replace(token, &new_token, &new_record, lifetime)
            .await
            .map_err(|e| {
                tracing::error!("Failed to rotate session on {} store: {}", self.store.name(), e);
                AuthError::Unauthenticated
            })?;
        if !swapped {
            tracing::debug!("Session ended before it could be rotated");
            return Err(AuthError::Unauthenticated);
        }

        tracing::debug!("Session rotated, new expiry {}", new_record.expires_at);
        Ok(IssuedToken {
            token: new_token,
            lifetime,
        })
    }

    /// Store round trip for readiness checks.
    pub async fn health(&self) -> Result<(), StoreError> {
        self.store.ping().await
    }

    // Signature and expiry first so garbage never costs a store round trip
    async fn session(&self, token: &str) -> Result<SessionRecord, AuthError> {
        if let Err(e) = self.codec.decode(token) {
            tracing::debug!("Rejected token: {}", e);
            return Err(AuthError::Unauthenticated);
        }

        match self.store.get(token).await {
            Ok(Some(record)) => Ok(record),
            Ok(None) => {
                tracing::debug!("No active session for token");
                Err(AuthError::Unauthenticated)
            }
            Err(e) => {
                tracing::error!("Session lookup failed on {} store: {}", self.store.name(), e);
                Err(AuthError::Unauthenticated)
            }
        }
    }
}

impl std::fmt::Debug for AuthBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthBackend")
            .field("algorithm", &self.codec.algorithm())
            .field("store", &self.store)
            .field("expiration", &self.expiration)
            .finish()
    }
}
