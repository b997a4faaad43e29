use std::env;
use std::time::Duration;

use common::config::parse_var;
use common::ConfigError;
use jsonwebtoken::Algorithm;

pub const DEFAULT_EXPIRATION: Duration = Duration::from_secs(3600);

/// HMAC algorithms the token codec can sign and verify with a shared secret.
pub const SUPPORTED_ALGORITHMS: [Algorithm; 3] = [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

/// Process-wide authentication settings, immutable once built.
#[derive(Clone)]
pub struct AuthSettings {
    secret: String,
    algorithm: Algorithm,
    expiration: Duration,
}

impl AuthSettings {
    pub fn new(
        secret: impl Into<String>,
        algorithm: Algorithm,
        expiration: Duration,
    ) -> Result<Self, ConfigError> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(ConfigError::EmptySecret);
        }
        if !SUPPORTED_ALGORITHMS.contains(&algorithm) {
            return Err(ConfigError::UnsupportedAlgorithm(format!("{:?}", algorithm)));
        }

        Ok(Self {
            secret,
            algorithm,
            expiration,
        })
    }

    /// HS256 with the default one hour expiration.
    pub fn hs256(secret: impl Into<String>) -> Result<Self, ConfigError> {
        Self::new(secret, Algorithm::HS256, DEFAULT_EXPIRATION)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let secret = env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET".to_string()))?;
        let algorithm = match env::var("JWT_ALGORITHM") {
            Ok(name) => parse_algorithm(&name)?,
            Err(_) => Algorithm::HS256,
        };
        let expiration = Duration::from_secs(parse_var("JWT_EXPIRATION_SECONDS", DEFAULT_EXPIRATION.as_secs())?);

        Self::new(secret, algorithm, expiration)
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn expiration(&self) -> Duration {
        self.expiration
    }
}

// Keep the secret out of logs
impl std::fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSettings")
            .field("secret", &"<redacted>")
            .field("algorithm", &self.algorithm)
            .field("expiration", &self.expiration)
            .finish()
    }
}

pub fn parse_algorithm(name: &str) -> Result<Algorithm, ConfigError> {
    match name.trim().to_ascii_uppercase().as_str() {
        "HS256" => Ok(Algorithm::HS256),
        "HS384" => Ok(Algorithm::HS384),
        "HS512" => Ok(Algorithm::HS512),
        _ => Err(ConfigError::UnsupportedAlgorithm(name.to_string())),
    }
}
