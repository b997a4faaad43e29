use std::time::Duration;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::JwtError;
use crate::settings::AuthSettings;

/// Application-defined identity fields carried by a token.
pub type ClaimsMap = Map<String, Value>;

/// Claim names the codec manages itself.
pub const RESERVED_CLAIMS: [&str; 3] = ["iat", "exp", "jti"];

/// Decoded token payload: caller claims plus the codec's bookkeeping.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TokenClaims {
    #[serde(flatten)]
    pub claims: ClaimsMap,
    pub iat: i64, // issued at, unix seconds
    pub exp: i64, // expiration, unix seconds
    pub jti: String,
}

/// Signs and verifies tokens with the configured shared secret.
#[derive(Clone)]
pub struct JwtCodec {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtCodec {
    pub fn new(settings: &AuthSettings) -> Self {
        let secret = settings.secret().as_bytes();
        Self {
            algorithm: settings.algorithm(),
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Signs `claims` into a token expiring `expiration` from now.
    pub fn encode(&self, claims: &ClaimsMap, expiration: Duration) -> Result<String, JwtError> {
        let iat = common::time::timestamp();
        let lifetime = i64::try_from(expiration.as_secs()).unwrap_or(i64::MAX);

        let mut embedded = claims.clone();
        for name in RESERVED_CLAIMS {
            embedded.remove(name);
        }

        let payload = TokenClaims {
            claims: embedded,
            iat,
            exp: iat.saturating_add(lifetime),
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::new(self.algorithm), &payload, &self.encoding_key)
            .map_err(|e| JwtError::Encoding(e.to_string()))
    }

    /// Verifies signature and expiry, returning the embedded payload.
    pub fn decode(&self, token: &str) -> Result<TokenClaims, JwtError> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        let token_data = decode::<TokenClaims>(token, &self.decoding_key, &validation).map_err(
            |e| match e.kind() {
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => JwtError::InvalidSignature,
                ErrorKind::ExpiredSignature => JwtError::Expired,
                _ => JwtError::Malformed(e.to_string()),
            },
        )?;

        Ok(token_data.claims)
    }
}
