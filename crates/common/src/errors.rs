use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(String),

    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    #[error("Unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Signing secret must not be empty")]
    EmptySecret,
}

impl ConfigError {
    pub fn invalid(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Failures talking to the networked key-value store.
///
/// `Unavailable` covers refused connections, dropped connections and
/// timeouts alike; callers only need to know the store could not answer.
/// `Rejected` means the server answered with an error reply to a command it
/// will never accept, such as an out-of-range expiry.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    #[error("Cache rejected command: {0}")]
    Rejected(String),

    #[error("Cache serialization error: {0}")]
    Serialization(String),
}

impl CacheError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        match err.kind() {
            redis::ErrorKind::TypeError => Self::Serialization(err.to_string()),
            redis::ErrorKind::ResponseError
            | redis::ErrorKind::ExecAbortError
            | redis::ErrorKind::NoScriptError
            | redis::ErrorKind::InvalidClientConfig => Self::Rejected(err.to_string()),
            _ => Self::Unavailable(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redis_error_classification() {
        let reply = redis::RedisError::from((
            redis::ErrorKind::ResponseError,
            "An error was signalled by the server",
            "invalid expire time in 'psetex' command".to_string(),
        ));
        assert!(matches!(CacheError::from(reply), CacheError::Rejected(_)));

        let io = redis::RedisError::from(std::io::Error::from(std::io::ErrorKind::ConnectionRefused));
        assert!(CacheError::from(io).is_unavailable());

        let parse = redis::RedisError::from((redis::ErrorKind::TypeError, "Response was of incompatible type"));
        assert!(matches!(CacheError::from(parse), CacheError::Serialization(_)));
    }
}
