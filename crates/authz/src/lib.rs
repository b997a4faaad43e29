// JWT session authentication: token codec, session stores, backend, actix middleware
pub mod backend;
pub mod error;
pub mod jwt;
pub mod middleware;
pub mod settings;
pub mod store;

pub use backend::{AuthBackend, Identity, IssuedToken};
pub use error::{AuthError, JwtError, StoreError};
pub use jwt::{ClaimsMap, JwtCodec, TokenClaims};
pub use middleware::{AuthMiddleware, CurrentSession, ExcludedPaths};
pub use settings::AuthSettings;
pub use store::{DynamoStore, MemoryStore, RedisStore, SessionRecord, SessionStore, Store};
