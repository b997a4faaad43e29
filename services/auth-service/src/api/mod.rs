pub mod handlers;
pub mod routes;

/// Paths reachable without a bearer token.
pub const PUBLIC_PATHS: [&str; 2] = ["/api/auth/health", "/api/auth/login"];
