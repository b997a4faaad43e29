use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    http::header,
    Error, FromRequest, HttpMessage, HttpRequest, HttpResponse,
};
use futures_util::future::LocalBoxFuture;
use std::future::{ready, Ready};
use std::rc::Rc;
use std::sync::Arc;

use crate::backend::{AuthBackend, Identity};

/// Path patterns that skip authentication.
///
/// A pattern is either an exact path (`/health`) or a prefix ending in `*`
/// (`/docs/*` matches `/docs/` and everything below it).
#[derive(Clone, Debug, Default)]
pub struct ExcludedPaths {
    exact: Vec<String>,
    prefixes: Vec<String>,
}

impl ExcludedPaths {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut paths = Self::default();
        for pattern in patterns {
            let pattern = pattern.into();
            match pattern.strip_suffix('*') {
                Some(prefix) => paths.prefixes.push(prefix.to_string()),
                None => paths.exact.push(pattern),
            }
        }
        paths
    }

    pub fn matches(&self, path: &str) -> bool {
        self.exact.iter().any(|p| p == path) || self.prefixes.iter().any(|p| path.starts_with(p.as_str()))
    }
}

/// The authenticated session of the current request.
///
/// Inserted into request extensions by [`AuthMiddleware`]; handlers take it
/// as an argument.
#[derive(Clone, Debug)]
pub struct CurrentSession {
    pub token: String,
    pub identity: Identity,
}

impl FromRequest for CurrentSession {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<CurrentSession>()
                .cloned()
                .ok_or_else(|| actix_web::error::ErrorUnauthorized("Unauthorized")),
        )
    }
}

/// Extracts the token from `Authorization: Bearer <token>`.
pub fn bearer_token(req: &HttpRequest) -> Option<String> {
    let value = req.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();

    if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
        Some(token.to_string())
    } else {
        None
    }
}

fn unauthorized() -> HttpResponse {
    HttpResponse::Unauthorized()
        .insert_header((header::WWW_AUTHENTICATE, "Bearer"))
        .json(serde_json::json!({ "error": "Unauthorized" }))
}

/// Per-request authentication gate.
///
/// Requests to excluded paths pass through untouched. Everything else needs
/// a bearer token that [`AuthBackend::validate_token`] accepts; otherwise the
/// request is answered with 401 and the wrapped service is never called.
#[derive(Clone)]
pub struct AuthMiddleware {
    backend: Arc<AuthBackend>,
    excluded: Arc<ExcludedPaths>,
}

impl AuthMiddleware {
    pub fn new(backend: Arc<AuthBackend>) -> Self {
        Self {
            backend,
            excluded: Arc::new(ExcludedPaths::default()),
        }
    }

    pub fn exclude<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded = Arc::new(ExcludedPaths::new(patterns));
        self
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = AuthMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthMiddlewareService {
            service: Rc::new(service),
            backend: self.backend.clone(),
            excluded: self.excluded.clone(),
        }))
    }
}

pub struct AuthMiddlewareService<S> {
    service: Rc<S>,
    backend: Arc<AuthBackend>,
    excluded: Arc<ExcludedPaths>,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if self.excluded.matches(req.path()) {
            let fut = self.service.call(req);
            return Box::pin(async move { Ok(fut.await?.map_into_left_body()) });
        }

        let token = match bearer_token(req.request()) {
            Some(token) => token,
            None => {
                tracing::debug!("Missing bearer token for {}", req.path());
                return Box::pin(async move { Ok(req.into_response(unauthorized()).map_into_right_body()) });
            }
        };

        let service = self.service.clone();
        let backend = self.backend.clone();

        Box::pin(async move {
            match backend.validate_token(&token).await {
                Ok(identity) => {
                    req.extensions_mut().insert(CurrentSession { token, identity });
                    let res = service.call(req).await?;
                    Ok(res.map_into_left_body())
                }
                Err(_) => {
                    tracing::debug!("Rejected request to {}", req.path());
                    Ok(req.into_response(unauthorized()).map_into_right_body())
                }
            }
        })
    }
}
