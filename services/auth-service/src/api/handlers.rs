use std::time::Duration;

use actix_web::{web, HttpResponse, Responder};
use authz::{AuthBackend, AuthError, CurrentSession, StoreError};
use serde::Serialize;

use crate::domain::{LoginRequest, TokenResponse};

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    store: &'static str,
}

pub async fn health_check(backend: web::Data<AuthBackend>) -> impl Responder {
    let store = backend.store().name();

    match backend.health().await {
        Ok(()) => HttpResponse::Ok().json(HealthResponse {
            status: "ok",
            service: "auth-service",
            store,
        }),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            HttpResponse::ServiceUnavailable().json(HealthResponse {
                status: "degraded",
                service: "auth-service",
                store,
            })
        }
    }
}

pub async fn login(
    backend: web::Data<AuthBackend>,
    request: web::Json<LoginRequest>,
) -> impl Responder {
    let LoginRequest { user, expires_in } = request.into_inner();

    if let Err(reason) = user.validate() {
        return HttpResponse::BadRequest().json(serde_json::json!({ "error": reason }));
    }

    let max = backend.default_expiration();
    let expiration = match expires_in {
        None => max,
        Some(secs) if secs == 0 || secs > max.as_secs() => {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": format!("expires_in must be between 1 and {} seconds", max.as_secs())
            }));
        }
        Some(secs) => Duration::from_secs(secs),
    };

    match backend.create_token(&user, Some(expiration)).await {
        Ok(token) => {
            tracing::info!("Issued session for {}", user.username);
            HttpResponse::Ok().json(TokenResponse::bearer(token, expiration.as_secs()))
        }
        Err(AuthError::Store(StoreError::Unavailable(e))) => {
            tracing::error!("Login failed, session store unavailable: {}", e);
            HttpResponse::ServiceUnavailable().json(serde_json::json!({
                "error": "Login temporarily unavailable"
            }))
        }
        Err(e) => {
            tracing::error!("Login error: {}", e);
            HttpResponse::InternalServerError().json(serde_json::json!({ "error": "Login failed" }))
        }
    }
}

pub async fn logout(backend: web::Data<AuthBackend>, session: CurrentSession) -> impl Responder {
    backend.invalidate_token(&session.token).await;
    HttpResponse::NoContent().finish()
}

pub async fn refresh(backend: web::Data<AuthBackend>, session: CurrentSession) -> impl Responder {
    match backend.refresh_session(&session.token).await {
        Ok(issued) => HttpResponse::Ok().json(TokenResponse::bearer(issued.token, issued.lifetime.as_secs())),
        Err(AuthError::Unauthenticated) => {
            HttpResponse::Unauthorized().json(serde_json::json!({ "error": "Unauthorized" }))
        }
        Err(e) => {
            tracing::error!("Refresh error: {}", e);
            HttpResponse::ServiceUnavailable().finish()
        }
    }
}

pub async fn me(session: CurrentSession) -> impl Responder {
    HttpResponse::Ok().json(session.identity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{routes, PUBLIC_PATHS};
    use actix_web::{http::header, http::StatusCode, test, App};
    use authz::{AuthMiddleware, AuthSettings, Store};
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn backend() -> Arc<AuthBackend> {
        Arc::new(AuthBackend::new(&AuthSettings::hs256("handler-secret").unwrap(), Store::memory()))
    }

    macro_rules! app {
        ($backend:expr) => {
            test::init_service(
                App::new()
                    .wrap(AuthMiddleware::new($backend.clone()).exclude(PUBLIC_PATHS))
                    .app_data(web::Data::from($backend.clone()))
                    .configure(routes::configure),
            )
            .await
        };
    }

    fn bearer(token: &str) -> (header::HeaderName, String) {
        (header::AUTHORIZATION, format!("Bearer {}", token))
    }

    #[actix_web::test]
    async fn test_health_is_public() {
        let backend = backend();
        let app = app!(backend);

        let req = test::TestRequest::get().uri("/api/auth/health").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["status"], "ok");
        assert_eq!(body["store"], "memory");
    }

    #[actix_web::test]
    async fn test_login_me_logout() {
        let backend = backend();
        let app = app!(backend);

        let req = test::TestRequest::post()
            .uri("/api/auth/login")
            .set_json(json!({"username": "alice", "team": "core"}))
            .to_request();
        let login: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(login["token_type"], "Bearer");
        assert_eq!(login["expires_in"], 3600);
        let token = login["token"].as_str().unwrap().to_string();

        let req = test::TestRequest::get()
            .uri("/api/auth/me")
            .insert_header(bearer(&token))
            .to_request();
        let me: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(me, json!({"username": "alice", "team": "core"}));

        let req = test::TestRequest::post()
            .uri("/api/auth/logout")
            .insert_header(bearer(&token))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);

        let req = test::TestRequest::get()
            .uri("/api/auth/me")
            .insert_header(bearer(&token))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn test_login_rejects_blank_username() {
        let backend = backend();
        let app = app!(backend);

        let req = test::TestRequest::post()
            .uri("/api/auth/login")
            .set_json(json!({"username": "  "}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_login_rejects_out_of_range_lifetime() {
        let backend = backend();
        let app = app!(backend);

        for expires_in in [json!(18446744073709551615u64), json!(3601), json!(0)] {
            let req = test::TestRequest::post()
                .uri("/api/auth/login")
                .set_json(json!({"username": "alice", "expires_in": expires_in}))
                .to_request();
            let res = test::call_service(&app, req).await;
            assert_eq!(res.status(), StatusCode::BAD_REQUEST, "expires_in = {}", expires_in);
        }
        assert!(backend.store().as_memory().unwrap().is_empty());
    }

    #[actix_web::test]
    async fn test_refresh_rotates_token() {
        let backend = backend();
        let app = app!(backend);

        let req = test::TestRequest::post()
            .uri("/api/auth/login")
            .set_json(json!({"username": "bob", "expires_in": 120}))
            .to_request();
        let login: Value = test::call_and_read_body_json(&app, req).await;
        let old = login["token"].as_str().unwrap().to_string();

        let req = test::TestRequest::post()
            .uri("/api/auth/refresh")
            .insert_header(bearer(&old))
            .to_request();
        let refreshed: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(refreshed["expires_in"], 120);
        let new = refreshed["token"].as_str().unwrap();
        assert_ne!(new, old);

        assert!(backend.validate_token(new).await.is_ok());
        assert!(backend.validate_token(&old).await.is_err());
    }

    #[actix_web::test]
    async fn test_protected_routes_need_token() {
        let backend = backend();
        let app = app!(backend);

        for (method, uri) in [("GET", "/api/auth/me"), ("POST", "/api/auth/logout"), ("POST", "/api/auth/refresh")] {
            let req = match method {
                "GET" => test::TestRequest::get(),
                _ => test::TestRequest::post(),
            }
            .uri(uri)
            .to_request();
            assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
        }
    }
}
