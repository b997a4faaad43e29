//! Request interceptor tests driven through an actix-web test service.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use actix_web::{http::header, http::StatusCode, test, web, App, HttpResponse};
use authz::{AuthBackend, AuthMiddleware, AuthSettings, CurrentSession, Store};
use serde_json::{json, Value};

fn backend() -> Arc<AuthBackend> {
    Arc::new(AuthBackend::new(&AuthSettings::hs256("middleware-secret").unwrap(), Store::memory()))
}

async fn whoami(session: CurrentSession) -> HttpResponse {
    HttpResponse::Ok().json(session.identity)
}

macro_rules! app {
    ($backend:expr, $hits:expr) => {{
        let hits = $hits.clone();
        test::init_service(
            App::new()
                .wrap(AuthMiddleware::new($backend.clone()).exclude(["/health", "/public/*"]))
                .route(
                    "/health",
                    web::get().to(|| async { HttpResponse::Ok().body("ok") }),
                )
                .route(
                    "/public/info",
                    web::get().to(|| async { HttpResponse::Ok().body("public") }),
                )
                .route("/me", web::get().to(whoami))
                .route(
                    "/counted",
                    web::get().to(move || {
                        let hits = hits.clone();
                        async move {
                            hits.fetch_add(1, Ordering::SeqCst);
                            HttpResponse::Ok().finish()
                        }
                    }),
                ),
        )
        .await
    }};
}

fn bearer(token: &str) -> (header::HeaderName, String) {
    (header::AUTHORIZATION, format!("Bearer {}", token))
}

#[actix_web::test]
async fn test_excluded_paths_need_no_token() {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = app!(backend(), hits);

    let res = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = test::call_service(&app, test::TestRequest::get().uri("/public/info").to_request()).await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[actix_web::test]
async fn test_excluded_path_ignores_bad_token() {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = app!(backend(), hits);

    let req = test::TestRequest::get()
        .uri("/health")
        .insert_header(bearer("garbage"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
}

#[actix_web::test]
async fn test_missing_token_is_rejected_before_handler() {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = app!(backend(), hits);

    let res = test::call_service(&app, test::TestRequest::get().uri("/counted").to_request()).await;

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(res.headers().get(header::WWW_AUTHENTICATE).unwrap(), "Bearer");
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    let body: Value = test::read_body_json(res).await;
    assert_eq!(body, json!({"error": "Unauthorized"}));
}

#[actix_web::test]
async fn test_invalid_token_is_rejected_before_handler() {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = app!(backend(), hits);

    let req = test::TestRequest::get()
        .uri("/counted")
        .insert_header(bearer("not.a.token"))
        .to_request();
    let res = test::call_service(&app, req).await;

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[actix_web::test]
async fn test_valid_token_attaches_identity() {
    let backend = backend();
    let hits = Arc::new(AtomicUsize::new(0));
    let app = app!(backend, hits);

    let token = backend
        .create_token(&json!({"username": "alice", "roles": ["admin"]}), None)
        .await
        .unwrap();

    let req = test::TestRequest::get().uri("/me").insert_header(bearer(&token)).to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body, json!({"username": "alice", "roles": ["admin"]}));

    let req = test::TestRequest::get().uri("/counted").insert_header(bearer(&token)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[actix_web::test]
async fn test_revoked_token_is_rejected() {
    let backend = backend();
    let hits = Arc::new(AtomicUsize::new(0));
    let app = app!(backend, hits);

    let token = backend.create_token(&json!({"username": "alice"}), None).await.unwrap();
    backend.invalidate_token(&token).await;

    let req = test::TestRequest::get().uri("/counted").insert_header(bearer(&token)).to_request();
    let res = test::call_service(&app, req).await;

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[actix_web::test]
async fn test_expired_session_is_rejected() {
    let backend = backend();
    let hits = Arc::new(AtomicUsize::new(0));
    let app = app!(backend, hits);

    let token = backend
        .create_token(&json!({"username": "alice"}), Some(Duration::from_millis(30)))
        .await
        .unwrap();
    actix_web::rt::time::sleep(Duration::from_millis(60)).await;

    let req = test::TestRequest::get().uri("/me").insert_header(bearer(&token)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
}
