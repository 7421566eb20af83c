//! Integration tests for HTTP basic auth (`--gradio-auth`).

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use common::{body_json, get};
use tower::ServiceExt;
use webui_api::config::Credentials;

fn app_with_auth() -> common::TestApp {
    let mut config = common::test_config();
    config.auth = vec![Credentials {
        username: "alice".to_string(),
        password: "s3cret".to_string(),
    }];
    common::build_test_app_with(config)
}

async fn get_with_auth(app: axum::Router, uri: &str, credentials: &str) -> axum::http::Response<Body> {
    app.oneshot(
        Request::get(uri)
            .header("authorization", format!("Basic {}", STANDARD.encode(credentials)))
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap()
}

// ---------------------------------------------------------------------------
// Test: protected routes require credentials
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_credentials_are_rejected() {
    let app = app_with_auth();
    let response = get(app.router, "/internal/ping").await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key("www-authenticate"));
    assert_eq!(body_json(response).await["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn wrong_password_is_rejected() {
    let app = app_with_auth();
    let response = get_with_auth(app.router, "/internal/ping", "alice:wrong").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn valid_credentials_pass() {
    let app = app_with_auth();
    let response = get_with_auth(app.router, "/internal/ping", "alice:s3cret").await;
    assert_eq!(response.status(), StatusCode::OK);
}

// ---------------------------------------------------------------------------
// Test: health stays public
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_is_public() {
    let app = app_with_auth();
    let response = get(app.router, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);
}

// ---------------------------------------------------------------------------
// Test: without --gradio-auth everything is open
// ---------------------------------------------------------------------------

#[tokio::test]
async fn no_auth_configured_is_open() {
    let app = common::build_test_app();
    let response = get(app.router, "/internal/ping").await;
    assert_eq!(response.status(), StatusCode::OK);
}
