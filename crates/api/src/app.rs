//! Router assembly shared by the binary and the integration tests.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderName, StatusCode};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::compression::CompressionLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::middleware::auth::require_basic_auth;
use crate::middleware::cors::build_cors_layer;
use crate::routes;
use crate::state::AppState;

/// Full application: routes, auth, and the middleware stack.
pub fn build_app(state: AppState) -> Router {
    let config = Arc::clone(&state.config);

    let protected = routes::app_routes(&config).route_layer(axum::middleware::from_fn_with_state(
        state.clone(),
        require_basic_auth,
    ));

    let routes = Router::new()
        .merge(routes::health::router())
        .merge(protected);

    let routes = if config.root_path.is_empty() {
        routes
    } else {
        Router::new().nest(&config.root_path, routes)
    };

    let request_id_header = HeaderName::from_static("x-request-id");

    // -- Middleware stack (applied bottom-up) --
    let mut app = routes
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.request_timeout_secs),
        ))
        .layer(CompressionLayer::new())
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid));

    if let Some(cors) = build_cors_layer(&config) {
        app = app.layer(cors);
    }

    app.with_state(state)
}
