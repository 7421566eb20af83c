//! HTTP basic auth.

use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use webui_core::error::CoreError;

use crate::config::Credentials;
use crate::error::AppError;
use crate::state::AppState;

/// The user a request was authenticated as. `None` when auth is disabled.
///
/// ```ignore
/// async fn my_handler(RequestUser(user): RequestUser) -> AppResult<Json<()>> {
///     tracing::info!(user = user.as_deref(), "handling request");
///     Ok(Json(()))
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestUser(pub Option<String>);

impl<S: Send + Sync> FromRequestParts<S> for RequestUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestUser>()
            .cloned()
            .unwrap_or_default())
    }
}

/// Reject requests without valid credentials when `--gradio-auth` is set,
/// and attach the [`RequestUser`] otherwise.
pub async fn require_basic_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = if state.config.auth.is_empty() {
        None
    } else {
        let header = request
            .headers()
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AppError::Core(CoreError::Unauthorized(
                    "Missing Authorization header".into(),
                ))
            })?;
        Some(check_basic(header, &state.config.auth)?)
    };

    request.extensions_mut().insert(RequestUser(user));
    Ok(next.run(request).await)
}

/// Validate a `Basic <base64(user:pass)>` header. Returns the username.
fn check_basic(header: &str, allowed: &[Credentials]) -> Result<String, AppError> {
    let invalid = || AppError::Core(CoreError::Unauthorized("Invalid credentials".into()));

    let encoded = header.strip_prefix("Basic ").ok_or_else(|| {
        AppError::Core(CoreError::Unauthorized(
            "Invalid Authorization format. Expected: Basic <credentials>".into(),
        ))
    })?;
    let decoded = STANDARD.decode(encoded.trim()).map_err(|_| invalid())?;
    let decoded = String::from_utf8(decoded).map_err(|_| invalid())?;
    let (username, password) = decoded.split_once(':').ok_or_else(invalid)?;

    allowed
        .iter()
        .find(|c| c.username == username && c.password == password)
        .map(|c| c.username.clone())
        .ok_or_else(invalid)
}
