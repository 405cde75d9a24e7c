//! API Middleware
//!
//! Bearer-token authentication, client-context extraction, and request
//! logging.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use crate::domain::ClientContext;
use crate::error::AppError;
use crate::store::Store;

use super::AppState;

/// Identity of the verified caller, extracted from the access token.
#[derive(Debug, Clone)]
pub struct AuthenticatedAccount {
    pub account_id: Uuid,
    pub email: String,
    pub display_name: String,
}

/// Build the client context from transport headers. Applied to every
/// route, authenticated or not, so even a refresh call carries the
/// originating address for revocation stamping.
pub async fn context_middleware(mut request: Request<Body>, next: Next) -> Response {
    let context = client_context(request.headers());
    request.extensions_mut().insert(context);
    next.run(request).await
}

fn client_context(headers: &HeaderMap) -> ClientContext {
    let mut context = ClientContext::new();

    if let Some(addr) = headers
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        context = context.with_client_addr(addr);
    }

    if let Some(correlation_id) = headers
        .get("X-Correlation-Id")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
    {
        context = context.with_correlation_id(correlation_id);
    }
    context.ensure_correlation_id();

    context
}

/// Verify the `Authorization: Bearer` access token and expose the claims
/// as an [`AuthenticatedAccount`] extension. Stateless by design: no
/// store round-trip per request.
pub async fn auth_middleware<S: Store>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    let token = match bearer_token(&headers) {
        Some(token) => token,
        None => return Err(AppError::Unauthenticated.into_response()),
    };

    let claims = state
        .tokens
        .validate_access(token)
        .map_err(|e| AppError::from(e).into_response())?;

    request.extensions_mut().insert(AuthenticatedAccount {
        account_id: claims.sub,
        email: claims.email,
        display_name: claims.name,
    });

    Ok(next.run(request).await)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Headers that should be masked in logs
const SENSITIVE_HEADERS: &[&str] = &["authorization", "cookie", "set-cookie"];

/// Mask sensitive headers for logging
pub fn mask_headers_for_logging(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let name_lower = name.as_str().to_lowercase();
            let masked_value = if SENSITIVE_HEADERS.contains(&name_lower.as_str()) {
                "[REDACTED]".to_string()
            } else {
                value.to_str().unwrap_or("[invalid utf8]").to_string()
            };
            (name.to_string(), masked_value)
        })
        .collect()
}

/// Request logging middleware
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    let headers = mask_headers_for_logging(request.headers());

    let correlation_id = request
        .extensions()
        .get::<ClientContext>()
        .and_then(|ctx| ctx.correlation_id);

    let start = std::time::Instant::now();

    tracing::info!(
        method = %method,
        uri = %uri,
        correlation_id = ?correlation_id,
        headers = ?headers,
        "Incoming request"
    );

    let response = next.run(request).await;

    let duration = start.elapsed();
    let status = response.status();

    tracing::info!(
        method = %method,
        uri = %uri,
        status = %status,
        duration_ms = %duration.as_millis(),
        correlation_id = ?correlation_id,
        "Request completed"
    );

    response
}
