//! Security Middleware Module
//!
//! Axum middleware that attaches the caller's [`Identity`] and hardens
//! responses with security headers.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderName, HeaderValue, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

use crate::api::app_state::AppState;
use crate::error::AppError;
use crate::security::auth::bearer_token;
use crate::security::identity::Identity;

/// Extension trait for reading the caller's identity from a request
pub trait RequestIdentityExt {
    fn identity(&self) -> Option<&Identity>;
    fn set_identity(&mut self, identity: Identity);
}

impl RequestIdentityExt for Request<Body> {
    fn identity(&self) -> Option<&Identity> {
        self.extensions().get::<Identity>()
    }

    fn set_identity(&mut self, identity: Identity) {
        self.extensions_mut().insert(identity);
    }
}

/// Identity extraction middleware.
///
/// A missing `Authorization` header leaves the request anonymous. A header
/// that is present but not a valid Bearer token is rejected with 401.
pub async fn identity_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let authorization = req.headers().get(header::AUTHORIZATION).map(|value| {
        value
            .to_str()
            .ok()
            .and_then(bearer_token)
            .map(str::to_string)
    });

    let token = match authorization {
        None => return next.run(req).await,
        Some(Some(token)) => token,
        Some(None) => {
            return AppError::Authentication("Expected a Bearer token".to_string())
                .into_response();
        }
    };

    match state.verifier.identity(&token) {
        Ok(identity) => {
            debug!(user_id = %identity, "Request authenticated");
            req.set_identity(identity);
            next.run(req).await
        }
        Err(e) => e.into_response(),
    }
}

const SECURITY_HEADERS: [(&str, &str); 5] = [
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "DENY"),
    ("strict-transport-security", "max-age=31536000; includeSubDomains"),
    ("referrer-policy", "strict-origin-when-cross-origin"),
    ("cache-control", "no-store"),
];

/// Security headers middleware
pub async fn security_headers_middleware(req: Request<Body>, next: Next) -> Response {
    let mut response = next.run(req).await;

    let headers = response.headers_mut();
    for (name, value) in SECURITY_HEADERS {
        headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
    }

    response
}
