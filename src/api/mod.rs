//! API 模块
//!
//! 提供 REST API 支持。

#[cfg(test)]
mod api_tests;
pub mod app_state;
pub mod dto;
pub mod handlers;
pub mod routes;

use crate::api::app_state::AppState;
use crate::observability::metrics_middleware;
use crate::security::middleware::{identity_middleware, security_headers_middleware};
use axum::Router;

pub fn create_router(app_state: AppState) -> Router {
    let api = Router::new()
        .merge(routes::rate_limit_routes::create_rate_limit_router())
        .merge(routes::role_routes::create_role_router())
        .merge(routes::login_routes::create_login_router())
        .layer(axum::middleware::from_fn_with_state(
            app_state.clone(),
            identity_middleware,
        ));

    Router::new()
        .nest("/api/v1", api)
        .layer(axum::middleware::from_fn(security_headers_middleware))
        .layer(axum::middleware::from_fn_with_state(
            app_state.metrics.clone(),
            metrics_middleware,
        ))
        .with_state(app_state)
}
