//! Role Routes

use crate::api::handlers::role_handler::resolve_role;
use axum::{Router, routing::post};

use crate::api::app_state::AppState;

/// 创建角色路由器
pub fn create_role_router() -> Router<AppState> {
    Router::new().route("/roles/resolve", post(resolve_role))
}
