//! Login Attempt Routes

use crate::api::handlers::login_handler::record_login_attempt;
use axum::{Router, routing::post};

use crate::api::app_state::AppState;

/// 创建登录上报路由器
pub fn create_login_router() -> Router<AppState> {
    Router::new().route("/security/login-attempts", post(record_login_attempt))
}
