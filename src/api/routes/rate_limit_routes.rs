//! Rate Limit Routes
//!
//! 定义限流相关的 API 路由。

use crate::api::handlers::rate_limit_handler::*;
use axum::{
    Router,
    routing::{get, post},
};

use crate::api::app_state::AppState;

/// 创建限流路由器
pub fn create_rate_limit_router() -> Router<AppState> {
    Router::new()
        .route("/rate-limit/check", post(check_limit))
        .route("/rate-limit/info", get(get_limit_info))
}
