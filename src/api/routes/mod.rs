//! Routes 模块
//!
//! 定义 API 路由。

pub mod login_routes;
pub mod rate_limit_routes;
pub mod role_routes;
