//! Handlers 模块
//!
//! HTTP 请求处理程序。

pub mod login_handler;
pub mod rate_limit_handler;
pub mod role_handler;

pub use login_handler::*;
pub use rate_limit_handler::*;
pub use role_handler::*;
