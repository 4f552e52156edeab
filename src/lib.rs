//! LawnBud Access - 访问控制核心
//!
//! 为 LawnBud 提供角色分级、按角色的每小时限流以及登录暴力破解检测，
//! 既可作为库嵌入，也可作为独立服务运行。

pub mod api;
pub mod config;
pub mod error;
pub mod observability;
pub mod security;
