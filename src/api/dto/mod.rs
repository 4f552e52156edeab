//! DTO 模块
//!
//! 数据传输对象，用于 API 请求和响应的序列化。

pub mod login_dto;
pub mod rate_limit_dto;
pub mod role_dto;

pub use login_dto::*;
pub use rate_limit_dto::*;
pub use role_dto::*;
