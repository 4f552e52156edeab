//! 错误处理模块
//!
//! 定义访问控制核心的错误类型和 HTTP 映射。

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 应用程序错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AppError {
    /// 外部存储（计数器/身份）不可用
    #[error("存储不可用: {0}")]
    StoreUnavailable(String),

    /// 外部调用超时
    #[error("操作超时: {0}")]
    Timeout(String),

    /// 超出限流配额
    #[error("Rate limit exceeded for {endpoint}. Max {limit} requests/hour.")]
    RateLimitExceeded { endpoint: String, limit: u64 },

    /// 角色查询失败（非致命，调用方已回退到最低权限）
    #[error("角色查询失败: {0}")]
    RoleLookupFailed(String),

    /// 认证错误
    #[error("认证失败: {0}")]
    Authentication(String),

    /// 授权错误
    #[error("未授权访问: {0}")]
    Authorization(String),

    /// 参数验证错误
    #[error("参数验证失败: {0}")]
    Validation(String),

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),

    /// 序列化错误
    #[error("序列化错误: {0}")]
    Serialization(String),

    /// 内部错误
    #[error("内部错误: {0}")]
    Internal(String),
}

impl AppError {
    /// Infrastructure failures that are recovered locally with a default.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, AppError::StoreUnavailable(_) | AppError::Timeout(_))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Serialization(e.to_string())
    }
}

impl From<figment::Error> for AppError {
    fn from(e: figment::Error) -> Self {
        AppError::Config(e.to_string())
    }
}

impl From<redis::RedisError> for AppError {
    fn from(e: redis::RedisError) -> Self {
        AppError::StoreUnavailable(e.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for AppError {
    fn from(e: tokio::time::error::Elapsed) -> Self {
        AppError::Timeout(e.to_string())
    }
}

/// Axum response implementation for AppError
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = (&self).into();
        let body = Json(ErrorResponse::new(&code, &self.to_string()));
        (
            StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            body,
        )
            .into_response()
    }
}

/// 错误响应
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// 错误代码
    pub code: String,
    /// 错误消息
    pub message: String,
    /// 详细信息
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    /// 创建新错误响应
    pub fn new(code: &str, message: &str) -> Self {
        Self {
            code: code.to_string(),
            message: message.to_string(),
            details: None,
        }
    }

    /// 添加详细信息
    pub fn with_details(mut self, details: &str) -> Self {
        self.details = Some(details.to_string());
        self
    }
}

/// HTTP 状态码映射
impl From<&AppError> for (u16, String) {
    fn from(err: &AppError) -> (u16, String) {
        match err {
            AppError::RateLimitExceeded { .. } => (429, "RATE_LIMITED".to_string()),
            AppError::Authentication(_) => (401, "UNAUTHORIZED".to_string()),
            AppError::Authorization(_) => (403, "FORBIDDEN".to_string()),
            AppError::Validation(_) => (400, "BAD_REQUEST".to_string()),
            AppError::StoreUnavailable(_) => (503, "SERVICE_UNAVAILABLE".to_string()),
            AppError::Timeout(_) => (504, "TIMEOUT".to_string()),
            _ => (500, "INTERNAL_ERROR".to_string()),
        }
    }
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, AppError>;
