//! 限流 DTO
//!
//! 定义限流相关的请求和响应数据结构。

use serde::{Deserialize, Serialize};

use crate::security::rate_limit::{RateLimitDecision, RateLimitInfo};
use crate::security::resolver::RoleResolution;
use crate::security::role::Role;

/// 限流检查请求
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CheckLimitRequest {
    /// 端点名称
    pub endpoint: String,
}

/// 限流检查响应
#[derive(Debug, Serialize, Deserialize)]
pub struct CheckLimitResponse {
    /// 是否允许
    pub allowed: bool,
    /// 剩余配额
    pub remaining: u64,
    /// 服务端解析出的角色
    pub role: Role,
    /// 角色查询失败时的错误信息（此时按默认角色计算配额）
    pub error: Option<String>,
}

impl CheckLimitResponse {
    pub fn new(resolution: RoleResolution, decision: RateLimitDecision) -> Self {
        Self {
            allowed: decision.allowed,
            remaining: decision.remaining,
            role: resolution.role,
            error: resolution.error,
        }
    }
}

/// 限流信息查询参数
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LimitInfoParams {
    /// 端点名称
    pub endpoint: String,
}

/// 限流信息响应
#[derive(Debug, Serialize, Deserialize)]
pub struct LimitInfoResponse {
    /// 当前小时已用次数
    pub current: u64,
    /// 每小时上限
    pub limit: u64,
    /// 剩余次数
    pub remaining: u64,
}

impl From<RateLimitInfo> for LimitInfoResponse {
    fn from(info: RateLimitInfo) -> Self {
        Self {
            current: info.current,
            limit: info.limit,
            remaining: info.remaining,
        }
    }
}
