//! 角色 DTO

use serde::{Deserialize, Serialize};

use crate::security::resolver::RoleResolution;
use crate::security::role::Role;

/// 角色解析响应
#[derive(Debug, Serialize, Deserialize)]
pub struct ResolveRoleResponse {
    pub role: Role,
    pub is_admin: bool,
    pub is_premium: bool,
    /// 角色查询失败时的错误信息
    pub error: Option<String>,
}

impl From<RoleResolution> for ResolveRoleResponse {
    fn from(resolution: RoleResolution) -> Self {
        Self {
            role: resolution.role,
            is_admin: resolution.is_admin(),
            is_premium: resolution.is_premium(),
            error: resolution.error,
        }
    }
}
