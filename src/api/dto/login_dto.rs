//! 登录尝试 DTO

use serde::{Deserialize, Serialize};

/// 登录尝试上报请求
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginAttemptRequest {
    /// 登录标识（邮箱或用户名）
    pub identifier: String,
    /// 是否登录成功
    pub success: bool,
    /// 失败时的错误信息
    pub error: Option<String>,
}

/// 登录尝试上报响应
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginAttemptResponse {
    /// 是否疑似暴力破解
    pub suspicious: bool,
}
