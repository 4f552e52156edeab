use axum::{
    Json,
    extract::{Extension, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::warn;

use crate::{
    api::{app_state::AppState, dto::login_dto::*},
    error::AppError,
    security::{
        identity::Identity,
        role::{Role, has_permission},
    },
};

/// 上报登录尝试所需的角色（认证服务使用的服务账号）
pub const LOGIN_REPORTER_ROLE: Role = Role::Admin;

/// 上报一次登录尝试
///
/// 仅接受已认证且具备上报角色的调用方，否则任何人都能用伪造的成功上报
/// 清除他人的失败计数。失败时累计计数并返回是否疑似暴力破解；成功时清除
/// 该标识的计数。遥测是否阻塞响应由监控器配置决定。
pub async fn record_login_attempt(
    State(state): State<AppState>,
    identity: Option<Extension<Identity>>,
    Json(request): Json<LoginAttemptRequest>,
) -> Result<impl IntoResponse, AppError> {
    let Some(Extension(reporter)) = identity else {
        return Err(AppError::Authentication(
            "login attempts must be reported by an authenticated service".to_string(),
        ));
    };

    let resolution = state.access.resolve_role(Some(&reporter)).await;
    if !has_permission(resolution.role, LOGIN_REPORTER_ROLE) {
        warn!(
            target: "security",
            reporter = %reporter,
            role = %resolution.role,
            "Rejected login attempt report from unprivileged caller"
        );
        return Err(AppError::Authorization(format!(
            "reporting login attempts requires the {} role",
            LOGIN_REPORTER_ROLE
        )));
    }

    if request.identifier.trim().is_empty() {
        return Err(AppError::Validation("identifier is required".to_string()));
    }

    let suspicious = if request.success {
        state.monitor.record_success(&request.identifier).await;
        false
    } else {
        state
            .monitor
            .record_failure(&request.identifier, request.error.as_deref())
            .await
            .suspicious
    };

    Ok((StatusCode::ACCEPTED, Json(LoginAttemptResponse { suspicious })))
}
