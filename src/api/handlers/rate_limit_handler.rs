use axum::{
    Json,
    extract::{Extension, Query, State},
    response::IntoResponse,
};
use tracing::debug;

use crate::{
    api::{app_state::AppState, dto::rate_limit_dto::*},
    error::AppError,
    security::identity::Identity,
};

fn require_endpoint(endpoint: &str) -> Result<&str, AppError> {
    let endpoint = endpoint.trim();
    if endpoint.is_empty() {
        return Err(AppError::Validation("endpoint is required".to_string()));
    }
    Ok(endpoint)
}

pub async fn check_limit(
    State(state): State<AppState>,
    identity: Option<Extension<Identity>>,
    Json(request): Json<CheckLimitRequest>,
) -> Result<impl IntoResponse, AppError> {
    let endpoint = require_endpoint(&request.endpoint)?;
    let identity = identity.map(|Extension(i)| i);
    debug!(endpoint, user_id = ?identity.as_ref().map(|i| i.user_id.as_str()), "Checking rate limit");

    let (resolution, decision) = state.access.check_limit(identity.as_ref(), endpoint).await;

    Ok(Json(CheckLimitResponse::new(resolution, decision)))
}

pub async fn get_limit_info(
    State(state): State<AppState>,
    identity: Option<Extension<Identity>>,
    Query(params): Query<LimitInfoParams>,
) -> Result<impl IntoResponse, AppError> {
    let endpoint = require_endpoint(&params.endpoint)?;
    let identity = identity.map(|Extension(i)| i);

    let info = state.access.limit_info(identity.as_ref(), endpoint).await;

    Ok(Json(LimitInfoResponse::from(info)))
}
