use axum::{
    Json,
    extract::{Extension, State},
    response::IntoResponse,
};

use crate::{
    api::{app_state::AppState, dto::role_dto::ResolveRoleResponse},
    security::identity::Identity,
};

pub async fn resolve_role(
    State(state): State<AppState>,
    identity: Option<Extension<Identity>>,
) -> impl IntoResponse {
    let identity = identity.map(|Extension(i)| i);
    let resolution = state.access.resolve_role(identity.as_ref()).await;
    Json(ResolveRoleResponse::from(resolution))
}
