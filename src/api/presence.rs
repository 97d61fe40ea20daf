use crate::api::AppState;
use crate::api::middleware::AuthUser;
use crate::api::schemas::presence::PresenceResponse;
use axum::{Json, extract::State};

/// Users with at least one authenticated live connection.
pub async fn online_users(_auth_user: AuthUser, State(state): State<AppState>) -> Json<PresenceResponse> {
    Json(PresenceResponse { online: state.gateway_service.presence_service().online_users() })
}
