//! Marketing module routes, gated behind session and module checks.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::error;
use utoipa::ToSchema;

use super::auth::session::authenticate_session;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MarketingOverview {
    pub success: bool,
    pub user_id: String,
    pub tenant_id: Option<String>,
    pub tenant_slug: Option<String>,
    pub module: String,
}

/// Representative module endpoint. Both gates have already run by the time
/// this executes, so a missing session here is a wiring error.
#[utoipa::path(
    get,
    path = "/marketing/overview",
    responses(
        (status = 200, description = "Marketing overview for the session tenant", body = MarketingOverview),
        (status = 401, description = "No active session")
    ),
    tag = "marketing"
)]
pub async fn overview(headers: HeaderMap, pool: Extension<PgPool>) -> impl IntoResponse {
    match authenticate_session(&headers, &pool).await {
        Ok(Some(record)) => Json(MarketingOverview {
            success: true,
            user_id: record.user_id.to_string(),
            tenant_id: record.tenant_id.map(|id| id.to_string()),
            tenant_slug: record.tenant_slug,
            module: "marketing".to_string(),
        })
        .into_response(),
        Ok(None) => StatusCode::UNAUTHORIZED.into_response(),
        Err(err) => {
            error!("Failed to load marketing overview session: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
