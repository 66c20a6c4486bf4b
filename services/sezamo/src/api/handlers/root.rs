use axum::response::IntoResponse;

/// Undocumented banner route; useful for load balancer sanity checks.
pub async fn root() -> impl IntoResponse {
    concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"))
}
