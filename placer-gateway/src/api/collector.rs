//! Collector API Handler
//!
//! Resolves access-point names to the address clients submit to.

use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, header},
};
use placer_client::AccessPoint;
use placer_core::dto::collector::LocateResponse;

use crate::api::error::ApiResult;
use crate::api::{AppState, bearer};

/// GET /api/collector/locate/{name}
/// Locate a named access point
pub async fn locate_access_point(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<LocateResponse>> {
    tracing::debug!("Locating access point: {}", name);

    let credential = bearer(&headers)?;
    let endpoint = state
        .access_point
        .locate("", &name, &credential)
        .await?;

    Ok(Json(LocateResponse {
        name: endpoint.name,
        address: advertised_address(&state, &headers),
    }))
}

/// Base URL clients should use for job requests
fn advertised_address(state: &AppState, headers: &HeaderMap) -> String {
    if let Some(url) = &state.public_url {
        return url.clone();
    }
    headers
        .get(header::HOST)
        .and_then(|host| host.to_str().ok())
        .map(|host| format!("http://{}", host))
        .unwrap_or_else(|| "http://localhost:9618".to_string())
}
