//! API Module
//!
//! HTTP API layer of the gateway.
//! Each submodule handles endpoints for a specific concern.

pub mod collector;
pub mod error;
pub mod health;
pub mod jobs;

use axum::{
    Router,
    http::{HeaderMap, header},
    routing::{get, post},
};
use placer_client::{Endpoint, LocalAccessPoint};
use placer_core::domain::credential::Credential;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::api::error::{ApiError, ApiResult};
use crate::config::GatewayConfig;

/// Shared state of all handlers
#[derive(Clone)]
pub struct AppState {
    pub access_point: Arc<LocalAccessPoint>,
    pub name: String,
    pub public_url: Option<String>,
}

impl AppState {
    pub fn new(access_point: LocalAccessPoint, name: impl Into<String>) -> Self {
        Self {
            access_point: Arc::new(access_point),
            name: name.into(),
            public_url: None,
        }
    }

    pub fn with_public_url(mut self, url: impl Into<String>) -> Self {
        self.public_url = Some(url.into());
        self
    }

    /// Build the access point described by `config`
    pub fn from_config(config: &GatewayConfig) -> anyhow::Result<Self> {
        let mut access_point =
            LocalAccessPoint::new(config.access_point.clone(), config.spool_dir.clone());
        if let Some(credential) = config.required_credential()? {
            access_point = access_point.require_credential(credential);
        }

        let mut state = Self::new(access_point, config.access_point.clone());
        state.public_url = config.public_url.clone();
        Ok(state)
    }

    /// The served endpoint, as seen with the caller's credential
    fn endpoint(&self, headers: &HeaderMap) -> ApiResult<Endpoint> {
        Ok(Endpoint {
            name: self.name.clone(),
            address: self.access_point.address(),
            credential: bearer(headers)?,
        })
    }
}

/// Credential presented in the `Authorization: Bearer` header
pub(crate) fn bearer(headers: &HeaderMap) -> ApiResult<Credential> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ApiError::Unauthorized("missing bearer token".to_string()))?;
    Ok(Credential::from(token))
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Collector endpoints
        .route(
            "/api/collector/locate/{name}",
            get(collector::locate_access_point),
        )
        // Job endpoints
        .route("/api/jobs/submit", post(jobs::submit_jobs))
        .route("/api/jobs/status", post(jobs::query_status))
        .route("/api/jobs/retrieve", post(jobs::retrieve_results))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
