//! HTTP access-point client
//!
//! Talks to an access-point gateway. The collector and the endpoint are both
//! plain base URLs; the credential is sent as a bearer token on every request.

use async_trait::async_trait;
use placer_core::domain::credential::Credential;
use placer_core::domain::description::JobDescription;
use placer_core::domain::status::JobId;
use placer_core::dto::collector::LocateResponse;
use placer_core::dto::jobs::{
    JobStatusRecord, SpooledFile, StatusQuery, SubmitRequest, SubmitResponse, TransferRequest,
};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{ClientError, Result};
use crate::{AccessPoint, Endpoint, write_spooled_files};

/// HTTP client for an access-point gateway
#[derive(Debug, Clone, Default)]
pub struct HttpAccessPoint {
    client: Client,
}

impl HttpAccessPoint {
    /// Create a client with default HTTP settings
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    /// Create a client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn url(base: &str, path: &str) -> String {
        format!("{}{}", base.trim_end_matches('/'), path)
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Check the status code and deserialize the JSON body
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::from_status(
                status.as_u16(),
                error_message(&error_text),
            ));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }
}

/// Pull the `error` field out of a gateway error body, falling back to the raw text
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

#[async_trait]
impl AccessPoint for HttpAccessPoint {
    async fn locate(
        &self,
        collector: &str,
        name: &str,
        credential: &Credential,
    ) -> Result<Endpoint> {
        let url = Self::url(collector, &format!("/api/collector/locate/{}", name));
        debug!("Locating endpoint {} via {}", name, url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(credential.bearer())
            .send()
            .await?;
        let located: LocateResponse = self.handle_response(response).await?;

        Ok(Endpoint {
            name: located.name,
            address: located.address,
            credential: credential.clone(),
        })
    }

    async fn submit(
        &self,
        endpoint: &Endpoint,
        description: &JobDescription,
        spool: bool,
    ) -> Result<SubmitResponse> {
        let url = Self::url(&endpoint.address, "/api/jobs/submit");
        let response = self
            .client
            .post(&url)
            .bearer_auth(endpoint.credential.bearer())
            .json(&SubmitRequest {
                description: description.clone(),
                spool,
            })
            .send()
            .await?;

        self.handle_response(response).await
    }

    async fn query_status(
        &self,
        endpoint: &Endpoint,
        ids: &[JobId],
    ) -> Result<Vec<JobStatusRecord>> {
        let url = Self::url(&endpoint.address, "/api/jobs/status");
        let response = self
            .client
            .post(&url)
            .bearer_auth(endpoint.credential.bearer())
            .json(&StatusQuery { ids: ids.to_vec() })
            .send()
            .await?;

        self.handle_response(response).await
    }

    async fn transfer_back(
        &self,
        endpoint: &Endpoint,
        ids: &[JobId],
        destination: &Path,
    ) -> Result<Vec<PathBuf>> {
        let url = Self::url(&endpoint.address, "/api/jobs/retrieve");
        let response = self
            .client
            .post(&url)
            .bearer_auth(endpoint.credential.bearer())
            .json(&TransferRequest { ids: ids.to_vec() })
            .send()
            .await?;

        let files: Vec<SpooledFile> = self.handle_response(response).await?;
        debug!("Received {} spooled file(s)", files.len());

        write_spooled_files(&files, destination).await
    }
}
