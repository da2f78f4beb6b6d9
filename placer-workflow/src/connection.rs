//! Resolved session to a submission endpoint

use placer_client::{AccessPoint, ClientError, Endpoint};
use placer_core::domain::credential::Credential;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::WorkflowConfig;
use crate::error::ConnectError;

/// Where to find the submission endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub collector: String,
    pub access_point: String,
}

impl From<&WorkflowConfig> for ConnectionConfig {
    fn from(config: &WorkflowConfig) -> Self {
        Self {
            collector: config.collector.clone(),
            access_point: config.access_point.clone(),
        }
    }
}

/// Handle to a located access point
///
/// Holds no state beyond the resolved endpoint, so connecting again is always
/// safe. One connection may serve any number of submissions.
#[derive(Clone)]
pub struct Connection {
    collector: String,
    endpoint: Endpoint,
    client: Arc<dyn AccessPoint>,
}

impl Connection {
    /// Locate the endpoint through the collector
    ///
    /// A single attempt is made; failures are returned as they happen.
    pub async fn connect(
        config: &ConnectionConfig,
        client: Arc<dyn AccessPoint>,
        credential: &Credential,
    ) -> Result<Self, ConnectError> {
        info!(
            "Locating access point {} via {}",
            config.access_point, config.collector
        );

        let endpoint = client
            .locate(&config.collector, &config.access_point, credential)
            .await
            .map_err(|source| {
                warn!("Could not locate {}: {}", config.access_point, source);
                classify(config, source)
            })?;

        info!("Connected to {} at {}", endpoint.name, endpoint.address);
        Ok(Self {
            collector: config.collector.clone(),
            endpoint,
            client,
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn client(&self) -> &Arc<dyn AccessPoint> {
        &self.client
    }

    pub fn collector(&self) -> &str {
        &self.collector
    }

    pub fn name(&self) -> &str {
        &self.endpoint.name
    }

    pub fn address(&self) -> &str {
        &self.endpoint.address
    }
}

fn classify(config: &ConnectionConfig, source: ClientError) -> ConnectError {
    if source.is_auth_failure() {
        ConnectError::AuthFailed {
            name: config.access_point.clone(),
            source,
        }
    } else {
        ConnectError::ResolutionFailed {
            name: config.access_point.clone(),
            collector: config.collector.clone(),
            source,
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("collector", &self.collector)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}
