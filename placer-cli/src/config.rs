//! Configuration module
//!
//! Turns command-line flags (and their environment fallbacks) into the
//! workflow configuration and the access-point client to use.

use anyhow::Result;
use clap::ValueEnum;
use placer_client::{AccessPoint, HttpAccessPoint, LocalAccessPoint};
use placer_workflow::WorkflowConfig;
use std::path::PathBuf;
use std::sync::Arc;

/// How the access point is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// An access-point gateway over HTTP
    Http,
    /// Jobs run inside this process; placements do not outlive it
    Local,
}

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub workflow: WorkflowConfig,
    pub backend: Backend,
    /// Spool root of the local backend
    pub local_spool: PathBuf,
}

impl Config {
    /// Validates the configuration for the chosen backend
    pub fn validate(&self) -> Result<()> {
        self.workflow.validate()?;
        if self.backend == Backend::Http {
            self.workflow.validate_collector_url()?;
        }
        Ok(())
    }

    /// Client for the configured backend
    pub fn client(&self) -> Arc<dyn AccessPoint> {
        match self.backend {
            Backend::Http => Arc::new(HttpAccessPoint::new()),
            Backend::Local => Arc::new(LocalAccessPoint::new(
                self.workflow.access_point.clone(),
                self.local_spool.clone(),
            )),
        }
    }
}
