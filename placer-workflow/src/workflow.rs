//! Placement workflow orchestration
//!
//! Sequences install -> parse -> connect -> submit -> monitor -> retrieve and
//! stops at the first failure. Every step is also available on its own so a
//! caller can resume a placement after a timed-out monitor.

use placer_client::AccessPoint;
use placer_core::domain::description::{JobDescription, JobSource, ParseError};
use placer_core::domain::status::JobStatus;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::WorkflowConfig;
use crate::connection::{Connection, ConnectionConfig};
use crate::credential::{CredentialInstaller, TokenState};
use crate::error::{
    ConnectError, InstallError, RetrieveError, StateError, SubmitError, WorkflowError,
};
use crate::placement::{MonitorOutcome, Placement, RetrieveReport};
use crate::store::PlacementStore;

/// Where the token for this run comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource {
    /// Search the configured directories
    Discover,
    /// Install this file
    Path(PathBuf),
    /// Use the token that is already installed
    Installed,
}

/// One end-to-end run
#[derive(Debug, Clone)]
pub struct WorkflowRequest {
    pub token: TokenSource,
    pub description: JobSource,
    pub spool: bool,
    /// Monitor budget; `f64::INFINITY` waits until every unit is terminal
    pub monitor_minutes: f64,
    /// Retrieve results once something has completed
    pub retrieve: bool,
}

impl WorkflowRequest {
    pub fn new(description: JobSource) -> Self {
        Self {
            token: TokenSource::Discover,
            description,
            spool: true,
            monitor_minutes: f64::INFINITY,
            retrieve: true,
        }
    }

    pub fn with_token(mut self, token: TokenSource) -> Self {
        self.token = token;
        self
    }

    pub fn with_spool(mut self, spool: bool) -> Self {
        self.spool = spool;
        self
    }

    pub fn with_monitor_minutes(mut self, minutes: f64) -> Self {
        self.monitor_minutes = minutes;
        self
    }

    pub fn with_retrieve(mut self, retrieve: bool) -> Self {
        self.retrieve = retrieve;
        self
    }
}

/// Everything a run produced, for the caller to present
#[derive(Debug)]
pub struct WorkflowReport {
    pub installed_token: Option<PathBuf>,
    pub placement: Placement,
    pub outcome: MonitorOutcome,
    pub retrieval: Option<RetrieveReport>,
}

impl fmt::Display for WorkflowReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(path) = &self.installed_token {
            writeln!(f, "Token installed at {}", path.display())?;
        }
        writeln!(f, "{}", self.placement.job_ids_label())?;
        write!(f, "{}", self.placement.summary())?;
        if self.outcome.is_timed_out() {
            write!(
                f,
                "\nStopped monitoring before every job finished; monitor again to keep waiting."
            )?;
        }
        if let Some(report) = &self.retrieval {
            write!(
                f,
                "\nRetrieved {} file(s) from {} job(s)",
                report.files.len(),
                report.retrieved.len()
            )?;
            if !report.skipped.is_empty() {
                write!(f, ", {} already retrieved", report.skipped.len())?;
            }
        }
        Ok(())
    }
}

/// Composes the workflow steps over one configuration and access point
pub struct PlacementWorkflow {
    config: WorkflowConfig,
    client: Arc<dyn AccessPoint>,
    installer: CredentialInstaller,
    store: PlacementStore,
}

impl PlacementWorkflow {
    pub fn new(config: WorkflowConfig, client: Arc<dyn AccessPoint>) -> Self {
        let installer = CredentialInstaller::from_config(&config);
        let store = PlacementStore::new(config.state_dir.clone());
        Self {
            config,
            client,
            installer,
            store,
        }
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn installer(&self) -> &CredentialInstaller {
        &self.installer
    }

    pub fn store(&self) -> &PlacementStore {
        &self.store
    }

    pub fn install_credential(&self, explicit: Option<&Path>) -> Result<PathBuf, InstallError> {
        self.installer.install(explicit)
    }

    /// Locate the configured access point with the installed token
    pub async fn connect(&self) -> Result<Connection, ConnectError> {
        let credential = self.installer.load()?;
        if let TokenState::Expired { expired_at, .. } = self.installer.state() {
            warn!(
                "The placement token expired at {}; the access point will likely refuse it",
                expired_at.format("%Y-%m-%d %H:%M:%S")
            );
        }
        Connection::connect(
            &ConnectionConfig::from(&self.config),
            Arc::clone(&self.client),
            &credential,
        )
        .await
    }

    pub fn load_description(&self, source: &JobSource) -> Result<JobDescription, ParseError> {
        JobDescription::parse_source(source)
    }

    pub async fn submit(
        &self,
        connection: &Connection,
        description: &JobDescription,
        spool: bool,
    ) -> Result<Placement, SubmitError> {
        let placement = Placement::submit(connection, description, spool).await?;
        Ok(self.configure(placement))
    }

    /// Retrieve into the configured results directory
    pub async fn retrieve(&self, placement: &mut Placement) -> Result<RetrieveReport, RetrieveError> {
        placement.retrieve(&self.config.results_dir).await
    }

    pub fn save(&self, placement: &Placement) -> Result<PathBuf, StateError> {
        self.store.save(&placement.to_record())
    }

    /// Reconnect to a placement submitted by an earlier process
    pub async fn reopen(&self, cluster: u64) -> Result<Placement, WorkflowError> {
        let record = self.store.load(&self.config.access_point, cluster)?;
        let connection = self.connect().await?;
        let placement = Placement::restore(connection, record)?;
        Ok(self.configure(placement))
    }

    fn configure(&self, placement: Placement) -> Placement {
        placement
            .with_poll_interval(self.config.poll_interval)
            .with_stale_warning(self.config.stale_status_warning)
    }

    fn persist(&self, placement: &Placement) {
        if let Err(e) = self.save(placement) {
            warn!("Could not record placement {}: {}", placement.cluster(), e);
        }
    }

    /// Run every step in order
    ///
    /// The description is parsed before connecting, so a bad description
    /// fails without any traffic to the access point. A timed-out monitor is
    /// not an error: the report carries the placement so the caller can
    /// monitor it again.
    pub async fn run(&self, request: WorkflowRequest) -> Result<WorkflowReport, WorkflowError> {
        if let Some(branch) = &self.config.content_branch {
            info!("Companion content branch: {}", branch);
        }

        let installed_token = match &request.token {
            TokenSource::Discover => Some(self.install_credential(None)?),
            TokenSource::Path(path) => Some(self.install_credential(Some(path.as_path()))?),
            TokenSource::Installed => None,
        };

        let description = self.load_description(&request.description)?;
        let connection = self.connect().await?;

        let mut placement = self.submit(&connection, &description, request.spool).await?;
        info!("{}", placement.job_ids_label());
        self.persist(&placement);

        let outcome = placement.monitor(request.monitor_minutes).await;
        self.persist(&placement);

        let completed = placement
            .statuses()
            .values()
            .any(|status| *status == JobStatus::Completed);
        let retrieval = if request.retrieve && placement.spool() && completed {
            Some(self.retrieve(&mut placement).await?)
        } else {
            None
        };
        if retrieval.is_some() {
            self.persist(&placement);
        }

        Ok(WorkflowReport {
            installed_token,
            placement,
            outcome,
            retrieval,
        })
    }
}

impl fmt::Debug for PlacementWorkflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlacementWorkflow")
            .field("config", &self.config)
            .field("installer", &self.installer)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}
