//! One submitted job description and its units
//!
//! A [`Placement`] owns the status of its units exclusively. Status changes
//! only through polling, and never moves backward: once a unit is seen
//! completed it stays completed no matter what a later poll reports.

use chrono::{DateTime, Local};
use placer_client::ClientError;
use placer_core::domain::description::JobDescription;
use placer_core::domain::status::{JobId, JobStatus, StatusMap, StatusSummary};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::connection::Connection;
use crate::error::{RetrieveError, StateError, SubmitError};
use crate::store::{PlacementRecord, UnitRecord};

/// How a call to [`Placement::monitor`] ended
///
/// Both variants carry the per-unit status at the time monitoring stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorOutcome {
    /// Every unit is completed, held or removed
    AllTerminal(StatusMap),
    /// The time budget ran out first; monitoring can be resumed
    TimedOut(StatusMap),
}

impl MonitorOutcome {
    pub fn statuses(&self) -> &StatusMap {
        match self {
            Self::AllTerminal(statuses) | Self::TimedOut(statuses) => statuses,
        }
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, Self::TimedOut(_))
    }
}

/// Result of one retrieval
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetrieveReport {
    /// Units whose artifacts were transferred by this call
    pub retrieved: Vec<JobId>,
    /// Completed units already retrieved earlier
    pub skipped: Vec<JobId>,
    /// Files written
    pub files: Vec<PathBuf>,
}

/// A submitted job and the observed status of its units
#[derive(Debug)]
pub struct Placement {
    connection: Connection,
    cluster: u64,
    ids: Vec<JobId>,
    spool: bool,
    statuses: StatusMap,
    retrieved: BTreeSet<JobId>,
    poll_interval: Duration,
    stale_warning: Duration,
    submitted_at: DateTime<Local>,
    last_update: Option<DateTime<Local>>,
    last_update_instant: Option<Instant>,
    next_update: Option<Instant>,
}

impl Placement {
    /// Queue `description` at the connected access point
    ///
    /// All units start out queued.
    pub async fn submit(
        connection: &Connection,
        description: &JobDescription,
        spool: bool,
    ) -> Result<Self, SubmitError> {
        let response = connection
            .client()
            .submit(connection.endpoint(), description, spool)
            .await
            .map_err(|source| SubmitError::SubmitFailed { source })?;

        let ids = response.job_ids();
        info!(
            "Submitted cluster {} with {} unit(s) to {} (spool: {})",
            response.cluster,
            ids.len(),
            connection.name(),
            spool
        );

        Ok(Self::new(
            connection.clone(),
            response.cluster,
            ids.iter().map(|id| (*id, JobStatus::Queued)).collect(),
            spool,
            Local::now(),
        ))
    }

    fn new(
        connection: Connection,
        cluster: u64,
        statuses: StatusMap,
        spool: bool,
        submitted_at: DateTime<Local>,
    ) -> Self {
        Self {
            connection,
            cluster,
            ids: statuses.keys().copied().collect(),
            spool,
            statuses,
            retrieved: BTreeSet::new(),
            poll_interval: Duration::from_secs(10),
            stale_warning: Duration::from_secs(60),
            submitted_at,
            last_update: None,
            last_update_instant: None,
            next_update: None,
        }
    }

    /// Rebuild a placement from its persisted record
    pub fn restore(connection: Connection, record: PlacementRecord) -> Result<Self, StateError> {
        if record.access_point != connection.name() {
            return Err(StateError::WrongAccessPoint {
                cluster: record.cluster,
                recorded: record.access_point,
                connected: connection.name().to_string(),
            });
        }

        let statuses = record
            .units
            .iter()
            .map(|unit| (unit.id, unit.status))
            .collect();
        let mut placement = Self::new(
            connection,
            record.cluster,
            statuses,
            record.spool,
            record.submitted_at,
        );
        placement.retrieved = record
            .units
            .iter()
            .filter(|unit| unit.retrieved)
            .map(|unit| unit.id)
            .collect();
        placement.last_update = record.last_update;
        Ok(placement)
    }

    /// Persistable snapshot of this placement
    pub fn to_record(&self) -> PlacementRecord {
        PlacementRecord {
            access_point: self.connection.name().to_string(),
            collector: self.connection.collector().to_string(),
            cluster: self.cluster,
            spool: self.spool,
            units: self
                .statuses
                .iter()
                .map(|(id, status)| UnitRecord {
                    id: *id,
                    status: *status,
                    retrieved: self.retrieved.contains(id),
                })
                .collect(),
            submitted_at: self.submitted_at,
            last_update: self.last_update,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_stale_warning(mut self, after: Duration) -> Self {
        self.stale_warning = after;
        self
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn cluster(&self) -> u64 {
        self.cluster
    }

    pub fn ids(&self) -> &[JobId] {
        &self.ids
    }

    pub fn spool(&self) -> bool {
        self.spool
    }

    pub fn statuses(&self) -> &StatusMap {
        &self.statuses
    }

    pub fn status(&self, id: JobId) -> Option<JobStatus> {
        self.statuses.get(&id).copied()
    }

    pub fn retrieved(&self) -> &BTreeSet<JobId> {
        &self.retrieved
    }

    pub fn submitted_at(&self) -> DateTime<Local> {
        self.submitted_at
    }

    pub fn last_update(&self) -> Option<DateTime<Local>> {
        self.last_update
    }

    /// True once no unit needs polling any more
    pub fn is_terminal(&self) -> bool {
        self.statuses.values().all(|status| status.is_terminal())
    }

    pub fn summary(&self) -> StatusSummary {
        StatusSummary::from_statuses(self.statuses.values(), self.last_update)
    }

    pub fn job_ids_label(&self) -> String {
        match self.ids.len() {
            1 => format!("Placement has job ID {}", self.cluster),
            n => format!(
                "Placement has job IDs {0}.0 - {0}.{1}",
                self.cluster,
                n.saturating_sub(1)
            ),
        }
    }

    /// Poll the access point for the status of every unit that can still change
    ///
    /// Held units are queried too, since a released job may still complete.
    /// Unless `force` is set, nothing is queried before the poll interval has
    /// passed since the previous update. Returns whether an update happened.
    pub async fn refresh(&mut self, force: bool) -> Result<bool, ClientError> {
        let now = Instant::now();
        if !force && self.next_update.is_some_and(|next| now < next) {
            debug!("Not updating status of placement {} yet", self.cluster);
            return Ok(false);
        }

        let pending: Vec<JobId> = self
            .statuses
            .iter()
            .filter(|(_, status)| !status.is_final())
            .map(|(id, _)| *id)
            .collect();
        if pending.is_empty() {
            return Ok(false);
        }

        let records = self
            .connection
            .client()
            .query_status(self.connection.endpoint(), &pending)
            .await?;

        for record in records {
            let Some(observed) = record.status() else {
                warn!(
                    "Job {} reported unknown status code {}",
                    record.id, record.job_status
                );
                continue;
            };
            if let Some(current) = self.statuses.get_mut(&record.id) {
                let next = current.advance(observed);
                if next != *current {
                    debug!("Job {}: {} -> {}", record.id, current, next);
                    *current = next;
                }
            }
        }

        let now = Instant::now();
        self.last_update = Some(Local::now());
        self.last_update_instant = Some(now);
        self.next_update = Some(now + self.poll_interval);
        Ok(true)
    }

    /// Wait until every unit is terminal or `minutes` have passed
    ///
    /// A budget of zero, less, or NaN returns [`MonitorOutcome::TimedOut`] at
    /// once without polling (unless everything is already terminal);
    /// `f64::INFINITY` waits without bound. Poll failures are logged and
    /// retried on the next interval.
    pub async fn monitor(&mut self, minutes: f64) -> MonitorOutcome {
        if self.is_terminal() {
            return MonitorOutcome::AllTerminal(self.statuses.clone());
        }

        if minutes.is_nan() || minutes <= 0.0 {
            debug!("No time budget to monitor placement {}", self.cluster);
            return MonitorOutcome::TimedOut(self.statuses.clone());
        }

        let started = Instant::now();
        // an infinite or overflowing budget has no deadline
        let deadline = Duration::try_from_secs_f64(minutes * 60.0)
            .ok()
            .and_then(|budget| started.checked_add(budget));

        match deadline {
            Some(_) => info!(
                "Monitoring placement {} for up to {:.2} minutes",
                self.cluster, minutes
            ),
            None => info!("Monitoring placement {}", self.cluster),
        }

        let mut warned_stale = false;
        loop {
            // a poll may not outlast the budget
            let bound = match deadline {
                Some(deadline) => self
                    .poll_interval
                    .min(deadline.saturating_duration_since(Instant::now())),
                None => self.poll_interval,
            };
            match tokio::time::timeout(bound, self.refresh(true)).await {
                Ok(Ok(_)) => debug!("Placement {}: {:?}", self.cluster, self.summary()),
                Ok(Err(e)) => warn!("Status poll for placement {} failed: {}", self.cluster, e),
                Err(_) => warn!("Status poll for placement {} timed out", self.cluster),
            }

            if self.is_terminal() {
                info!("No jobs of placement {} in progress", self.cluster);
                return MonitorOutcome::AllTerminal(self.statuses.clone());
            }

            let since = self
                .last_update_instant
                .map_or(started, |last| last.max(started));
            if !warned_stale && since.elapsed() >= self.stale_warning {
                warn!(
                    "No status update for placement {} in {} seconds; check the access point",
                    self.cluster,
                    since.elapsed().as_secs()
                );
                warned_stale = true;
            }

            let pause = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        info!("Time budget for placement {} reached", self.cluster);
                        return MonitorOutcome::TimedOut(self.statuses.clone());
                    }
                    self.poll_interval.min(deadline - now)
                }
                None => self.poll_interval,
            };
            tokio::time::sleep(pause).await;
        }
    }

    /// Transfer the spooled artifacts of completed units into `destination`
    ///
    /// Units retrieved by an earlier call are skipped and not fetched again.
    ///
    /// # Errors
    /// - [`RetrieveError::NotReady`] when no unit has completed; nothing is
    ///   transferred
    /// - [`RetrieveError::RetrieveFailed`] when the transfer fails, or the
    ///   placement was submitted without spooling
    pub async fn retrieve(&mut self, destination: &Path) -> Result<RetrieveReport, RetrieveError> {
        let completed: Vec<JobId> = self
            .statuses
            .iter()
            .filter(|(_, status)| **status == JobStatus::Completed)
            .map(|(id, _)| *id)
            .collect();
        if completed.is_empty() {
            return Err(RetrieveError::NotReady {
                cluster: self.cluster,
            });
        }

        if !self.spool {
            return Err(RetrieveError::RetrieveFailed {
                cluster: self.cluster,
                source: ClientError::NotSpooled(
                    "outputs were written directly to the shared filesystem".to_string(),
                ),
            });
        }

        let (skipped, pending): (Vec<JobId>, Vec<JobId>) = completed
            .into_iter()
            .partition(|id| self.retrieved.contains(id));

        if pending.is_empty() {
            info!(
                "All completed jobs of placement {} were already retrieved",
                self.cluster
            );
            return Ok(RetrieveReport {
                skipped,
                ..RetrieveReport::default()
            });
        }

        let files = self
            .connection
            .client()
            .transfer_back(self.connection.endpoint(), &pending, destination)
            .await
            .map_err(|source| RetrieveError::RetrieveFailed {
                cluster: self.cluster,
                source,
            })?;

        info!(
            "Retrieved {} file(s) of {} job(s) into {}",
            files.len(),
            pending.len(),
            destination.display()
        );
        self.retrieved.extend(pending.iter().copied());

        Ok(RetrieveReport {
            retrieved: pending,
            skipped,
            files,
        })
    }
}
