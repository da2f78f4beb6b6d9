//! Job identifiers and per-unit status

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Hold reason code the access point uses while spooled input is still arriving
pub const HOLD_REASON_SPOOLING_INPUT: u32 = 16;

/// Identifier of one queued unit: the batch (cluster) and its index (proc)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JobId {
    pub cluster: u64,
    pub proc: u32,
}

impl JobId {
    pub fn new(cluster: u64, proc: u32) -> Self {
        Self { cluster, proc }
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.cluster, self.proc)
    }
}

impl FromStr for JobId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (cluster, proc) = s
            .split_once('.')
            .ok_or_else(|| format!("'{}' is not a cluster.proc job id", s))?;
        Ok(Self {
            cluster: cluster
                .parse()
                .map_err(|_| format!("invalid cluster id in '{}'", s))?,
            proc: proc
                .parse()
                .map_err(|_| format!("invalid process id in '{}'", s))?,
        })
    }
}

/// Observed status of a single unit
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    TransferringInput,
    Running,
    Suspended,
    TransferringOutput,
    Completed,
    Held,
    Removed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 8] = [
        JobStatus::Queued,
        JobStatus::TransferringInput,
        JobStatus::Running,
        JobStatus::Suspended,
        JobStatus::TransferringOutput,
        JobStatus::Completed,
        JobStatus::Held,
        JobStatus::Removed,
    ];

    /// Map the access point's numeric status code
    ///
    /// A held job whose hold reason is [`HOLD_REASON_SPOOLING_INPUT`] is still
    /// waiting for its input, so it is reported as transferring input.
    pub fn from_raw(job_status: u8, hold_reason_code: Option<u32>) -> Option<Self> {
        match job_status {
            1 => Some(Self::Queued),
            2 => Some(Self::Running),
            3 => Some(Self::Removed),
            4 => Some(Self::Completed),
            5 if hold_reason_code == Some(HOLD_REASON_SPOOLING_INPUT) => {
                Some(Self::TransferringInput)
            }
            5 => Some(Self::Held),
            6 => Some(Self::TransferringOutput),
            7 => Some(Self::Suspended),
            _ => None,
        }
    }

    /// Inverse of [`JobStatus::from_raw`]
    pub fn to_raw(self) -> (u8, Option<u32>) {
        match self {
            Self::Queued => (1, None),
            Self::Running => (2, None),
            Self::Removed => (3, None),
            Self::Completed => (4, None),
            Self::TransferringInput => (5, Some(HOLD_REASON_SPOOLING_INPUT)),
            Self::Held => (5, None),
            Self::TransferringOutput => (6, None),
            Self::Suspended => (7, None),
        }
    }

    /// Completed, held and removed units need no further waiting
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Held | Self::Removed)
    }

    /// Completed and removed units never change status again
    pub fn is_final(self) -> bool {
        matches!(self, Self::Completed | Self::Removed)
    }

    /// Units that are still making progress toward completion
    pub fn in_progress(self) -> bool {
        matches!(
            self,
            Self::Queued | Self::TransferringInput | Self::Running | Self::TransferringOutput
        )
    }

    fn rank(self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::TransferringInput => 1,
            Self::Running | Self::Suspended => 2,
            Self::TransferringOutput => 3,
            Self::Held => 4,
            Self::Completed | Self::Removed => 5,
        }
    }

    /// Status to keep after observing `observed`
    ///
    /// Status never moves backward: an observation that ranks below the
    /// current status is ignored. Completed and removed are final; a held
    /// unit may still be seen completed or removed.
    pub fn advance(self, observed: JobStatus) -> JobStatus {
        if self.is_final() {
            return self;
        }
        if observed.rank() >= self.rank() {
            observed
        } else {
            self
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::TransferringInput => "transferring input",
            Self::Running => "running",
            Self::Suspended => "suspended",
            Self::TransferringOutput => "transferring output",
            Self::Completed => "completed",
            Self::Held => "held",
            Self::Removed => "removed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-unit status of a placement
pub type StatusMap = BTreeMap<JobId, JobStatus>;

/// Count of units per status at one point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSummary {
    counts: BTreeMap<JobStatus, usize>,
    updated_at: Option<DateTime<Local>>,
}

impl StatusSummary {
    pub fn from_statuses<'a>(
        statuses: impl IntoIterator<Item = &'a JobStatus>,
        updated_at: Option<DateTime<Local>>,
    ) -> Self {
        let mut counts = BTreeMap::new();
        for status in statuses {
            *counts.entry(*status).or_insert(0) += 1;
        }
        Self { counts, updated_at }
    }

    pub fn count(&self, status: JobStatus) -> usize {
        self.counts.get(&status).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// Number of units still in progress
    pub fn in_progress(&self) -> usize {
        self.counts
            .iter()
            .filter(|(status, _)| status.in_progress())
            .map(|(_, count)| count)
            .sum()
    }

    pub fn updated_at(&self) -> Option<DateTime<Local>> {
        self.updated_at
    }
}

impl fmt::Display for StatusSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(updated_at) = self.updated_at else {
            return write!(f, "Status unknown");
        };

        write!(f, "As of {}:", updated_at.format("%H:%M:%S"))?;
        for status in JobStatus::ALL {
            match self.count(status) {
                0 => {}
                1 => write!(f, "\n1 job is {}.", status)?,
                n => write!(f, "\n{} jobs are {}.", n, status)?,
            }
        }
        Ok(())
    }
}
