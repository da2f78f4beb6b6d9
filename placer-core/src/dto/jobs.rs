//! Job submission, status and transfer DTOs

use serde::{Deserialize, Serialize};

use crate::domain::description::JobDescription;
use crate::domain::status::{JobId, JobStatus};

/// Request to queue a job description
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub description: JobDescription,
    pub spool: bool,
}

/// Identifiers assigned to a submitted description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub cluster: u64,
    pub num_procs: u32,
}

impl SubmitResponse {
    /// All (cluster, proc) pairs of this submission
    pub fn job_ids(&self) -> Vec<JobId> {
        (0..self.num_procs)
            .map(|proc| JobId::new(self.cluster, proc))
            .collect()
    }
}

/// Status query for a set of units
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusQuery {
    pub ids: Vec<JobId>,
}

/// Raw status of one unit as reported by the access point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatusRecord {
    pub id: JobId,
    pub job_status: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hold_reason_code: Option<u32>,
}

impl JobStatusRecord {
    pub fn new(id: JobId, status: JobStatus) -> Self {
        let (job_status, hold_reason_code) = status.to_raw();
        Self {
            id,
            job_status,
            hold_reason_code,
        }
    }

    /// Interpreted status, `None` for codes this client does not know
    pub fn status(&self) -> Option<JobStatus> {
        JobStatus::from_raw(self.job_status, self.hold_reason_code)
    }
}

/// Request to pull back spooled artifacts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    pub ids: Vec<JobId>,
}

/// One spooled artifact of a completed unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpooledFile {
    pub id: JobId,
    pub name: String,
    pub contents: Vec<u8>,
}
