//! Scripted access point shared by the workflow integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use placer_client::{
    AccessPoint, ClientError, Endpoint, JobStatusRecord, SpooledFile, SubmitResponse,
    write_spooled_files,
};
use placer_core::domain::credential::Credential;
use placer_core::domain::description::JobDescription;
use placer_core::domain::status::{JobId, JobStatus};
use placer_workflow::{Connection, ConnectionConfig};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const CLUSTER: u64 = 42;

/// Failure a scripted call answers with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    NotFound,
    Auth,
    Rejected,
    Unavailable,
}

impl Failure {
    fn error(self) -> ClientError {
        match self {
            Self::NotFound => ClientError::NotFound("no such access point".to_string()),
            Self::Auth => ClientError::AuthenticationFailed("token expired".to_string()),
            Self::Rejected => ClientError::Rejected("bad attribute".to_string()),
            Self::Unavailable => ClientError::from_status(503, "schedd unavailable"),
        }
    }
}

/// One status poll: per-proc statuses, or a failure
pub type PollStep = Result<Vec<JobStatus>, Failure>;

#[derive(Default)]
struct Script {
    locate: Option<Failure>,
    submit: Option<Failure>,
    polls: VecDeque<PollStep>,
    transfers: VecDeque<Failure>,
    transferred: Vec<Vec<JobId>>,
    status_delay: Option<Duration>,
}

/// Access point answering from a script, counting every call
pub struct ScriptedAccessPoint {
    num_procs: u32,
    script: Mutex<Script>,
    pub locate_calls: AtomicUsize,
    pub submit_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
    pub transfer_calls: AtomicUsize,
}

impl ScriptedAccessPoint {
    pub fn new(num_procs: u32) -> Self {
        Self {
            num_procs,
            script: Mutex::new(Script::default()),
            locate_calls: AtomicUsize::new(0),
            submit_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            transfer_calls: AtomicUsize::new(0),
        }
    }

    pub fn fail_locate(self, failure: Failure) -> Self {
        self.script.lock().unwrap().locate = Some(failure);
        self
    }

    pub fn fail_submit(self, failure: Failure) -> Self {
        self.script.lock().unwrap().submit = Some(failure);
        self
    }

    /// Queue poll answers; the last one repeats once the queue runs dry
    pub fn push_polls(&self, steps: impl IntoIterator<Item = PollStep>) {
        self.script.lock().unwrap().polls.extend(steps);
    }

    /// Make every status query hang for `delay` before answering
    pub fn stall_status(&self, delay: Duration) {
        self.script.lock().unwrap().status_delay = Some(delay);
    }

    /// Fail the next transfer
    pub fn fail_next_transfer(&self, failure: Failure) {
        self.script.lock().unwrap().transfers.push_back(failure);
    }

    /// Ids passed to each successful transfer
    pub fn transferred(&self) -> Vec<Vec<JobId>> {
        self.script.lock().unwrap().transferred.clone()
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn next_poll(&self) -> PollStep {
        let mut script = self.script.lock().unwrap();
        if script.polls.len() > 1 {
            script.polls.pop_front().unwrap()
        } else {
            script.polls.front().cloned().unwrap_or(Ok(Vec::new()))
        }
    }
}

#[async_trait]
impl AccessPoint for ScriptedAccessPoint {
    async fn locate(
        &self,
        collector: &str,
        name: &str,
        credential: &Credential,
    ) -> placer_client::Result<Endpoint> {
        self.locate_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(failure) = self.script.lock().unwrap().locate {
            return Err(failure.error());
        }
        Ok(Endpoint {
            name: name.to_string(),
            address: format!("{}/{}", collector, name),
            credential: credential.clone(),
        })
    }

    async fn submit(
        &self,
        _endpoint: &Endpoint,
        _description: &JobDescription,
        _spool: bool,
    ) -> placer_client::Result<SubmitResponse> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(failure) = self.script.lock().unwrap().submit {
            return Err(failure.error());
        }
        Ok(SubmitResponse {
            cluster: CLUSTER,
            num_procs: self.num_procs,
        })
    }

    async fn query_status(
        &self,
        _endpoint: &Endpoint,
        ids: &[JobId],
    ) -> placer_client::Result<Vec<JobStatusRecord>> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.script.lock().unwrap().status_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let statuses = self.next_poll().map_err(Failure::error)?;
        Ok(ids
            .iter()
            .filter_map(|id| {
                statuses
                    .get(id.proc as usize)
                    .map(|status| JobStatusRecord::new(*id, *status))
            })
            .collect())
    }

    async fn transfer_back(
        &self,
        _endpoint: &Endpoint,
        ids: &[JobId],
        destination: &Path,
    ) -> placer_client::Result<Vec<PathBuf>> {
        self.transfer_calls.fetch_add(1, Ordering::SeqCst);
        let failure = self.script.lock().unwrap().transfers.pop_front();
        if let Some(failure) = failure {
            return Err(failure.error());
        }

        self.script.lock().unwrap().transferred.push(ids.to_vec());
        let files: Vec<SpooledFile> = ids
            .iter()
            .map(|id| SpooledFile {
                id: *id,
                name: format!("out.{}", id.proc),
                contents: format!("unit {}\n", id).into_bytes(),
            })
            .collect();
        write_spooled_files(&files, destination).await
    }
}

pub fn connection_config() -> ConnectionConfig {
    ConnectionConfig {
        collector: "http://cm.example.org:9618".to_string(),
        access_point: "ap1".to_string(),
    }
}

/// Connect to a scripted access point with a throwaway token
pub async fn connect(ap: &Arc<ScriptedAccessPoint>) -> Connection {
    Connection::connect(
        &connection_config(),
        Arc::clone(ap) as Arc<dyn AccessPoint>,
        &Credential::from("test-token"),
    )
    .await
    .unwrap()
}

/// Description with `procs` units
pub fn description(procs: u32) -> JobDescription {
    JobDescription::parse(&format!(
        "Executable = /bin/true\nOutput = out.$(Process)\nQueue {}\n",
        procs
    ))
    .unwrap()
}
