//! In-process access point
//!
//! Runs submitted jobs on this machine. Each unit gets a sandbox directory
//! below the spool root; its standard output and error are captured into the
//! files the description names, and a short event log is written when `Log`
//! is set. Statuses progress queued -> running -> completed (or held when the
//! executable cannot be started).

use async_trait::async_trait;
use placer_core::domain::credential::Credential;
use placer_core::domain::description::{JobDescription, TransferFiles};
use placer_core::domain::status::{JobId, JobStatus};
use placer_core::dto::jobs::{JobStatusRecord, SpooledFile, SubmitResponse};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{ClientError, Result};
use crate::{AccessPoint, Endpoint, write_spooled_files};

/// Bookkeeping for one queued unit
#[derive(Debug)]
struct LocalJob {
    status: JobStatus,
    spooled: bool,
    sandbox: PathBuf,
    outputs: Vec<String>,
    exit_code: Option<i32>,
}

#[derive(Debug, Default)]
struct LocalState {
    next_cluster: u64,
    jobs: BTreeMap<JobId, LocalJob>,
}

/// Access point that executes jobs on the local machine
#[derive(Debug, Clone)]
pub struct LocalAccessPoint {
    endpoints: Vec<String>,
    spool_root: PathBuf,
    required_credential: Option<Credential>,
    state: Arc<Mutex<LocalState>>,
}

impl LocalAccessPoint {
    /// Create an access point serving `endpoint` from `spool_root`
    pub fn new(endpoint: impl Into<String>, spool_root: impl Into<PathBuf>) -> Self {
        Self {
            endpoints: vec![endpoint.into()],
            spool_root: spool_root.into(),
            required_credential: None,
            state: Arc::new(Mutex::new(LocalState {
                next_cluster: 1,
                jobs: BTreeMap::new(),
            })),
        }
    }

    /// Only accept this credential
    pub fn require_credential(mut self, credential: Credential) -> Self {
        self.required_credential = Some(credential);
        self
    }

    pub fn spool_root(&self) -> &Path {
        &self.spool_root
    }

    /// Address reported for located endpoints
    pub fn address(&self) -> String {
        format!("local://{}", self.spool_root.display())
    }

    /// Exit code of a finished unit
    pub fn exit_code(&self, id: JobId) -> Option<i32> {
        self.state().jobs.get(&id).and_then(|job| job.exit_code)
    }

    fn state(&self) -> MutexGuard<'_, LocalState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_credential(&self, name: &str, credential: &Credential) -> Result<()> {
        match &self.required_credential {
            Some(required) if !required.matches_bearer(&credential.bearer()) => {
                Err(ClientError::AuthenticationFailed(format!(
                    "placement token refused by access point '{}'",
                    name
                )))
            }
            _ => Ok(()),
        }
    }

    fn authorize(&self, endpoint: &Endpoint) -> Result<()> {
        if !self.endpoints.iter().any(|name| name == &endpoint.name) {
            return Err(ClientError::NotFound(format!(
                "access point '{}' is not served here",
                endpoint.name
            )));
        }
        self.check_credential(&endpoint.name, &endpoint.credential)
    }

    /// Artifacts of the completed units among `ids`
    ///
    /// Units that are not completed yet are skipped. Asking for units that
    /// were submitted without spooling fails with [`ClientError::NotSpooled`].
    pub async fn spooled_files(
        &self,
        endpoint: &Endpoint,
        ids: &[JobId],
    ) -> Result<Vec<SpooledFile>> {
        self.authorize(endpoint)?;

        let mut wanted = Vec::new();
        {
            let state = self.state();
            for id in ids {
                let job = state
                    .jobs
                    .get(id)
                    .ok_or_else(|| ClientError::NotFound(format!("job {} is not queued here", id)))?;
                if !job.spooled {
                    return Err(ClientError::NotSpooled(format!(
                        "job {} wrote its output directly to {}",
                        id,
                        job.sandbox.display()
                    )));
                }
                if job.status == JobStatus::Completed {
                    for name in &job.outputs {
                        wanted.push((*id, name.clone(), job.sandbox.join(name)));
                    }
                }
            }
        }

        let mut files = Vec::with_capacity(wanted.len());
        for (id, name, path) in wanted {
            match tokio::fs::read(&path).await {
                Ok(contents) => files.push(SpooledFile { id, name, contents }),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!("Job {} did not produce {}", id, name);
                }
                Err(e) => {
                    return Err(ClientError::io(
                        format!("Failed to read {}", path.display()),
                        e,
                    ));
                }
            }
        }

        Ok(files)
    }

    /// Forget delivered units and delete their spool sandboxes
    ///
    /// Only completed, spooled units are released; anything else among `ids`
    /// is left alone. Released units are no longer known to this access point.
    pub async fn release(&self, ids: &[JobId]) {
        let mut sandboxes = Vec::new();
        {
            let mut state = self.state();
            for id in ids {
                let delivered = state
                    .jobs
                    .get(id)
                    .is_some_and(|job| job.spooled && job.status == JobStatus::Completed);
                if let Some(job) = delivered.then(|| state.jobs.remove(id)).flatten() {
                    sandboxes.push((*id, job.sandbox));
                }
            }
        }

        for (id, sandbox) in sandboxes {
            debug!("Releasing job {}", id);
            if let Err(e) = tokio::fs::remove_dir_all(&sandbox).await {
                warn!("Could not remove sandbox {}: {}", sandbox.display(), e);
            }
        }
    }

    fn set_status(state: &Mutex<LocalState>, id: JobId, status: JobStatus, exit_code: Option<i32>) {
        let mut state = state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(job) = state.jobs.get_mut(&id) {
            job.status = status;
            if exit_code.is_some() {
                job.exit_code = exit_code;
            }
        }
    }

    /// Run one unit to completion and record the outcome
    async fn run_unit(
        state: Arc<Mutex<LocalState>>,
        id: JobId,
        executable: PathBuf,
        description: JobDescription,
        sandbox: PathBuf,
    ) {
        Self::set_status(&state, id, JobStatus::Running, None);

        match execute(id, &executable, &description, &sandbox).await {
            Ok(code) => {
                info!("Job {} exited with code {:?}", id, code);
                Self::set_status(&state, id, JobStatus::Completed, code);
            }
            Err(e) => {
                warn!("Job {} could not run: {}", id, e);
                Self::set_status(&state, id, JobStatus::Held, None);
            }
        }
    }
}

#[async_trait]
impl AccessPoint for LocalAccessPoint {
    async fn locate(
        &self,
        _collector: &str,
        name: &str,
        credential: &Credential,
    ) -> Result<Endpoint> {
        if !self.endpoints.iter().any(|known| known == name) {
            return Err(ClientError::NotFound(format!(
                "no access point named '{}' is registered",
                name
            )));
        }
        self.check_credential(name, credential)?;

        Ok(Endpoint {
            name: name.to_string(),
            address: self.address(),
            credential: credential.clone(),
        })
    }

    async fn submit(
        &self,
        endpoint: &Endpoint,
        description: &JobDescription,
        spool: bool,
    ) -> Result<SubmitResponse> {
        self.authorize(endpoint)?;

        let executable = description
            .executable()
            .ok_or_else(|| ClientError::Rejected("no executable given".to_string()))?;

        if spool && description.should_transfer_files() == Some(TransferFiles::No) {
            return Err(ClientError::Rejected(
                "spooling needs file transfer, but Should_Transfer_Files = NO".to_string(),
            ));
        }

        let executable = if description.transfer_executable() {
            std::fs::canonicalize(executable).map_err(|_| {
                ClientError::Rejected(format!(
                    "executable '{}' cannot be transferred: no such file",
                    executable
                ))
            })?
        } else {
            PathBuf::from(executable)
        };

        let shared_dir = description
            .get("initialdir")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        let (response, units) = {
            let mut state = self.state();
            let cluster = state.next_cluster;
            state.next_cluster += 1;

            let mut units = Vec::new();
            for proc in 0..description.queue_count() {
                let id = JobId::new(cluster, proc);
                let sandbox = if spool {
                    self.spool_root.join(id.to_string())
                } else {
                    shared_dir.clone()
                };
                state.jobs.insert(
                    id,
                    LocalJob {
                        status: JobStatus::Queued,
                        spooled: spool,
                        sandbox: sandbox.clone(),
                        outputs: description.output_files(id),
                        exit_code: None,
                    },
                );
                units.push((id, sandbox));
            }

            let response = SubmitResponse {
                cluster,
                num_procs: description.queue_count(),
            };
            (response, units)
        };

        info!(
            "Queued cluster {} with {} unit(s) at {}",
            response.cluster, response.num_procs, endpoint.name
        );

        for (id, sandbox) in units {
            tokio::spawn(Self::run_unit(
                Arc::clone(&self.state),
                id,
                executable.clone(),
                description.clone(),
                sandbox,
            ));
        }

        Ok(response)
    }

    async fn query_status(
        &self,
        endpoint: &Endpoint,
        ids: &[JobId],
    ) -> Result<Vec<JobStatusRecord>> {
        self.authorize(endpoint)?;

        let state = self.state();
        Ok(ids
            .iter()
            .filter_map(|id| {
                state
                    .jobs
                    .get(id)
                    .map(|job| JobStatusRecord::new(*id, job.status))
            })
            .collect())
    }

    async fn transfer_back(
        &self,
        endpoint: &Endpoint,
        ids: &[JobId],
        destination: &Path,
    ) -> Result<Vec<PathBuf>> {
        let files = self.spooled_files(endpoint, ids).await?;
        let written = write_spooled_files(&files, destination).await?;
        self.release(ids).await;
        Ok(written)
    }
}

/// Start the executable in its sandbox and wait for it
async fn execute(
    id: JobId,
    executable: &Path,
    description: &JobDescription,
    sandbox: &Path,
) -> std::io::Result<Option<i32>> {
    tokio::fs::create_dir_all(sandbox).await?;

    let event_log = description
        .log()
        .map(|name| sandbox.join(JobDescription::expand(name, id)));
    log_event(event_log.as_deref(), id, "000", "Job submitted from local access point")?;

    log_event(event_log.as_deref(), id, "001", "Job executing on local host")?;

    let stdout = open_capture(sandbox, description.output(), id)?;
    let stderr = open_capture(sandbox, description.error(), id)?;

    let status = Command::new(executable)
        .args(description.argv())
        .current_dir(sandbox)
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr)
        .status()
        .await;

    let status = match status {
        Ok(status) => status,
        Err(e) => {
            log_event(event_log.as_deref(), id, "012", &format!("Job was held: {}", e))?;
            return Err(e);
        }
    };

    log_event(
        event_log.as_deref(),
        id,
        "005",
        &format!(
            "Job terminated. (return value {})",
            status.code().map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string())
        ),
    )?;

    Ok(status.code())
}

fn open_capture(sandbox: &Path, name: Option<&str>, id: JobId) -> std::io::Result<Stdio> {
    match name {
        Some(name) => {
            let file = std::fs::File::create(sandbox.join(JobDescription::expand(name, id)))?;
            Ok(Stdio::from(file))
        }
        None => Ok(Stdio::null()),
    }
}

fn log_event(path: Option<&Path>, id: JobId, code: &str, message: &str) -> std::io::Result<()> {
    let Some(path) = path else {
        return Ok(());
    };

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(
        file,
        "{} ({:03}.{:03}.000) {} {}\n...",
        code,
        id.cluster,
        id.proc,
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        message
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn wait_for_terminal(ap: &LocalAccessPoint, endpoint: &Endpoint, ids: &[JobId]) {
        for _ in 0..200 {
            let records = ap.query_status(endpoint, ids).await.unwrap();
            if records
                .iter()
                .all(|r| r.status().map(|s| s.is_terminal()).unwrap_or(false))
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("jobs did not finish in time");
    }

    async fn located(ap: &LocalAccessPoint) -> Endpoint {
        ap.locate("local", "ap1", &Credential::from("tok"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_locate_unknown_endpoint() {
        let dir = TempDir::new().unwrap();
        let ap = LocalAccessPoint::new("ap1", dir.path());
        let err = ap
            .locate("local", "ap2", &Credential::from("tok"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_locate_with_wrong_credential() {
        let dir = TempDir::new().unwrap();
        let ap =
            LocalAccessPoint::new("ap1", dir.path()).require_credential(Credential::from("right"));
        let err = ap
            .locate("local", "ap1", &Credential::from("wrong"))
            .await
            .unwrap_err();
        assert!(err.is_auth_failure());
        assert!(ap.locate("local", "ap1", &Credential::from("right")).await.is_ok());
    }

    #[tokio::test]
    async fn test_run_and_transfer_back() {
        let dir = TempDir::new().unwrap();
        let ap = LocalAccessPoint::new("ap1", dir.path().join("spool"));
        let endpoint = located(&ap).await;

        let description = JobDescription::parse(
            "Executable = /bin/sh\nArguments = \"-c 'echo unit $0'\"\nOutput = out.$(Process)\nLog = job.log\nQueue 2\n",
        )
        .unwrap();
        let submitted = ap.submit(&endpoint, &description, true).await.unwrap();
        assert_eq!(submitted.num_procs, 2);

        let ids = submitted.job_ids();
        wait_for_terminal(&ap, &endpoint, &ids).await;
        assert_eq!(ap.exit_code(ids[0]), Some(0));

        let results = dir.path().join("results");
        let written = ap.transfer_back(&endpoint, &ids, &results).await.unwrap();
        assert!(written.contains(&results.join("out.0")));
        assert!(written.contains(&results.join("out.1")));
        assert!(written.contains(&results.join("job.log")));

        // delivered units are forgotten and their sandboxes removed
        assert!(!dir.path().join("spool").join(ids[0].to_string()).exists());
        assert!(ap.query_status(&endpoint, &ids).await.unwrap().is_empty());
        let err = ap.transfer_back(&endpoint, &ids, &results).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_release_keeps_unfinished_and_unspooled_units() {
        let dir = TempDir::new().unwrap();
        let shared = dir.path().join("shared");
        std::fs::create_dir_all(&shared).unwrap();
        let ap = LocalAccessPoint::new("ap1", dir.path().join("spool"));
        let endpoint = located(&ap).await;

        let slow = JobDescription::parse("Executable = /bin/sleep\nArguments = 5\nQueue\n").unwrap();
        let running = ap.submit(&endpoint, &slow, true).await.unwrap().job_ids();
        let unspooled = JobDescription::parse(&format!(
            "Executable = /bin/true\nInitialdir = {}\nQueue\n",
            shared.display()
        ))
        .unwrap();
        let direct = ap.submit(&endpoint, &unspooled, false).await.unwrap().job_ids();
        wait_for_terminal(&ap, &endpoint, &direct).await;

        let all: Vec<JobId> = running.iter().chain(direct.iter()).copied().collect();
        ap.release(&all).await;
        assert_eq!(ap.query_status(&endpoint, &all).await.unwrap().len(), 2);
        assert!(shared.exists());
    }

    #[tokio::test]
    async fn test_missing_executable_is_rejected() {
        let dir = TempDir::new().unwrap();
        let ap = LocalAccessPoint::new("ap1", dir.path());
        let endpoint = located(&ap).await;

        let description =
            JobDescription::parse("Executable = /nonexistent/placer-tool\nQueue\n").unwrap();
        let err = ap.submit(&endpoint, &description, true).await.unwrap_err();
        assert!(matches!(err, ClientError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_spooling_without_file_transfer_is_rejected() {
        let dir = TempDir::new().unwrap();
        let ap = LocalAccessPoint::new("ap1", dir.path());
        let endpoint = located(&ap).await;

        let description =
            JobDescription::parse("Executable = /bin/true\nShould_Transfer_Files = NO\nQueue\n")
                .unwrap();
        let err = ap.submit(&endpoint, &description, true).await.unwrap_err();
        assert!(matches!(err, ClientError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_unstartable_executable_is_held() {
        let dir = TempDir::new().unwrap();
        let ap = LocalAccessPoint::new("ap1", dir.path());
        let endpoint = located(&ap).await;

        let description = JobDescription::parse(
            "Executable = /nonexistent/placer-tool\nTransfer_Executable = false\nQueue\n",
        )
        .unwrap();
        let submitted = ap.submit(&endpoint, &description, true).await.unwrap();
        let ids = submitted.job_ids();
        wait_for_terminal(&ap, &endpoint, &ids).await;

        let records = ap.query_status(&endpoint, &ids).await.unwrap();
        assert_eq!(records[0].status(), Some(JobStatus::Held));
    }

    #[tokio::test]
    async fn test_unspooled_jobs_cannot_be_transferred() {
        let dir = TempDir::new().unwrap();
        let shared = dir.path().join("shared");
        std::fs::create_dir_all(&shared).unwrap();
        let ap = LocalAccessPoint::new("ap1", dir.path().join("spool"));
        let endpoint = located(&ap).await;

        let description = JobDescription::parse(&format!(
            "Executable = /bin/true\nInitialdir = {}\nQueue\n",
            shared.display()
        ))
        .unwrap();
        let submitted = ap.submit(&endpoint, &description, false).await.unwrap();
        let ids = submitted.job_ids();
        wait_for_terminal(&ap, &endpoint, &ids).await;

        let err = ap
            .transfer_back(&endpoint, &ids, dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::NotSpooled(_)));
    }
}
