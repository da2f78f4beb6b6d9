//! Error taxonomy of the placement workflow
//!
//! Every message says what went wrong and what to do about it; callers can
//! show them to users as they are.

use placer_client::ClientError;
use placer_core::domain::description::ParseError;
use std::path::PathBuf;
use thiserror::Error;

fn show_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Token installation failures
#[derive(Debug, Error)]
pub enum InstallError {
    /// No token file at the given path or in any search location
    #[error("no placement token found (looked for {}); place the token file there or pass its path, then retry", show_paths(.searched))]
    NotFound { searched: Vec<PathBuf> },

    /// The given path exists but is not a usable token file
    #[error("{} is not a readable token file ({reason}); pass the path of the token file itself", .path.display())]
    SourceInvalid { path: PathBuf, reason: String },

    /// Copying the token or setting its permissions failed
    #[error("could not install the token into {}: {source}; check that you can write to that directory", .destination.display())]
    InstallFailed {
        destination: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl InstallError {
    /// Process exit code for command-line tools
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NotFound { .. } => 2,
            Self::SourceInvalid { .. } => 3,
            Self::InstallFailed { .. } => 4,
        }
    }
}

/// Connection failures
#[derive(Debug, Error)]
pub enum ConnectError {
    /// Nothing is installed to authenticate with
    #[error("no placement token is installed at {}; install one with 'install-token' and retry", .path.display())]
    CredentialMissing { path: PathBuf },

    /// The collector does not know the endpoint, or cannot be reached
    #[error("could not locate access point '{name}' through {collector}: {source}; check the collector address and access point name")]
    ResolutionFailed {
        name: String,
        collector: String,
        #[source]
        source: ClientError,
    },

    /// The access point refused the installed token
    #[error("authentication to access point '{name}' failed; you might need to get another token")]
    AuthFailed {
        name: String,
        #[source]
        source: ClientError,
    },
}

fn submit_hint(source: &ClientError) -> &'static str {
    if source.is_auth_failure() {
        "you might need to get another token"
    } else {
        "fix the job description and submit again"
    }
}

/// Submission failures
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("the access point did not accept the job: {source}; {}", submit_hint(.source))]
    SubmitFailed {
        #[source]
        source: ClientError,
    },
}

/// Result retrieval failures
#[derive(Debug, Error)]
pub enum RetrieveError {
    /// Nothing has completed yet
    #[error("no job of placement {cluster} has completed yet; monitor the placement and retrieve once a job completes")]
    NotReady { cluster: u64 },

    /// The transfer itself failed
    #[error("retrieving results of placement {cluster} failed: {source}; retrying is safe")]
    RetrieveFailed {
        cluster: u64,
        #[source]
        source: ClientError,
    },
}

/// Failures reading or writing persisted placement records
#[derive(Debug, Error)]
pub enum StateError {
    #[error("cannot access placement record {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("placement record {} is corrupt: {source}; remove it and check the access point directly", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("access point name '{name}' cannot be used in a record file name")]
    InvalidAccessPoint { name: String },

    #[error("no record of placement {cluster} at access point '{access_point}'; submit it from this machine first")]
    UnknownPlacement { access_point: String, cluster: u64 },

    #[error("placement {cluster} was made at access point '{recorded}', not '{connected}'; connect to '{recorded}' to resume it")]
    WrongAccessPoint {
        cluster: u64,
        recorded: String,
        connected: String,
    },
}

/// Any failure of a workflow step
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Install(#[from] InstallError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Submit(#[from] SubmitError),

    #[error(transparent)]
    Retrieve(#[from] RetrieveError),

    #[error(transparent)]
    State(#[from] StateError),
}

impl WorkflowError {
    /// Process exit code, distinct per failure class
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Install(e) => e.exit_code(),
            Self::Parse(_) => 5,
            Self::Connect(_) => 6,
            Self::Submit(_) => 7,
            Self::Retrieve(_) => 8,
            Self::State(_) => 1,
        }
    }
}
