//! Placer access-point client
//!
//! The job-queueing service behind an access point is reached through the
//! [`AccessPoint`] trait, which exposes exactly four operations: locating a
//! named endpoint through a collector, submitting a description, querying
//! unit status and transferring spooled artifacts back.
//!
//! Two implementations ship with this crate:
//! - [`HttpAccessPoint`] talks to an access-point gateway over HTTP
//! - [`LocalAccessPoint`] runs jobs in-process from a local spool directory
//!
//! # Example
//!
//! ```no_run
//! use placer_client::{AccessPoint, HttpAccessPoint};
//! use placer_core::domain::credential::Credential;
//! use placer_core::domain::description::JobDescription;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = HttpAccessPoint::new();
//!     let credential = Credential::from("token-text");
//!     let endpoint = client
//!         .locate("http://localhost:9618", "ap1", &credential)
//!         .await?;
//!
//!     let description = JobDescription::parse("Executable = /bin/true\nQueue 1\n")?;
//!     let submitted = client.submit(&endpoint, &description, true).await?;
//!     println!("Placed cluster {}", submitted.cluster);
//!     Ok(())
//! }
//! ```

pub mod error;
mod http;
mod local;

pub use error::{ClientError, Result};
pub use http::HttpAccessPoint;
pub use local::LocalAccessPoint;
pub use placer_core::dto::jobs::{JobStatusRecord, SpooledFile, SubmitResponse};

use async_trait::async_trait;
use placer_core::domain::credential::Credential;
use placer_core::domain::description::JobDescription;
use placer_core::domain::status::JobId;
use std::path::{Path, PathBuf};

/// A located submission endpoint, authenticated with a credential
#[derive(Debug, Clone)]
pub struct Endpoint {
    /// Endpoint identity as registered with the collector
    pub name: String,
    /// Address the endpoint is reached at
    pub address: String,
    /// Credential presented on every request to this endpoint
    pub credential: Credential,
}

/// Client capability of a remote job-queueing service
///
/// All implementations are stateless from the caller's point of view: the
/// same endpoint may be used for any number of submissions.
#[async_trait]
pub trait AccessPoint: Send + Sync {
    /// Resolve a named submission endpoint through a collector
    ///
    /// # Errors
    /// - [`ClientError::NotFound`] when no endpoint with that name is known
    /// - [`ClientError::AuthenticationFailed`] when the credential is refused
    async fn locate(&self, collector: &str, name: &str, credential: &Credential)
    -> Result<Endpoint>;

    /// Queue a job description, optionally spooling its artifacts
    async fn submit(
        &self,
        endpoint: &Endpoint,
        description: &JobDescription,
        spool: bool,
    ) -> Result<SubmitResponse>;

    /// Current raw status of the given units
    ///
    /// Units unknown to the access point are left out of the answer.
    async fn query_status(&self, endpoint: &Endpoint, ids: &[JobId])
    -> Result<Vec<JobStatusRecord>>;

    /// Copy the spooled artifacts of completed units into `destination`
    ///
    /// Returns the paths written.
    async fn transfer_back(
        &self,
        endpoint: &Endpoint,
        ids: &[JobId],
        destination: &Path,
    ) -> Result<Vec<PathBuf>>;
}

/// Write transferred artifacts below `destination`
///
/// Only plain file names are accepted; anything that could escape the
/// destination directory is refused.
pub async fn write_spooled_files(
    files: &[SpooledFile],
    destination: &Path,
) -> Result<Vec<PathBuf>> {
    tokio::fs::create_dir_all(destination)
        .await
        .map_err(|e| ClientError::io(format!("Failed to create {}", destination.display()), e))?;

    let mut written = Vec::with_capacity(files.len());
    for file in files {
        let name = Path::new(&file.name);
        let plain = name.file_name().map(|n| n == name.as_os_str()).unwrap_or(false);
        if !plain {
            return Err(ClientError::ParseError(format!(
                "refusing artifact name '{}' of job {}",
                file.name, file.id
            )));
        }

        let path = destination.join(name);
        tokio::fs::write(&path, &file.contents)
            .await
            .map_err(|e| ClientError::io(format!("Failed to write {}", path.display()), e))?;
        written.push(path);
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_spooled_files() {
        let dir = TempDir::new().unwrap();
        let files = vec![SpooledFile {
            id: JobId::new(1, 0),
            name: "job.out".to_string(),
            contents: b"done\n".to_vec(),
        }];

        let written = write_spooled_files(&files, &dir.path().join("results"))
            .await
            .unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(std::fs::read(&written[0]).unwrap(), b"done\n");
    }

    #[tokio::test]
    async fn test_write_spooled_files_refuses_traversal() {
        let dir = TempDir::new().unwrap();
        for name in ["../escape", "sub/dir", "/etc/passwd"] {
            let files = vec![SpooledFile {
                id: JobId::new(1, 0),
                name: name.to_string(),
                contents: Vec::new(),
            }];
            let err = write_spooled_files(&files, dir.path()).await.unwrap_err();
            assert!(matches!(err, ClientError::ParseError(_)), "{}", name);
        }
    }
}
