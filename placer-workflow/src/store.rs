//! Persisted placement records
//!
//! A placement outlives the process that submitted it; its identifiers and
//! last observed statuses are kept as one JSON file per placement so that a
//! later invocation can keep monitoring and retrieve it.

use chrono::{DateTime, Local};
use placer_core::domain::status::{JobId, JobStatus};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::StateError;

/// One unit of a persisted placement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitRecord {
    pub id: JobId,
    pub status: JobStatus,
    pub retrieved: bool,
}

/// Serializable form of a [`crate::Placement`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementRecord {
    pub access_point: String,
    pub collector: String,
    pub cluster: u64,
    pub spool: bool,
    pub units: Vec<UnitRecord>,
    pub submitted_at: DateTime<Local>,
    pub last_update: Option<DateTime<Local>>,
}

/// Directory of placement records
#[derive(Debug, Clone)]
pub struct PlacementStore {
    dir: PathBuf,
}

impl PlacementStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, access_point: &str, cluster: u64) -> Result<PathBuf, StateError> {
        if !is_plain_name(access_point) {
            return Err(StateError::InvalidAccessPoint {
                name: access_point.to_string(),
            });
        }
        Ok(self.dir.join(format!("{}.{}.json", access_point, cluster)))
    }

    /// Write (or overwrite) the record
    pub fn save(&self, record: &PlacementRecord) -> Result<PathBuf, StateError> {
        let path = self.path_for(&record.access_point, record.cluster)?;
        let io_error = |source| StateError::Io {
            path: path.clone(),
            source,
        };

        std::fs::create_dir_all(&self.dir).map_err(io_error)?;
        let json = serde_json::to_vec_pretty(record).map_err(|source| StateError::Corrupt {
            path: path.clone(),
            source,
        })?;
        std::fs::write(&path, json).map_err(io_error)?;

        debug!("Saved placement record {}", path.display());
        Ok(path)
    }

    /// Read the record of `cluster` submitted at `access_point`
    ///
    /// When there is no record for that access point but exactly one for the
    /// cluster elsewhere, the error names the access point it belongs to.
    pub fn load(&self, access_point: &str, cluster: u64) -> Result<PlacementRecord, StateError> {
        let path = self.path_for(access_point, cluster)?;
        match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|source| StateError::Corrupt { path, source }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let elsewhere = self
                    .list()?
                    .into_iter()
                    .find(|record| record.cluster == cluster);
                Err(match elsewhere {
                    Some(record) => StateError::WrongAccessPoint {
                        cluster,
                        recorded: record.access_point,
                        connected: access_point.to_string(),
                    },
                    None => StateError::UnknownPlacement {
                        access_point: access_point.to_string(),
                        cluster,
                    },
                })
            }
            Err(source) => Err(StateError::Io { path, source }),
        }
    }

    /// All readable records, oldest submission first
    ///
    /// Files that do not parse are skipped.
    pub fn list(&self) -> Result<Vec<PlacementRecord>, StateError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StateError::Io {
                    path: self.dir.clone(),
                    source,
                });
            }
        };

        let mut records = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            match std::fs::read(&path)
                .ok()
                .and_then(|bytes| serde_json::from_slice::<PlacementRecord>(&bytes).ok())
            {
                Some(record) => records.push(record),
                None => debug!("Skipping unreadable record {}", path.display()),
            }
        }

        records.sort_by_key(|record| record.submitted_at);
        Ok(records)
    }
}

/// Whether `name` stays a single component when used in a file name
pub(crate) fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}
