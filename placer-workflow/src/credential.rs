//! Placement token discovery and installation

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Local};
use placer_core::domain::credential::{Credential, TOKEN_DIR_MODE, TOKEN_FILE_MODE};
use std::fs::{self, DirBuilder, OpenOptions};
use std::io::Write;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::WorkflowConfig;
use crate::error::{ConnectError, InstallError};

/// What is currently installed at the token destination
///
/// Expiry is read from the `exp` claim of the token's payload. The access
/// point still has the final word on whether a token is accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenState {
    Missing,
    Unreadable(String),
    /// Installed, but its expiry cannot be read
    Unrecognized { reason: String, mode: u32 },
    Expired { expired_at: DateTime<Local>, mode: u32 },
    Valid {
        expires_at: DateTime<Local>,
        modified: Option<DateTime<Local>>,
        len: u64,
        mode: u32,
    },
}

/// Finds a placement token and installs it for the invoking user
#[derive(Debug, Clone)]
pub struct CredentialInstaller {
    file_name: String,
    search_dirs: Vec<PathBuf>,
    destination_dir: PathBuf,
}

impl CredentialInstaller {
    pub fn new(
        file_name: impl Into<String>,
        search_dirs: Vec<PathBuf>,
        destination_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            search_dirs,
            destination_dir: destination_dir.into(),
        }
    }

    pub fn from_config(config: &WorkflowConfig) -> Self {
        Self::new(
            config.token_filename.clone(),
            config.token_search_dirs.clone(),
            config.token_dir.clone(),
        )
    }

    /// Path the token is installed at
    pub fn destination(&self) -> PathBuf {
        self.destination_dir.join(&self.file_name)
    }

    /// Pick the token to install
    ///
    /// An explicit path wins; otherwise the search directories are tried in
    /// order for the configured file name.
    pub fn resolve_source(&self, explicit: Option<&Path>) -> Result<PathBuf, InstallError> {
        let candidates: Vec<PathBuf> = match explicit {
            Some(path) => vec![path.to_path_buf()],
            None => self
                .search_dirs
                .iter()
                .map(|dir| dir.join(&self.file_name))
                .collect(),
        };

        match candidates.iter().find(|path| path.exists()) {
            Some(found) => Ok(found.clone()),
            None => Err(InstallError::NotFound {
                searched: candidates,
            }),
        }
    }

    /// Copy the token into place with owner-only permissions
    ///
    /// Any previously installed token is replaced. Returns the destination.
    ///
    /// # Errors
    /// - [`InstallError::NotFound`] when no source exists; nothing is written
    /// - [`InstallError::SourceInvalid`] when the source is not a readable,
    ///   non-empty regular file
    /// - [`InstallError::InstallFailed`] when writing the destination fails
    pub fn install(&self, explicit: Option<&Path>) -> Result<PathBuf, InstallError> {
        let source = self.resolve_source(explicit)?;
        let contents = read_source(&source)?;

        let destination = self.destination();
        let failed = |source: std::io::Error| InstallError::InstallFailed {
            destination: destination.clone(),
            source,
        };

        create_private_dir(&self.destination_dir).map_err(failed)?;
        write_private_file(&destination, &contents).map_err(failed)?;

        info!(
            "Installed placement token from {} to {}",
            source.display(),
            destination.display()
        );
        Ok(destination)
    }

    /// Inspect the installed token
    pub fn state(&self) -> TokenState {
        let destination = self.destination();
        let meta = match fs::metadata(&destination) {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => {
                return TokenState::Unreadable(format!(
                    "{} is not a file",
                    destination.display()
                ));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return TokenState::Missing,
            Err(e) => return TokenState::Unreadable(e.to_string()),
        };
        let contents = match fs::read(&destination) {
            Ok(contents) => contents,
            Err(e) => return TokenState::Unreadable(e.to_string()),
        };

        let mode = meta.permissions().mode() & 0o777;
        match token_expiry(&contents) {
            Err(reason) => {
                debug!("Cannot decode {}: {}", destination.display(), reason);
                TokenState::Unrecognized { reason, mode }
            }
            Ok(expires_at) if expires_at < Local::now() => TokenState::Expired {
                expired_at: expires_at,
                mode,
            },
            Ok(expires_at) => TokenState::Valid {
                expires_at,
                modified: meta.modified().ok().map(DateTime::<Local>::from),
                len: meta.len(),
                mode,
            },
        }
    }

    /// Read the installed token
    pub fn load(&self) -> Result<Credential, ConnectError> {
        let destination = self.destination();
        let missing = || ConnectError::CredentialMissing {
            path: destination.clone(),
        };

        let bytes = fs::read(&destination).map_err(|e| {
            debug!("Cannot read {}: {}", destination.display(), e);
            missing()
        })?;
        let credential = Credential::new(bytes);
        if credential.is_empty() {
            return Err(missing());
        }
        Ok(credential)
    }
}

/// Expiry claim of a `header.payload.signature` token
fn token_expiry(contents: &[u8]) -> Result<DateTime<Local>, String> {
    let text = std::str::from_utf8(contents).map_err(|_| "not a text token".to_string())?;
    let payload = text
        .trim()
        .split('.')
        .nth(1)
        .ok_or_else(|| "not a signed token".to_string())?;
    let decoded = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| format!("payload is not base64: {}", e))?;
    let claims: serde_json::Value =
        serde_json::from_slice(&decoded).map_err(|e| format!("payload is not JSON: {}", e))?;

    let exp = match claims.get("exp") {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| "no expiry claim".to_string())?;

    DateTime::from_timestamp(exp.floor() as i64, 0)
        .map(|at| at.with_timezone(&Local))
        .ok_or_else(|| format!("expiry {} is out of range", exp))
}

fn read_source(path: &Path) -> Result<Vec<u8>, InstallError> {
    let invalid = |reason: String| InstallError::SourceInvalid {
        path: path.to_path_buf(),
        reason,
    };

    let meta = fs::metadata(path).map_err(|e| invalid(e.to_string()))?;
    if !meta.is_file() {
        return Err(invalid("not a regular file".to_string()));
    }

    let contents = fs::read(path).map_err(|e| invalid(e.to_string()))?;
    if Credential::new(contents.clone()).is_empty() {
        return Err(invalid("the file is empty".to_string()));
    }
    Ok(contents)
}

fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    DirBuilder::new()
        .recursive(true)
        .mode(TOKEN_DIR_MODE)
        .create(dir)?;
    // an existing directory keeps its old mode otherwise
    fs::set_permissions(dir, fs::Permissions::from_mode(TOKEN_DIR_MODE))
}

fn write_private_file(destination: &Path, contents: &[u8]) -> std::io::Result<()> {
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = destination.with_file_name(format!(".{}.tmp", name));

    let _ = fs::remove_file(&temp);
    let result = write_temp(&temp, contents).and_then(|()| fs::rename(&temp, destination));
    if result.is_err() {
        let _ = fs::remove_file(&temp);
    }
    result
}

fn write_temp(temp: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(TOKEN_FILE_MODE)
        .open(temp)?;
    file.write_all(contents)?;
    file.sync_all()?;
    // mode passed to open is masked by the umask
    fs::set_permissions(temp, fs::Permissions::from_mode(TOKEN_FILE_MODE))
}
