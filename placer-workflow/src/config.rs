//! Workflow configuration
//!
//! Everything the workflow reads from its surroundings is captured here once,
//! at construction, so the workflow itself never looks at the environment.

use placer_core::domain::credential::{TOKEN_DIR, TOKEN_FILENAME};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default collector address of the access-point gateway
pub const DEFAULT_COLLECTOR: &str = "http://localhost:9618";

/// Workflow configuration
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Pool collector address used to locate the access point
    pub collector: String,

    /// Identity of the submission endpoint (access point)
    pub access_point: String,

    /// File name the token is discovered and installed under
    pub token_filename: String,

    /// Directory the token is installed into
    pub token_dir: PathBuf,

    /// Directories searched, in order, when no token path is given
    pub token_search_dirs: Vec<PathBuf>,

    /// Time between status polls while monitoring
    pub poll_interval: Duration,

    /// Warn once when no status update arrived for this long
    pub stale_status_warning: Duration,

    /// Where retrieved artifacts are written
    pub results_dir: PathBuf,

    /// Where placement records are kept between processes
    pub state_dir: PathBuf,

    /// Branch selector of the companion content deployed with the session
    pub content_branch: Option<String>,
}

fn home_dir() -> PathBuf {
    home::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

fn current_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

impl WorkflowConfig {
    /// Creates a new configuration with defaults
    pub fn new(collector: impl Into<String>, access_point: impl Into<String>) -> Self {
        let home = home_dir();
        Self {
            collector: collector.into(),
            access_point: access_point.into(),
            token_filename: TOKEN_FILENAME.to_string(),
            token_dir: home.join(TOKEN_DIR),
            token_search_dirs: vec![current_dir(), home.clone()],
            poll_interval: Duration::from_secs(10),
            stale_status_warning: Duration::from_secs(60),
            results_dir: PathBuf::from("."),
            state_dir: home.join(".placer/placements"),
            content_branch: None,
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - PLACER_ACCESS_POINT (required)
    /// - PLACER_COLLECTOR (optional, default: http://localhost:9618)
    /// - PLACER_TOKEN_FILE (optional, default: ap-placement.tkn)
    /// - PLACER_TOKEN_DIR (optional, default: ~/.condor/tokens.d)
    /// - PLACER_POLL_INTERVAL (optional, seconds, default: 10)
    /// - PLACER_RESULTS_DIR (optional, default: current directory)
    /// - PLACER_STATE_DIR (optional, default: ~/.placer/placements)
    /// - PLACER_CONTENT_BRANCH (optional)
    pub fn from_env() -> anyhow::Result<Self> {
        let access_point = std::env::var("PLACER_ACCESS_POINT")
            .map_err(|_| anyhow::anyhow!("PLACER_ACCESS_POINT environment variable not set"))?;

        let collector =
            std::env::var("PLACER_COLLECTOR").unwrap_or_else(|_| DEFAULT_COLLECTOR.to_string());

        let mut config = Self::new(collector, access_point);

        if let Ok(name) = std::env::var("PLACER_TOKEN_FILE") {
            config.token_filename = name;
        }

        if let Ok(dir) = std::env::var("PLACER_TOKEN_DIR") {
            config.token_dir = PathBuf::from(dir);
        }

        if let Some(interval) = std::env::var("PLACER_POLL_INTERVAL")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            config.poll_interval = Duration::from_secs(interval);
        }

        if let Ok(dir) = std::env::var("PLACER_RESULTS_DIR") {
            config.results_dir = PathBuf::from(dir);
        }

        if let Ok(dir) = std::env::var("PLACER_STATE_DIR") {
            config.state_dir = PathBuf::from(dir);
        }

        config.content_branch = std::env::var("PLACER_CONTENT_BRANCH")
            .ok()
            .filter(|branch| !branch.is_empty());

        Ok(config)
    }

    pub fn with_token_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.token_dir = dir.into();
        self
    }

    pub fn with_token_search_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.token_search_dirs = dirs;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_results_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.results_dir = dir.into();
        self
    }

    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = dir.into();
        self
    }

    /// Full path of the installed token
    pub fn token_path(&self) -> PathBuf {
        self.token_dir.join(&self.token_filename)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.access_point.is_empty() {
            anyhow::bail!("access_point cannot be empty");
        }

        if !crate::store::is_plain_name(&self.access_point) {
            anyhow::bail!("access_point cannot contain path separators");
        }

        if self.collector.is_empty() {
            anyhow::bail!("collector cannot be empty");
        }

        let name = Path::new(&self.token_filename);
        if self.token_filename.is_empty() || name.file_name() != Some(name.as_os_str()) {
            anyhow::bail!("token_filename must be a plain file name");
        }

        if self.poll_interval.is_zero() {
            anyhow::bail!("poll_interval must be greater than 0");
        }

        Ok(())
    }

    /// Validates that the collector can be reached over HTTP
    pub fn validate_collector_url(&self) -> anyhow::Result<()> {
        if !self.collector.starts_with("http://") && !self.collector.starts_with("https://") {
            anyhow::bail!("collector must start with http:// or https://");
        }
        Ok(())
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self::new(DEFAULT_COLLECTOR, "localhost")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = WorkflowConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.token_filename, "ap-placement.tkn");
        assert!(config.token_dir.ends_with(".condor/tokens.d"));
        assert_eq!(config.token_search_dirs.len(), 2);
        assert!(config.validate().is_ok());
        assert!(config.validate_collector_url().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = WorkflowConfig::default();

        config.access_point = String::new();
        assert!(config.validate().is_err());
        config.access_point = "../ap1".to_string();
        assert!(config.validate().is_err());
        config.access_point = "ap1".to_string();

        config.token_filename = "../escape.tkn".to_string();
        assert!(config.validate().is_err());
        config.token_filename = TOKEN_FILENAME.to_string();

        config.poll_interval = Duration::ZERO;
        assert!(config.validate().is_err());
        config.poll_interval = Duration::from_secs(1);
        assert!(config.validate().is_ok());

        config.collector = "cm.example.org:9618".to_string();
        assert!(config.validate().is_ok());
        assert!(config.validate_collector_url().is_err());
    }

    #[test]
    fn test_token_path() {
        let config = WorkflowConfig::default().with_token_dir("/tmp/tokens");
        assert_eq!(config.token_path(), PathBuf::from("/tmp/tokens/ap-placement.tkn"));
    }

    #[test]
    fn test_from_env() {
        // only this test touches PLACER_* variables
        unsafe {
            std::env::set_var("PLACER_ACCESS_POINT", "ap7");
            std::env::set_var("PLACER_POLL_INTERVAL", "3");
            std::env::set_var("PLACER_STATE_DIR", "/tmp/placer-state");
            std::env::set_var("PLACER_CONTENT_BRANCH", "");
        }

        let config = WorkflowConfig::from_env().unwrap();
        assert_eq!(config.access_point, "ap7");
        assert_eq!(config.collector, DEFAULT_COLLECTOR);
        assert_eq!(config.poll_interval, Duration::from_secs(3));
        assert_eq!(config.state_dir, PathBuf::from("/tmp/placer-state"));
        assert_eq!(config.content_branch, None);

        unsafe {
            std::env::remove_var("PLACER_ACCESS_POINT");
        }
        assert!(WorkflowConfig::from_env().is_err());
    }
}
