//! Gateway configuration

use anyhow::{Context, Result};
use placer_core::domain::credential::Credential;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Address to listen on
    pub bind_addr: String,

    /// Name the access point is registered under
    pub access_point: String,

    /// Root of the per-job sandboxes
    pub spool_dir: PathBuf,

    /// Token clients must present
    pub token_file: Option<PathBuf>,

    /// Accept any token when no token file is set; loopback addresses only
    pub allow_any_token: bool,

    /// Base URL handed out by locate; taken from the Host header when unset
    pub public_url: Option<String>,
}

impl GatewayConfig {
    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - GATEWAY_BIND_ADDR (optional, default: 127.0.0.1:9618)
    /// - GATEWAY_ACCESS_POINT (optional, default: localhost)
    /// - GATEWAY_SPOOL_DIR (optional, default: <tmp>/placer-gateway)
    /// - GATEWAY_TOKEN_FILE (required unless GATEWAY_ALLOW_ANY_TOKEN is set)
    /// - GATEWAY_ALLOW_ANY_TOKEN (optional, `true` or `1`)
    /// - GATEWAY_PUBLIC_URL (optional)
    pub fn from_env() -> Result<Self> {
        let config = Self {
            bind_addr: std::env::var("GATEWAY_BIND_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:9618".to_string()),
            access_point: std::env::var("GATEWAY_ACCESS_POINT")
                .unwrap_or_else(|_| "localhost".to_string()),
            spool_dir: std::env::var("GATEWAY_SPOOL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| std::env::temp_dir().join("placer-gateway")),
            token_file: std::env::var("GATEWAY_TOKEN_FILE").ok().map(PathBuf::from),
            allow_any_token: std::env::var("GATEWAY_ALLOW_ANY_TOKEN")
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            public_url: std::env::var("GATEWAY_PUBLIC_URL").ok(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        if self.access_point.is_empty() {
            anyhow::bail!("access_point cannot be empty");
        }
        if self.token_file.is_none() {
            if !self.allow_any_token {
                anyhow::bail!(
                    "no token file configured; set GATEWAY_TOKEN_FILE, or GATEWAY_ALLOW_ANY_TOKEN=true for a loopback-only gateway"
                );
            }
            if !self.binds_loopback() {
                anyhow::bail!(
                    "refusing to accept any token on {}; bind to a loopback address or set GATEWAY_TOKEN_FILE",
                    self.bind_addr
                );
            }
        }
        if let Some(url) = &self.public_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("public_url must start with http:// or https://");
            }
        }
        Ok(())
    }

    /// True when only this machine can reach the listen address
    pub fn binds_loopback(&self) -> bool {
        match self.bind_addr.parse::<SocketAddr>() {
            Ok(addr) => addr.ip().is_loopback(),
            Err(_) => self.bind_addr.starts_with("localhost:"),
        }
    }

    /// Load the token clients must present, if one is configured
    pub fn required_credential(&self) -> Result<Option<Credential>> {
        let Some(path) = &self.token_file else {
            return Ok(None);
        };
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read token file {}", path.display()))?;
        let credential = Credential::new(bytes);
        if credential.is_empty() {
            anyhow::bail!("token file {} is empty", path.display());
        }
        Ok(Some(credential))
    }
}
