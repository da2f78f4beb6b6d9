//! Collector (endpoint discovery) DTOs

use serde::{Deserialize, Serialize};

/// Resolved location of a named submission endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocateResponse {
    pub name: String,
    pub address: String,
}
