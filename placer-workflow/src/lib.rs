//! Placer Workflow
//!
//! The job-placement lifecycle: install a placement token, connect to an
//! access point, submit a job description, monitor its units with a bounded
//! wait and retrieve the spooled results.
//!
//! Architecture:
//! - Configuration: captured once from the environment or built explicitly
//! - Credential: token discovery and owner-only installation
//! - Connection: endpoint resolution through an [`placer_client::AccessPoint`]
//! - Placement: one submission, its status polling and result retrieval
//! - Store: JSON records so a placement can be resumed by a later process
//! - Workflow: sequencing of the steps above for notebook or CLI callers

pub mod config;
pub mod connection;
pub mod credential;
pub mod error;
pub mod placement;
pub mod store;
pub mod workflow;

pub use config::WorkflowConfig;
pub use connection::{Connection, ConnectionConfig};
pub use credential::{CredentialInstaller, TokenState};
pub use error::{ConnectError, InstallError, RetrieveError, StateError, SubmitError, WorkflowError};
pub use placement::{MonitorOutcome, Placement, RetrieveReport};
pub use placer_core::domain::description::{JobDescription, JobSource, ParseError};
pub use store::{PlacementRecord, PlacementStore};
pub use workflow::{PlacementWorkflow, TokenSource, WorkflowReport, WorkflowRequest};
