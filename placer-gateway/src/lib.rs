//! Placer Gateway
//!
//! Serves an in-process access point over HTTP so that remote `placer`
//! clients can locate it, submit jobs, poll their status and pull spooled
//! results back.

pub mod api;
pub mod config;

pub use api::{AppState, create_router};
pub use config::GatewayConfig;
