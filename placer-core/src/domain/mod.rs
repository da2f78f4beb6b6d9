//! Core domain types
//!
//! These types describe a job placement independently of how the access point
//! is reached. They are shared by the client (which talks to the access point),
//! the workflow (which drives a placement) and the gateway.

pub mod credential;
pub mod description;
pub mod status;
