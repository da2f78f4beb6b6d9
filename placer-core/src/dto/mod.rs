//! Data Transfer Objects for access-point communication
//!
//! These types travel between the HTTP access-point client and the gateway.
//! Credentials never appear in them; they ride in the `Authorization` header.

pub mod collector;
pub mod jobs;
