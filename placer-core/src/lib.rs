//! Placer Core
//!
//! Core types shared by every Placer component.
//!
//! This crate contains:
//! - Domain types: credentials, job descriptions, job identifiers and statuses
//! - DTOs: wire types exchanged with an access-point gateway

pub mod domain;
pub mod dto;
