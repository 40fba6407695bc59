//! services/api/src/lib.rs
//!
//! Library surface of the API service. The binary in `bin/api.rs` wires these
//! modules together; exposing them as a lib keeps them testable in isolation.

pub mod adapters;
pub mod auth;
pub mod config;
pub mod error;
pub mod notify;
pub mod web;
