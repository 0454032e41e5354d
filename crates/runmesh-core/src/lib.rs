#![forbid(unsafe_code)]
//! runmesh-core: identifiers, keys, the system/report data model, execution
//! plans, action requests, session events, and node configuration.
//!
//! Everything here is plain data. Storage, querying, and the async runtime
//! live in the downstream crates.

pub mod config;
pub mod error;
pub mod event;
pub mod hash;
pub mod id;
pub mod keys;
pub mod manifest;
pub mod model;
pub mod plan;
pub mod prelude;
pub mod request;
pub mod schema;
pub mod types;

/// Crate version, stamped into manifests for provenance.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
