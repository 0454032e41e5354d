#![forbid(unsafe_code)]
//! runmesh: orchestration substrate for multi-action analysis runs.
//!
//! Re-exports the member crates under one roof:
//! - [`core`]: ids, keys, the system/report model, plans, requests, config.
//! - [`query`]: predicates, the `SELECT` parser, table operators, joins.
//! - [`store`]: the `Storage` trait, backends, row tables, export writers.
//! - [`repo`]: executable and report repositories.
//! - [`exec`]: sessions, the action runtime, and the cluster event bus.

pub use runmesh_core as core;
pub use runmesh_exec as exec;
pub use runmesh_query as query;
pub use runmesh_repo as repo;
pub use runmesh_store as store;

pub use runmesh_core::prelude;
pub use runmesh_exec::{Engine, ExecError};
pub use runmesh_repo::{ExecutableRepository, ReportRepository, RepoError};
