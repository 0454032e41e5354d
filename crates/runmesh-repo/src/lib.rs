#![forbid(unsafe_code)]
//! runmesh-repo: typed repositories over the shared store.
//!
//! - `ExecutableRepository`: candidate systems per (run, action, abstraction).
//! - `ReportRepository`: versioned report rows per (run, kind), with
//!   first/last lookups, table dumps, cross-kind joins, and export.
//!
//! Both are cheap handles (`Clone`) over an `Arc<dyn Storage>`. Writers on
//! different nodes are not coordinated: the last write to a key wins.

pub mod error;
pub mod executable;
pub mod report;

pub use error::{RepoError, Result};
pub use executable::{ActionExecutables, ExecutableRepository};
pub use report::{ReportRepository, ReportRow};
