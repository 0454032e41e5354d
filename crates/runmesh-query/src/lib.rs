#![forbid(unsafe_code)]
//! runmesh-query: typed predicates and the table operators behind report
//! queries (filter/project/sort/limit, full outer joins, ad-hoc selects).
//!
//! Predicates are an AST, never concatenated strings. Text only enters
//! through `parse_predicate`/`parse_select`, which produce the same AST.
//! Everything here is pure and synchronous.

pub mod error;
pub mod join;
pub mod ops;
pub mod parse;
pub mod predicate;
pub mod select;

pub use error::{QueryError, Result};
pub use join::{full_outer_join, full_outer_join_all};
pub use ops::{filter, limit, project, sort, OrderBy};
pub use parse::{parse_predicate, parse_select};
pub use predicate::{CmpOp, Predicate};
pub use select::Select;
