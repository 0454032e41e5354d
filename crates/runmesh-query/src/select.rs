//! Ad-hoc `SELECT` over one table.

use serde::{Deserialize, Serialize};

use runmesh_core::types::Table;

use crate::error::Result;
use crate::ops::{self, OrderBy};
use crate::predicate::Predicate;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Select {
    /// Empty means `*`.
    pub columns: Vec<String>,
    pub from: String,
    pub filter: Predicate,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<usize>,
}

impl Select {
    /// Apply filter, ordering, limit, then projection to the `from` table.
    pub fn apply(&self, table: &Table) -> Result<Table> {
        let mut out = ops::filter(table, &self.filter)?;
        ops::sort(&mut out, &self.order_by)?;
        if let Some(n) = self.limit {
            ops::limit(&mut out, n);
        }
        ops::project(&out, &self.columns)
    }
}
