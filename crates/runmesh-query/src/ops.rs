//! Table operators: filter, project, sort, limit.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use runmesh_core::types::{scalar_cmp, Column, Scalar, Table};

use crate::error::{QueryError, Result};
use crate::predicate::{resolve_column, Predicate};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: String,
    pub descending: bool,
}

impl OrderBy {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: false,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: true,
        }
    }
}

/// Rows of `table` matching `predicate`, columns unchanged.
pub fn filter(table: &Table, predicate: &Predicate) -> Result<Table> {
    let bound = predicate.bind(&table.column_names())?;
    let mut keep = Vec::new();
    for (i, row) in table.rows().enumerate() {
        if bound.matches(&row)? {
            keep.push(i);
        }
    }
    let mut out = table.clone();
    out.reorder(&keep);
    Ok(out)
}

/// Keep the named columns in the given order; names resolve case-insensitively.
/// An empty list keeps every column.
pub fn project(table: &Table, columns: &[String]) -> Result<Table> {
    if columns.is_empty() {
        return Ok(table.clone());
    }
    let names = table.column_names();
    let mut out = Vec::with_capacity(columns.len());
    for c in columns {
        let idx = resolve_column(&names, c)?;
        out.push(Column {
            name: table.columns[idx].name.clone(),
            values: table.columns[idx].values.clone(),
        });
    }
    Ok(Table { columns: out })
}

/// Resolve sort columns to `(index, descending)` pairs.
pub fn resolve_order(columns: &[String], order: &[OrderBy]) -> Result<Vec<(usize, bool)>> {
    order
        .iter()
        .map(|o| resolve_column(columns, &o.column).map(|i| (i, o.descending)))
        .collect()
}

/// Compare two rows under resolved sort keys.
pub fn compare_rows(keys: &[(usize, bool)], a: &[Scalar], b: &[Scalar]) -> Ordering {
    for &(col, desc) in keys {
        let ord = scalar_cmp(&a[col], &b[col]);
        let ord = if desc { ord.reverse() } else { ord };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Stable multi-key sort.
pub fn sort(table: &mut Table, order: &[OrderBy]) -> Result<()> {
    if order.is_empty() || table.num_rows() == 0 {
        return Ok(());
    }
    let keys = resolve_order(&table.column_names(), order)?;
    let rows: Vec<Vec<Scalar>> = table.rows().collect();
    let mut idx: Vec<usize> = (0..rows.len()).collect();
    idx.sort_by(|&a, &b| compare_rows(&keys, &rows[a], &rows[b]));
    table.reorder(&idx);
    Ok(())
}

/// First `n` rows.
pub fn limit(table: &mut Table, n: usize) {
    for col in &mut table.columns {
        col.values.truncate(n);
    }
}

/// Rename one column in place.
pub fn rename(table: &mut Table, from: &str, to: impl Into<String>) -> Result<()> {
    let col = table
        .columns
        .iter_mut()
        .find(|c| c.name == from)
        .ok_or_else(|| QueryError::UnknownColumn(from.to_string()))?;
    col.name = to.into();
    Ok(())
}
