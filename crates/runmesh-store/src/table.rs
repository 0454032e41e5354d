//! Typed row tables on top of a `Storage`.
//!
//! A `RowTable` owns a key prefix and a column list. Each row is one stored
//! value (`Vec<Scalar>` in column order) under `prefix/<segments...>`, so
//! point reads and subtree scans are plain key operations. Queries go through
//! `find_ordered`, which takes a typed predicate and sort order and yields a
//! `Cursor` of rows.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use runmesh_core::types::{Scalar, Table};
use runmesh_query::{ops, OrderBy, Predicate};

use crate::error::{Result, StoreError};
use crate::path;
use crate::storage::Storage;

#[derive(Serialize, Deserialize)]
struct StoredRow {
    values: Vec<Scalar>,
}

/// One stored row and the key it lives under.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub key: String,
    pub values: Vec<Scalar>,
}

/// Forward-only result of `find_ordered`.
#[derive(Debug)]
pub struct Cursor {
    columns: Arc<[String]>,
    rows: std::vec::IntoIter<Row>,
}

impl Cursor {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Remaining rows as a table, keys dropped.
    pub fn into_table(self) -> Result<Table> {
        let mut t = Table::with_columns(self.columns.iter().cloned());
        for row in self.rows {
            t.push_row(row.values).map_err(StoreError::Schema)?;
        }
        Ok(t)
    }
}

impl Iterator for Cursor {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        self.rows.next()
    }
}

#[derive(Clone)]
pub struct RowTable {
    storage: Arc<dyn Storage>,
    prefix: String,
    columns: Arc<[String]>,
}

impl RowTable {
    /// `prefix` must already be an encoded key (see `path::key`).
    pub fn new(storage: Arc<dyn Storage>, prefix: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            storage,
            prefix: prefix.into().trim_end_matches('/').to_string(),
            columns: columns.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn key_for<S: AsRef<str>>(&self, segments: &[S]) -> String {
        path::key(&self.prefix, segments)
    }

    /// Upsert a row under `segments`; returns its key.
    pub fn put<S: AsRef<str>>(&self, segments: &[S], values: Vec<Scalar>) -> Result<String> {
        if values.len() != self.columns.len() {
            return Err(StoreError::Schema(format!(
                "{} values for {} columns under '{}'",
                values.len(),
                self.columns.len(),
                self.prefix
            )));
        }
        let key = self.key_for(segments);
        let bytes = serde_json::to_vec(&StoredRow { values })?;
        self.storage.write(&key, &bytes)?;
        debug!(key = %key, "row stored");
        Ok(key)
    }

    /// Point read by full key.
    pub fn get(&self, key: &str) -> Result<Option<Row>> {
        match self.storage.read(key)? {
            None => Ok(None),
            Some(bytes) => {
                let stored: StoredRow = serde_json::from_slice(&bytes)?;
                Ok(Some(Row {
                    key: key.to_string(),
                    values: stored.values,
                }))
            }
        }
    }

    pub fn delete(&self, key: &str) -> Result<()> {
        self.storage.delete(key)
    }

    /// Every row under `prefix/<segments...>/`, in key order.
    pub fn scan<S: AsRef<str>>(&self, segments: &[S]) -> Result<Vec<Row>> {
        let dir = path::dir(&self.prefix, segments);
        let mut rows = Vec::new();
        for key in self.storage.list(&dir)? {
            // a concurrent delete between list and read is fine
            if let Some(row) = self.get(&key)? {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    /// Delete every row under `prefix/<segments...>/`.
    pub fn delete_within<S: AsRef<str>>(&self, segments: &[S]) -> Result<usize> {
        self.storage.delete_prefix(&path::dir(&self.prefix, segments))
    }

    /// Filter, sort, and limit the rows of the whole table.
    pub fn find_ordered(
        &self,
        predicate: &Predicate,
        order: &[OrderBy],
        limit: Option<usize>,
    ) -> Result<Cursor> {
        self.find_ordered_within::<&str>(&[], predicate, order, limit)
    }

    /// `find_ordered` restricted to the subtree under `segments`.
    pub fn find_ordered_within<S: AsRef<str>>(
        &self,
        segments: &[S],
        predicate: &Predicate,
        order: &[OrderBy],
        limit: Option<usize>,
    ) -> Result<Cursor> {
        let bound = predicate.bind(&self.columns)?;
        let mut matched = Vec::new();
        for row in self.scan(segments)? {
            if bound.matches(&row.values)? {
                matched.push(row);
            }
        }

        if !order.is_empty() {
            let keys = ops::resolve_order(&self.columns, order)?;
            matched.sort_by(|a, b| ops::compare_rows(&keys, &a.values, &b.values));
        }

        if let Some(n) = limit {
            matched.truncate(n);
        }
        Ok(Cursor {
            columns: Arc::clone(&self.columns),
            rows: matched.into_iter(),
        })
    }

    /// Full dump in key order.
    pub fn to_table(&self) -> Result<Table> {
        self.find_ordered(&Predicate::True, &[], None)?.into_table()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use runmesh_query::parse_predicate;

    fn table() -> RowTable {
        let t = RowTable::new(
            Arc::new(MemoryStorage::new()),
            "t",
            vec!["SYSTEM".into(), "TS".into()],
        );
        for (sys, ts) in [("s1", 30), ("s2", 10), ("s1", 20), ("s3", 40)] {
            t.put(&[sys, ts.to_string().as_str()], vec![Scalar::Str(sys.into()), Scalar::I64(ts)])
                .unwrap();
        }
        t
    }

    #[test]
    fn find_ordered_filters_sorts_and_limits() {
        let t = table();
        let p = parse_predicate("SYSTEM = 's1'").unwrap();

        let asc: Vec<_> = t.find_ordered(&p, &[OrderBy::asc("TS")], None).unwrap().collect();
        assert_eq!(asc.len(), 2);
        assert_eq!(asc[0].values[1], Scalar::I64(20));

        let mut desc = t.find_ordered(&p, &[OrderBy::desc("TS")], Some(1)).unwrap();
        let first = desc.next().unwrap();
        assert_eq!(first.values[1], Scalar::I64(30));
        assert!(desc.next().is_none());
        assert_eq!(t.get(&first.key).unwrap().unwrap(), first);
    }

    #[test]
    fn scan_is_scoped_to_subtree() {
        let t = table();
        assert_eq!(t.scan(&["s1"]).unwrap().len(), 2);
        assert_eq!(t.delete_within(&["s1"]).unwrap(), 2);
        assert_eq!(t.to_table().unwrap().num_rows(), 2);
    }

    #[test]
    fn put_checks_arity_and_queries_check_columns() {
        let t = table();
        assert!(matches!(t.put(&["x"], vec![Scalar::Null]), Err(StoreError::Schema(_))));
        let bad = parse_predicate("NOPE = 1").unwrap();
        assert!(matches!(
            t.find_ordered(&bad, &[], None),
            Err(StoreError::Query(_))
        ));
    }
}
