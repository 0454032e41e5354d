//! Report repository: one versioned row table per (run, report kind).
//!
//! Layout:
//! - `reports/<run>/kinds/<kind>`: the declared `ReportSchema`.
//! - `reports/<run>/rows/<kind>/<abstraction>/<system>/<perm>/<action>/<datasource>/<version>`:
//!   one row per write. `version` is `<stamp>-<seq>-<nonce>`: the zero-padded
//!   wall-clock `LASTMODIFIED` millis, a process-wide write counter, and a
//!   random nonce, so two writers never share a version and versions of one
//!   key sort by write time.
//!
//! Every write adds a version; `get`, table dumps, and joins read the latest
//! version of each key, while `get_first`/`get_last` pick the earliest/latest
//! version across the (system, abstraction, perm id) subtree.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::{debug, info, warn};
use uuid::Uuid;

use runmesh_core::id::RunId;
use runmesh_core::keys::{self, ReportKey, KEY_COLUMNS};
use runmesh_core::manifest::now_millis;
use runmesh_core::model::Report;
use runmesh_core::schema::{DataType, Field, ReportSchema};
use runmesh_core::types::{Column, Scalar, Table};
use runmesh_query::{full_outer_join_all, parse_select, OrderBy, Predicate, QueryError};
use runmesh_store::writers::{write_table, ExportFormat};
use runmesh_store::{path, Row, RowTable, Storage, StoreError};

use crate::error::{RepoError, Result};

const PREFIX: &str = "reports";
const FIELD_OFFSET: usize = KEY_COLUMNS.len();
const JOIN_KEYS: [&str; 3] = [keys::ABSTRACTION, keys::SYSTEM, keys::PERMID];
const STAMP_COLUMN: usize = 5;

/// Orders same-millisecond writes made in this process, whatever handle
/// made them.
static WRITE_SEQ: AtomicU64 = AtomicU64::new(0);

/// One stored report version.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub key: ReportKey,
    pub last_modified: u64,
    /// Storage version segment; unique per write.
    pub version: String,
    pub report: Report,
}

#[derive(Clone)]
pub struct ReportRepository {
    storage: Arc<dyn Storage>,
    schemas: Arc<RwLock<HashMap<(RunId, String), Arc<ReportSchema>>>>,
}

impl ReportRepository {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            schemas: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn schema_key(run_id: &RunId, kind: &str) -> String {
        path::key(PREFIX, &[run_id.as_str(), "kinds", kind])
    }

    fn table(&self, run_id: &RunId, schema: &ReportSchema) -> RowTable {
        RowTable::new(
            Arc::clone(&self.storage),
            path::key(PREFIX, &[run_id.as_str(), "rows", schema.kind.as_str()]),
            schema.table_schema().names(),
        )
    }

    /// Declare a report kind for the run. Returns `false` when it was
    /// already declared (the existing schema is kept).
    pub fn register_kind(&self, run_id: &RunId, schema: ReportSchema) -> Result<bool> {
        schema.validate()?;
        if let Some(existing) = self.load_schema(run_id, &schema.kind)? {
            if *existing != schema {
                warn!(
                    run_id = %run_id,
                    kind = %schema.kind,
                    "report kind already declared with a different schema; keeping the existing one"
                );
            }
            return Ok(false);
        }
        let bytes = serde_json::to_vec(&schema)?;
        self.storage.write(&Self::schema_key(run_id, &schema.kind), &bytes)?;
        info!(run_id = %run_id, kind = %schema.kind, fields = schema.fields.len(), "report kind registered");
        self.cache(run_id, schema);
        Ok(true)
    }

    fn cache(&self, run_id: &RunId, schema: ReportSchema) -> Arc<ReportSchema> {
        let schema = Arc::new(schema);
        let mut cache = self.schemas.write().unwrap_or_else(|e| e.into_inner());
        cache.insert((run_id.clone(), schema.kind.clone()), Arc::clone(&schema));
        schema
    }

    fn load_schema(&self, run_id: &RunId, kind: &str) -> Result<Option<Arc<ReportSchema>>> {
        {
            let cache = self.schemas.read().unwrap_or_else(|e| e.into_inner());
            if let Some(s) = cache.get(&(run_id.clone(), kind.to_string())) {
                return Ok(Some(Arc::clone(s)));
            }
        }
        match self.storage.read(&Self::schema_key(run_id, kind))? {
            None => Ok(None),
            Some(bytes) => {
                let schema: ReportSchema = serde_json::from_slice(&bytes)?;
                Ok(Some(self.cache(run_id, schema)))
            }
        }
    }

    /// Declared schema of `kind`, or `ReportKindNotFound`.
    pub fn schema(&self, run_id: &RunId, kind: &str) -> Result<Arc<ReportSchema>> {
        self.load_schema(run_id, kind)?
            .ok_or_else(|| RepoError::ReportKindNotFound {
                run_id: run_id.clone(),
                kind: kind.to_string(),
            })
    }

    /// Kinds declared for the run, sorted by name.
    pub fn kinds(&self, run_id: &RunId) -> Result<Vec<String>> {
        let dir = path::dir(PREFIX, &[run_id.as_str(), "kinds"]);
        let mut out = Vec::new();
        for k in self.storage.list(&dir)? {
            if let Some(bytes) = self.storage.read(&k)? {
                let schema: ReportSchema = serde_json::from_slice(&bytes)?;
                out.push(schema.kind);
            }
        }
        out.sort();
        Ok(out)
    }

    fn key_segments(key: &ReportKey) -> [String; 5] {
        [
            key.abstraction.clone(),
            key.system.clone(),
            key.perm_id.to_string(),
            key.action.clone(),
            key.data_source.clone(),
        ]
    }

    /// Write a new version of the report under `key`; returns its stamp.
    pub fn put(&self, run_id: &RunId, key: &ReportKey, kind: &str, report: &Report) -> Result<u64> {
        let schema = self.schema(run_id, kind)?;
        let fields = schema.conform(report)?;
        let stamp = now_millis();
        let version = version_segment(stamp);

        let mut values = vec![
            Scalar::Str(key.action.clone()),
            Scalar::Str(key.abstraction.clone()),
            Scalar::Str(key.system.clone()),
            Scalar::Str(key.data_source.clone()),
            Scalar::I64(key.perm_id),
            Scalar::Timestamp(stamp),
        ];
        values.extend(fields);

        let mut segments = Self::key_segments(key).to_vec();
        segments.push(version);
        self.table(run_id, &schema).put(&segments, values)?;
        debug!(run_id = %run_id, kind, system = %key.system, stamp, "report stored");
        Ok(stamp)
    }

    /// Declare `kind` from the value types on first use, then `put`.
    pub fn put_values(&self, run_id: &RunId, key: &ReportKey, kind: &str, report: &Report) -> Result<u64> {
        if self.load_schema(run_id, kind)?.is_none() {
            let mut fields = Vec::new();
            for name in report.names() {
                let data_type = report
                    .get(name)
                    .and_then(|v| v.data_type())
                    .unwrap_or(DataType::Utf8);
                fields.push(Field::new(name, data_type, true));
            }
            self.register_kind(run_id, ReportSchema::new(kind, fields))?;
        }
        self.put(run_id, key, kind, report)
    }

    /// Delete every version stored under `key`.
    pub fn remove(&self, run_id: &RunId, key: &ReportKey, kind: &str) -> Result<usize> {
        let schema = self.schema(run_id, kind)?;
        Ok(self.table(run_id, &schema).delete_within(&Self::key_segments(key))?)
    }

    /// Latest version stored under exactly `key`.
    pub fn get(&self, run_id: &RunId, key: &ReportKey, kind: &str) -> Result<Option<ReportRow>> {
        let schema = self.schema(run_id, kind)?;
        let rows = self.table(run_id, &schema).scan(&Self::key_segments(key))?;
        // versions are zero-padded, so key order is write order
        Ok(rows.into_iter().last().map(|r| to_report_row(&schema, r)))
    }

    /// Earliest version for the key's (system, abstraction, perm id).
    ///
    /// Store and query failures are logged and read as `None`; an undeclared
    /// kind is still an error.
    pub fn get_first(&self, run_id: &RunId, key: &ReportKey, kind: &str) -> Result<Option<ReportRow>> {
        self.get_ordered(run_id, key, kind, false)
    }

    /// Latest version for the key's (system, abstraction, perm id). Failure
    /// handling as in `get_first`.
    pub fn get_last(&self, run_id: &RunId, key: &ReportKey, kind: &str) -> Result<Option<ReportRow>> {
        self.get_ordered(run_id, key, kind, true)
    }

    fn get_ordered(
        &self,
        run_id: &RunId,
        key: &ReportKey,
        kind: &str,
        latest: bool,
    ) -> Result<Option<ReportRow>> {
        let schema = self.schema(run_id, kind)?;
        let table = self.table(run_id, &schema);
        let predicate = Predicate::all_eq([
            (keys::SYSTEM, Scalar::Str(key.system.clone())),
            (keys::ABSTRACTION, Scalar::Str(key.abstraction.clone())),
            (keys::PERMID, Scalar::I64(key.perm_id)),
        ]);
        let subtree = [
            key.abstraction.clone(),
            key.system.clone(),
            key.perm_id.to_string(),
        ];

        let order = if latest {
            OrderBy::desc(keys::LASTMODIFIED)
        } else {
            OrderBy::asc(keys::LASTMODIFIED)
        };

        // locate the row key first, then fetch the full row by that key
        let found = table
            .find_ordered_within(&subtree, &predicate, &[order], None)
            .map(|cursor| extreme_version(cursor, latest));
        let row_key = match found {
            Ok(Some(k)) => k,
            Ok(None) => return Ok(None),
            Err(e) => {
                warn!(run_id = %run_id, kind, system = %key.system, error = %e, "ordered report lookup failed");
                return Ok(None);
            }
        };
        match table.get(&row_key) {
            Ok(row) => Ok(row.map(|r| to_report_row(&schema, r))),
            Err(e) => {
                warn!(run_id = %run_id, kind, key = %row_key, error = %e, "report fetch failed");
                Ok(None)
            }
        }
    }

    fn latest_rows(&self, run_id: &RunId, schema: &ReportSchema, predicate: &Predicate) -> Result<Table> {
        let table = self.table(run_id, schema);
        let mut latest: Vec<(String, Vec<Scalar>)> = Vec::new();
        for row in table.find_ordered(&Predicate::True, &[], None)? {
            // rows of one key are adjacent and ascend by version
            let identity = row.key[..row.key.len() - version_of(&row.key).len()].to_string();
            match latest.last_mut() {
                Some((last, values)) if *last == identity => *values = row.values,
                _ => latest.push((identity, row.values)),
            }
        }
        let mut out = Table::with_columns(table.columns().iter().cloned());
        for (_, values) in latest {
            out.push_row(values).map_err(RepoError::Schema)?;
        }
        // filter after picking versions so a stale version never matches
        Ok(runmesh_query::filter(&out, predicate)?)
    }

    /// Latest version of every key of `kind`, one row per report key.
    pub fn to_table(&self, run_id: &RunId, kind: &str) -> Result<Table> {
        let schema = self.schema(run_id, kind)?;
        self.latest_rows(run_id, &schema, &Predicate::True)
    }

    /// `to_table` restricted to rows written by `action`.
    pub fn to_table_for_action(&self, run_id: &RunId, kind: &str, action: &str) -> Result<Table> {
        let schema = self.schema(run_id, kind)?;
        let only = Predicate::eq(keys::ACTION, Scalar::Str(action.to_string()));
        self.latest_rows(run_id, &schema, &only)
    }

    /// Typed query over the latest rows of `kind`.
    pub fn find(
        &self,
        run_id: &RunId,
        kind: &str,
        predicate: &Predicate,
        order: &[OrderBy],
        limit: Option<usize>,
    ) -> Result<Table> {
        let schema = self.schema(run_id, kind)?;
        let mut t = self.latest_rows(run_id, &schema, predicate)?;
        runmesh_query::sort(&mut t, order)?;
        if let Some(n) = limit {
            runmesh_query::limit(&mut t, n);
        }
        Ok(t)
    }

    /// Outer join of every declared kind on (ABSTRACTION, SYSTEM, PERMID).
    /// Kind fields appear as `<kind>.<field>`; missing rows leave nulls.
    pub fn to_joined_table(&self, run_id: &RunId) -> Result<Table> {
        let mut parts = Vec::new();
        for kind in self.kinds(run_id)? {
            let schema = self.schema(run_id, &kind)?;
            let full = self.latest_rows(run_id, &schema, &Predicate::True)?;
            let mut part = Table::default();
            for k in JOIN_KEYS {
                part.columns.push(column_or_empty(&full, k));
            }
            for f in &schema.fields {
                let mut c = column_or_empty(&full, &f.name);
                c.name = format!("{}.{}", kind, f.name);
                part.columns.push(c);
            }
            parts.push(part);
        }
        Ok(full_outer_join_all(&parts, &JOIN_KEYS)?)
    }

    /// `SELECT cols FROM <kind> [WHERE ..] [ORDER BY ..] [LIMIT n]`.
    pub fn select(&self, run_id: &RunId, sql: &str) -> Result<Table> {
        let query = parse_select(sql).map_err(|e| {
            warn!(run_id = %run_id, sql, error = %e, "rejected report query");
            RepoError::Query(e)
        })?;
        let table = self.to_table(run_id, &query.from)?;
        query.apply(&table).map_err(|e| {
            warn!(run_id = %run_id, sql, error = %e, "report query failed");
            RepoError::Query(e)
        })
    }

    /// `SYSTEM, PERMID, <Kind.field>` for every row of the abstraction.
    pub fn values(&self, run_id: &RunId, abstraction: &str, qualified: &str) -> Result<Table> {
        let (kind, field) = qualified.split_once('.').ok_or_else(|| {
            RepoError::Query(QueryError::Invalid(format!(
                "expected <Kind>.<field>, got '{}'",
                qualified
            )))
        })?;
        let schema = self.schema(run_id, kind)?;
        let only = Predicate::eq(keys::ABSTRACTION, Scalar::Str(abstraction.to_string()));
        let full = self.latest_rows(run_id, &schema, &only)?;
        let mut out = runmesh_query::project(
            &full,
            &[keys::SYSTEM.to_string(), keys::PERMID.to_string(), field.to_string()],
        )?;
        out.columns[2].name = qualified.to_string();
        Ok(out)
    }

    /// Distinct permutation ids stored for the key's (system, abstraction).
    pub fn permutation_ids(&self, run_id: &RunId, key: &ReportKey, kind: &str) -> Result<Vec<i64>> {
        let schema = self.schema(run_id, kind)?;
        let rows = self
            .table(run_id, &schema)
            .scan(&[key.abstraction.as_str(), key.system.as_str()])?;
        let ids: BTreeSet<i64> = rows
            .iter()
            .filter_map(|r| r.values.get(4).and_then(|v| v.as_i64()))
            .collect();
        Ok(ids.into_iter().collect())
    }

    /// Write `table` to `destination` (pass-through to the export writers).
    pub fn export(&self, table: &Table, destination: &Path, format: ExportFormat) -> Result<()> {
        write_table(table, destination, format).map_err(|e| match e {
            StoreError::Unavailable(msg) => RepoError::StoreUnavailable(msg),
            other => RepoError::Export(format!("{}: {}", destination.display(), other)),
        })
    }

    /// Export every kind holding rows of `action` to `<dir>/<kind>_<action>.<ext>`.
    pub fn export_action(
        &self,
        run_id: &RunId,
        action: &str,
        dir: &Path,
        format: ExportFormat,
    ) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        for kind in self.kinds(run_id)? {
            let table = self.to_table_for_action(run_id, &kind, action)?;
            if table.num_rows() == 0 {
                continue;
            }
            let file = dir.join(format!("{}_{}.{}", kind, action, format.extension()));
            self.export(&table, &file, format)?;
            written.push(file);
        }
        info!(run_id = %run_id, action, files = written.len(), "reports exported");
        Ok(written)
    }

    /// Destroy every report table and kind declaration of the run.
    pub fn drop_run(&self, run_id: &RunId) -> Result<usize> {
        let removed = self
            .storage
            .delete_prefix(&path::dir(PREFIX, &[run_id.as_str()]))?;
        let mut cache = self.schemas.write().unwrap_or_else(|e| e.into_inner());
        cache.retain(|(run, _), _| run != run_id);
        info!(run_id = %run_id, removed, "report caches dropped");
        Ok(removed)
    }
}

fn column_or_empty(table: &Table, name: &str) -> Column {
    table.column(name).cloned().unwrap_or_else(|| Column::new(name))
}

fn version_segment(stamp: u64) -> String {
    let seq = WRITE_SEQ.fetch_add(1, Ordering::SeqCst);
    format!("{:020}-{:020}-{}", stamp, seq, Uuid::new_v4().simple())
}

/// Last segment of a row key.
fn version_of(row_key: &str) -> &str {
    row_key.rsplit('/').next().unwrap_or(row_key)
}

fn stamp_of(row: &Row) -> u64 {
    match row.values.get(STAMP_COLUMN) {
        Some(Scalar::Timestamp(t)) => *t,
        _ => 0,
    }
}

/// Key of the first row of a stamp-ordered cursor, ties on the stamp broken
/// by the version segment in the same direction.
fn extreme_version(cursor: impl Iterator<Item = Row>, latest: bool) -> Option<String> {
    let mut best: Option<(u64, String)> = None;
    for row in cursor {
        let stamp = stamp_of(&row);
        let ahead = match &best {
            None => true,
            Some((top, _)) if *top != stamp => break,
            Some((_, key)) if latest => version_of(&row.key) > version_of(key),
            Some((_, key)) => version_of(&row.key) < version_of(key),
        };
        if ahead {
            best = Some((stamp, row.key));
        }
    }
    best.map(|(_, key)| key)
}

fn to_report_row(schema: &ReportSchema, row: Row) -> ReportRow {
    let version = version_of(&row.key).to_string();
    let last_modified = stamp_of(&row);
    let values = row.values;
    let text = |i: usize| values.get(i).and_then(|v| v.as_str()).unwrap_or("").to_string();
    let key = ReportKey {
        action: text(0),
        abstraction: text(1),
        system: text(2),
        data_source: text(3),
        perm_id: values.get(4).and_then(|v| v.as_i64()).unwrap_or(ReportKey::NO_PERMUTATION),
    };
    let mut report = Report::new();
    for (f, v) in schema.fields.iter().zip(values.iter().skip(FIELD_OFFSET)) {
        report.set(f.name.clone(), v.clone());
    }
    ReportRow {
        key,
        last_modified,
        version,
        report,
    }
}
