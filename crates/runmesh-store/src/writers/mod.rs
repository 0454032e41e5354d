//! Tabular export writers.

pub mod csv;
pub mod jsonl;

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use runmesh_core::types::Table;

use crate::error::{Result, StoreError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportFormat {
    #[default]
    Csv,
    Jsonl,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Jsonl => "jsonl",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "jsonl" | "ndjson" | "json" => Ok(ExportFormat::Jsonl),
            other => Err(StoreError::Config(format!("unknown export format '{other}'"))),
        }
    }
}

/// Write `table` to `path` in `format`, creating parent directories.
pub fn write_table(table: &Table, path: &Path, format: ExportFormat) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    match format {
        ExportFormat::Csv => {
            let mut w = csv::CsvWriter::to_path(path)?;
            w.write_table(table)?;
            w.finish()
        }
        ExportFormat::Jsonl => {
            let mut w = jsonl::JsonlWriter::to_path(path, None)?;
            w.write_table(table)
        }
    }
}
