//! CSV writer: header row of column names, NULL as an empty field.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use runmesh_core::types::Table;

use crate::error::Result;

pub struct CsvWriter<W: Write> {
    writer: ::csv::Writer<W>,
    wrote_header: bool,
}

impl CsvWriter<File> {
    pub fn to_path(path: &Path) -> Result<Self> {
        Ok(Self::to_writer(File::create(path)?))
    }
}

impl<W: Write> CsvWriter<W> {
    pub fn to_writer(writer: W) -> Self {
        Self {
            writer: ::csv::Writer::from_writer(writer),
            wrote_header: false,
        }
    }

    /// Write every row; the header is emitted once, from the first table.
    pub fn write_table(&mut self, table: &Table) -> Result<()> {
        if !self.wrote_header {
            self.writer.write_record(table.column_names())?;
            self.wrote_header = true;
        }
        for row in table.rows() {
            self.writer
                .write_record(row.iter().map(|v| v.to_string()))?;
        }
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| crate::error::StoreError::Io(e.into_error()))
    }
}
