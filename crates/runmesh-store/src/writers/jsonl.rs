//! JSON-lines writer: one object per row, keys are column names.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde_json::{Map, Value};

use crate::error::Result;
use runmesh_core::types::Table;

pub struct JsonlWriter<W: Write> {
    out: BufWriter<W>,
    /// Fixed after the first table unless given up front.
    columns: Option<Vec<String>>,
}

impl JsonlWriter<File> {
    pub fn to_path(path: &Path, columns: Option<Vec<String>>) -> Result<Self> {
        Ok(Self::to_writer(File::create(path)?, columns))
    }
}

impl<W: Write> JsonlWriter<W> {
    pub fn to_writer(writer: W, columns: Option<Vec<String>>) -> Self {
        Self {
            out: BufWriter::new(writer),
            columns,
        }
    }

    pub fn write_table(&mut self, table: &Table) -> Result<()> {
        let columns = self.columns.get_or_insert_with(|| table.column_names());
        // columns the table lacks are skipped
        let present: Vec<(&String, usize)> = columns
            .iter()
            .filter_map(|name| table.column_index(name).map(|idx| (name, idx)))
            .collect();

        for row in table.rows() {
            let obj: Map<String, Value> = present
                .iter()
                .map(|(name, idx)| ((*name).clone(), row[*idx].to_json()))
                .collect();
            serde_json::to_writer(&mut self.out, &obj)?;
            self.out.write_all(b"\n")?;
        }
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runmesh_core::types::Scalar;

    #[test]
    fn one_object_per_row() {
        let mut t = Table::with_columns(["a", "b"]);
        t.push_row(vec![Scalar::I64(1), Scalar::Null]).unwrap();
        t.push_row(vec![Scalar::I64(2), Scalar::Str("x".into())]).unwrap();

        let mut buf = Vec::new();
        {
            let mut w = JsonlWriter::to_writer(&mut buf, None);
            w.write_table(&t).unwrap();
        }
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines, vec![r#"{"a":1,"b":null}"#, r#"{"a":2,"b":"x"}"#]);
    }

    #[test]
    fn explicit_columns_select_and_skip() {
        let mut t = Table::with_columns(["a", "b"]);
        t.push_row(vec![Scalar::I64(1), Scalar::Bool(true)]).unwrap();

        let mut buf = Vec::new();
        {
            let mut w = JsonlWriter::to_writer(&mut buf, Some(vec!["b".into(), "zz".into()]));
            w.write_table(&t).unwrap();
        }
        assert_eq!(String::from_utf8(buf).unwrap().trim(), r#"{"b":true}"#);
    }
}
