//! Logical schema types and the per-kind report schema registry entries.
//!
//! Report kinds are declared at runtime as an ordered list of typed fields.
//! A `ReportSchema` is validated once when the kind is registered and is then
//! used to check every report written under that kind.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::keys::KEY_COLUMNS;
use crate::model::Report;
use crate::types::Scalar;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Boolean,
    Int32,
    Int64,
    Float64,
    Utf8,
    /// Milliseconds since Unix epoch (UTC).
    Timestamp,
}

impl DataType {
    /// Parse the loose type names used in scripts (`int`, `double`, `string`, ...).
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "bool" | "boolean" => Some(DataType::Boolean),
            "int" | "int32" | "integer" => Some(DataType::Int32),
            "long" | "int64" | "bigint" => Some(DataType::Int64),
            "double" | "float" | "float64" | "real" => Some(DataType::Float64),
            "string" | "utf8" | "varchar" | "text" => Some(DataType::Utf8),
            "timestamp" | "datetime" => Some(DataType::Timestamp),
            _ => None,
        }
    }

    /// Coerce a value into this type, widening numerics where lossless enough.
    /// Returns `None` when the value cannot be represented.
    pub fn coerce(&self, value: Scalar) -> Option<Scalar> {
        use Scalar::*;
        match (self, value) {
            (_, Null) => Some(Null),
            (DataType::Boolean, Bool(b)) => Some(Bool(b)),
            (DataType::Int32, I32(i)) => Some(I32(i)),
            (DataType::Int32, I64(i)) => i32::try_from(i).ok().map(I32),
            (DataType::Int64, I32(i)) => Some(I64(i as i64)),
            (DataType::Int64, I64(i)) => Some(I64(i)),
            (DataType::Float64, I32(i)) => Some(F64(i as f64)),
            (DataType::Float64, I64(i)) => Some(F64(i as f64)),
            (DataType::Float64, F64(f)) => Some(F64(f)),
            (DataType::Utf8, Str(s)) => Some(Str(s)),
            (DataType::Timestamp, Timestamp(t)) => Some(Timestamp(t)),
            (DataType::Timestamp, I64(t)) if t >= 0 => Some(Timestamp(t as u64)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn field(&self, idx: usize) -> Option<&Field> {
        self.fields.get(idx)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }
}

/// Declared shape of one report kind: `kind -> [(field, type)]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSchema {
    pub kind: String,
    pub fields: Vec<Field>,
}

impl ReportSchema {
    pub fn new(kind: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            kind: kind.into(),
            fields,
        }
    }

    /// Build from `(name, type-name)` pairs, all fields nullable.
    pub fn from_type_names<'a>(
        kind: impl Into<String>,
        fields: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self> {
        let kind = kind.into();
        let mut out = Vec::new();
        for (name, ty) in fields {
            let data_type = DataType::parse(ty).ok_or_else(|| {
                Error::Schema(format!("kind '{}': unknown type '{}' for '{}'", kind, ty, name))
            })?;
            out.push(Field::new(name, data_type, true));
        }
        Ok(Self::new(kind, out))
    }

    /// Check names and reserved columns. Run once at registration.
    pub fn validate(&self) -> Result<()> {
        check_identifier("report kind", &self.kind)?;
        let mut seen = std::collections::HashSet::new();
        for f in &self.fields {
            check_identifier("field", &f.name)?;
            let upper = f.name.to_ascii_uppercase();
            if KEY_COLUMNS.contains(&upper.as_str()) {
                return Err(Error::Schema(format!(
                    "kind '{}': field '{}' collides with a key column",
                    self.kind, f.name
                )));
            }
            if !seen.insert(upper) {
                return Err(Error::Schema(format!(
                    "kind '{}': duplicate field '{}'",
                    self.kind, f.name
                )));
            }
        }
        Ok(())
    }

    /// Full table schema: the key columns followed by the kind's own fields.
    pub fn table_schema(&self) -> Schema {
        let mut fields = vec![
            Field::new(KEY_COLUMNS[0], DataType::Utf8, false),
            Field::new(KEY_COLUMNS[1], DataType::Utf8, false),
            Field::new(KEY_COLUMNS[2], DataType::Utf8, false),
            Field::new(KEY_COLUMNS[3], DataType::Utf8, false),
            Field::new(KEY_COLUMNS[4], DataType::Int64, false),
            Field::new(KEY_COLUMNS[5], DataType::Timestamp, false),
        ];
        fields.extend(self.fields.iter().cloned());
        Schema::new(fields)
    }

    /// Check a report against the schema and return its values in field order.
    pub fn conform(&self, report: &Report) -> Result<Vec<Scalar>> {
        for name in report.names() {
            if !self.fields.iter().any(|f| f.name == name) {
                return Err(Error::Schema(format!(
                    "kind '{}': unknown field '{}'",
                    self.kind, name
                )));
            }
        }

        let mut values = Vec::with_capacity(self.fields.len());
        for f in &self.fields {
            let raw = report.get(&f.name).cloned().unwrap_or(Scalar::Null);
            if raw.is_null() {
                if !f.nullable {
                    return Err(Error::Schema(format!(
                        "kind '{}': field '{}' is not nullable",
                        self.kind, f.name
                    )));
                }
                values.push(Scalar::Null);
                continue;
            }
            let found = raw.data_type();
            let v = f.data_type.coerce(raw).ok_or_else(|| {
                Error::Schema(format!(
                    "kind '{}': field '{}' expects {:?}, got {:?}",
                    self.kind, f.name, f.data_type, found
                ))
            })?;
            values.push(v);
        }
        Ok(values)
    }
}

fn check_identifier(what: &str, name: &str) -> Result<()> {
    let mut chars = name.chars();
    let ok = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if ok {
        Ok(())
    } else {
        Err(Error::Schema(format!("invalid {} name '{}'", what, name)))
    }
}
