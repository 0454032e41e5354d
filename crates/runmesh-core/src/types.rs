//! Lightweight logical values and tables shared by the store, the query layer,
//! and the report repository.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::schema::DataType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    Null,
    Bool(bool),
    I32(i32),
    I64(i64),
    F64(f64),
    Str(String),
    /// Milliseconds since Unix epoch (UTC).
    Timestamp(u64),
}

impl Scalar {
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Scalar::Null => None,
            Scalar::Bool(_) => Some(DataType::Boolean),
            Scalar::I32(_) => Some(DataType::Int32),
            Scalar::I64(_) => Some(DataType::Int64),
            Scalar::F64(_) => Some(DataType::Float64),
            Scalar::Str(_) => Some(DataType::Utf8),
            Scalar::Timestamp(_) => Some(DataType::Timestamp),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view across the integer-like variants.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::I32(i) => Some(*i as i64),
            Scalar::I64(i) => Some(*i),
            Scalar::Timestamp(t) => i64::try_from(*t).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::F64(f) => Some(*f),
            other => other.as_i64().map(|i| i as f64),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        use Scalar::*;
        match self {
            Null => serde_json::Value::Null,
            Bool(b) => serde_json::Value::Bool(*b),
            I32(i) => serde_json::Value::from(*i),
            I64(i) => serde_json::Value::from(*i),
            F64(f) => serde_json::Value::from(*f),
            Str(s) => serde_json::Value::String(s.clone()),
            Timestamp(t) => serde_json::Value::from(*t),
        }
    }

    /// Best-effort conversion from untyped JSON (scripts, configuration).
    /// Arrays and objects are kept as their JSON text.
    pub fn from_json(v: &serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Scalar::Null,
            serde_json::Value::Bool(b) => Scalar::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Scalar::I64(i),
                None => Scalar::F64(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Scalar::Str(s.clone()),
            other => Scalar::Str(other.to_string()),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Scalar::*;
        match self {
            Null => Ok(()),
            Bool(b) => write!(f, "{}", b),
            I32(i) => write!(f, "{}", i),
            I64(i) => write!(f, "{}", i),
            F64(x) => write!(f, "{}", x),
            Str(s) => f.write_str(s),
            Timestamp(t) => write!(f, "{}", t),
        }
    }
}

/// Named column of values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub values: Vec<Scalar>,
}

impl Column {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Column-oriented result table (report dumps, joins, ad-hoc selects).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<Column>,
}

impl Table {
    /// Empty table with the given column names.
    pub fn with_columns<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: names.into_iter().map(Column::new).collect(),
        }
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map(|c| c.len()).unwrap_or(0)
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Append one row; the row must have one value per column.
    pub fn push_row(&mut self, row: Vec<Scalar>) -> Result<(), String> {
        if row.len() != self.columns.len() {
            return Err(format!(
                "row has {} values, table has {} columns",
                row.len(),
                self.columns.len()
            ));
        }
        for (col, v) in self.columns.iter_mut().zip(row) {
            col.values.push(v);
        }
        Ok(())
    }

    pub fn row(&self, idx: usize) -> Option<Vec<Scalar>> {
        if idx >= self.num_rows() {
            return None;
        }
        Some(self.columns.iter().map(|c| c.values[idx].clone()).collect())
    }

    pub fn rows(&self) -> impl Iterator<Item = Vec<Scalar>> + '_ {
        (0..self.num_rows()).map(move |i| self.columns.iter().map(|c| c.values[i].clone()).collect())
    }

    /// Value at (row, column name).
    pub fn value(&self, idx: usize, column: &str) -> Option<&Scalar> {
        self.column(column).and_then(|c| c.values.get(idx))
    }

    /// Sort rows by the specified columns (in order).
    ///
    /// Creates a vector of (sort_key_tuple, original_index), sorts it,
    /// then reorders all columns accordingly. The sort is stable.
    pub fn sort_by_columns(&mut self, sort_keys: &[String]) -> Result<(), String> {
        let num_rows = self.num_rows();
        if num_rows == 0 {
            return Ok(());
        }

        let key_indices: Vec<usize> = sort_keys
            .iter()
            .map(|key| {
                self.column_index(key)
                    .ok_or_else(|| format!("sort key column '{}' not found", key))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut indices: Vec<(Vec<Scalar>, usize)> = (0..num_rows)
            .map(|row_idx| {
                let sort_tuple: Vec<Scalar> = key_indices
                    .iter()
                    .map(|&col_idx| self.columns[col_idx].values[row_idx].clone())
                    .collect();
                (sort_tuple, row_idx)
            })
            .collect();

        indices.sort_by(|(a, _), (b, _)| scalar_tuple_cmp(a, b));

        let order: Vec<usize> = indices.into_iter().map(|(_, i)| i).collect();
        self.reorder(&order);
        Ok(())
    }

    /// Keep only the rows at `order`, in that order.
    pub fn reorder(&mut self, order: &[usize]) {
        for col in &mut self.columns {
            let original = std::mem::take(&mut col.values);
            col.values = order.iter().map(|&i| original[i].clone()).collect();
        }
    }
}

/// Compare two scalar tuples lexicographically.
pub fn scalar_tuple_cmp(a: &[Scalar], b: &[Scalar]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        match scalar_cmp(x, y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    a.len().cmp(&b.len())
}

/// Total order over scalars.
///
/// Nulls sort first. Numbers compare by value across the numeric variants,
/// NaN sorts last. Otherwise mixed types order by variant.
pub fn scalar_cmp(a: &Scalar, b: &Scalar) -> Ordering {
    use Scalar::*;

    match (a, b) {
        (Null, Null) => Ordering::Equal,
        (Null, _) => Ordering::Less,
        (_, Null) => Ordering::Greater,
        (Bool(x), Bool(y)) => x.cmp(y),
        (Str(x), Str(y)) => x.cmp(y),
        (I32(_) | I64(_) | Timestamp(_), I32(_) | I64(_) | Timestamp(_)) => {
            match (a.as_i64(), b.as_i64()) {
                (Some(x), Some(y)) => x.cmp(&y),
                // u64 timestamps beyond i64::MAX
                _ => scalar_type_order(a).cmp(&scalar_type_order(b)),
            }
        }
        (I32(_) | I64(_) | F64(_) | Timestamp(_), I32(_) | I64(_) | F64(_) | Timestamp(_)) => {
            let x = a.as_f64().unwrap_or(f64::NAN);
            let y = b.as_f64().unwrap_or(f64::NAN);
            if x.is_nan() && y.is_nan() {
                Ordering::Equal
            } else if x.is_nan() {
                Ordering::Greater
            } else if y.is_nan() {
                Ordering::Less
            } else {
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            }
        }
        _ => scalar_type_order(a).cmp(&scalar_type_order(b)),
    }
}

fn scalar_type_order(s: &Scalar) -> u8 {
    use Scalar::*;
    match s {
        Null => 0,
        Bool(_) => 1,
        I32(_) | I64(_) | F64(_) | Timestamp(_) => 2,
        Str(_) => 3,
    }
}
