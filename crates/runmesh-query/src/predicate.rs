//! Predicate AST and its evaluation against table rows.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use runmesh_core::types::{scalar_cmp, Scalar};

use crate::error::{QueryError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn holds(self, ord: Ordering) -> bool {
        match self {
            CmpOp::Eq => ord == Ordering::Equal,
            CmpOp::Ne => ord != Ordering::Equal,
            CmpOp::Lt => ord == Ordering::Less,
            CmpOp::Le => ord != Ordering::Greater,
            CmpOp::Gt => ord == Ordering::Greater,
            CmpOp::Ge => ord != Ordering::Less,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "=",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    /// Matches every row.
    True,
    Cmp {
        column: String,
        op: CmpOp,
        value: Scalar,
    },
    IsNull {
        column: String,
        negated: bool,
    },
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn cmp(column: impl Into<String>, op: CmpOp, value: Scalar) -> Self {
        Predicate::Cmp {
            column: column.into(),
            op,
            value,
        }
    }

    pub fn eq(column: impl Into<String>, value: Scalar) -> Self {
        Self::cmp(column, CmpOp::Eq, value)
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Predicate::IsNull {
            column: column.into(),
            negated: false,
        }
    }

    pub fn and(self, other: Predicate) -> Self {
        match (self, other) {
            (Predicate::True, p) | (p, Predicate::True) => p,
            (a, b) => Predicate::And(Box::new(a), Box::new(b)),
        }
    }

    pub fn or(self, other: Predicate) -> Self {
        Predicate::Or(Box::new(self), Box::new(other))
    }

    pub fn negate(self) -> Self {
        Predicate::Not(Box::new(self))
    }

    /// Conjunction of `column = value` terms.
    pub fn all_eq<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = (S, Scalar)>,
        S: Into<String>,
    {
        terms
            .into_iter()
            .fold(Predicate::True, |acc, (c, v)| acc.and(Predicate::eq(c, v)))
    }

    /// Column names referenced by the predicate.
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Predicate::True => {}
            Predicate::Cmp { column, .. } | Predicate::IsNull { column, .. } => {
                if !out.contains(&column.as_str()) {
                    out.push(column.as_str());
                }
            }
            Predicate::And(a, b) | Predicate::Or(a, b) => {
                a.collect_columns(out);
                b.collect_columns(out);
            }
            Predicate::Not(p) => p.collect_columns(out),
        }
    }

    /// Resolve column names against `columns` (exact match first, then
    /// case-insensitive) so rows can be evaluated by position.
    pub fn bind(&self, columns: &[String]) -> Result<BoundPredicate> {
        Ok(match self {
            Predicate::True => BoundPredicate::True,
            Predicate::Cmp { column, op, value } => BoundPredicate::Cmp {
                idx: resolve_column(columns, column)?,
                column: column.clone(),
                op: *op,
                value: value.clone(),
            },
            Predicate::IsNull { column, negated } => BoundPredicate::IsNull {
                idx: resolve_column(columns, column)?,
                negated: *negated,
            },
            Predicate::And(a, b) => {
                BoundPredicate::And(Box::new(a.bind(columns)?), Box::new(b.bind(columns)?))
            }
            Predicate::Or(a, b) => {
                BoundPredicate::Or(Box::new(a.bind(columns)?), Box::new(b.bind(columns)?))
            }
            Predicate::Not(p) => BoundPredicate::Not(Box::new(p.bind(columns)?)),
        })
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::True => f.write_str("TRUE"),
            Predicate::Cmp { column, op, value } => match value {
                Scalar::Str(s) => write!(f, "{} {} '{}'", column, op.symbol(), s.replace('\'', "''")),
                Scalar::Null => write!(f, "{} {} NULL", column, op.symbol()),
                v => write!(f, "{} {} {}", column, op.symbol(), v),
            },
            Predicate::IsNull { column, negated } => {
                write!(f, "{} IS {}NULL", column, if *negated { "NOT " } else { "" })
            }
            Predicate::And(a, b) => write!(f, "({} AND {})", a, b),
            Predicate::Or(a, b) => write!(f, "({} OR {})", a, b),
            Predicate::Not(p) => write!(f, "NOT {}", p),
        }
    }
}

/// Index of `name` in `columns`: exact match first, then case-insensitive.
pub fn resolve_column(columns: &[String], name: &str) -> Result<usize> {
    columns
        .iter()
        .position(|c| c == name)
        .or_else(|| columns.iter().position(|c| c.eq_ignore_ascii_case(name)))
        .ok_or_else(|| QueryError::UnknownColumn(name.to_string()))
}

/// Predicate with columns resolved to row positions.
#[derive(Debug, Clone)]
pub enum BoundPredicate {
    True,
    Cmp {
        idx: usize,
        column: String,
        op: CmpOp,
        value: Scalar,
    },
    IsNull {
        idx: usize,
        negated: bool,
    },
    And(Box<BoundPredicate>, Box<BoundPredicate>),
    Or(Box<BoundPredicate>, Box<BoundPredicate>),
    Not(Box<BoundPredicate>),
}

impl BoundPredicate {
    /// Comparisons against NULL never match; comparing a string with a
    /// number is a type error.
    pub fn matches(&self, row: &[Scalar]) -> Result<bool> {
        match self {
            BoundPredicate::True => Ok(true),
            BoundPredicate::Cmp {
                idx,
                column,
                op,
                value,
            } => {
                let cell = row.get(*idx).unwrap_or(&Scalar::Null);
                if cell.is_null() || value.is_null() {
                    return Ok(false);
                }
                if !comparable(cell, value) {
                    return Err(QueryError::TypeMismatch(format!(
                        "cannot compare column '{}' ({:?}) with {:?}",
                        column, cell, value
                    )));
                }
                Ok(op.holds(scalar_cmp(cell, value)))
            }
            BoundPredicate::IsNull { idx, negated } => {
                let is_null = row.get(*idx).map(|v| v.is_null()).unwrap_or(true);
                Ok(is_null != *negated)
            }
            BoundPredicate::And(a, b) => Ok(a.matches(row)? && b.matches(row)?),
            BoundPredicate::Or(a, b) => Ok(a.matches(row)? || b.matches(row)?),
            BoundPredicate::Not(p) => Ok(!p.matches(row)?),
        }
    }
}

fn comparable(a: &Scalar, b: &Scalar) -> bool {
    use Scalar::*;
    let numeric = |s: &Scalar| matches!(s, I32(_) | I64(_) | F64(_) | Timestamp(_));
    match (a, b) {
        (Bool(_), Bool(_)) | (Str(_), Str(_)) => true,
        _ => numeric(a) && numeric(b),
    }
}
