//! Hash-based full outer join over shared key columns.
//!
//! Output layout: key columns (coalesced from whichever side has the row),
//! then left non-key columns, then right non-key columns. Left row order is
//! preserved; right rows without a partner follow in their own order.
//! Duplicate keys produce the cross product of matching rows.

use std::collections::HashMap;

use runmesh_core::types::{Scalar, Table};

use crate::error::{QueryError, Result};

fn key_of(table: &Table, key_idx: &[usize], row: usize) -> String {
    // Debug form distinguishes Str("1") from I64(1)
    let mut k = String::new();
    for &c in key_idx {
        k.push_str(&format!("{:?}\u{1f}", table.columns[c].values[row]));
    }
    k
}

fn key_indices(table: &Table, keys: &[&str], side: &str) -> Result<Vec<usize>> {
    keys.iter()
        .map(|k| {
            table
                .column_index(k)
                .ok_or_else(|| QueryError::Join(format!("{} side has no key column '{}'", side, k)))
        })
        .collect()
}

pub fn full_outer_join(left: &Table, right: &Table, keys: &[&str]) -> Result<Table> {
    if keys.is_empty() {
        return Err(QueryError::Join("no join keys".into()));
    }
    let lk = key_indices(left, keys, "left")?;
    let rk = key_indices(right, keys, "right")?;

    let l_rest: Vec<usize> = (0..left.num_columns()).filter(|i| !lk.contains(i)).collect();
    let r_rest: Vec<usize> = (0..right.num_columns()).filter(|i| !rk.contains(i)).collect();

    let mut names: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
    names.extend(l_rest.iter().map(|&i| left.columns[i].name.clone()));
    for &i in &r_rest {
        let n = &right.columns[i].name;
        if names.contains(n) {
            return Err(QueryError::Join(format!("column '{}' exists on both sides", n)));
        }
        names.push(n.clone());
    }

    let mut right_rows: HashMap<String, Vec<usize>> = HashMap::new();
    for r in 0..right.num_rows() {
        right_rows.entry(key_of(right, &rk, r)).or_default().push(r);
    }

    let mut out = Table::with_columns(names);
    let mut matched = vec![false; right.num_rows()];

    let assemble = |l: Option<usize>, r: Option<usize>| -> Vec<Scalar> {
        let mut row = Vec::new();
        for (&li, &ri) in lk.iter().zip(rk.iter()) {
            let v = match (l, r) {
                (Some(l), _) => left.columns[li].values[l].clone(),
                (None, Some(r)) => right.columns[ri].values[r].clone(),
                (None, None) => Scalar::Null,
            };
            row.push(v);
        }
        for &c in &l_rest {
            row.push(l.map(|l| left.columns[c].values[l].clone()).unwrap_or(Scalar::Null));
        }
        for &c in &r_rest {
            row.push(r.map(|r| right.columns[c].values[r].clone()).unwrap_or(Scalar::Null));
        }
        row
    };

    for l in 0..left.num_rows() {
        match right_rows.get(&key_of(left, &lk, l)) {
            Some(partners) => {
                for &r in partners {
                    matched[r] = true;
                    out.push_row(assemble(Some(l), Some(r))).map_err(QueryError::Join)?;
                }
            }
            None => out.push_row(assemble(Some(l), None)).map_err(QueryError::Join)?,
        }
    }
    for (r, seen) in matched.iter().enumerate() {
        if !seen {
            out.push_row(assemble(None, Some(r))).map_err(QueryError::Join)?;
        }
    }
    Ok(out)
}

/// Left fold of `full_outer_join` over every table; an empty input yields a
/// table holding only the key columns.
pub fn full_outer_join_all(tables: &[Table], keys: &[&str]) -> Result<Table> {
    let mut iter = tables.iter();
    let Some(first) = iter.next() else {
        return Ok(Table::with_columns(keys.iter().copied()));
    };
    let mut acc = first.clone();
    for t in iter {
        acc = full_outer_join(&acc, t, keys)?;
    }
    Ok(acc)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind(prefix: &str, rows: &[(&str, i64)]) -> Table {
        let mut t = Table::with_columns(["SYSTEM".to_string(), "PERMID".to_string(), format!("{}.v", prefix)]);
        for (s, v) in rows {
            t.push_row(vec![Scalar::Str(s.to_string()), Scalar::I64(-1), Scalar::I64(*v)]).unwrap();
        }
        t
    }

    #[test]
    fn outer_join_fills_nulls_for_missing_keys() {
        let a = kind("A", &[("s1", 1), ("s2", 2), ("s3", 3)]);
        let b = kind("B", &[("s3", 30), ("s1", 10)]);
        let j = full_outer_join(&a, &b, &["SYSTEM", "PERMID"]).unwrap();
        assert_eq!(j.num_rows(), 3);
        assert_eq!(j.column_names(), vec!["SYSTEM", "PERMID", "A.v", "B.v"]);
        assert_eq!(j.value(1, "B.v"), Some(&Scalar::Null));
        assert_eq!(j.value(2, "B.v"), Some(&Scalar::I64(30)));
    }

    #[test]
    fn right_only_rows_are_appended() {
        let a = kind("A", &[("s1", 1)]);
        let b = kind("B", &[("s9", 9)]);
        let j = full_outer_join(&a, &b, &["SYSTEM", "PERMID"]).unwrap();
        assert_eq!(j.num_rows(), 2);
        assert_eq!(j.value(1, "SYSTEM"), Some(&Scalar::Str("s9".into())));
        assert_eq!(j.value(1, "A.v"), Some(&Scalar::Null));
    }

    #[test]
    fn duplicates_cross_multiply() {
        let a = kind("A", &[("s1", 1), ("s1", 2)]);
        let b = kind("B", &[("s1", 10), ("s1", 20)]);
        let j = full_outer_join(&a, &b, &["SYSTEM", "PERMID"]).unwrap();
        assert_eq!(j.num_rows(), 4);
    }

    #[test]
    fn join_errors() {
        let a = kind("A", &[]);
        assert!(full_outer_join(&a, &a, &["SYSTEM"]).is_err()); // A.v on both sides
        assert!(full_outer_join(&a, &kind("B", &[]), &["NOPE"]).is_err());
        assert!(full_outer_join(&a, &kind("B", &[]), &[]).is_err());
    }

    #[test]
    fn join_all_folds_three_tables() {
        let j = full_outer_join_all(
            &[kind("A", &[("s1", 1)]), kind("B", &[("s2", 2)]), kind("C", &[("s1", 3)])],
            &["SYSTEM", "PERMID"],
        )
        .unwrap();
        assert_eq!(j.num_rows(), 2);
        assert_eq!(j.value(0, "C.v"), Some(&Scalar::I64(3)));
        assert_eq!(full_outer_join_all(&[], &["SYSTEM"]).unwrap().column_names(), vec!["SYSTEM"]);
    }
}
