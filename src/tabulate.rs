//! Frequency tables and grouped aggregation.
//!
//! Tables are keyed by distinct non-missing values, in ascending order
//! (numbers before strings). Observations with a missing key are left out.
//!
//! # Example
//!
//! ```
//! use u_statkit::dataset::Dataset;
//! use u_statkit::tabulate::tabulate;
//! use u_statkit::types::{ScalarType, Value};
//!
//! let mut ds = Dataset::new();
//! ds.add_values("rep78", ScalarType::Integer, vec![3.into(), 4.into(), 3.into(), Value::Missing]).unwrap();
//!
//! let table = tabulate(&ds, "rep78").unwrap();
//! assert_eq!(table.len(), 2);
//! assert_eq!(table[0].value, Value::Int(3));
//! assert_eq!(table[0].count, 2);
//! ```

use std::collections::{BTreeMap, BTreeSet};

use crate::dataset::{Dataset, IndexKey};
use crate::error::{StatError, StatResult};
use crate::types::Value;

// ── One-way ───────────────────────────────────────────────────────────

/// One line of a one-way frequency table.
#[derive(Debug, Clone, PartialEq)]
pub struct Frequency {
    pub value: Value,
    pub count: usize,
    /// Share of non-missing observations, in percent.
    pub percent: f64,
    /// Running total of `percent`.
    pub cumulative: f64,
}

/// One-way frequency table of `var`.
pub fn tabulate(dataset: &Dataset, var: &str) -> StatResult<Vec<Frequency>> {
    let column = dataset.require(var)?;
    let mut counts: BTreeMap<IndexKey, usize> = BTreeMap::new();
    for v in column.values().filter(|v| !v.is_missing()) {
        *counts.entry(IndexKey(v)).or_default() += 1;
    }

    let total: usize = counts.values().sum();
    let mut cumulative = 0.0;
    Ok(counts
        .into_iter()
        .map(|(key, count)| {
            let percent = 100.0 * count as f64 / total as f64;
            cumulative += percent;
            Frequency {
                value: key.0,
                count,
                percent,
                cumulative,
            }
        })
        .collect())
}

// ── Two-way ───────────────────────────────────────────────────────────

/// Two-way table of counts.
#[derive(Debug, Clone, PartialEq)]
pub struct CrossTab {
    /// Distinct values of the row variable, ascending.
    pub row_values: Vec<Value>,
    /// Distinct values of the column variable, ascending.
    pub col_values: Vec<Value>,
    /// `counts[i][j]` observations with `row_values[i]` and `col_values[j]`.
    pub counts: Vec<Vec<usize>>,
}

impl CrossTab {
    /// Count for a pair of values, 0 when the pair never occurs.
    pub fn count(&self, row: &Value, col: &Value) -> usize {
        let find = |values: &[Value], v: &Value| values.iter().position(|x| x.total_cmp(v).is_eq());
        match (find(&self.row_values, row), find(&self.col_values, col)) {
            (Some(i), Some(j)) => self.counts[i][j],
            _ => 0,
        }
    }

    /// Number of observations in the table.
    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }
}

/// Two-way table of `row_var` by `col_var`.
///
/// Observations missing either variable are not counted.
pub fn tabulate2(dataset: &Dataset, row_var: &str, col_var: &str) -> StatResult<CrossTab> {
    let rows = dataset.require(row_var)?;
    let cols = dataset.require(col_var)?;

    let mut cells: BTreeMap<IndexKey, BTreeMap<IndexKey, usize>> = BTreeMap::new();
    let mut col_keys: BTreeSet<IndexKey> = BTreeSet::new();
    for (r, c) in rows.values().zip(cols.values()) {
        if r.is_missing() || c.is_missing() {
            continue;
        }
        col_keys.insert(IndexKey(c.clone()));
        *cells
            .entry(IndexKey(r))
            .or_default()
            .entry(IndexKey(c))
            .or_default() += 1;
    }

    let col_values: Vec<Value> = col_keys.into_iter().map(|k| k.0).collect();
    let mut row_values = Vec::with_capacity(cells.len());
    let mut counts = Vec::with_capacity(cells.len());
    for (row_key, line) in cells {
        counts.push(
            col_values
                .iter()
                .map(|c| line.get(&IndexKey(c.clone())).copied().unwrap_or(0))
                .collect(),
        );
        row_values.push(row_key.0);
    }

    Ok(CrossTab {
        row_values,
        col_values,
        counts,
    })
}

// ── Grouped aggregation ───────────────────────────────────────────────

/// Aggregation applied to each group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    Mean,
    Sum,
    /// Number of non-missing target values.
    Count,
}

impl Aggregation {
    /// Parses `mean`, `sum` or `count`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "mean" => Some(Self::Mean),
            "sum" => Some(Self::Sum),
            "count" => Some(Self::Count),
            _ => None,
        }
    }
}

/// Aggregate of one group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupRow {
    pub key: Value,
    /// Non-missing target values in the group.
    pub n: usize,
    /// `None` for the mean of a group with no target values.
    pub value: Option<f64>,
}

/// Aggregates `target` within each distinct value of `by`.
pub fn group_aggregate(
    dataset: &Dataset,
    by: &str,
    target: &str,
    aggregation: Aggregation,
) -> StatResult<Vec<GroupRow>> {
    let keys = dataset.require(by)?;
    let values = dataset.require(target)?;
    if aggregation != Aggregation::Count && !values.scalar_type().is_numeric() {
        return Err(StatError::NonNumericColumn {
            name: target.to_string(),
        });
    }

    let mut groups: BTreeMap<IndexKey, (usize, f64)> = BTreeMap::new();
    for (row, key) in keys.values().enumerate() {
        if key.is_missing() {
            continue;
        }
        let entry = groups.entry(IndexKey(key)).or_insert((0, 0.0));
        if values.is_valid(row) {
            entry.0 += 1;
            entry.1 += values.numeric_at(row).unwrap_or(0.0);
        }
    }

    Ok(groups
        .into_iter()
        .map(|(key, (n, sum))| GroupRow {
            key: key.0,
            n,
            value: match aggregation {
                Aggregation::Mean => (n > 0).then(|| sum / n as f64),
                Aggregation::Sum => Some(sum),
                Aggregation::Count => Some(n as f64),
            },
        })
        .collect())
}
