//! Variable creation, modification and observation/variable selection.
//!
//! Every function here validates and computes first and only then writes
//! the dataset, so a failure (unknown variable, division by zero on some
//! row, type mismatch) leaves the dataset exactly as it was.
//!
//! # Example
//!
//! ```
//! use u_statkit::crud::{generate, keep_if};
//! use u_statkit::dataset::Dataset;
//! use u_statkit::expr::Expression;
//! use u_statkit::types::{ScalarType, Value};
//!
//! let mut ds = Dataset::new();
//! ds.add_values("price", ScalarType::Integer, vec![10.into(), 100.into()]).unwrap();
//! ds.add_values("foreign", ScalarType::Integer, vec![0.into(), 1.into()]).unwrap();
//!
//! generate(&mut ds, "lprice", &Expression::parse("log(price)").unwrap()).unwrap();
//! assert_eq!(ds.column_by_name("lprice").unwrap().scalar_type(), ScalarType::Float);
//!
//! keep_if(&mut ds, &Expression::parse("foreign == 1").unwrap()).unwrap();
//! assert_eq!(ds.n_obs(), 1);
//! assert_eq!(ds.get("price", 0).unwrap(), Value::Int(100));
//! ```

use std::collections::HashSet;

use log::{debug, warn};

use crate::dataset::{Column, Dataset};
use crate::error::{StatError, StatResult};
use crate::expr::Expression;
use crate::types::{infer_from_values, Value};

// ── Variables from expressions ────────────────────────────────────────

/// Creates a new variable from `expr` evaluated on every observation.
///
/// The column type is inferred from the produced values: all integers give
/// an integer column, any float gives a float column, strings give a string
/// column and an all-missing result gives a float column.
pub fn generate(dataset: &mut Dataset, name: &str, expr: &Expression) -> StatResult<()> {
    if dataset.column_index(name).is_some() {
        return Err(StatError::DuplicateColumn {
            name: name.to_string(),
        });
    }
    let values = expr.evaluate_all(dataset)?;
    let scalar_type = infer_from_values(&values)?;
    let column = Column::from_values(scalar_type, &values)?;
    let missing = column.null_count();
    dataset.add_column(name, column)?;
    debug!(
        "generate {name} = {expr}: {} observations, {missing} missing",
        dataset.n_obs()
    );
    Ok(())
}

/// Overwrites `target` with `expr` on the observations selected by `filter`.
///
/// Without a filter every observation is replaced. `expr` is evaluated only
/// on selected observations, so a row excluded by the filter cannot raise an
/// evaluation error. Returns the number of observations whose value changed.
pub fn replace(
    dataset: &mut Dataset,
    target: &str,
    expr: &Expression,
    filter: Option<&Expression>,
) -> StatResult<usize> {
    let mut column = dataset.require(target)?.clone();
    let mask = match filter {
        Some(f) => f.mask(dataset)?,
        None => vec![true; dataset.n_obs()],
    };

    let mut changed = 0;
    for row in (0..mask.len()).filter(|&i| mask[i]) {
        let value = expr
            .evaluate(dataset, row)
            .map_err(|e| e.at_row(row))?;
        if column.value(row).as_ref() != Some(&value) {
            changed += 1;
        }
        column.set(row, value).map_err(|e| e.at_row(row))?;
    }

    dataset.replace_column(target, column)?;
    debug!("replace {target} = {expr}: {changed} real changes");
    Ok(changed)
}

// ── Observation selection ─────────────────────────────────────────────

/// Keeps only the observations for which `filter` is true.
///
/// Missing filter results count as false. Returns the number of
/// observations dropped.
pub fn keep_if(dataset: &mut Dataset, filter: &Expression) -> StatResult<usize> {
    let mask = filter.mask(dataset)?;
    apply_mask(dataset, &mask, "keep if", filter)
}

/// Drops the observations for which `filter` is true.
///
/// Observations whose filter result is missing are kept. Returns the number
/// of observations dropped.
pub fn drop_if(dataset: &mut Dataset, filter: &Expression) -> StatResult<usize> {
    let mask: Vec<bool> = filter.mask(dataset)?.into_iter().map(|m| !m).collect();
    apply_mask(dataset, &mask, "drop if", filter)
}

fn apply_mask(
    dataset: &mut Dataset,
    mask: &[bool],
    command: &str,
    filter: &Expression,
) -> StatResult<usize> {
    let before = dataset.n_obs();
    *dataset = dataset.select_rows(mask)?;
    let dropped = before - dataset.n_obs();
    debug!("{command} {filter}: {dropped} observations deleted");
    if dataset.n_obs() == 0 && before > 0 {
        warn!("{command} {filter} left the dataset with no observations");
    }
    Ok(dropped)
}

// ── Variable selection ────────────────────────────────────────────────

/// Drops the named variables.
///
/// All names are validated before anything is removed.
pub fn drop_vars(dataset: &mut Dataset, names: &[&str]) -> StatResult<()> {
    validate_names(dataset, names)?;
    for name in names.iter().collect::<HashSet<_>>() {
        dataset.drop_column(name)?;
    }
    debug!("drop {}: {} variables remain", names.join(" "), dataset.column_count());
    Ok(())
}

/// Keeps only the named variables, in their existing order.
pub fn keep_vars(dataset: &mut Dataset, names: &[&str]) -> StatResult<()> {
    validate_names(dataset, names)?;
    let doomed: Vec<String> = dataset
        .column_names()
        .iter()
        .filter(|n| !names.contains(&n.as_str()))
        .cloned()
        .collect();
    for name in &doomed {
        dataset.drop_column(name)?;
    }
    debug!("keep {}: {} variables dropped", names.join(" "), doomed.len());
    Ok(())
}

/// Renames a variable.
pub fn rename(dataset: &mut Dataset, old: &str, new: &str) -> StatResult<()> {
    dataset.rename_column(old, new)?;
    debug!("rename {old} -> {new}");
    Ok(())
}

fn validate_names(dataset: &Dataset, names: &[&str]) -> StatResult<()> {
    names.iter().try_for_each(|n| dataset.require(n).map(|_| ()))
}

/// Values of `name` as a plain vector (missing included).
pub fn column_values(dataset: &Dataset, name: &str) -> StatResult<Vec<Value>> {
    Ok(dataset.require(name)?.values().collect())
}

// ── Tests ─────────────────────────────────────────────────────────────
