//! Per-variable summary statistics: `describe` and `summarize`.
//!
//! Both commands compute over non-missing values only. `describe` adds the
//! storage type, missing count and median; `summarize` supports an optional
//! weight variable.
//!
//! Weighted statistics use the population form with `Σw` as divisor:
//!
//! ```text
//! mean = Σ wᵢxᵢ / Σ wᵢ
//! sd   = sqrt( Σ wᵢ(xᵢ − mean)² / Σ wᵢ )
//! ```
//!
//! # Example
//!
//! ```
//! use u_statkit::dataset::Dataset;
//! use u_statkit::descriptives::{summarize, SummarizeOptions};
//! use u_statkit::types::ScalarType;
//!
//! let mut ds = Dataset::new();
//! ds.add_values("price", ScalarType::Integer, vec![4000.into(), 5000.into(), 6000.into()]).unwrap();
//!
//! let rows = summarize(&ds, &[], &SummarizeOptions::default()).unwrap();
//! assert_eq!(rows[0].n, 3);
//! assert!((rows[0].mean.unwrap() - 5000.0).abs() < 1e-9);
//! assert!((rows[0].sd.unwrap() - 1000.0).abs() < 1e-9);
//! ```

use crate::dataset::{Column, Dataset};
use crate::error::{StatError, StatResult};
use crate::types::ScalarType;

// ── Records ───────────────────────────────────────────────────────────

/// One row of `summarize` output.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub name: String,
    /// Observations used (non-missing value, and non-missing weight when weighted).
    pub n: usize,
    pub mean: Option<f64>,
    /// Sample SD (N−1) unweighted; population SD (Σw) weighted.
    pub sd: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// Σw, present only for weighted summaries.
    pub sum_weights: Option<f64>,
}

/// One row of `describe` output.
#[derive(Debug, Clone, PartialEq)]
pub struct Description {
    pub name: String,
    pub scalar_type: ScalarType,
    /// Count of non-missing numeric values (0 for string variables).
    pub n: usize,
    /// Count of missing values.
    pub missing: usize,
    pub mean: Option<f64>,
    pub sd: Option<f64>,
    pub min: Option<f64>,
    /// Median (p50).
    pub median: Option<f64>,
    pub max: Option<f64>,
}

// ── Options ───────────────────────────────────────────────────────────

/// Options for [`summarize`].
#[derive(Debug, Clone, Default)]
pub struct SummarizeOptions {
    weight: Option<String>,
}

impl SummarizeOptions {
    /// Unweighted summary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Weights observations by the numeric variable `name`.
    pub fn weight(mut self, name: impl Into<String>) -> Self {
        self.weight = Some(name.into());
        self
    }

    /// The configured weight variable, if any.
    pub fn weight_name(&self) -> Option<&str> {
        self.weight.as_deref()
    }
}

// ── Commands ──────────────────────────────────────────────────────────

/// Describes the requested variables (all numeric variables when `vars` is empty).
///
/// String variables may be requested explicitly and are reported with
/// N = 0 and no statistics.
pub fn describe(dataset: &Dataset, vars: &[&str]) -> StatResult<Vec<Description>> {
    select(dataset, vars)?
        .into_iter()
        .map(|(name, col)| {
            let values = col.valid_numeric_values().unwrap_or_default();
            let stats = Moments::unweighted(&values);
            Ok(Description {
                name,
                scalar_type: col.scalar_type(),
                n: values.len(),
                missing: col.null_count(),
                mean: stats.mean,
                sd: stats.sd,
                min: stats.min,
                median: u_numflow::stats::median(&values),
                max: stats.max,
            })
        })
        .collect()
}

/// Summarizes the requested variables (all numeric variables when `vars` is empty).
///
/// With a weight, only observations where both the variable and the weight
/// are present are used, and a negative weight is an error.
pub fn summarize(
    dataset: &Dataset,
    vars: &[&str],
    options: &SummarizeOptions,
) -> StatResult<Vec<Summary>> {
    let weight = match options.weight_name() {
        Some(w) => {
            let col = dataset.require(w)?;
            if !col.scalar_type().is_numeric() {
                return Err(StatError::NonNumericColumn {
                    name: w.to_string(),
                });
            }
            Some(col)
        }
        None => None,
    };

    select(dataset, vars)?
        .into_iter()
        .map(|(name, col)| match weight {
            None => {
                let values = col.valid_numeric_values().unwrap_or_default();
                let stats = Moments::unweighted(&values);
                Ok(Summary {
                    name,
                    n: values.len(),
                    mean: stats.mean,
                    sd: stats.sd,
                    min: stats.min,
                    max: stats.max,
                    sum_weights: None,
                })
            }
            Some(w) => weighted_summary(&name, col, w),
        })
        .collect()
}

fn select<'a>(dataset: &'a Dataset, vars: &[&str]) -> StatResult<Vec<(String, &'a Column)>> {
    if vars.is_empty() {
        return Ok(dataset
            .iter()
            .filter(|(_, c)| c.scalar_type().is_numeric())
            .map(|(n, c)| (n.to_string(), c))
            .collect());
    }
    vars.iter()
        .map(|&v| Ok((v.to_string(), dataset.require(v)?)))
        .collect()
}

fn weighted_summary(name: &str, col: &Column, weight: &Column) -> StatResult<Summary> {
    let mut pairs = Vec::new();
    for row in 0..col.len() {
        let (Some(x), Some(w)) = (col.numeric_at(row), weight.numeric_at(row)) else {
            continue;
        };
        if w < 0.0 || !w.is_finite() {
            return Err(StatError::InvalidWeight { row, value: w });
        }
        pairs.push((x, w));
    }

    let sum_w: f64 = pairs.iter().map(|(_, w)| w).sum();
    let values: Vec<f64> = pairs.iter().map(|(x, _)| *x).collect();
    let (mean, sd) = if sum_w > 0.0 {
        let mean = pairs.iter().map(|(x, w)| x * w).sum::<f64>() / sum_w;
        let var = pairs.iter().map(|(x, w)| w * (x - mean).powi(2)).sum::<f64>() / sum_w;
        (Some(mean), Some(var.sqrt()))
    } else {
        (None, None)
    };

    Ok(Summary {
        name: name.to_string(),
        n: pairs.len(),
        mean,
        sd,
        min: u_numflow::stats::min(&values),
        max: u_numflow::stats::max(&values),
        sum_weights: Some(sum_w),
    })
}

// ── Moments ───────────────────────────────────────────────────────────

struct Moments {
    mean: Option<f64>,
    sd: Option<f64>,
    min: Option<f64>,
    max: Option<f64>,
}

impl Moments {
    fn unweighted(values: &[f64]) -> Self {
        let sd = if values.len() > 1 {
            u_numflow::stats::std_dev(values)
        } else {
            None
        };
        Self {
            mean: u_numflow::stats::mean(values),
            sd,
            min: u_numflow::stats::min(values),
            max: u_numflow::stats::max(values),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    fn data() -> Dataset {
        let mut ds = Dataset::new();
        ds.add_values(
            "price",
            ScalarType::Integer,
            vec![4000.into(), 5000.into(), 6000.into(), Value::Missing],
        )
        .unwrap();
        ds.add_values(
            "w",
            ScalarType::Float,
            vec![1.0.into(), 1.0.into(), 2.0.into(), 1.0.into()],
        )
        .unwrap();
        ds.add_values(
            "make",
            ScalarType::String,
            vec!["a".into(), "b".into(), Value::Missing, "d".into()],
        )
        .unwrap();
        ds
    }

    #[test]
    fn summarize_unweighted() {
        let rows = summarize(&data(), &["price"], &SummarizeOptions::new()).unwrap();
        let s = &rows[0];
        assert_eq!(s.n, 3);
        assert!((s.mean.unwrap() - 5000.0).abs() < 1e-9);
        assert!((s.sd.unwrap() - 1000.0).abs() < 1e-9);
        assert_eq!(s.min, Some(4000.0));
        assert_eq!(s.max, Some(6000.0));
        assert_eq!(s.sum_weights, None);
    }

    #[test]
    fn summarize_defaults_to_numeric_vars() {
        let rows = summarize(&data(), &[], &SummarizeOptions::new()).unwrap();
        let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["price", "w"]);
    }

    #[test]
    fn summarize_weighted() {
        let opts = SummarizeOptions::new().weight("w");
        let rows = summarize(&data(), &["price"], &opts).unwrap();
        let s = &rows[0];
        assert_eq!(s.n, 3);
        assert_eq!(s.sum_weights, Some(4.0));
        // (4000 + 5000 + 2·6000) / 4
        assert!((s.mean.unwrap() - 5250.0).abs() < 1e-9);
        // (1250² + 250² + 2·750²) / 4
        let var: f64 = (1250.0_f64.powi(2) + 250.0_f64.powi(2) + 2.0 * 750.0_f64.powi(2)) / 4.0;
        assert!((s.sd.unwrap() - var.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn negative_weight_rejected() {
        let mut ds = data();
        ds.set("w", 1, Value::Float(-1.0)).unwrap();
        let err = summarize(&ds, &["price"], &SummarizeOptions::new().weight("w")).unwrap_err();
        assert_eq!(err, StatError::InvalidWeight { row: 1, value: -1.0 });
    }

    #[test]
    fn weight_must_exist_and_be_numeric() {
        let ds = data();
        let err = summarize(&ds, &[], &SummarizeOptions::new().weight("pop")).unwrap_err();
        assert!(matches!(err, StatError::UnknownColumn { .. }));
        let err = summarize(&ds, &[], &SummarizeOptions::new().weight("make")).unwrap_err();
        assert!(matches!(err, StatError::NonNumericColumn { .. }));
    }

    #[test]
    fn single_observation_has_no_sd() {
        let mut ds = Dataset::new();
        ds.add_values("x", ScalarType::Float, vec![3.5.into()]).unwrap();
        let s = &summarize(&ds, &[], &SummarizeOptions::new()).unwrap()[0];
        assert_eq!(s.n, 1);
        assert_eq!(s.mean, Some(3.5));
        assert_eq!(s.sd, None);
    }

    #[test]
    fn describe_reports_type_missing_and_median() {
        let rows = describe(&data(), &["price", "make"]).unwrap();
        let price = &rows[0];
        assert_eq!(price.scalar_type, ScalarType::Integer);
        assert_eq!(price.n, 3);
        assert_eq!(price.missing, 1);
        assert_eq!(price.median, Some(5000.0));

        let make = &rows[1];
        assert_eq!(make.scalar_type, ScalarType::String);
        assert_eq!(make.n, 0);
        assert_eq!(make.missing, 1);
        assert_eq!(make.mean, None);
        assert_eq!(make.max, None);
    }

    #[test]
    fn unknown_variable() {
        let err = describe(&data(), &["mpg"]).unwrap_err();
        assert!(matches!(err, StatError::UnknownColumn { .. }));
    }

    #[test]
    fn repeated_calls_agree() {
        let ds = data();
        assert_eq!(describe(&ds, &[]).unwrap(), describe(&ds, &[]).unwrap());
        let opts = SummarizeOptions::new().weight("w");
        assert_eq!(
            summarize(&ds, &[], &opts).unwrap(),
            summarize(&ds, &[], &opts).unwrap()
        );
    }
}
