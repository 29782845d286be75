//! Ordinary least squares regression.
//!
//! Fits `y = Xβ + ε` with an intercept column prepended to the requested
//! regressors, using the normal equations:
//!
//! ```text
//! β     = (XᵗX)⁻¹ Xᵗy
//! σ²    = eᵗe / (n − k)
//! Var β = σ² (XᵗX)⁻¹
//! ```
//!
//! The inverse comes from [`Matrix::inverse_symmetric`], which scales `XᵗX`
//! to unit diagonal first so regressors measured in very different units
//! share one tolerance. Collinear regressors surface as
//! [`StatError::SingularMatrix`]. Observations with a
//! missing value in any involved variable are excluded (listwise deletion).
//!
//! # Example
//!
//! ```
//! use u_statkit::dataset::Dataset;
//! use u_statkit::regression::{regress, RegressConfig};
//! use u_statkit::types::ScalarType;
//!
//! let mut ds = Dataset::new();
//! ds.add_values("x", ScalarType::Integer, vec![1.into(), 2.into(), 3.into(), 4.into()]).unwrap();
//! ds.add_values("y", ScalarType::Integer, vec![5.into(), 8.into(), 11.into(), 14.into()]).unwrap();
//!
//! let fit = regress(&ds, "y", &["x"], None, &RegressConfig::default()).unwrap();
//! assert!((fit.coefficients[0] - 2.0).abs() < 1e-9);
//! assert!((fit.coefficients[1] - 3.0).abs() < 1e-9);
//! assert!((fit.r_squared - 1.0).abs() < 1e-9);
//! ```

use log::debug;

use crate::dataset::{Column, Dataset};
use crate::error::{StatError, StatResult};
use crate::expr::Expression;
use crate::matrix::{Matrix, DEFAULT_PIVOT_TOLERANCE};
use crate::types::{ScalarType, Value};

/// Name reported for the intercept term.
pub const INTERCEPT: &str = "_cons";

// ── Configuration ─────────────────────────────────────────────────────

/// Numerical settings for [`regress`].
#[derive(Debug, Clone, PartialEq)]
pub struct RegressConfig {
    pivot_tolerance: f64,
    conf_level: f64,
}

impl Default for RegressConfig {
    fn default() -> Self {
        Self {
            pivot_tolerance: DEFAULT_PIVOT_TOLERANCE,
            conf_level: 0.95,
        }
    }
}

impl RegressConfig {
    /// Default settings: pivot tolerance `1e-10`, 95% intervals.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pivot magnitude, relative to the equilibrated `XᵗX`, at or below which
    /// the regressors are treated as collinear.
    pub fn pivot_tolerance(mut self, tolerance: f64) -> Self {
        self.pivot_tolerance = tolerance;
        self
    }

    /// Coverage of the coefficient confidence intervals, in `(0, 1)`.
    pub fn conf_level(mut self, level: f64) -> Self {
        self.conf_level = level;
        self
    }
}

// ── Result ────────────────────────────────────────────────────────────

/// Fitted OLS model.
///
/// Per-term vectors are ordered intercept first, then the regressors in the
/// order they were requested.
#[derive(Debug, Clone, PartialEq)]
pub struct RegressionResult {
    pub depvar: String,
    pub indepvars: Vec<String>,
    pub coefficients: Vec<f64>,
    pub std_errors: Vec<f64>,
    /// `β / SE`; `None` where the standard error is exactly zero.
    pub t_stats: Vec<Option<f64>>,
    /// `(lower, upper)` bounds at [`conf_level`](Self::conf_level).
    pub conf_intervals: Vec<(f64, f64)>,
    pub conf_level: f64,
    pub r_squared: f64,
    pub adj_r_squared: f64,
    /// Model F statistic; `None` without regressors or for a perfect fit.
    pub f_stat: Option<f64>,
    /// Residual sum of squares `eᵗe`.
    pub rss: f64,
    /// Total sum of squares about the mean of `y`.
    pub tss: f64,
    /// Root mean squared error `σ`.
    pub root_mse: f64,
    pub n_obs: usize,
    pub df_model: usize,
    pub df_resid: usize,
}

impl RegressionResult {
    /// Term names: `_cons` followed by the regressors.
    pub fn terms(&self) -> Vec<&str> {
        std::iter::once(INTERCEPT)
            .chain(self.indepvars.iter().map(String::as_str))
            .collect()
    }

    /// Coefficient for a term name (`_cons` for the intercept).
    pub fn coefficient(&self, term: &str) -> Option<f64> {
        self.terms()
            .iter()
            .position(|t| *t == term)
            .map(|i| self.coefficients[i])
    }

    /// Linear prediction for one set of regressor values.
    pub fn predict_one(&self, x: &[f64]) -> Option<f64> {
        if x.len() != self.indepvars.len() {
            return None;
        }
        Some(
            self.coefficients[0]
                + self.coefficients[1..]
                    .iter()
                    .zip(x)
                    .map(|(b, v)| b * v)
                    .sum::<f64>(),
        )
    }
}

// ── Estimation ────────────────────────────────────────────────────────

/// Regresses `depvar` on `indepvars` plus an intercept.
///
/// `filter`, when given, further restricts the estimation sample to
/// observations where it evaluates true.
pub fn regress(
    dataset: &Dataset,
    depvar: &str,
    indepvars: &[&str],
    filter: Option<&Expression>,
    config: &RegressConfig,
) -> StatResult<RegressionResult> {
    for name in std::iter::once(&depvar).chain(indepvars) {
        require_numeric(dataset, name)?;
    }

    let rows = estimation_sample(dataset, depvar, indepvars, filter)?;
    let n = rows.len();
    let k = indepvars.len() + 1;
    if n <= k {
        return Err(StatError::InsufficientData {
            observations: n,
            parameters: k,
        });
    }

    let y_col = dataset.require(depvar)?;
    let x_cols = indepvars
        .iter()
        .map(|v| dataset.require(v))
        .collect::<StatResult<Vec<&Column>>>()?;

    let y: Vec<f64> = rows.iter().map(|&r| y_col.numeric_at(r).unwrap_or(f64::NAN)).collect();
    let mut design = Vec::with_capacity(n * k);
    for &r in &rows {
        design.push(1.0);
        design.extend(x_cols.iter().map(|c| c.numeric_at(r).unwrap_or(f64::NAN)));
    }
    let x = Matrix::new(n, k, design)?;
    if !x.is_finite() || y.iter().any(|v| !v.is_finite()) {
        return Err(StatError::NumericalInstability {
            quantity: "design matrix",
        });
    }

    let xtx_inv = x.gram().inverse_symmetric(config.pivot_tolerance)?;
    let xty = x.transpose().mul_vec(&y)?;
    let beta = xtx_inv.mul_vec(&xty)?;
    if beta.iter().any(|b| !b.is_finite()) {
        return Err(StatError::NumericalInstability {
            quantity: "coefficients",
        });
    }

    let fitted = x.mul_vec(&beta)?;
    let rss: f64 = y.iter().zip(&fitted).map(|(yi, fi)| (yi - fi).powi(2)).sum();
    let y_mean = y.iter().sum::<f64>() / n as f64;
    let tss: f64 = y.iter().map(|yi| (yi - y_mean).powi(2)).sum();

    let df_resid = n - k;
    let df_model = k - 1;
    let sigma2 = rss / df_resid as f64;

    let std_errors: Vec<f64> = xtx_inv
        .diagonal()
        .iter()
        .map(|d| (sigma2 * d).max(0.0).sqrt())
        .collect();
    if std_errors.iter().any(|s| !s.is_finite()) {
        return Err(StatError::NumericalInstability {
            quantity: "standard errors",
        });
    }
    let t_stats = beta
        .iter()
        .zip(&std_errors)
        .map(|(b, se)| (*se > 0.0).then(|| b / se))
        .collect();

    let q = u_numflow::special::t_distribution_quantile(
        1.0 - (1.0 - config.conf_level) / 2.0,
        df_resid as f64,
    );
    if !q.is_finite() {
        return Err(StatError::NumericalInstability {
            quantity: "t quantile",
        });
    }
    let conf_intervals = beta
        .iter()
        .zip(&std_errors)
        .map(|(b, se)| (b - q * se, b + q * se))
        .collect();

    let r_squared = if tss > 0.0 { 1.0 - rss / tss } else { 0.0 };
    let adj_r_squared = 1.0 - (1.0 - r_squared) * (n - 1) as f64 / df_resid as f64;
    let f_stat = (df_model > 0 && rss > 0.0 && tss > 0.0)
        .then(|| ((tss - rss) / df_model as f64) / sigma2)
        .filter(|f| f.is_finite());

    debug!(
        "regress {depvar} on {}: n = {n}, R² = {r_squared:.4}",
        indepvars.join(" ")
    );

    Ok(RegressionResult {
        depvar: depvar.to_string(),
        indepvars: indepvars.iter().map(|s| s.to_string()).collect(),
        coefficients: beta,
        std_errors,
        t_stats,
        conf_intervals,
        conf_level: config.conf_level,
        r_squared,
        adj_r_squared,
        f_stat,
        rss,
        tss,
        root_mse: sigma2.sqrt(),
        n_obs: n,
        df_model,
        df_resid,
    })
}

fn require_numeric(dataset: &Dataset, name: &str) -> StatResult<()> {
    if dataset.require(name)?.scalar_type().is_numeric() {
        Ok(())
    } else {
        Err(StatError::NonNumericColumn {
            name: name.to_string(),
        })
    }
}

/// Observations where every involved variable is present and `filter` holds.
fn estimation_sample(
    dataset: &Dataset,
    depvar: &str,
    indepvars: &[&str],
    filter: Option<&Expression>,
) -> StatResult<Vec<usize>> {
    let mut keep = match filter {
        Some(f) => f.mask(dataset)?,
        None => vec![true; dataset.n_obs()],
    };
    for name in std::iter::once(&depvar).chain(indepvars) {
        let values = Expression::variable(name).evaluate_all(dataset)?;
        for (k, v) in keep.iter_mut().zip(&values) {
            *k &= !v.is_missing();
        }
    }
    Ok(keep
        .iter()
        .enumerate()
        .filter_map(|(i, &k)| k.then_some(i))
        .collect())
}

// ── Prediction ────────────────────────────────────────────────────────

/// What [`predict`] writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictKind {
    /// Linear prediction `xβ`.
    Fitted,
    /// `y − xβ`.
    Residuals,
}

/// Adds a float variable `name` holding fitted values or residuals.
///
/// Every observation gets a value when its regressors (and, for residuals,
/// the dependent variable) are present; the rest get missing.
pub fn predict(
    dataset: &mut Dataset,
    result: &RegressionResult,
    name: &str,
    kind: PredictKind,
) -> StatResult<()> {
    if dataset.column_index(name).is_some() {
        return Err(StatError::DuplicateColumn {
            name: name.to_string(),
        });
    }
    let x_cols = result
        .indepvars
        .iter()
        .map(|v| dataset.require(v))
        .collect::<StatResult<Vec<&Column>>>()?;
    let y_col = match kind {
        PredictKind::Fitted => None,
        PredictKind::Residuals => Some(dataset.require(&result.depvar)?),
    };

    let values: Vec<Value> = (0..dataset.n_obs())
        .map(|row| {
            let x: Option<Vec<f64>> = x_cols.iter().map(|c| c.numeric_at(row)).collect();
            let fitted = x.and_then(|x| result.predict_one(&x));
            let out = match y_col {
                None => fitted,
                Some(y) => fitted.zip(y.numeric_at(row)).map(|(f, obs)| obs - f),
            };
            Value::from(out)
        })
        .collect();

    let column = Column::from_values(ScalarType::Float, &values)?;
    dataset.add_column(name, column)?;
    debug!("predict {name}: {} observations", dataset.n_obs());
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────
