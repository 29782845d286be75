//! Dense row-major matrix with the operations ordinary least squares needs.
//!
//! Only transpose, multiplication and Gauss-Jordan inversion with partial
//! pivoting are provided. Regression systems are small (one row and column
//! per regressor), so a plain `Vec<f64>` is the whole storage story.
//!
//! # Example
//!
//! ```
//! use u_statkit::matrix::Matrix;
//!
//! let a = Matrix::new(2, 2, vec![4.0, 7.0, 2.0, 6.0]).unwrap();
//! let inv = a.inverse().unwrap();
//! let id = a.matmul(&inv).unwrap();
//! assert!((id.get(0, 0) - 1.0).abs() < 1e-12);
//! assert!(id.get(0, 1).abs() < 1e-12);
//! ```

use log::trace;

use crate::error::{StatError, StatResult};

/// Default pivot tolerance, relative to the scale of the pivot's column.
pub const DEFAULT_PIVOT_TOLERANCE: f64 = 1e-10;

/// Dense `rows × cols` matrix stored row by row.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    /// Creates a matrix from row-major data.
    pub fn new(rows: usize, cols: usize, data: Vec<f64>) -> StatResult<Self> {
        if data.len() != rows * cols {
            return Err(StatError::LengthMismatch {
                expected: rows * cols,
                actual: data.len(),
            });
        }
        Ok(Self { rows, cols, data })
    }

    /// All-zero matrix.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// `n × n` identity.
    pub fn identity(n: usize) -> Self {
        let mut m = Self::zeros(n, n);
        for i in 0..n {
            m.data[i * n + i] = 1.0;
        }
        m
    }

    /// Builds a matrix from equally long rows.
    pub fn from_rows(rows: &[Vec<f64>]) -> StatResult<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            if row.len() != cols {
                return Err(StatError::LengthMismatch {
                    expected: cols,
                    actual: row.len(),
                });
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            data,
        })
    }

    /// Number of rows.
    #[inline]
    pub fn nrows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    #[inline]
    pub fn ncols(&self) -> usize {
        self.cols
    }

    /// Entry at `(r, c)`. Panics when out of bounds, like slice indexing.
    #[inline]
    pub fn get(&self, r: usize, c: usize) -> f64 {
        self.data[r * self.cols + c]
    }

    /// Overwrites the entry at `(r, c)`.
    #[inline]
    pub fn set(&mut self, r: usize, c: usize, value: f64) {
        self.data[r * self.cols + c] = value;
    }

    /// Row `r` as a slice.
    pub fn row(&self, r: usize) -> &[f64] {
        &self.data[r * self.cols..(r + 1) * self.cols]
    }

    /// Row-major entries.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Main diagonal.
    pub fn diagonal(&self) -> Vec<f64> {
        (0..self.rows.min(self.cols)).map(|i| self.get(i, i)).collect()
    }

    /// Returns `true` if every entry is finite.
    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }

    // ── Products ──────────────────────────────────────────────────────

    /// Transpose.
    pub fn transpose(&self) -> Self {
        let mut t = Self::zeros(self.cols, self.rows);
        for r in 0..self.rows {
            for c in 0..self.cols {
                t.data[c * self.rows + r] = self.data[r * self.cols + c];
            }
        }
        t
    }

    /// Matrix product `self · other`.
    pub fn matmul(&self, other: &Matrix) -> StatResult<Self> {
        if self.cols != other.rows {
            return Err(StatError::LengthMismatch {
                expected: self.cols,
                actual: other.rows,
            });
        }
        let mut out = Self::zeros(self.rows, other.cols);
        for i in 0..self.rows {
            for k in 0..self.cols {
                let a = self.data[i * self.cols + k];
                if a == 0.0 {
                    continue;
                }
                for j in 0..other.cols {
                    out.data[i * other.cols + j] += a * other.data[k * other.cols + j];
                }
            }
        }
        Ok(out)
    }

    /// `selfᵗ · self` without materialising the transpose.
    pub fn gram(&self) -> Self {
        let k = self.cols;
        let mut out = Self::zeros(k, k);
        for r in 0..self.rows {
            let row = self.row(r);
            for i in 0..k {
                for j in i..k {
                    out.data[i * k + j] += row[i] * row[j];
                }
            }
        }
        for i in 0..k {
            for j in 0..i {
                out.data[i * k + j] = out.data[j * k + i];
            }
        }
        out
    }

    /// Matrix-vector product.
    pub fn mul_vec(&self, v: &[f64]) -> StatResult<Vec<f64>> {
        if v.len() != self.cols {
            return Err(StatError::LengthMismatch {
                expected: self.cols,
                actual: v.len(),
            });
        }
        Ok((0..self.rows)
            .map(|r| self.row(r).iter().zip(v).map(|(a, b)| a * b).sum())
            .collect())
    }

    // ── Inversion ─────────────────────────────────────────────────────

    /// Inverse with the default relative pivot tolerance.
    pub fn inverse(&self) -> StatResult<Self> {
        self.inverse_with_tolerance(DEFAULT_PIVOT_TOLERANCE)
    }

    /// Gauss-Jordan inverse with partial pivoting.
    ///
    /// At each column the row with the largest absolute entry is swapped into
    /// the pivot position. A pivot whose magnitude is at most
    /// `tolerance × maxᵢ|aᵢⱼ|` (the largest entry of that column in the
    /// input) means the matrix is singular and yields
    /// [`StatError::SingularMatrix`] naming the column.
    pub fn inverse_with_tolerance(&self, tolerance: f64) -> StatResult<Self> {
        if self.rows != self.cols {
            return Err(StatError::LengthMismatch {
                expected: self.rows,
                actual: self.cols,
            });
        }
        let n = self.rows;
        let thresholds: Vec<f64> = (0..n)
            .map(|c| tolerance * (0..n).fold(0.0_f64, |m, r| m.max(self.get(r, c).abs())))
            .collect();
        let mut a = self.clone();
        let mut inv = Self::identity(n);

        for col in 0..n {
            let (pivot_row, pivot_abs) = (col..n)
                .map(|r| (r, a.get(r, col).abs()))
                .fold((col, -1.0), |best, cur| if cur.1 > best.1 { cur } else { best });
            trace!("gauss-jordan column {col}: pivot row {pivot_row}, |pivot| = {pivot_abs:e}");
            if pivot_abs <= thresholds[col] || pivot_abs == 0.0 {
                return Err(StatError::SingularMatrix { column: col });
            }
            if pivot_row != col {
                a.swap_rows(pivot_row, col);
                inv.swap_rows(pivot_row, col);
            }

            let pivot = a.get(col, col);
            for c in 0..n {
                a.data[col * n + c] /= pivot;
                inv.data[col * n + c] /= pivot;
            }

            for r in 0..n {
                if r == col {
                    continue;
                }
                let factor = a.get(r, col);
                if factor == 0.0 {
                    continue;
                }
                for c in 0..n {
                    a.data[r * n + c] -= factor * a.data[col * n + c];
                    inv.data[r * n + c] -= factor * inv.data[col * n + c];
                }
            }
        }

        if !inv.is_finite() {
            return Err(StatError::NumericalInstability {
                quantity: "matrix inverse",
            });
        }
        Ok(inv)
    }

    /// Inverse of a symmetric positive semi-definite matrix such as `XᵗX`.
    ///
    /// The matrix is first scaled to unit diagonal, `B = D·A·D` with
    /// `D = diag(1/√aⱼⱼ)`, so the pivot tolerance does not depend on the
    /// units of each variable. `A⁻¹ = D·B⁻¹·D`. A zero diagonal entry (an
    /// all-zero regressor) is [`StatError::SingularMatrix`].
    ///
    /// ```
    /// use u_statkit::matrix::Matrix;
    ///
    /// let a = Matrix::from_rows(&[vec![1e12, 0.0], vec![0.0, 1e-2]]).unwrap();
    /// let inv = a.inverse_symmetric(1e-10).unwrap();
    /// assert!((inv.get(0, 0) - 1e-12).abs() < 1e-24);
    /// assert!((inv.get(1, 1) - 100.0).abs() < 1e-9);
    /// ```
    pub fn inverse_symmetric(&self, tolerance: f64) -> StatResult<Self> {
        if self.rows != self.cols {
            return Err(StatError::LengthMismatch {
                expected: self.rows,
                actual: self.cols,
            });
        }
        let n = self.rows;
        let mut scale = Vec::with_capacity(n);
        for j in 0..n {
            let d = self.get(j, j);
            if !d.is_finite() {
                return Err(StatError::NumericalInstability {
                    quantity: "matrix diagonal",
                });
            }
            if d <= 0.0 {
                return Err(StatError::SingularMatrix { column: j });
            }
            scale.push(d.sqrt().recip());
        }

        let mut b = self.clone();
        b.rescale(&scale);
        let mut inv = b.inverse_with_tolerance(tolerance)?;
        inv.rescale(&scale);
        if !inv.is_finite() {
            return Err(StatError::NumericalInstability {
                quantity: "matrix inverse",
            });
        }
        Ok(inv)
    }

    /// `aᵢⱼ ← aᵢⱼ·sᵢ·sⱼ`
    fn rescale(&mut self, s: &[f64]) {
        for i in 0..self.rows {
            for j in 0..self.cols {
                self.data[i * self.cols + j] *= s[i] * s[j];
            }
        }
    }

    fn swap_rows(&mut self, a: usize, b: usize) {
        for c in 0..self.cols {
            self.data.swap(a * self.cols + c, b * self.cols + c);
        }
    }
}
