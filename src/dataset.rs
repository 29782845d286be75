//! Column-major dataset of named, typed variables.
//!
//! The [`Dataset`] stores data in column-major order. Every [`Column`] keeps
//! one slot per observation and a compact [`ValidityBitmap`] marking which
//! slots hold the missing sentinel. All mutating operations are atomic: they
//! either succeed completely or leave the dataset untouched.
//!
//! # Column Types
//!
//! | Type | Storage | Use case |
//! |------|---------|----------|
//! | [`Integer`](Column::Integer) | `Vec<i64>` + bitmap | Counts, codes, indicators |
//! | [`Float`](Column::Float) | `Vec<f64>` + bitmap | Continuous values |
//! | [`Text`](Column::Text) | `Vec<String>` + bitmap | Labels and free text |
//!
//! # Example
//!
//! ```
//! use u_statkit::dataset::{Column, Dataset, ValidityBitmap};
//! use u_statkit::types::Value;
//!
//! let mut ds = Dataset::new();
//! ds.add_column(
//!     "price",
//!     Column::float(vec![4099.0, 4749.0, 3799.0], ValidityBitmap::all_valid(3)),
//! ).unwrap();
//! assert_eq!(ds.n_obs(), 3);
//! assert_eq!(ds.get("price", 1).unwrap(), Value::Float(4749.0));
//! ```

use std::collections::{BTreeMap, HashMap};

use log::trace;

use crate::error::{StatError, StatResult};
use crate::types::{ScalarType, Value};

// ── ValidityBitmap ────────────────────────────────────────────────────

/// Bit-packed validity bitmap using `Vec<u64>`.
///
/// Each bit indicates whether the corresponding observation holds a value (1)
/// or the missing sentinel (0).
#[derive(Debug, Clone, PartialEq)]
pub struct ValidityBitmap {
    bits: Vec<u64>,
    len: usize,
}

impl ValidityBitmap {
    /// Creates a bitmap where all `len` positions are valid.
    pub fn all_valid(len: usize) -> Self {
        let n_words = len.div_ceil(64);
        let mut bits = vec![u64::MAX; n_words];
        let trailing = len % 64;
        if trailing != 0 && n_words > 0 {
            bits[n_words - 1] = (1u64 << trailing) - 1;
        }
        Self { bits, len }
    }

    /// Creates an empty bitmap with no positions.
    pub fn empty() -> Self {
        Self {
            bits: Vec::new(),
            len: 0,
        }
    }

    /// Builds a bitmap from per-position validity flags.
    pub fn from_flags<I: IntoIterator<Item = bool>>(flags: I) -> Self {
        let mut bm = Self::empty();
        for valid in flags {
            bm.push(valid);
        }
        bm
    }

    /// Returns `true` if the value at `idx` is present.
    #[inline]
    pub fn is_valid(&self, idx: usize) -> bool {
        debug_assert!(idx < self.len, "index {idx} out of bounds (len={})", self.len);
        let (word, bit) = (idx / 64, idx % 64);
        (self.bits[word] >> bit) & 1 == 1
    }

    /// Marks position `idx` as present.
    #[inline]
    pub fn set_valid(&mut self, idx: usize) {
        debug_assert!(idx < self.len, "index {idx} out of bounds (len={})", self.len);
        let (word, bit) = (idx / 64, idx % 64);
        self.bits[word] |= 1u64 << bit;
    }

    /// Marks position `idx` as missing.
    #[inline]
    pub fn set_invalid(&mut self, idx: usize) {
        debug_assert!(idx < self.len, "index {idx} out of bounds (len={})", self.len);
        let (word, bit) = (idx / 64, idx % 64);
        self.bits[word] &= !(1u64 << bit);
    }

    /// Appends a new position.
    pub fn push(&mut self, valid: bool) {
        let idx = self.len;
        self.len += 1;
        let (word, bit) = (idx / 64, idx % 64);
        if word >= self.bits.len() {
            self.bits.push(0);
        }
        if valid {
            self.bits[word] |= 1u64 << bit;
        }
    }

    /// Returns the total number of tracked positions.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the bitmap tracks zero positions.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Counts the missing positions.
    pub fn null_count(&self) -> usize {
        let valid_count: usize = self.bits.iter().map(|w| w.count_ones() as usize).sum();
        self.len - valid_count
    }

    /// Counts the present positions.
    pub fn valid_count(&self) -> usize {
        self.len - self.null_count()
    }

    /// Returns an iterator over indices of present positions.
    pub fn valid_indices(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len).filter(move |&i| self.is_valid(i))
    }

    fn gather(&self, indices: &[usize]) -> Self {
        Self::from_flags(indices.iter().map(|&i| self.is_valid(i)))
    }
}

// ── Column ────────────────────────────────────────────────────────────

/// A typed column with a validity bitmap for missing values.
///
/// Missing positions hold a placeholder (`0`, `0.0` or an empty string)
/// that is never observed through the public accessors.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    /// Integer values. Missing positions hold `0`.
    Integer {
        values: Vec<i64>,
        validity: ValidityBitmap,
    },
    /// Float values. Missing positions hold `0.0`.
    Float {
        values: Vec<f64>,
        validity: ValidityBitmap,
    },
    /// Text values. Missing positions hold an empty string.
    Text {
        values: Vec<String>,
        validity: ValidityBitmap,
    },
}

impl Column {
    /// Creates an integer column.
    pub fn integer(values: Vec<i64>, validity: ValidityBitmap) -> Self {
        Self::Integer { values, validity }
    }

    /// Creates a float column.
    pub fn float(values: Vec<f64>, validity: ValidityBitmap) -> Self {
        Self::Float { values, validity }
    }

    /// Creates a text column.
    pub fn text(values: Vec<String>, validity: ValidityBitmap) -> Self {
        Self::Text { values, validity }
    }

    /// Creates an empty column of the given type.
    pub fn empty(scalar_type: ScalarType) -> Self {
        match scalar_type {
            ScalarType::Integer => Self::integer(Vec::new(), ValidityBitmap::empty()),
            ScalarType::Float => Self::float(Vec::new(), ValidityBitmap::empty()),
            ScalarType::String => Self::text(Vec::new(), ValidityBitmap::empty()),
        }
    }

    /// Builds a column of `scalar_type` from values.
    ///
    /// Integers are widened into float columns; any other mismatch is a
    /// [`StatError::TypeMismatch`].
    pub fn from_values(scalar_type: ScalarType, values: &[Value]) -> StatResult<Self> {
        let mut col = Self::empty(scalar_type);
        for v in values {
            col.push_exact(v)?;
        }
        Ok(col)
    }

    /// Returns the storage type of this column.
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            Self::Integer { .. } => ScalarType::Integer,
            Self::Float { .. } => ScalarType::Float,
            Self::Text { .. } => ScalarType::String,
        }
    }

    /// Returns the number of observations in this column.
    pub fn len(&self) -> usize {
        self.validity().len()
    }

    /// Returns `true` if the column has no observations.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a reference to the validity bitmap.
    pub fn validity(&self) -> &ValidityBitmap {
        match self {
            Self::Integer { validity, .. }
            | Self::Float { validity, .. }
            | Self::Text { validity, .. } => validity,
        }
    }

    /// Returns the number of missing values.
    pub fn null_count(&self) -> usize {
        self.validity().null_count()
    }

    /// Returns the number of non-missing values.
    pub fn valid_count(&self) -> usize {
        self.validity().valid_count()
    }

    /// Returns `true` if the value at `idx` is not missing.
    pub fn is_valid(&self, idx: usize) -> bool {
        self.validity().is_valid(idx)
    }

    /// Returns the value at `idx`, or `None` when `idx` is out of range.
    pub fn value(&self, idx: usize) -> Option<Value> {
        if idx >= self.len() {
            return None;
        }
        if !self.is_valid(idx) {
            return Some(Value::Missing);
        }
        Some(match self {
            Self::Integer { values, .. } => Value::Int(values[idx]),
            Self::Float { values, .. } => Value::Float(values[idx]),
            Self::Text { values, .. } => Value::Str(values[idx].clone()),
        })
    }

    /// Numeric value at `idx`; `None` when missing, out of range, or text.
    pub fn numeric_at(&self, idx: usize) -> Option<f64> {
        if idx >= self.len() || !self.is_valid(idx) {
            return None;
        }
        match self {
            Self::Integer { values, .. } => Some(values[idx] as f64),
            Self::Float { values, .. } => Some(values[idx]),
            Self::Text { .. } => None,
        }
    }

    /// Returns non-missing numeric values as `f64`, or `None` for text columns.
    pub fn valid_numeric_values(&self) -> Option<Vec<f64>> {
        if !self.scalar_type().is_numeric() {
            return None;
        }
        Some(
            self.validity()
                .valid_indices()
                .filter_map(|i| self.numeric_at(i))
                .collect(),
        )
    }

    /// Iterates over all values in observation order.
    pub fn values(&self) -> impl Iterator<Item = Value> + '_ {
        (0..self.len()).filter_map(move |i| self.value(i))
    }

    /// Overwrites the value at `idx`.
    ///
    /// Writing a non-integral float into an integer column promotes the
    /// column to float. Text into a numeric column (or a number into a text
    /// column) is a [`StatError::TypeMismatch`].
    pub fn set(&mut self, idx: usize, value: Value) -> StatResult<()> {
        let len = self.len();
        if idx >= len {
            return Err(StatError::IndexOutOfRange { index: idx, len });
        }
        let value = self.widen(value);
        match (self, value) {
            (Self::Integer { validity, .. }, Value::Missing)
            | (Self::Float { validity, .. }, Value::Missing)
            | (Self::Text { validity, .. }, Value::Missing) => validity.set_invalid(idx),
            (Self::Integer { values, validity }, Value::Int(v)) => {
                values[idx] = v;
                validity.set_valid(idx);
            }
            (Self::Float { values, validity }, Value::Int(v)) => {
                values[idx] = v as f64;
                validity.set_valid(idx);
            }
            (Self::Float { values, validity }, Value::Float(v)) => {
                values[idx] = v;
                validity.set_valid(idx);
            }
            (Self::Text { values, validity }, Value::Str(s)) => {
                values[idx] = s;
                validity.set_valid(idx);
            }
            (col, value) => return Err(mismatch(col.scalar_type(), &value)),
        }
        Ok(())
    }

    /// Appends a value, promoting an integer column for non-integral floats.
    pub fn push(&mut self, value: Value) -> StatResult<()> {
        let value = self.widen(value);
        self.push_exact(&value)
    }

    /// Integral floats become integers; other floats promote an integer column.
    fn widen(&mut self, value: Value) -> Value {
        match (self.scalar_type(), value) {
            (ScalarType::Integer, Value::Float(v)) if is_integral(v) => Value::Int(v as i64),
            (ScalarType::Integer, Value::Float(v)) => {
                self.promote_to_float();
                Value::Float(v)
            }
            (_, value) => value,
        }
    }

    /// Converts an integer column to float in place.
    pub fn promote_to_float(&mut self) {
        if let Self::Integer { values, validity } = self {
            let values = values.iter().map(|&v| v as f64).collect();
            *self = Self::Float {
                values,
                validity: validity.clone(),
            };
        }
    }

    /// Returns a new column holding the observations at `indices`, in order.
    pub fn take(&self, indices: &[usize]) -> Self {
        match self {
            Self::Integer { values, validity } => Self::Integer {
                values: indices.iter().map(|&i| values[i]).collect(),
                validity: validity.gather(indices),
            },
            Self::Float { values, validity } => Self::Float {
                values: indices.iter().map(|&i| values[i]).collect(),
                validity: validity.gather(indices),
            },
            Self::Text { values, validity } => Self::Text {
                values: indices.iter().map(|&i| values[i].clone()).collect(),
                validity: validity.gather(indices),
            },
        }
    }

    fn push_exact(&mut self, value: &Value) -> StatResult<()> {
        match (self, value) {
            (Self::Integer { values, validity }, Value::Missing) => {
                values.push(0);
                validity.push(false);
            }
            (Self::Float { values, validity }, Value::Missing) => {
                values.push(0.0);
                validity.push(false);
            }
            (Self::Text { values, validity }, Value::Missing) => {
                values.push(String::new());
                validity.push(false);
            }
            (Self::Integer { values, validity }, Value::Int(v)) => {
                values.push(*v);
                validity.push(true);
            }
            (Self::Float { values, validity }, Value::Int(v)) => {
                values.push(*v as f64);
                validity.push(true);
            }
            (Self::Float { values, validity }, Value::Float(v)) => {
                values.push(*v);
                validity.push(true);
            }
            (Self::Text { values, validity }, Value::Str(s)) => {
                values.push(s.clone());
                validity.push(true);
            }
            (col, value) => return Err(mismatch(col.scalar_type(), value)),
        }
        Ok(())
    }
}

fn is_integral(v: f64) -> bool {
    v.fract() == 0.0 && v >= i64::MIN as f64 && v < i64::MAX as f64
}

fn mismatch(column_type: ScalarType, value: &Value) -> StatError {
    let value_type = value
        .scalar_type()
        .map_or_else(|| "missing".to_string(), |t| t.to_string());
    StatError::TypeMismatch {
        message: format!("cannot store {value_type} value in {column_type} column"),
    }
}

// ── Equality index ────────────────────────────────────────────────────

/// Ordering wrapper so values can key a `BTreeMap`.
#[derive(Debug, Clone)]
pub(crate) struct IndexKey(pub(crate) Value);

impl PartialEq for IndexKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0).is_eq()
    }
}

impl Eq for IndexKey {}

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IndexKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Ordered value → observation-indices map for one column.
#[derive(Debug, Clone, Default)]
struct EqualityIndex {
    entries: BTreeMap<IndexKey, Vec<usize>>,
}

impl EqualityIndex {
    fn build(column: &Column) -> Self {
        let mut entries: BTreeMap<IndexKey, Vec<usize>> = BTreeMap::new();
        for (i, v) in column.values().enumerate() {
            entries.entry(IndexKey(v)).or_default().push(i);
        }
        Self { entries }
    }

    fn search(&self, value: &Value) -> Vec<usize> {
        self.entries
            .get(&IndexKey(value.clone()))
            .cloned()
            .unwrap_or_default()
    }
}

// ── Snapshot ──────────────────────────────────────────────────────────

/// A full value copy of a dataset, used for undo.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    names: Vec<String>,
    columns: Vec<Column>,
    n_obs: usize,
}

impl Snapshot {
    /// Number of observations captured.
    pub fn n_obs(&self) -> usize {
        self.n_obs
    }

    /// Variable names captured, in order.
    pub fn column_names(&self) -> &[String] {
        &self.names
    }
}

// ── Dataset ───────────────────────────────────────────────────────────

/// Column-major table of named variables sharing one observation count.
///
/// Invariants: every column has exactly [`n_obs`](Dataset::n_obs) slots,
/// column names are unique, and observation `i` is the same logical row in
/// every column.
///
/// ```
/// use u_statkit::dataset::Dataset;
/// use u_statkit::types::{ScalarType, Value};
///
/// let mut ds = Dataset::new();
/// ds.add_values("foreign", ScalarType::Integer, vec![0.into(), 1.into()]).unwrap();
/// ds.add_values("make", ScalarType::String, vec!["AMC".into(), "Audi".into()]).unwrap();
/// assert_eq!(ds.column_names(), &["foreign", "make"]);
/// assert!(ds.add_values("make", ScalarType::String, vec![]).is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    names: Vec<String>,
    columns: Vec<Column>,
    n_obs: usize,
    indexes: HashMap<String, EqualityIndex>,
}

impl PartialEq for Dataset {
    fn eq(&self, other: &Self) -> bool {
        self.names == other.names && self.columns == other.columns && self.n_obs == other.n_obs
    }
}

impl Dataset {
    /// Creates an empty dataset with no variables or observations.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a named column.
    ///
    /// The first column fixes the observation count; later columns must
    /// match it.
    pub fn add_column(&mut self, name: impl Into<String>, column: Column) -> StatResult<()> {
        let name = name.into();
        if self.column_index(&name).is_some() {
            return Err(StatError::DuplicateColumn { name });
        }
        let col_len = column.len();
        if self.columns.is_empty() {
            self.n_obs = col_len;
        } else if col_len != self.n_obs {
            return Err(StatError::LengthMismatch {
                expected: self.n_obs,
                actual: col_len,
            });
        }
        self.names.push(name);
        self.columns.push(column);
        Ok(())
    }

    /// Adds a column of `scalar_type` built from `values`.
    pub fn add_values(
        &mut self,
        name: impl Into<String>,
        scalar_type: ScalarType,
        values: Vec<Value>,
    ) -> StatResult<()> {
        let name = name.into();
        if self.column_index(&name).is_some() {
            return Err(StatError::DuplicateColumn { name });
        }
        let column = Column::from_values(scalar_type, &values)?;
        self.add_column(name, column)
    }

    /// Removes a column.
    pub fn drop_column(&mut self, name: &str) -> StatResult<Column> {
        let idx = self.require_index(name)?;
        self.names.remove(idx);
        self.indexes.remove(name);
        let column = self.columns.remove(idx);
        if self.columns.is_empty() {
            self.n_obs = 0;
        }
        Ok(column)
    }

    /// Renames a column, keeping its position.
    pub fn rename_column(&mut self, old: &str, new: &str) -> StatResult<()> {
        let idx = self.require_index(old)?;
        if old != new && self.column_index(new).is_some() {
            return Err(StatError::DuplicateColumn {
                name: new.to_string(),
            });
        }
        self.names[idx] = new.to_string();
        self.indexes.clear();
        Ok(())
    }

    /// Swaps in a replacement for an existing column of the same length.
    pub(crate) fn replace_column(&mut self, name: &str, column: Column) -> StatResult<()> {
        let idx = self.require_index(name)?;
        if column.len() != self.n_obs {
            return Err(StatError::LengthMismatch {
                expected: self.n_obs,
                actual: column.len(),
            });
        }
        self.columns[idx] = column;
        self.indexes.remove(name);
        Ok(())
    }

    /// Returns a new dataset holding only the observations where `mask` is `true`.
    ///
    /// Column order and types are preserved.
    pub fn select_rows(&self, mask: &[bool]) -> StatResult<Dataset> {
        if mask.len() != self.n_obs {
            return Err(StatError::LengthMismatch {
                expected: self.n_obs,
                actual: mask.len(),
            });
        }
        let keep: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(i, &m)| m.then_some(i))
            .collect();
        Ok(self.gather(&keep))
    }

    /// Returns the value of `name` at observation `index`.
    pub fn get(&self, name: &str, index: usize) -> StatResult<Value> {
        let col = self.require(name)?;
        col.value(index).ok_or(StatError::IndexOutOfRange {
            index,
            len: self.n_obs,
        })
    }

    /// Overwrites the value of `name` at observation `index`.
    pub fn set(&mut self, name: &str, index: usize, value: Value) -> StatResult<()> {
        let idx = self.require_index(name)?;
        self.columns[idx].set(index, value)?;
        self.indexes.remove(name);
        Ok(())
    }

    /// Appends one observation.
    ///
    /// Variables not named in `row` receive the missing sentinel.
    pub fn push_row(&mut self, row: &[(&str, Value)]) -> StatResult<()> {
        for (name, _) in row {
            self.require_index(name)?;
        }
        let mut columns = self.columns.clone();
        for (name, col) in self.names.iter().zip(columns.iter_mut()) {
            let value = row
                .iter()
                .rev()
                .find(|(n, _)| n == name)
                .map_or(Value::Missing, |(_, v)| v.clone());
            col.push(value)?;
        }
        self.columns = columns;
        self.n_obs += 1;
        self.indexes.clear();
        Ok(())
    }

    /// Removes observation `index` from every column.
    pub fn remove_row(&mut self, index: usize) -> StatResult<()> {
        if index >= self.n_obs {
            return Err(StatError::IndexOutOfRange {
                index,
                len: self.n_obs,
            });
        }
        let keep: Vec<usize> = (0..self.n_obs).filter(|&i| i != index).collect();
        *self = self.gather(&keep);
        Ok(())
    }

    /// Stable sort of all observations by one variable.
    ///
    /// Missing values sort last in both directions.
    pub fn sort_by(&mut self, name: &str, descending: bool) -> StatResult<()> {
        let col = self.require(name)?;
        let keys: Vec<Value> = col.values().collect();
        let mut order: Vec<usize> = (0..self.n_obs).collect();
        order.sort_by(|&a, &b| {
            let (ka, kb) = (&keys[a], &keys[b]);
            match (ka.is_missing(), kb.is_missing(), descending) {
                (false, false, true) => kb.total_cmp(ka),
                _ => ka.total_cmp(kb),
            }
        });
        *self = self.gather(&order);
        Ok(())
    }

    /// Returns the observations where `name` equals `value`.
    ///
    /// An ordered index is built on first use and dropped by any mutation
    /// of the column.
    pub fn lookup(&mut self, name: &str, value: &Value) -> StatResult<Vec<usize>> {
        let idx = self.require_index(name)?;
        if !self.indexes.contains_key(name) {
            trace!("building equality index for '{name}'");
            let index = EqualityIndex::build(&self.columns[idx]);
            self.indexes.insert(name.to_string(), index);
        }
        Ok(self
            .indexes
            .get(name)
            .map(|index| index.search(value))
            .unwrap_or_default())
    }

    /// Takes a full value copy of the dataset.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            names: self.names.clone(),
            columns: self.columns.clone(),
            n_obs: self.n_obs,
        }
    }

    /// Replaces the dataset's contents with a snapshot.
    pub fn restore(&mut self, snapshot: Snapshot) {
        self.names = snapshot.names;
        self.columns = snapshot.columns;
        self.n_obs = snapshot.n_obs;
        self.indexes.clear();
    }

    /// Returns the number of observations.
    #[inline]
    pub fn n_obs(&self) -> usize {
        self.n_obs
    }

    /// Returns the number of variables.
    #[inline]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Returns `true` if the dataset has no variables.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Returns variable names in order.
    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    /// Returns a reference to the column at position `index`.
    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    /// Returns a reference to the column with the given `name`.
    pub fn column_by_name(&self, name: &str) -> Option<&Column> {
        self.column_index(name).map(|i| &self.columns[i])
    }

    /// Returns the position of the column with the given `name`.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Returns an iterator over (name, column) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.names.iter().map(|s| s.as_str()).zip(self.columns.iter())
    }

    /// Returns the storage type of each variable.
    pub fn schema(&self) -> Vec<(&str, ScalarType)> {
        self.iter().map(|(n, c)| (n, c.scalar_type())).collect()
    }

    /// Returns all values of observation `index`, in column order.
    pub fn row(&self, index: usize) -> StatResult<Vec<Value>> {
        if index >= self.n_obs {
            return Err(StatError::IndexOutOfRange {
                index,
                len: self.n_obs,
            });
        }
        Ok(self
            .columns
            .iter()
            .map(|c| c.value(index).unwrap_or(Value::Missing))
            .collect())
    }

    /// Iterates over observations as value rows.
    pub fn rows(&self) -> impl Iterator<Item = Vec<Value>> + '_ {
        (0..self.n_obs).map(move |i| {
            self.columns
                .iter()
                .map(|c| c.value(i).unwrap_or(Value::Missing))
                .collect()
        })
    }

    /// Returns the column named `name` or [`StatError::UnknownColumn`].
    pub fn require(&self, name: &str) -> StatResult<&Column> {
        self.column_by_name(name)
            .ok_or_else(|| StatError::UnknownColumn {
                name: name.to_string(),
            })
    }

    fn require_index(&self, name: &str) -> StatResult<usize> {
        self.column_index(name).ok_or_else(|| StatError::UnknownColumn {
            name: name.to_string(),
        })
    }

    fn gather(&self, indices: &[usize]) -> Dataset {
        Dataset {
            names: self.names.clone(),
            columns: self.columns.iter().map(|c| c.take(indices)).collect(),
            n_obs: indices.len(),
            indexes: HashMap::new(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn auto() -> Dataset {
        let mut ds = Dataset::new();
        ds.add_values(
            "price",
            ScalarType::Integer,
            vec![4099.into(), 4749.into(), 3799.into(), 4816.into()],
        )
        .unwrap();
        ds.add_values(
            "foreign",
            ScalarType::Integer,
            vec![0.into(), 1.into(), 1.into(), 0.into()],
        )
        .unwrap();
        ds.add_values(
            "make",
            ScalarType::String,
            vec!["AMC".into(), "Audi".into(), "BMW".into(), "Buick".into()],
        )
        .unwrap();
        ds
    }

    // ── ValidityBitmap tests ──────────────────────────────────────

    #[test]
    fn bitmap_all_valid() {
        let bm = ValidityBitmap::all_valid(100);
        assert_eq!(bm.len(), 100);
        assert_eq!(bm.null_count(), 0);
        assert!((0..100).all(|i| bm.is_valid(i)));
    }

    #[test]
    fn bitmap_boundary_64() {
        let bm65 = ValidityBitmap::all_valid(65);
        assert_eq!(bm65.bits.len(), 2);
        assert_eq!(bm65.null_count(), 0);
        assert!(bm65.is_valid(64));
    }

    #[test]
    fn bitmap_push_and_indices() {
        let bm = ValidityBitmap::from_flags((0..130).map(|i| i % 3 != 0));
        assert_eq!(bm.len(), 130);
        assert_eq!(bm.null_count(), (0..130).filter(|i| i % 3 == 0).count());
        assert_eq!(bm.valid_indices().take(3).collect::<Vec<_>>(), vec![1, 2, 4]);
    }

    // ── Column tests ─────────────────────────────────────────────

    #[test]
    fn column_values_with_missing() {
        let col = Column::from_values(
            ScalarType::Float,
            &[Value::Float(1.5), Value::Missing, Value::Int(3)],
        )
        .unwrap();
        assert_eq!(col.scalar_type(), ScalarType::Float);
        assert_eq!(col.null_count(), 1);
        assert_eq!(col.value(1), Some(Value::Missing));
        assert_eq!(col.value(2), Some(Value::Float(3.0)));
        assert_eq!(col.value(3), None);
        assert_eq!(col.valid_numeric_values(), Some(vec![1.5, 3.0]));
    }

    #[test]
    fn column_rejects_text_in_numeric() {
        let err = Column::from_values(ScalarType::Integer, &[Value::Str("x".into())]);
        assert!(matches!(err, Err(StatError::TypeMismatch { .. })));
    }

    #[test]
    fn set_promotes_integer_column() {
        let mut col = Column::from_values(ScalarType::Integer, &[1.into(), 2.into()]).unwrap();
        col.set(0, Value::Float(4.0)).unwrap();
        assert_eq!(col.scalar_type(), ScalarType::Integer);
        assert_eq!(col.value(0), Some(Value::Int(4)));

        col.set(1, Value::Float(2.5)).unwrap();
        assert_eq!(col.scalar_type(), ScalarType::Float);
        assert_eq!(col.value(0), Some(Value::Float(4.0)));
        assert_eq!(col.value(1), Some(Value::Float(2.5)));
    }

    #[test]
    fn set_two_pow_63_promotes() {
        let big = 2f64.powi(63);
        let mut col = Column::from_values(ScalarType::Integer, &[1.into()]).unwrap();
        col.set(0, Value::Float(big)).unwrap();
        assert_eq!(col.scalar_type(), ScalarType::Float);
        assert_eq!(col.value(0), Some(Value::Float(9_223_372_036_854_775_808.0)));
    }

    #[test]
    fn set_missing_and_back() {
        let mut col = Column::from_values(ScalarType::String, &["a".into()]).unwrap();
        col.set(0, Value::Missing).unwrap();
        assert_eq!(col.value(0), Some(Value::Missing));
        col.set(0, "b".into()).unwrap();
        assert_eq!(col.value(0), Some(Value::Str("b".into())));
        assert!(col.set(0, Value::Int(1)).is_err());
    }

    // ── Dataset tests ────────────────────────────────────────────

    #[test]
    fn empty_dataset() {
        let ds = Dataset::new();
        assert_eq!(ds.n_obs(), 0);
        assert!(ds.is_empty());
    }

    #[test]
    fn duplicate_and_length_checks() {
        let mut ds = auto();
        let err = ds
            .add_values("price", ScalarType::Integer, vec![1.into(); 4])
            .unwrap_err();
        assert!(matches!(err, StatError::DuplicateColumn { .. }));

        let err = ds
            .add_values("mpg", ScalarType::Integer, vec![1.into(); 3])
            .unwrap_err();
        assert_eq!(
            err,
            StatError::LengthMismatch {
                expected: 4,
                actual: 3
            }
        );
        assert_eq!(ds.column_count(), 3);
    }

    #[test]
    fn first_column_sets_row_count() {
        let mut ds = Dataset::new();
        ds.add_values("x", ScalarType::Float, vec![]).unwrap();
        assert_eq!(ds.n_obs(), 0);
        assert!(ds.add_values("y", ScalarType::Float, vec![1.0.into()]).is_err());
    }

    #[test]
    fn drop_and_rename() {
        let mut ds = auto();
        assert!(matches!(
            ds.drop_column("mpg"),
            Err(StatError::UnknownColumn { .. })
        ));
        ds.drop_column("foreign").unwrap();
        assert_eq!(ds.column_names(), &["price", "make"]);

        ds.rename_column("make", "model").unwrap();
        assert_eq!(ds.column_names(), &["price", "model"]);
        assert!(ds.rename_column("model", "price").is_err());
    }

    #[test]
    fn select_rows_keeps_order() {
        let ds = auto();
        let sub = ds.select_rows(&[false, true, true, false]).unwrap();
        assert_eq!(sub.n_obs(), 2);
        assert_eq!(sub.get("make", 0).unwrap(), Value::Str("Audi".into()));
        assert_eq!(sub.get("make", 1).unwrap(), Value::Str("BMW".into()));
        assert_eq!(sub.schema(), ds.schema());
        assert!(matches!(
            ds.select_rows(&[true]),
            Err(StatError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn point_access_errors() {
        let mut ds = auto();
        assert!(matches!(
            ds.get("mpg", 0),
            Err(StatError::UnknownColumn { .. })
        ));
        assert!(matches!(
            ds.get("price", 9),
            Err(StatError::IndexOutOfRange { index: 9, len: 4 })
        ));
        assert!(matches!(
            ds.set("price", 9, Value::Int(1)),
            Err(StatError::IndexOutOfRange { .. })
        ));
        ds.set("price", 0, Value::Int(5000)).unwrap();
        assert_eq!(ds.get("price", 0).unwrap(), Value::Int(5000));
    }

    #[test]
    fn snapshot_restore_round_trip() {
        let mut ds = auto();
        let snap = ds.snapshot();
        ds.drop_column("make").unwrap();
        ds.remove_row(0).unwrap();
        ds.restore(snap);
        assert_eq!(ds, auto());
        assert_eq!(ds.column_names(), &["price", "foreign", "make"]);
    }

    #[test]
    fn push_and_remove_rows() {
        let mut ds = auto();
        ds.push_row(&[("price", Value::Int(6000)), ("make", "Fiat".into())])
            .unwrap();
        assert_eq!(ds.n_obs(), 5);
        assert_eq!(ds.get("foreign", 4).unwrap(), Value::Missing);

        let before = ds.clone();
        assert!(ds.push_row(&[("price", "oops".into())]).is_err());
        assert!(ds.push_row(&[("mpg", Value::Int(1))]).is_err());
        assert_eq!(ds, before);

        ds.remove_row(0).unwrap();
        assert_eq!(ds.n_obs(), 4);
        assert_eq!(ds.get("make", 0).unwrap(), Value::Str("Audi".into()));
        assert!(ds.remove_row(10).is_err());
    }

    #[test]
    fn sort_descending_missing_last() {
        let mut ds = auto();
        ds.set("price", 2, Value::Missing).unwrap();
        ds.sort_by("price", true).unwrap();
        let prices: Vec<Value> = ds.column_by_name("price").unwrap().values().collect();
        assert_eq!(
            prices,
            vec![4816.into(), 4749.into(), 4099.into(), Value::Missing]
        );
        assert_eq!(ds.get("make", 0).unwrap(), Value::Str("Buick".into()));
    }

    #[test]
    fn lookup_uses_fresh_index() {
        let mut ds = auto();
        assert_eq!(ds.lookup("foreign", &Value::Int(1)).unwrap(), vec![1, 2]);
        assert_eq!(ds.lookup("foreign", &Value::Float(0.0)).unwrap(), vec![0, 3]);
        ds.set("foreign", 0, Value::Int(1)).unwrap();
        assert_eq!(ds.lookup("foreign", &Value::Int(1)).unwrap(), vec![0, 1, 2]);
        assert!(ds.lookup("make", &"Zed".into()).unwrap().is_empty());
    }

    #[test]
    fn rows_view() {
        let ds = auto();
        let rows: Vec<Vec<Value>> = ds.rows().collect();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[1], ds.row(1).unwrap());
        assert_eq!(rows[1][2], Value::Str("Audi".into()));
    }
}
