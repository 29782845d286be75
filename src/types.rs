//! Scalar values and per-column type inference.
//!
//! Raw text tokens are classified column-globally: a column is
//! [`Integer`](ScalarType::Integer) when every non-missing token parses as
//! an `i64`, [`Float`](ScalarType::Float) when every non-missing token
//! parses as a finite `f64`, and [`String`](ScalarType::String) otherwise.
//! Missing markers never force a string column.
//!
//! # Example
//!
//! ```
//! use u_statkit::types::{infer_column, ScalarType, Value};
//!
//! let col = infer_column(&["", "2", "3"]);
//! assert_eq!(col.scalar_type, ScalarType::Integer);
//! assert_eq!(col.values[0], Value::Missing);
//! assert_eq!(col.values[1], Value::Int(2));
//! ```

use std::cmp::Ordering;
use std::fmt;

use crate::error::{StatError, StatResult};

/// Missing-value markers recognized by default.
const DEFAULT_MISSING_MARKERS: &[&str] = &["", ".", "NA"];

// ── ScalarType ────────────────────────────────────────────────────────

/// Storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    /// 64-bit signed integers.
    Integer,
    /// 64-bit floats.
    Float,
    /// Free-form text.
    String,
}

impl ScalarType {
    /// Returns `true` for integer and float columns.
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Integer | Self::Float)
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => write!(f, "int"),
            Self::Float => write!(f, "float"),
            Self::String => write!(f, "str"),
        }
    }
}

// ── Value ─────────────────────────────────────────────────────────────

/// A single observation's value. [`Value::Missing`] is the missing sentinel.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// No data.
    Missing,
    /// Integer value.
    Int(i64),
    /// Floating-point value.
    Float(f64),
    /// Text value.
    Str(String),
}

impl Value {
    /// Returns `true` for the missing sentinel.
    #[inline]
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    /// Numeric value as `f64`, or `None` for missing and text.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Missing | Self::Str(_) => None,
        }
    }

    /// Text value, or `None` for anything else.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Type of a non-missing value.
    pub fn scalar_type(&self) -> Option<ScalarType> {
        match self {
            Self::Missing => None,
            Self::Int(_) => Some(ScalarType::Integer),
            Self::Float(_) => Some(ScalarType::Float),
            Self::Str(_) => Some(ScalarType::String),
        }
    }

    /// Total order used for sorting and indexing.
    ///
    /// Numbers compare numerically across `Int`/`Float`, numbers sort before
    /// text, and missing sorts after everything.
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Missing, Self::Missing) => Ordering::Equal,
            (Self::Missing, _) => Ordering::Greater,
            (_, Self::Missing) => Ordering::Less,
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Str(a), Self::Str(b)) => a.cmp(b),
            (Self::Str(_), _) => Ordering::Greater,
            (_, Self::Str(_)) => Ordering::Less,
            (a, b) => {
                let (x, y) = (a.as_f64().unwrap_or(f64::NAN), b.as_f64().unwrap_or(f64::NAN));
                x.total_cmp(&y)
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => write!(f, "."),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Missing, Into::into)
    }
}

// ── Type inference ────────────────────────────────────────────────────

/// A column of classified tokens.
#[derive(Debug, Clone, PartialEq)]
pub struct InferredColumn {
    /// Column-global type.
    pub scalar_type: ScalarType,
    /// One value per input token, converted to `scalar_type`.
    pub values: Vec<Value>,
}

/// Type inference configuration.
///
/// ```
/// use u_statkit::types::{ScalarType, TypeInference};
///
/// let inference = TypeInference::new().missing_markers(vec!["-999".into()]);
/// let col = inference.infer_column(&["-999", "1.5"]);
/// assert_eq!(col.scalar_type, ScalarType::Float);
/// assert!(col.values[0].is_missing());
/// ```
#[derive(Debug, Clone)]
pub struct TypeInference {
    missing_markers: Vec<String>,
    trim: bool,
}

impl TypeInference {
    /// Creates the default inference (`""`, `"."`, `"NA"` are missing; tokens trimmed).
    pub fn new() -> Self {
        Self {
            missing_markers: DEFAULT_MISSING_MARKERS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            trim: true,
        }
    }

    /// Sets custom missing markers (replaces defaults).
    pub fn missing_markers(mut self, markers: Vec<String>) -> Self {
        self.missing_markers = markers;
        self
    }

    /// Sets whether surrounding whitespace is stripped before parsing (default: true).
    pub fn trim(mut self, trim: bool) -> Self {
        self.trim = trim;
        self
    }

    /// Returns `true` if `token` is a missing-value marker.
    pub fn is_missing(&self, token: &str) -> bool {
        let token = self.prepare(token);
        self.missing_markers.iter().any(|m| m == token)
    }

    /// Decides the column type without converting values.
    pub fn infer_type<S: AsRef<str>>(&self, tokens: &[S]) -> ScalarType {
        self.classify(tokens, &[])
    }

    /// Infers the column type and converts every token to it.
    pub fn infer_column<S: AsRef<str>>(&self, tokens: &[S]) -> InferredColumn {
        self.infer_quoted(tokens, &[])
    }

    /// Like [`infer_column`](Self::infer_column), but a token flagged in
    /// `quoted` is literal text and never counts as missing.
    ///
    /// ```
    /// use u_statkit::types::{ScalarType, TypeInference, Value};
    ///
    /// let col = TypeInference::new().infer_quoted(&["NA", "NA", ""], &[true, false, true]);
    /// assert_eq!(col.scalar_type, ScalarType::String);
    /// assert_eq!(col.values, vec![Value::Str("NA".into()), Value::Missing, Value::Str("".into())]);
    /// ```
    pub fn infer_quoted<S: AsRef<str>>(&self, tokens: &[S], quoted: &[bool]) -> InferredColumn {
        let scalar_type = self.classify(tokens, quoted);
        let values = tokens
            .iter()
            .enumerate()
            .map(|(i, t)| self.convert(t.as_ref(), scalar_type, is_flagged(quoted, i)))
            .collect();
        InferredColumn {
            scalar_type,
            values,
        }
    }

    fn classify<S: AsRef<str>>(&self, tokens: &[S], quoted: &[bool]) -> ScalarType {
        let present: Vec<&str> = tokens
            .iter()
            .enumerate()
            .filter_map(|(i, t)| {
                let t: &str = t.as_ref();
                (is_flagged(quoted, i) || !self.is_missing(t)).then(|| self.prepare(t))
            })
            .collect();

        if present.is_empty() {
            return ScalarType::Float;
        }
        if present.iter().all(|t| t.parse::<i64>().is_ok()) {
            return ScalarType::Integer;
        }
        if present.iter().all(|t| parse_finite(t).is_some()) {
            return ScalarType::Float;
        }
        ScalarType::String
    }

    fn convert(&self, token: &str, scalar_type: ScalarType, literal: bool) -> Value {
        if !literal && self.is_missing(token) {
            return Value::Missing;
        }
        let token = self.prepare(token);
        match scalar_type {
            ScalarType::Integer => token.parse::<i64>().map_or(Value::Missing, Value::Int),
            ScalarType::Float => parse_finite(token).map_or(Value::Missing, Value::Float),
            ScalarType::String => Value::Str(token.to_string()),
        }
    }

    fn prepare<'a>(&self, token: &'a str) -> &'a str {
        if self.trim {
            token.trim()
        } else {
            token
        }
    }
}

impl Default for TypeInference {
    fn default() -> Self {
        Self::new()
    }
}

fn is_flagged(flags: &[bool], i: usize) -> bool {
    flags.get(i).copied().unwrap_or(false)
}

/// Infers a column from raw tokens using the default missing markers.
pub fn infer_column<S: AsRef<str>>(tokens: &[S]) -> InferredColumn {
    TypeInference::new().infer_column(tokens)
}

/// Classifies evaluator output into a column type.
///
/// Integers only → `Integer`, any float → `Float`, text → `String`, all
/// missing → `Float`. Text mixed with numbers is a [`StatError::TypeMismatch`].
pub fn infer_from_values(values: &[Value]) -> StatResult<ScalarType> {
    let mut seen_int = false;
    let mut seen_float = false;
    let mut seen_str = false;
    for v in values {
        match v {
            Value::Missing => {}
            Value::Int(_) => seen_int = true,
            Value::Float(_) => seen_float = true,
            Value::Str(_) => seen_str = true,
        }
    }
    match (seen_str, seen_int || seen_float) {
        (true, true) => Err(StatError::TypeMismatch {
            message: "expression produced both text and numbers".into(),
        }),
        (true, false) => Ok(ScalarType::String),
        (false, _) if seen_float => Ok(ScalarType::Float),
        (false, _) if seen_int => Ok(ScalarType::Integer),
        _ => Ok(ScalarType::Float),
    }
}

fn parse_finite(token: &str) -> Option<f64> {
    token.parse::<f64>().ok().filter(|v| v.is_finite())
}
