//! Error types for u-statkit.

use thiserror::Error;

/// All errors produced by u-statkit operations.
///
/// Every command fails fast with one of these kinds; none of them is ever
/// coerced into a default value. Per-row evaluation failures are wrapped in
/// [`StatError::AtRow`] so the caller can report the offending observation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StatError {
    /// A column with this name already exists.
    #[error("variable '{name}' already exists")]
    DuplicateColumn { name: String },

    /// No column with this name exists.
    #[error("variable '{name}' not found")]
    UnknownColumn { name: String },

    /// An expression referenced a name that is not a column.
    #[error("unknown variable '{name}' in expression")]
    UnknownVariable { name: String },

    /// A sequence did not have the dataset's observation count.
    #[error("expected {expected} values, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// An observation index was past the end of the dataset.
    #[error("observation {index} out of range (dataset has {len})")]
    IndexOutOfRange { index: usize, len: usize },

    /// Division (or modulus) by zero during evaluation.
    #[error("division by zero")]
    DivisionByZero,

    /// A function received an argument outside its domain.
    #[error("{function}() is undefined for argument {value}")]
    Domain { function: &'static str, value: f64 },

    /// A weight value was negative.
    #[error("negative weight {value} at observation {row}")]
    InvalidWeight { row: usize, value: f64 },

    /// Not enough observations for the requested estimate.
    #[error("insufficient observations: {observations} for {parameters} parameters")]
    InsufficientData {
        observations: usize,
        parameters: usize,
    },

    /// Matrix inversion hit a (numerically) zero pivot.
    #[error("matrix is singular (collinear regressors) at column {column}")]
    SingularMatrix { column: usize },

    /// A computation produced NaN or infinity.
    #[error("numerical instability: non-finite {quantity}")]
    NumericalInstability { quantity: &'static str },

    /// Malformed expression text.
    #[error("syntax error at position {position}: {message}")]
    ExpressionSyntax { position: usize, message: String },

    /// Operands or values of incompatible types.
    #[error("type mismatch: {message}")]
    TypeMismatch { message: String },

    /// A string variable was used where numbers are required.
    #[error("variable '{name}' is not numeric")]
    NonNumericColumn { name: String },

    /// A per-row evaluation failure, tagged with its observation index.
    #[error("observation {row}: {source}")]
    AtRow {
        row: usize,
        #[source]
        source: Box<StatError>,
    },

    /// A session command was issued before any data was loaded.
    #[error("no dataset in memory")]
    NoDataset,

    /// Tabular text could not be parsed.
    #[error("CSV parse error at line {line}: {message}")]
    CsvParse { line: usize, message: String },

    /// I/O error while reading or writing tabular text.
    #[error("I/O error: {0}")]
    Io(String),
}

impl StatError {
    /// Wraps `self` with the observation index it occurred at.
    pub(crate) fn at_row(self, row: usize) -> Self {
        match self {
            already @ Self::AtRow { .. } => already,
            other => Self::AtRow {
                row,
                source: Box::new(other),
            },
        }
    }

    /// Returns the underlying error, looking through [`StatError::AtRow`].
    ///
    /// ```
    /// use u_statkit::error::StatError;
    ///
    /// let err = StatError::AtRow { row: 3, source: Box::new(StatError::DivisionByZero) };
    /// assert_eq!(err.innermost(), &StatError::DivisionByZero);
    /// assert_eq!(err.row(), Some(3));
    /// ```
    pub fn innermost(&self) -> &StatError {
        match self {
            Self::AtRow { source, .. } => source.innermost(),
            other => other,
        }
    }

    /// Observation index attached to this error, if any.
    pub fn row(&self) -> Option<usize> {
        match self {
            Self::AtRow { row, .. } => Some(*row),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StatError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// Result alias used throughout the crate.
pub type StatResult<T> = Result<T, StatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_row_does_not_double_wrap() {
        let err = StatError::DivisionByZero.at_row(2).at_row(7);
        assert_eq!(err.row(), Some(2));
        assert_eq!(err.innermost(), &StatError::DivisionByZero);
    }

    #[test]
    fn display_includes_row() {
        let err = StatError::UnknownVariable { name: "mpg".into() }.at_row(4);
        assert_eq!(err.to_string(), "observation 4: unknown variable 'mpg' in expression");
    }

    #[test]
    fn io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(matches!(StatError::from(io), StatError::Io(_)));
    }
}
