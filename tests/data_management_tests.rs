//! Integration tests for loading, transforming and undoing changes to a
//! dataset through the session surface.
//!
//! ## Test Organization
//!
//! 1. **Type Inference** - column types decided from raw text
//! 2. **Expressions** - precedence, masks and evaluation failures
//! 3. **Data Management** - generate, keep/drop and undo
//! 4. **Descriptives** - describe, summarize and tables

use approx::{assert_abs_diff_eq, assert_relative_eq};

use u_statkit::csv_io::CsvWriter;
use u_statkit::dataset::Dataset;
use u_statkit::error::StatError;
use u_statkit::expr::Expression;
use u_statkit::session::Session;
use u_statkit::types::{infer_column, ScalarType, Value};

const AUTO: &str = "\
make,price,mpg,foreign
AMC Concord,4099,22,0
AMC Pacer,4749,17,0
Audi 5000,9690,17,1
BMW 320i,9735,25,1
Buick Century,4816,20,0
Datsun 210,4589,35,1
";

fn auto() -> Session {
    let mut s = Session::new();
    s.load_str(AUTO).unwrap();
    s
}

// ============================================================================
// Type Inference
// ============================================================================

/// Integer tokens with a missing marker stay integer.
#[test]
fn test_infer_integer_with_missing() {
    let col = infer_column(&["1", "2", "."]);
    assert_eq!(col.scalar_type, ScalarType::Integer);
    assert_eq!(col.values, vec![Value::Int(1), Value::Int(2), Value::Missing]);
}

/// One decimal token promotes the column to float.
#[test]
fn test_infer_float() {
    let col = infer_column(&["1", "2.5"]);
    assert_eq!(col.scalar_type, ScalarType::Float);
    assert_eq!(col.values, vec![Value::Float(1.0), Value::Float(2.5)]);
}

/// Any non-numeric token makes the column text.
#[test]
fn test_infer_string() {
    let col = infer_column(&["a", "1"]);
    assert_eq!(col.scalar_type, ScalarType::String);
}

/// Loaded columns carry their inferred types.
#[test]
fn test_loaded_schema() {
    let s = auto();
    let ds = s.dataset().unwrap();
    assert_eq!(
        ds.schema(),
        vec![
            ("make", ScalarType::String),
            ("price", ScalarType::Integer),
            ("mpg", ScalarType::Integer),
            ("foreign", ScalarType::Integer),
        ]
    );
    assert_eq!(ds.n_obs(), 6);
}

// ============================================================================
// Expressions
// ============================================================================

/// Multiplication binds tighter than addition.
#[test]
fn test_precedence() {
    let ds = Dataset::new();
    let v = Expression::parse("2 + 3 * 4").unwrap().evaluate(&ds, 0).unwrap();
    assert_eq!(v, Value::Int(14));
}

/// A comparison used as a filter yields one flag per observation.
#[test]
fn test_comparison_mask() {
    let s = auto();
    let mask = Expression::parse("foreign == 1")
        .unwrap()
        .mask(s.dataset().unwrap())
        .unwrap();
    assert_eq!(mask, vec![false, false, true, true, false, true]);
}

/// Division by zero is an error, reported with the observation index.
#[test]
fn test_division_by_zero() {
    let s = auto();
    let err = Expression::parse("price / 0")
        .unwrap()
        .evaluate_all(s.dataset().unwrap())
        .unwrap_err();
    assert_eq!(err.innermost(), &StatError::DivisionByZero);
    assert_eq!(err.row(), Some(0));
}

/// Referencing a column that does not exist fails.
#[test]
fn test_unknown_variable() {
    let s = auto();
    let err = Expression::parse("weight * 2")
        .unwrap()
        .evaluate(s.dataset().unwrap(), 0)
        .unwrap_err();
    assert!(matches!(err.innermost(), StatError::UnknownVariable { name } if name == "weight"));
}

/// Missing operands propagate through arithmetic.
#[test]
fn test_missing_propagates() {
    let mut s = Session::new();
    s.load_str("x\n1\n.\n3\n").unwrap();
    let values = Expression::parse("x * 2 + 1")
        .unwrap()
        .evaluate_all(s.dataset().unwrap())
        .unwrap();
    assert_eq!(values, vec![Value::Int(3), Value::Missing, Value::Int(7)]);
}

// ============================================================================
// Data Management
// ============================================================================

/// `generate` appends a float column of natural logs.
#[test]
fn test_generate_log() {
    let mut s = Session::new();
    s.load_str("price\n10\n100\n").unwrap();
    s.generate("lp", "log(price)").unwrap();

    let ds = s.dataset().unwrap();
    let lp = ds.column_by_name("lp").unwrap();
    assert_eq!(lp.scalar_type(), ScalarType::Float);
    assert_relative_eq!(lp.numeric_at(0).unwrap(), 2.302585, epsilon = 1e-6);
    assert_relative_eq!(lp.numeric_at(1).unwrap(), 4.605170, epsilon = 1e-6);
}

/// Generating an existing name fails and leaves the data untouched.
#[test]
fn test_generate_duplicate() {
    let mut s = auto();
    let before = s.dataset().unwrap().clone();
    let err = s.generate("price", "1").unwrap_err();
    assert!(matches!(err, StatError::DuplicateColumn { .. }));
    assert_eq!(s.dataset().unwrap(), &before);
}

/// `keep if` retains matching observations and can be undone.
#[test]
fn test_keep_if_and_undo() {
    let mut s = auto();
    let dropped = s.keep_if("foreign == 1").unwrap();
    assert_eq!(dropped, 3);
    assert_eq!(s.dataset().unwrap().n_obs(), 3);

    assert!(s.undo());
    assert_eq!(s.dataset().unwrap().n_obs(), 6);
}

/// `replace ... if` only touches observations where the filter holds.
#[test]
fn test_replace_with_filter() {
    let mut s = auto();
    let changed = s.replace("mpg", "mpg + 100", Some("foreign == 0")).unwrap();
    assert_eq!(changed, 3);
    let ds = s.dataset().unwrap();
    assert_eq!(ds.get("mpg", 0).unwrap(), Value::Int(122));
    assert_eq!(ds.get("mpg", 2).unwrap(), Value::Int(17));
}

/// A snapshot restores the exact prior state.
#[test]
fn test_snapshot_round_trip() {
    let s = auto();
    let original = s.dataset().unwrap().clone();

    let mut ds = original.clone();
    let snapshot = ds.snapshot();
    ds.drop_column("mpg").unwrap();
    ds.remove_row(0).unwrap();
    ds.restore(snapshot);

    assert_eq!(ds, original);
}

/// Only the two most recent changes can be undone.
#[test]
fn test_undo_depth() {
    let mut s = auto();
    s.drop_vars(&["mpg"]).unwrap();
    s.rename("price", "cost").unwrap();
    s.drop_if("foreign == 0").unwrap();

    assert!(s.undo());
    assert!(s.undo());
    assert!(!s.undo());
    assert_eq!(s.dataset().unwrap().column_names(), &["make", "price", "foreign"]);
}

/// Saved text loads back into an equal dataset.
#[test]
fn test_save_and_reload() {
    let mut s = auto();
    s.generate("ratio", "price / mpg").unwrap();
    let text = CsvWriter::new().write_string(s.dataset().unwrap());

    let mut t = Session::new();
    t.load_str(&text).unwrap();
    let a = s.dataset().unwrap();
    let b = t.dataset().unwrap();
    assert_eq!(a.column_names(), b.column_names());
    for row in 0..a.n_obs() {
        assert_relative_eq!(
            a.column_by_name("ratio").unwrap().numeric_at(row).unwrap(),
            b.column_by_name("ratio").unwrap().numeric_at(row).unwrap(),
            max_relative = 1e-12
        );
    }
}

/// Text equal to a missing marker reloads as text, not as missing.
#[test]
fn test_marker_like_text_round_trip() {
    let mut s = Session::new();
    s.load_str("id\n1\n2\n3\n").unwrap();
    s.generate("label", "\"NA\"").unwrap();
    s.replace("label", "\"\"", Some("id == 2")).unwrap();
    s.replace("label", ".", Some("id == 3")).unwrap();

    let text = CsvWriter::new().write_string(s.dataset().unwrap());
    let mut t = Session::new();
    t.load_str(&text).unwrap();

    let labels: Vec<Value> = t
        .dataset()
        .unwrap()
        .column_by_name("label")
        .unwrap()
        .values()
        .collect();
    assert_eq!(
        labels,
        vec![Value::Str("NA".into()), Value::Str(String::new()), Value::Missing]
    );
}

// ============================================================================
// Descriptives
// ============================================================================

/// Mean, sample SD and range of a small column.
#[test]
fn test_summarize_price() {
    let mut s = Session::new();
    s.load_str("price\n4000\n5000\n6000\n").unwrap();
    let summary = s.summarize(&["price"], None).unwrap();

    assert_eq!(summary.len(), 1);
    let row = &summary[0];
    assert_eq!(row.n, 3);
    assert_abs_diff_eq!(row.mean.unwrap(), 5000.0, epsilon = 1e-9);
    assert_abs_diff_eq!(row.sd.unwrap(), 1000.0, epsilon = 1e-9);
    assert_eq!(row.min, Some(4000.0));
    assert_eq!(row.max, Some(6000.0));
}

/// Integer frequency weights act like repeated observations for the mean.
#[test]
fn test_weighted_mean() {
    let mut s = Session::new();
    s.load_str("x,w\n1,1\n4,2\n").unwrap();
    let summary = s.summarize(&["x"], Some("w")).unwrap();
    assert_abs_diff_eq!(summary[0].mean.unwrap(), 3.0, epsilon = 1e-12);
    assert_eq!(summary[0].sum_weights, Some(3.0));
}

/// Describing twice gives identical results and leaves the data unchanged.
#[test]
fn test_describe_is_idempotent() {
    let s = auto();
    let before = s.dataset().unwrap().clone();
    let first = s.describe(&[]).unwrap();
    let second = s.describe(&[]).unwrap();
    assert_eq!(first, second);
    assert_eq!(s.dataset().unwrap(), &before);
    assert_eq!(s.undo_depth(), 0);
}

/// One-way table counts and cumulative percentages.
#[test]
fn test_tabulate_foreign() {
    let s = auto();
    let table = s.tabulate("foreign").unwrap();
    assert_eq!(table.len(), 2);
    assert_eq!(table[0].value, Value::Int(0));
    assert_eq!(table[0].count, 3);
    assert_abs_diff_eq!(table[0].percent, 50.0, epsilon = 1e-12);
    assert_abs_diff_eq!(table[1].cumulative, 100.0, epsilon = 1e-12);
}
