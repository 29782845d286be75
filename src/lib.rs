//! # u-statkit
//!
//! In-memory statistical dataset engine.
//!
//! u-statkit holds one rectangular dataset of named, typed variables and
//! runs the classic interactive-statistics commands against it:
//!
//! - **Data management**: derive and overwrite variables from expressions,
//!   filter observations, reshape the variable list, with bounded undo
//! - **Estimation**: descriptive statistics, frequency tables and OLS
//!   regression built on a hand-written Gauss-Jordan inverse
//!
//! ## Modules
//!
//! - [`types`]: Scalar types, values with a missing sentinel, column type inference
//! - [`dataset`]: Column-major dataset (Dataset, Column, ValidityBitmap, Snapshot)
//! - [`expr`]: Expression parser and per-observation evaluator
//! - [`crud`]: generate / replace / keep if / drop if and variable lists
//! - [`descriptives`]: describe and (weighted) summarize
//! - [`tabulate`]: One-way and two-way tables, grouped aggregation
//! - [`matrix`]: Dense matrix with transpose, product and inverse
//! - [`regression`]: OLS with standard errors, t statistics, R², F and intervals
//! - [`history`]: Bounded undo history
//! - [`session`]: Dataset plus history behind one command surface
//! - [`csv_io`]: Delimited text reader and writer
//! - [`error`]: Error types
//!
//! ## Quick Start
//!
//! ```
//! use u_statkit::session::Session;
//!
//! let mut s = Session::new();
//! s.load_str("x,y\n1,5\n2,8\n3,11\n4,14\n").unwrap();
//! s.generate("x2", "x ^ 2").unwrap();
//!
//! let fit = s.regress("y", &["x"], None).unwrap();
//! assert!((fit.coefficient("x").unwrap() - 3.0).abs() < 1e-9);
//! assert!((fit.coefficient("_cons").unwrap() - 2.0).abs() < 1e-9);
//! ```

pub mod crud;
pub mod csv_io;
pub mod dataset;
pub mod descriptives;
pub mod error;
pub mod expr;
pub mod history;
pub mod matrix;
pub mod regression;
pub mod session;
pub mod tabulate;
pub mod types;

pub use dataset::{Column, Dataset};
pub use error::{StatError, StatResult};
pub use expr::Expression;
pub use session::Session;
pub use types::{ScalarType, Value};
