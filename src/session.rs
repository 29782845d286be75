//! Session state: the dataset in memory plus its undo history.
//!
//! [`Session`] is the command surface a front end drives. Every command
//! that changes the data takes a snapshot first; the snapshot enters the
//! undo history only if the command succeeds, and a failed command leaves
//! the data as it was. Commands that need data fail with
//! [`StatError::NoDataset`] until something is loaded.
//!
//! # Example
//!
//! ```
//! use u_statkit::session::Session;
//!
//! let mut s = Session::new();
//! s.load_str("price,foreign\n4099,0\n9690,1\n9735,1\n4816,0\n").unwrap();
//! s.keep_if("foreign == 1").unwrap();
//! assert_eq!(s.dataset().unwrap().n_obs(), 2);
//!
//! assert!(s.undo());
//! assert_eq!(s.dataset().unwrap().n_obs(), 4);
//! assert!(!s.undo());
//! ```

use std::path::Path;

use log::debug;

use crate::crud;
use crate::csv_io::{CsvReader, CsvWriter};
use crate::dataset::Dataset;
use crate::descriptives::{self, Description, SummarizeOptions, Summary};
use crate::error::{StatError, StatResult};
use crate::expr::Expression;
use crate::history::UndoHistory;
use crate::regression::{self, PredictKind, RegressConfig, RegressionResult};
use crate::tabulate::{self, Aggregation, CrossTab, Frequency, GroupRow};
use crate::types::Value;

/// One dataset, its undo history and the I/O and estimation settings.
#[derive(Debug, Clone, Default)]
pub struct Session {
    dataset: Option<Dataset>,
    history: UndoHistory,
    reader: CsvReader,
    writer: CsvWriter,
    regress_config: RegressConfig,
}

impl Session {
    /// Empty session with default settings and an undo depth of 2.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `reader` for [`load`](Self::load) and [`load_str`](Self::load_str).
    pub fn with_reader(mut self, reader: CsvReader) -> Self {
        self.reader = reader;
        self
    }

    /// Uses `writer` for [`save`](Self::save).
    pub fn with_writer(mut self, writer: CsvWriter) -> Self {
        self.writer = writer;
        self
    }

    /// Uses `config` for [`regress`](Self::regress).
    pub fn with_regress_config(mut self, config: RegressConfig) -> Self {
        self.regress_config = config;
        self
    }

    // ── Data in and out ───────────────────────────────────────────────

    /// Loads a file, replacing the current dataset and clearing the history.
    pub fn load(&mut self, path: impl AsRef<Path>) -> StatResult<()> {
        let ds = self.reader.read_path(path)?;
        self.use_dataset(ds);
        Ok(())
    }

    /// Loads delimited text held in memory.
    pub fn load_str(&mut self, text: &str) -> StatResult<()> {
        let ds = self.reader.parse_str(text)?;
        self.use_dataset(ds);
        Ok(())
    }

    /// Installs an already-built dataset, clearing the history.
    pub fn use_dataset(&mut self, dataset: Dataset) {
        debug!(
            "dataset in memory: {} observations, {} variables",
            dataset.n_obs(),
            dataset.column_count()
        );
        self.dataset = Some(dataset);
        self.history.clear();
    }

    /// The dataset in memory.
    pub fn dataset(&self) -> StatResult<&Dataset> {
        self.dataset.as_ref().ok_or(StatError::NoDataset)
    }

    /// Writes the dataset to a file.
    pub fn save(&self, path: impl AsRef<Path>) -> StatResult<()> {
        self.writer.write_path(self.dataset()?, path)
    }

    /// Number of snapshots available to [`undo`](Self::undo).
    pub fn undo_depth(&self) -> usize {
        self.history.len()
    }

    // ── Mutating commands ─────────────────────────────────────────────

    /// `generate name = expr`
    pub fn generate(&mut self, name: &str, expr: &str) -> StatResult<()> {
        let expr = Expression::parse(expr)?;
        self.mutate(|ds| crud::generate(ds, name, &expr))
    }

    /// `replace target = expr [if filter]`; returns the number of changes.
    pub fn replace(&mut self, target: &str, expr: &str, filter: Option<&str>) -> StatResult<usize> {
        let expr = Expression::parse(expr)?;
        let filter = filter.map(Expression::parse).transpose()?;
        self.mutate(|ds| crud::replace(ds, target, &expr, filter.as_ref()))
    }

    /// `keep if filter`; returns the number of observations dropped.
    pub fn keep_if(&mut self, filter: &str) -> StatResult<usize> {
        let filter = Expression::parse(filter)?;
        self.mutate(|ds| crud::keep_if(ds, &filter))
    }

    /// `drop if filter`; returns the number of observations dropped.
    pub fn drop_if(&mut self, filter: &str) -> StatResult<usize> {
        let filter = Expression::parse(filter)?;
        self.mutate(|ds| crud::drop_if(ds, &filter))
    }

    pub fn keep_vars(&mut self, names: &[&str]) -> StatResult<()> {
        self.mutate(|ds| crud::keep_vars(ds, names))
    }

    pub fn drop_vars(&mut self, names: &[&str]) -> StatResult<()> {
        self.mutate(|ds| crud::drop_vars(ds, names))
    }

    pub fn rename(&mut self, old: &str, new: &str) -> StatResult<()> {
        self.mutate(|ds| crud::rename(ds, old, new))
    }

    /// Sorts all observations by `var`.
    pub fn sort(&mut self, var: &str, descending: bool) -> StatResult<()> {
        self.mutate(|ds| ds.sort_by(var, descending))
    }

    /// Appends one observation; unnamed variables are missing.
    pub fn add_obs(&mut self, values: &[(&str, Value)]) -> StatResult<()> {
        self.mutate(|ds| ds.push_row(values))
    }

    /// Removes observation `index`.
    pub fn drop_obs(&mut self, index: usize) -> StatResult<()> {
        self.mutate(|ds| ds.remove_row(index))
    }

    /// Adds fitted values or residuals from `result` as variable `name`.
    pub fn predict(
        &mut self,
        result: &RegressionResult,
        name: &str,
        kind: PredictKind,
    ) -> StatResult<()> {
        self.mutate(|ds| regression::predict(ds, result, name, kind))
    }

    /// Restores the most recent snapshot. Returns `false` when there is none.
    pub fn undo(&mut self) -> bool {
        let Some(snapshot) = self.history.pop() else {
            return false;
        };
        let ds = self.dataset.get_or_insert_with(Dataset::new);
        ds.restore(snapshot);
        debug!("undo: {} observations restored", ds.n_obs());
        true
    }

    fn mutate<T>(&mut self, command: impl FnOnce(&mut Dataset) -> StatResult<T>) -> StatResult<T> {
        let ds = self.dataset.as_mut().ok_or(StatError::NoDataset)?;
        let snapshot = ds.snapshot();
        match command(&mut *ds) {
            Ok(out) => {
                self.history.push(snapshot);
                Ok(out)
            }
            Err(e) => {
                ds.restore(snapshot);
                Err(e)
            }
        }
    }

    // ── Queries ───────────────────────────────────────────────────────

    pub fn describe(&self, vars: &[&str]) -> StatResult<Vec<Description>> {
        descriptives::describe(self.dataset()?, vars)
    }

    /// `summarize vars [weight]`
    pub fn summarize(&self, vars: &[&str], weight: Option<&str>) -> StatResult<Vec<Summary>> {
        let options = match weight {
            Some(w) => SummarizeOptions::new().weight(w),
            None => SummarizeOptions::new(),
        };
        descriptives::summarize(self.dataset()?, vars, &options)
    }

    pub fn tabulate(&self, var: &str) -> StatResult<Vec<Frequency>> {
        tabulate::tabulate(self.dataset()?, var)
    }

    pub fn tabulate2(&self, row_var: &str, col_var: &str) -> StatResult<CrossTab> {
        tabulate::tabulate2(self.dataset()?, row_var, col_var)
    }

    /// `group by target [mean|sum|count]`
    pub fn group(
        &self,
        by: &str,
        target: &str,
        aggregation: Aggregation,
    ) -> StatResult<Vec<GroupRow>> {
        tabulate::group_aggregate(self.dataset()?, by, target, aggregation)
    }

    /// `regress depvar indepvars [if filter]`
    pub fn regress(
        &self,
        depvar: &str,
        indepvars: &[&str],
        filter: Option<&str>,
    ) -> StatResult<RegressionResult> {
        let filter = filter.map(Expression::parse).transpose()?;
        regression::regress(
            self.dataset()?,
            depvar,
            indepvars,
            filter.as_ref(),
            &self.regress_config,
        )
    }

    /// Observations where `var` equals `value`.
    pub fn lookup(&mut self, var: &str, value: &Value) -> StatResult<Vec<usize>> {
        self.dataset
            .as_mut()
            .ok_or(StatError::NoDataset)?
            .lookup(var, value)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────
