//! Flat tabular text in and out.
//!
//! [`CsvReader`] turns delimited text into a [`Dataset`], inferring each
//! column's type with a [`TypeInference`]. [`CsvWriter`] writes a dataset
//! back, representing missing values with a configurable marker.
//!
//! # Features
//!
//! - RFC 4180 quoting (quoted fields, `""` escapes, delimiters and newlines in fields)
//! - LF, CRLF and a leading BOM accepted
//! - Configurable delimiter and missing markers
//! - Quoted fields are literal text: `"NA"` reads as a string, `NA` as missing
//!
//! # Example
//!
//! ```
//! use u_statkit::csv_io::{CsvReader, CsvWriter};
//! use u_statkit::types::{ScalarType, Value};
//!
//! let ds = CsvReader::new().parse_str("make,price\nAMC,4099\n\"Audi, 5000\",.\n").unwrap();
//! assert_eq!(ds.n_obs(), 2);
//! assert_eq!(ds.column_by_name("price").unwrap().scalar_type(), ScalarType::Integer);
//! assert_eq!(ds.get("price", 1).unwrap(), Value::Missing);
//!
//! let text = CsvWriter::new().write_string(&ds);
//! assert_eq!(text, "make,price\nAMC,4099\n\"Audi, 5000\",\n");
//! ```

use std::io::Write;
use std::path::Path;

use log::debug;

use crate::dataset::{Column, Dataset};
use crate::error::{StatError, StatResult};
use crate::types::{TypeInference, Value};

// ── Reader ────────────────────────────────────────────────────────────

/// Delimited-text reader configuration and entry point.
#[derive(Debug, Clone)]
pub struct CsvReader {
    delimiter: u8,
    has_header: bool,
    inference: TypeInference,
}

impl Default for CsvReader {
    fn default() -> Self {
        Self::new()
    }
}

impl CsvReader {
    /// Comma delimiter, header row, default missing markers.
    pub fn new() -> Self {
        Self {
            delimiter: b',',
            has_header: true,
            inference: TypeInference::new(),
        }
    }

    /// Sets the field delimiter (default: comma).
    pub fn delimiter(mut self, delim: u8) -> Self {
        self.delimiter = delim;
        self
    }

    /// Sets whether the first record names the variables (default: true).
    ///
    /// Without a header, variables are named `v1`, `v2`, ...
    pub fn has_header(mut self, header: bool) -> Self {
        self.has_header = header;
        self
    }

    /// Replaces the type inference settings.
    pub fn inference(mut self, inference: TypeInference) -> Self {
        self.inference = inference;
        self
    }

    /// Reads a file.
    pub fn read_path(&self, path: impl AsRef<Path>) -> StatResult<Dataset> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let ds = self.parse_str(&content)?;
        debug!(
            "loaded {}: {} observations, {} variables",
            path.as_ref().display(),
            ds.n_obs(),
            ds.column_count()
        );
        Ok(ds)
    }

    /// Parses delimited text.
    pub fn parse_str(&self, input: &str) -> StatResult<Dataset> {
        let input = input.strip_prefix('\u{feff}').unwrap_or(input);
        let records = self.parse_records(input)?;
        let Some((_, first)) = records.first() else {
            return Ok(Dataset::new());
        };

        let n_cols = first.len();
        let (headers, body): (Vec<String>, &[(usize, Vec<Field>)]) = if self.has_header {
            let names = first
                .iter()
                .enumerate()
                .map(|(i, h)| {
                    let h = h.text.trim();
                    if h.is_empty() {
                        format!("v{}", i + 1)
                    } else {
                        h.to_string()
                    }
                })
                .collect();
            (names, &records[1..])
        } else {
            ((1..=n_cols).map(|i| format!("v{i}")).collect(), &records[..])
        };

        let mut raw_columns: Vec<Vec<&str>> = vec![Vec::with_capacity(body.len()); n_cols];
        let mut quoted: Vec<Vec<bool>> = vec![Vec::with_capacity(body.len()); n_cols];
        for (line, record) in body {
            if record.len() != n_cols {
                return Err(StatError::CsvParse {
                    line: *line,
                    message: format!("expected {n_cols} fields, got {}", record.len()),
                });
            }
            for ((col, flags), field) in raw_columns.iter_mut().zip(quoted.iter_mut()).zip(record) {
                col.push(&field.text);
                flags.push(field.quoted);
            }
        }

        let mut ds = Dataset::new();
        for ((name, raw), flags) in headers.into_iter().zip(&raw_columns).zip(&quoted) {
            let inferred = self.inference.infer_quoted(raw.as_slice(), flags);
            let column = Column::from_values(inferred.scalar_type, &inferred.values)?;
            ds.add_column(name, column)?;
        }
        Ok(ds)
    }

    /// Splits text into records, each tagged with its starting line number.
    fn parse_records(&self, input: &str) -> StatResult<Vec<(usize, Vec<Field>)>> {
        let delim = self.delimiter as char;
        let mut records = Vec::new();
        let mut record: Vec<Field> = Vec::new();
        let mut field = Field::default();
        let mut in_quotes = false;
        let mut line = 1;
        let mut record_line = 1;
        let mut chars = input.chars().peekable();

        let mut finish = |record: &mut Vec<Field>, field: &mut Field, start: usize| {
            record.push(std::mem::take(field));
            let blank = record.len() == 1 && record[0].text.is_empty() && !record[0].quoted;
            let done = std::mem::take(record);
            if !blank {
                records.push((start, done));
            }
        };

        while let Some(c) = chars.next() {
            if in_quotes {
                match c {
                    '"' if chars.peek() == Some(&'"') => {
                        chars.next();
                        field.text.push('"');
                    }
                    '"' => in_quotes = false,
                    '\n' => {
                        line += 1;
                        field.text.push(c);
                    }
                    _ => field.text.push(c),
                }
                continue;
            }
            match c {
                '"' if field.text.is_empty() => {
                    in_quotes = true;
                    field.quoted = true;
                }
                '\r' if chars.peek() == Some(&'\n') => {}
                '\n' | '\r' => {
                    finish(&mut record, &mut field, record_line);
                    line += 1;
                    record_line = line;
                }
                _ if c == delim => record.push(std::mem::take(&mut field)),
                _ => field.text.push(c),
            }
        }

        if in_quotes {
            return Err(StatError::CsvParse {
                line: record_line,
                message: "unterminated quoted field".into(),
            });
        }
        if !field.text.is_empty() || field.quoted || !record.is_empty() {
            finish(&mut record, &mut field, record_line);
        }
        Ok(records)
    }
}

/// One parsed field. Quoted fields are literal text and never missing.
#[derive(Debug, Default)]
struct Field {
    text: String,
    quoted: bool,
}

// ── Writer ────────────────────────────────────────────────────────────

/// Delimited-text writer configuration and entry point.
#[derive(Debug, Clone)]
pub struct CsvWriter {
    delimiter: u8,
    missing_marker: String,
    inference: TypeInference,
}

impl Default for CsvWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl CsvWriter {
    /// Comma delimiter, missing values written as empty fields.
    pub fn new() -> Self {
        Self {
            delimiter: b',',
            missing_marker: String::new(),
            inference: TypeInference::new(),
        }
    }

    /// Sets the field delimiter (default: comma).
    pub fn delimiter(mut self, delim: u8) -> Self {
        self.delimiter = delim;
        self
    }

    /// Sets the text written for missing values (default: empty).
    pub fn missing_marker(mut self, marker: impl Into<String>) -> Self {
        self.missing_marker = marker.into();
        self
    }

    /// Sets the markers the reading side treats as missing (default: the
    /// [`TypeInference`] defaults). Text values matching one are quoted.
    pub fn inference(mut self, inference: TypeInference) -> Self {
        self.inference = inference;
        self
    }

    /// Renders the dataset as a string.
    pub fn write_string(&self, dataset: &Dataset) -> String {
        let mut out = Vec::new();
        // Writing to a Vec<u8> cannot fail.
        let _ = self.write_to(dataset, &mut out);
        String::from_utf8_lossy(&out).into_owned()
    }

    /// Writes the header and every observation to `out`.
    pub fn write_to<W: Write>(&self, dataset: &Dataset, mut out: W) -> StatResult<()> {
        let header: Vec<String> = dataset
            .column_names()
            .iter()
            .map(|n| self.quote(n))
            .collect();
        self.write_record(&mut out, &header)?;
        for row in dataset.rows() {
            let fields: Vec<String> = row.iter().map(|v| self.format(v)).collect();
            self.write_record(&mut out, &fields)?;
        }
        Ok(())
    }

    /// Writes to a file, replacing it.
    pub fn write_path(&self, dataset: &Dataset, path: impl AsRef<Path>) -> StatResult<()> {
        let file = std::fs::File::create(path.as_ref())?;
        self.write_to(dataset, std::io::BufWriter::new(file))?;
        debug!(
            "saved {}: {} observations",
            path.as_ref().display(),
            dataset.n_obs()
        );
        Ok(())
    }

    fn write_record<W: Write>(&self, out: &mut W, fields: &[String]) -> StatResult<()> {
        let delim = [self.delimiter];
        for (i, f) in fields.iter().enumerate() {
            if i > 0 {
                out.write_all(&delim)?;
            }
            out.write_all(f.as_bytes())?;
        }
        out.write_all(b"\n")?;
        Ok(())
    }

    fn format(&self, value: &Value) -> String {
        match value {
            Value::Missing => self.quote(&self.missing_marker),
            Value::Int(i) => i.to_string(),
            Value::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{f:.1}"),
            Value::Float(f) => f.to_string(),
            Value::Str(s) if s == &self.missing_marker || self.inference.is_missing(s) => {
                format!("\"{}\"", s.replace('"', "\"\""))
            }
            Value::Str(s) => self.quote(s),
        }
    }

    fn quote(&self, text: &str) -> String {
        let delim = self.delimiter as char;
        if text.contains(delim) || text.contains(['"', '\n', '\r']) {
            format!("\"{}\"", text.replace('"', "\"\""))
        } else {
            text.to_string()
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────
