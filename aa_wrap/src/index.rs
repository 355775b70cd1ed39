//! Reading the per-sample job index.
//!
//! The index is a headerless CSV file with one sample per line:
//! `sample_id,cnv_filename[,...]`. Rows are addressed by their 1-based line
//! number, which is what a batch array task index maps onto.

use crate::errors::DispatchError;
use csv::StringRecord;
use itertools::Itertools;
use log::debug;
use std::fs::File;
use std::io::{BufRead, BufReader, Split};
use std::path::{Path, PathBuf};

/// One row of the job index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRecord {
    /// The 1-based row this record was read from.
    pub row: usize,
    pub sample_id: String,
    pub cnv_filename: String,
    /// Any columns past the second. Carried along but not used for dispatch.
    pub extra: Vec<String>,
}

/// A job index file on disk.
#[derive(Debug, Clone)]
pub struct JobIndex {
    path: PathBuf,
}

impl JobIndex {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JobIndex { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw lines of the file. Only the requested row is ever decoded, so a
    /// badly encoded row does not affect any other row.
    fn lines(&self) -> Result<Split<BufReader<File>>, DispatchError> {
        let file = File::open(&self.path).map_err(|err| self.read_error(err.into()))?;
        Ok(BufReader::new(file).split(b'\n'))
    }

    fn read_error(&self, source: csv::Error) -> DispatchError {
        DispatchError::ReadIndex {
            path: self.path.clone(),
            source,
        }
    }

    /// Number of addressable rows: the line number of the last non-blank row.
    /// Trailing blank lines are not counted.
    pub fn num_rows(&self) -> Result<usize, DispatchError> {
        let mut last_row = 0;
        for (i, line) in self.lines()?.enumerate() {
            let line = line.map_err(|err| self.read_error(err.into()))?;
            if !is_blank(&line) {
                last_row = i + 1;
            }
        }
        Ok(last_row)
    }

    /// Read the record at 1-based `row`, and only that row.
    pub fn record(&self, row: usize) -> Result<IndexRecord, DispatchError> {
        if row == 0 {
            return Err(DispatchError::RowIndexZero {
                path: self.path.clone(),
            });
        }

        let mut last_row = 0;
        for (i, line) in self.lines()?.enumerate() {
            let line = line.map_err(|err| self.read_error(err.into()))?;
            let line_no = i + 1;
            let blank = is_blank(&line);
            if !blank {
                last_row = line_no;
            }
            match line_no.cmp(&row) {
                std::cmp::Ordering::Less => {}
                std::cmp::Ordering::Equal if !blank => return self.parse_line(row, &line),
                std::cmp::Ordering::Equal => {}
                // The requested row was blank but more rows follow it.
                std::cmp::Ordering::Greater if !blank => {
                    return Err(self.malformed(row, "sample_id", String::new()));
                }
                std::cmp::Ordering::Greater => {}
            }
        }

        Err(DispatchError::IndexOutOfRange {
            path: self.path.clone(),
            row,
            num_rows: last_row,
        })
    }

    fn parse_line(&self, row: usize, line: &[u8]) -> Result<IndexRecord, DispatchError> {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        // Plain comma splitting: quotes are ordinary characters.
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .quoting(false)
            .from_reader(line);
        let record = match reader.records().next() {
            Some(rec) => rec.map_err(|source| self.read_error(source))?,
            None => StringRecord::new(),
        };
        let fields: Vec<&str> = record
            .iter()
            .map(|field| field.trim_end_matches('\r'))
            .collect();
        debug!("index row {row}: {}", fields.iter().join(","));

        let sample_id = match fields.first() {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => return Err(self.malformed(row, "sample_id", lossy(line))),
        };
        let cnv_filename = match fields.get(1) {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => return Err(self.malformed(row, "cnv_filename", lossy(line))),
        };
        if !is_valid_sample_id(&sample_id) {
            return Err(DispatchError::InvalidSampleId {
                path: self.path.clone(),
                row,
                sample_id,
            });
        }

        Ok(IndexRecord {
            row,
            sample_id,
            cnv_filename,
            extra: fields.iter().skip(2).map(|s| s.to_string()).collect(),
        })
    }

    fn malformed(&self, row: usize, field: &'static str, line: String) -> DispatchError {
        DispatchError::MalformedIndex {
            path: self.path.clone(),
            row,
            field,
            line,
        }
    }
}

fn is_blank(line: &[u8]) -> bool {
    line.iter().all(u8::is_ascii_whitespace)
}

fn lossy(line: &[u8]) -> String {
    String::from_utf8_lossy(line).into_owned()
}

/// The sample id becomes a directory name under the output root, so it must
/// not escape it or collide with another job's folder.
fn is_valid_sample_id(sample_id: &str) -> bool {
    !sample_id.trim().is_empty()
        && !sample_id.contains('/')
        && sample_id != "."
        && sample_id != ".."
}
