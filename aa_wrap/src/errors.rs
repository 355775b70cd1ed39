use std::path::PathBuf;
use std::process::ExitStatus;

/// The input a pre-dispatch check found missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Bam,
    Cnv,
    DataRepo,
}

impl std::fmt::Display for InputKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            InputKind::Bam => "BAM file",
            InputKind::Cnv => "copy-number file",
            InputKind::DataRepo => "data repository directory",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Rows of the index file {path:?} are numbered from 1, but row 0 was requested.")]
    RowIndexZero { path: PathBuf },

    #[error(
        "Requested row {row} of the index file {path:?}, but the file only has {num_rows} rows."
    )]
    IndexOutOfRange {
        path: PathBuf,
        row: usize,
        num_rows: usize,
    },

    #[error(
        "Row {row} of the index file {path:?} is missing the '{field}' field. \
         Each row needs to be of the form sample_id,cnv_filename. The row was: `{line}`"
    )]
    MalformedIndex {
        path: PathBuf,
        row: usize,
        field: &'static str,
        line: String,
    },

    #[error(
        "Invalid sample id '{sample_id}' in row {row} of the index file {path:?}. \
         A sample id names its output folder and cannot be a path."
    )]
    InvalidSampleId {
        path: PathBuf,
        row: usize,
        sample_id: String,
    },

    #[error("Unable to read the index file {path:?}")]
    ReadIndex {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("The {kind} for sample '{sample_id}' does not exist: {path:?}")]
    MissingInput {
        sample_id: String,
        kind: InputKind,
        path: PathBuf,
    },

    #[error(
        "The license location {path:?} points at the license file itself. \
         It should be the path of the directory containing mosek.lic."
    )]
    LicensePath { path: PathBuf },

    #[error("No mosek.lic license file found in {path:?}")]
    MissingLicense { path: PathBuf },

    #[error("Failed to launch {program:?} for sample '{sample_id}'")]
    Launch {
        sample_id: String,
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("The pipeline for sample '{sample_id}' (row {row}) exited with {status}")]
    ExternalProcessFailure {
        sample_id: String,
        row: usize,
        status: ExitStatus,
    },
}
