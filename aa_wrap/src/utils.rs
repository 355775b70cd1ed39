use anyhow::{ensure, Result};
use itertools::Itertools;
use std::process::{ExitCode, ExitStatus};

/// Convert something to an ExitCode.
pub trait IntoExitCode {
    fn into_exit_code(self) -> ExitCode;
}

impl IntoExitCode for ExitStatus {
    /// Convert an ExitStatus to an ExitCode. A child killed by a signal has
    /// no exit code and maps to failure.
    fn into_exit_code(self) -> ExitCode {
        self.code()
            .map_or(ExitCode::FAILURE, |x| ExitCode::from(x as u8))
    }
}

/// Convert an io::error to a string and strip "(os error 4)" from the end.
fn io_error_to_string(err: &std::io::Error) -> String {
    let s = err.to_string();
    s.strip_suffix(&format!(" (os error {})", err.raw_os_error().unwrap_or(0)))
        .unwrap_or(&s)
        .to_string()
}

/// Print an error chain.
pub fn print_error_chain(err: &anyhow::Error) {
    let error_chain = err.chain().join("\n\tCaused by: ");
    if let Some(io_err) = err.downcast_ref::<std::io::Error>() {
        let io_err_str = io_error_to_string(io_err);
        match err.chain().len() {
            1 => eprintln!("ERROR: {io_err_str}"),
            2 => eprintln!("ERROR: {io_err_str}: {err}"),
            _ => eprintln!("ERROR: {error_chain}"),
        };
    } else {
        eprintln!("ERROR: {error_chain}");
    };
}

/// Parse and validate an identifier, for use with Clap's value_parser.
/// A valid indentifier contains only letters, digits, underscores, and dashes.
pub fn validate_ascii_identifier(id: &str) -> Result<String> {
    ensure!(!id.is_empty(), "must not be empty.");
    ensure!(
        id.chars()
            .all(|c| matches!(c, '0'..='9' | 'A'..='Z' | 'a'..='z' | '_' | '-')),
        "must contain only letters, digits, underscores, and dashes."
    );
    Ok(String::from(id))
}

/// Translate a scheduler array task index into a 1-based index row, given
/// the task index that maps onto the first row.
pub fn row_for_task(task_index: usize, first_task_index: usize) -> Result<usize> {
    ensure!(
        task_index >= first_task_index,
        "array task index {task_index} is below the first task index {first_task_index}"
    );
    Ok(task_index - first_task_index + 1)
}
