//! Bounded subprocess execution.
//!
//! External tools (git, ffmpeg) are run with piped output and a hard deadline.
//! A child that outlives its deadline is killed and reported as timed out.

use std::io;
use std::process::{Output, Stdio};
use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;
use tokio::process::Command;

/// Errors from running an external program.
#[derive(Error, Diagnostic, Debug)]
pub enum ProcessError {
    #[error("Program not found: {0}")]
    #[diagnostic(code(routines::process::not_found))]
    NotFound(String),

    #[error("{program} timed out after {timeout:?}")]
    #[diagnostic(code(routines::process::timed_out))]
    TimedOut { program: String, timeout: Duration },

    #[error("IO error: {0}")]
    #[diagnostic(code(routines::process::io))]
    Io(#[from] io::Error),
}

/// Run `command` to completion, or kill it once `timeout` has elapsed.
///
/// Stdin is closed. The child is killed when the timed-out future is dropped.
pub async fn run_with_timeout(
    command: &mut Command,
    timeout: Duration,
) -> Result<Output, ProcessError> {
    let program = command
        .as_std()
        .get_program()
        .to_string_lossy()
        .into_owned();

    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    match tokio::time::timeout(timeout, command.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) if e.kind() == io::ErrorKind::NotFound => Err(ProcessError::NotFound(program)),
        Ok(Err(e)) => Err(ProcessError::Io(e)),
        Err(_) => Err(ProcessError::TimedOut { program, timeout }),
    }
}

/// Stdout and stderr joined for log messages.
pub fn combined_output(output: &Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = stdout.trim();
    let stderr = stderr.trim();
    match (stdout.is_empty(), stderr.is_empty()) {
        (false, false) => format!("{}\n{}", stdout, stderr),
        (false, true) => stdout.to_string(),
        _ => stderr.to_string(),
    }
}
