//! Error types for the entire crate.
//!
//! We use `thiserror` for library-style errors with custom types,
//! and `anyhow` for application-level error propagation in main.rs and commands.

use std::fmt;
use thiserror::Error;

/// One interval that was still open when a stack violation was detected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenInterval {
    pub name: String,
    pub stack_level: i32,
    /// True for the interval whose pop triggered the violation
    pub is_exit: bool,
}

/// Diagnostic payload of a stack-discipline violation.
///
/// Renders as the classic dump: every unfinished interval indented by its
/// level, the offending one marked, followed by a one-line summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackDiagnostic {
    pub open: Vec<OpenInterval>,
    pub exit_name: String,
    pub exit_level: i32,
    pub current_level: i32,
}

impl fmt::Display for StackDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for mark in &self.open {
            let level = mark.stack_level.max(0) as usize;
            let info = if mark.is_exit { " <- exit is here" } else { "" };
            writeln!(
                f,
                "{:2}: {:indent$} {}{}",
                mark.stack_level,
                "",
                mark.name,
                info,
                indent = 2 * level
            )?;
        }
        write!(
            f,
            "error: pop '{}' event with a stack level of {}, but current stack level is {}",
            self.exit_name, self.exit_level, self.current_level
        )
    }
}

/// Errors raised on the capture path
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("stack discipline violated\n{0}")]
    StackMismatch(StackDiagnostic),

    #[error("unknown interval handle: {0}")]
    InvalidHandle(usize),
}

/// Structural errors while rebuilding a call tree
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("broken event list: record #{index} '{name}' at stack level {stack_level}")]
    BrokenEventList {
        index: usize,
        name: String,
        stack_level: i32,
    },

    #[error("stack level increase under '{parent}' changed the counter from thread time to process time at '{name}'")]
    ClockKindChange { parent: String, name: String },

    #[error("strict merge absorbed an already accumulated node '{name}'")]
    MergeInvariant { name: String },
}

/// Frame protocol violations; abort report generation for one run
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("no frame thread found")]
    NoFrameThread,

    #[error("frame thread must have only one entry point, found {count}")]
    MultipleFrameEntryPoints { count: usize },
}

/// Errors raised while aggregating per-function statistics
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StatsError {
    #[error("recursion detected on statistics collection stage: '{name}'")]
    RecursionDetected { name: String },
}

/// Errors that can occur while analysing one thread
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Stats(#[from] StatsError),
}

/// Errors that can occur while reading or writing event logs
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("parse fail at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("parse fail at line {line}: unknown name id {id}")]
    UnknownNameId { line: usize, id: u32 },

    #[error("event log has no calibration header")]
    MissingHeader,

    #[error("event name cannot be encoded: {0:?}")]
    InvalidName(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur during file output
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Failed to write file: {0}")]
    WriteFailed(#[from] std::io::Error),

    #[error("Failed to serialize JSON: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    #[error("Invalid output path: {0}")]
    InvalidPath(String),
}

/// Errors while writing the shutdown event log or report
#[derive(Error, Debug)]
pub enum ShutdownError {
    #[error("Failed to write event log: {0}")]
    Codec(#[from] CodecError),

    #[error("Failed to write report: {0}")]
    Output(#[from] OutputError),

    #[error("Cannot build report: {0}")]
    Protocol(#[from] ProtocolError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_diagnostic_marks_exit() {
        let diag = StackDiagnostic {
            open: vec![
                OpenInterval {
                    name: "frame".to_string(),
                    stack_level: 0,
                    is_exit: false,
                },
                OpenInterval {
                    name: "draw".to_string(),
                    stack_level: 1,
                    is_exit: true,
                },
            ],
            exit_name: "draw".to_string(),
            exit_level: 1,
            current_level: 0,
        };

        let text = diag.to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], " 0:  frame");
        assert_eq!(lines[1], " 1:    draw <- exit is here");
        assert_eq!(
            lines[2],
            "error: pop 'draw' event with a stack level of 1, but current stack level is 0"
        );
    }
}
