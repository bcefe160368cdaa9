// src/error.rs
//! Error types for command execution, output parsing and the exporter itself.

use std::time::Duration;
use thiserror::Error;

/// Failure of a single diagnostic command run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunnerError {
    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Execution(String),
}

/// Output of a diagnostic command did not match the expected grammar.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("line {line}: value {value:?} for {tag} is not an unsigned integer")]
    InvalidNumber {
        line: usize,
        tag: &'static str,
        value: String,
    },

    #[error("line {line}: {tag} has no value")]
    MissingValue { line: usize, tag: &'static str },

    #[error("label {label:?} not found in output")]
    LabelNotFound { label: &'static str },

    #[error("line {line}: status is empty")]
    EmptyStatus { line: usize },
}

/// Startup and exposition failures.
#[derive(Error, Debug)]
pub enum ExporterError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("exposition is not valid utf-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),

    #[error("collector {0} is already registered")]
    DuplicateCollector(String),

    #[error("metric family {family} of collector {collector} is already registered")]
    DuplicateFamily { family: String, collector: String },
}
