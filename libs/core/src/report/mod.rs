//! Canonical `pest-e2e.v1` report model, strict parser and run-bound reader.

mod model;
mod parser;
mod reader;

use std::{io, path::PathBuf};

pub use model::{
    FailedTest, JsonReport, REPORT_SCHEMA_V1, ReportStats, TestArtifacts, TestError, TestResult,
    TestStatus,
};
pub use parser::JsonReportParser;
pub use reader::JsonReportReader;

/// Every way a report can fail to load or validate.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("JSON report file not found: {}", .path.display())]
    NotFound { path: PathBuf },

    #[error("Unable to read JSON report file: {}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        error: io::Error,
    },

    #[error("Invalid JSON in report ({origin}): {error}")]
    InvalidJson {
        origin: String,
        #[source]
        error: serde_json::Error,
    },

    #[error("Invalid JSON report root ({origin}): expected object")]
    InvalidRoot { origin: String },

    #[error("Missing/invalid {kind} field ({origin}): {key}")]
    InvalidField {
        origin: String,
        kind: &'static str,
        key: &'static str,
    },

    #[error("Invalid {what} ({origin}): expected {expected}")]
    InvalidShape {
        origin: String,
        what: &'static str,
        expected: &'static str,
    },

    #[error("Unsupported JSON report schema ({origin}): {schema}")]
    UnsupportedSchema { origin: String, schema: String },

    #[error("Invalid status ({origin}): {status}")]
    InvalidStatus { origin: String, status: String },

    #[error("JSON report {field} mismatch in {}: expected {expected}, got {actual}", path.display())]
    Mismatch {
        field: &'static str,
        expected: String,
        actual: String,
        path: PathBuf,
    },
}
