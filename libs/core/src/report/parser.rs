use std::{fs, io, path::Path};

use serde_json::{Map, Value};

use super::{
    ReportError,
    model::{
        JsonReport, REPORT_SCHEMA_V1, ReportStats, TestArtifacts, TestError, TestResult,
        TestStatus,
    },
};

const INLINE_ORIGIN: &str = "<inline>";

/// Strict decoder for `pest-e2e.v1` documents.
///
/// Required fields must be present with the right type; optional fields of
/// the wrong type decode as absent.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonReportParser;

impl JsonReportParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse_file(&self, path: &Path) -> Result<JsonReport, ReportError> {
        let raw = fs::read_to_string(path).map_err(|error| match error.kind() {
            io::ErrorKind::NotFound => ReportError::NotFound {
                path: path.to_path_buf(),
            },
            _ => ReportError::Unreadable {
                path: path.to_path_buf(),
                error,
            },
        })?;
        self.parse_json(&raw, &path.display().to_string())
    }

    pub fn parse_str(&self, json: &str) -> Result<JsonReport, ReportError> {
        self.parse_json(json, INLINE_ORIGIN)
    }

    /// `origin` labels error messages, usually the file path.
    pub fn parse_json(&self, json: &str, origin: &str) -> Result<JsonReport, ReportError> {
        let data: Value =
            serde_json::from_str(json).map_err(|error| ReportError::InvalidJson {
                origin: origin.to_string(),
                error,
            })?;
        let Value::Object(root) = data else {
            return Err(ReportError::InvalidRoot {
                origin: origin.to_string(),
            });
        };

        let schema = require_str(&root, "schema", origin)?;
        if schema != REPORT_SCHEMA_V1 {
            return Err(ReportError::UnsupportedSchema {
                origin: origin.to_string(),
                schema,
            });
        }
        let target = require_str(&root, "target", origin)?;
        let run_id = require_str(&root, "runId", origin)?;

        let stats_origin = format!("{origin}.stats");
        let stats = require_object(&root, "stats", origin)?;
        let stats = ReportStats {
            passed: require_count(stats, "passed", &stats_origin)?,
            failed: require_count(stats, "failed", &stats_origin)?,
            skipped: require_count(stats, "skipped", &stats_origin)?,
            duration_ms: require_count(stats, "durationMs", &stats_origin)?,
        };

        let tests = match root.get("tests") {
            None => Vec::new(),
            Some(Value::Array(entries)) => entries
                .iter()
                .enumerate()
                .map(|(i, entry)| {
                    let entry_origin = format!("{origin}.tests[{i}]");
                    match entry {
                        Value::Object(fields) => parse_test(fields, &entry_origin),
                        _ => Err(shape(entry_origin, "test entry", "object")),
                    }
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => return Err(shape(origin.to_string(), "tests field", "array")),
        };

        Ok(JsonReport {
            schema,
            target,
            run_id,
            stats,
            tests,
        })
    }
}

fn parse_test(fields: &Map<String, Value>, origin: &str) -> Result<TestResult, ReportError> {
    let name = require_str(fields, "name", origin)?;
    let raw_status = require_str(fields, "status", origin)?;
    let status = TestStatus::parse(&raw_status).ok_or_else(|| ReportError::InvalidStatus {
        origin: origin.to_string(),
        status: raw_status.clone(),
    })?;

    let error = match fields.get("error") {
        None | Some(Value::Null) => None,
        Some(Value::Object(err)) => {
            let err_origin = format!("{origin}.error");
            Some(TestError {
                message: require_str(err, "message", &err_origin)?,
                stack: optional_str(err, "stack"),
            })
        }
        Some(_) => {
            return Err(shape(format!("{origin}.error"), "error field", "object"));
        }
    };

    let artifacts = match fields.get("artifacts") {
        None | Some(Value::Null) => None,
        Some(Value::Object(art)) => Some(parse_artifacts(art, &format!("{origin}.artifacts"))?),
        Some(_) => {
            return Err(shape(
                format!("{origin}.artifacts"),
                "artifacts field",
                "object",
            ));
        }
    };

    Ok(TestResult {
        name,
        status,
        file: optional_str(fields, "file"),
        duration_ms: fields.get("durationMs").and_then(Value::as_u64),
        id: optional_str(fields, "id"),
        error,
        artifacts,
    })
}

fn parse_artifacts(fields: &Map<String, Value>, origin: &str) -> Result<TestArtifacts, ReportError> {
    let screenshots = match fields.get("screenshots") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(j, item)| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    shape(
                        format!("{origin}.screenshots[{j}]"),
                        "screenshot entry",
                        "string",
                    )
                })
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => {
            return Err(shape(
                format!("{origin}.screenshots"),
                "screenshots field",
                "array",
            ));
        }
    };

    Ok(TestArtifacts {
        trace: optional_str(fields, "trace"),
        video: optional_str(fields, "video"),
        screenshots,
    })
}

fn shape(origin: String, what: &'static str, expected: &'static str) -> ReportError {
    ReportError::InvalidShape {
        origin,
        what,
        expected,
    }
}

fn require_str(
    fields: &Map<String, Value>,
    key: &'static str,
    origin: &str,
) -> Result<String, ReportError> {
    match fields.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        _ => Err(ReportError::InvalidField {
            origin: origin.to_string(),
            kind: "string",
            key,
        }),
    }
}

fn require_object<'a>(
    fields: &'a Map<String, Value>,
    key: &'static str,
    origin: &str,
) -> Result<&'a Map<String, Value>, ReportError> {
    match fields.get(key) {
        Some(Value::Object(map)) => Ok(map),
        _ => Err(ReportError::InvalidField {
            origin: origin.to_string(),
            kind: "object",
            key,
        }),
    }
}

/// Non-negative JSON integer; `1.0` and `"1"` are rejected.
fn require_count(
    fields: &Map<String, Value>,
    key: &'static str,
    origin: &str,
) -> Result<u64, ReportError> {
    fields
        .get(key)
        .and_then(Value::as_u64)
        .ok_or_else(|| ReportError::InvalidField {
            origin: origin.to_string(),
            kind: "int",
            key,
        })
}

fn optional_str(fields: &Map<String, Value>, key: &str) -> Option<String> {
    fields.get(key).and_then(Value::as_str).map(str::to_string)
}
