use std::{io, path::PathBuf};

use e2e_auth::AuthTicketError;

use crate::report::{FailedTest, ReportError};

/// Raised when a target definition is incomplete.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TargetConfigError {
    #[error("E2E target name must not be empty.")]
    EmptyName,
    #[error("E2E target '{target}' is missing {field}.")]
    MissingField {
        target: String,
        field: &'static str,
    },
}

/// Errors surfaced by the bridge to the calling test.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Unknown E2E target [{name}]. Known: {}", known_list(.known))]
    UnknownTarget { name: String, known: Vec<String> },

    #[error(transparent)]
    TargetConfig(#[from] TargetConfigError),

    #[error(
        "Target \"{target}\" does not support filtering. Configure it with .filter(\"--flag\")."
    )]
    FilterUnsupported { target: String },

    #[error("Cannot pass {value:?} to the shell safely: {reason}")]
    UnsafeArgument { value: String, reason: &'static str },

    #[error("Unable to encode E2E params for target {target}: {error}")]
    ParamsEncode {
        target: String,
        #[source]
        error: serde_json::Error,
    },

    #[error("Unable to create params dir: {}", .path.display())]
    ParamsDir {
        path: PathBuf,
        #[source]
        error: io::Error,
    },

    #[error("Unable to write params file: {}", .path.display())]
    ParamsWrite {
        path: PathBuf,
        #[source]
        error: io::Error,
    },

    #[error("Failed to start E2E command `{command}` in {}", .cwd.display())]
    Spawn {
        command: String,
        cwd: PathBuf,
        #[source]
        error: io::Error,
    },

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error(
        "E2E command failed (exit {exit_code}).\n\nCMD:\n{command}\n\nCWD:\n{}\n\nSTDOUT:\n{stdout}\n\nSTDERR:\n{stderr}\n\nREPORT:\n{report}",
        .cwd.display()
    )]
    ProcessFailed {
        exit_code: i32,
        command: String,
        cwd: PathBuf,
        stdout: String,
        stderr: String,
        report: ReportError,
    },

    #[error("E2E failures for {target} ({run_id}):\n{}", failure_list(.failures))]
    TestFailures {
        target: String,
        run_id: String,
        failures: Vec<FailedTest>,
    },

    #[error("E2E call harness not found at {}", .0.display())]
    HarnessMissing(PathBuf),

    #[error(
        "E2E call failed (exit {exit_code}).\n\nTARGET:\n{call}\n\nCMD:\n{command}\n\nCWD:\n{}\n\nSTDOUT:\n{stdout}\n\nSTDERR:\n{stderr}",
        .cwd.display()
    )]
    CallFailed {
        exit_code: i32,
        call: String,
        command: String,
        cwd: PathBuf,
        stdout: String,
        stderr: String,
    },

    #[error(transparent)]
    AuthTicket(#[from] AuthTicketError),
}

fn known_list(known: &[String]) -> String {
    if known.is_empty() {
        "(none)".to_string()
    } else {
        known.join(", ")
    }
}

fn failure_list(failures: &[FailedTest]) -> String {
    failures
        .iter()
        .map(|failure| {
            let mut line = format!("- {}", failure.name);
            if let Some(file) = &failure.file {
                line.push_str(&format!(" ({file})"));
            }
            if let Some(message) = failure.message.as_deref().filter(|m| !m.is_empty()) {
                line.push_str("\n  ");
                line.push_str(message);
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_target_lists_known_names() {
        let err = BridgeError::UnknownTarget {
            name: "mobile".into(),
            known: vec!["admin".into(), "frontend".into()],
        };
        assert_eq!(
            err.to_string(),
            "Unknown E2E target [mobile]. Known: admin, frontend"
        );
    }

    #[test]
    fn failures_render_name_file_and_message() {
        let err = BridgeError::TestFailures {
            target: "frontend".into(),
            run_id: "abc".into(),
            failures: vec![
                FailedTest {
                    name: "login works".into(),
                    file: Some("tests/login.spec.ts".into()),
                    message: Some("expected 200".into()),
                },
                FailedTest {
                    name: "bare".into(),
                    file: None,
                    message: None,
                },
            ],
        };
        assert_eq!(
            err.to_string(),
            "E2E failures for frontend (abc):\n- login works (tests/login.spec.ts)\n  expected 200\n- bare"
        );
    }
}
