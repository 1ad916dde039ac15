#![cfg(unix)]

use std::{sync::Arc, time::Duration};

use e2e_core::{BridgeConfig, BridgeError, E2eBridge, ProcessOptions, TIMEOUT_EXIT_CODE};
use e2e_testutil::FixedRunIdGenerator;
use serde_json::json;

// Writes a report echoing the params it received.
const SCRIPT: &str = r#"mkdir -p reports && printf '{"schema":"pest-e2e.v1","target":"%s","runId":"%s","stats":{"passed":1,"failed":0,"skipped":0,"durationMs":1},"tests":[{"name":"%s","status":"passed"}]}' "$PEST_E2E_TARGET" "$PEST_E2E_RUN_ID" "$GREETING" > "reports/$PEST_E2E_RUN_ID.json""#;

fn bridge(dir: &std::path::Path, command: &str) -> E2eBridge {
    let mut bridge = E2eBridge::builder(BridgeConfig::default())
        .run_ids(Arc::new(FixedRunIdGenerator::new("shell-run")))
        .build();
    let dir = dir.to_path_buf();
    let command = command.to_string();
    bridge
        .target("shell", move |t| {
            t.dir(dir)
                .command(command)
                .json_report("reports/{runId}.json")
        })
        .unwrap();
    bridge
}

#[tracing_test::traced_test]
#[test]
fn real_process_writes_report_read_back_by_runner() {
    let tmp = tempfile::tempdir().unwrap();
    let bridge = bridge(tmp.path(), SCRIPT);
    let report = bridge
        .handle("shell")
        .unwrap()
        .with_env([("GREETING", "hello from sh")])
        .with_params(json!({"locale": "en"}).as_object().unwrap())
        .run()
        .unwrap();
    assert_eq!(report.target, "shell");
    assert_eq!(report.run_id, "shell-run");
    assert_eq!(report.tests[0].name, "hello from sh");
    assert!(logs_contain("e2e target passed"));
}

#[test]
fn timeout_surfaces_as_process_failure() {
    let tmp = tempfile::tempdir().unwrap();
    let bridge = bridge(tmp.path(), "sleep 30");
    let err = bridge
        .handle("shell")
        .unwrap()
        .with_options(ProcessOptions::default().with_timeout(Duration::from_millis(200)))
        .run()
        .unwrap_err();
    match err {
        BridgeError::ProcessFailed {
            exit_code, stderr, ..
        } => {
            assert_eq!(exit_code, TIMEOUT_EXIT_CODE);
            assert!(stderr.contains("timed out"));
        }
        other => panic!("unexpected error: {other}"),
    }
}
