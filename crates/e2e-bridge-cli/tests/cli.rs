use std::fs;
use std::path::Path;
use std::process::{Command, Output};

fn cli_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_e2e-bridge"));
    cmd.current_dir(dir).env("RUST_LOG", "warn");
    cmd
}

fn run(dir: &Path, args: &[&str]) -> Output {
    cli_cmd(dir).args(args).output().expect("run e2e-bridge CLI")
}

fn run_ok(dir: &Path, args: &[&str]) -> String {
    let output = run(dir, args);
    if !output.status.success() {
        panic!(
            "CLI command {:?} failed: status={:?}\nstdout={}\nstderr={}",
            args,
            output.status,
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
    }
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn publish_writes_assets_and_prints_next_steps() {
    let tmp = tempfile::tempdir().unwrap();
    let stdout = run_ok(tmp.path(), &["publish"]);
    let dest = tmp.path().join("resources/js/pest-e2e");
    for name in ["core.mjs", "call.mjs", "playwright.mjs"] {
        assert!(dest.join(name).is_file(), "{name} missing");
    }
    assert!(stdout.contains("globalSetup"), "stdout:\n{stdout}");
    assert!(
        stdout.contains("(call.mjs, core.mjs, playwright.mjs)"),
        "stdout:\n{stdout}"
    );

    fs::write(dest.join("call.mjs"), "// mine").unwrap();
    let stdout = run_ok(tmp.path(), &["publish"]);
    assert!(stdout.contains("--force"), "stdout:\n{stdout}");
    assert_eq!(fs::read_to_string(dest.join("call.mjs")).unwrap(), "// mine");

    run_ok(tmp.path(), &["publish", "--force"]);
    assert_ne!(fs::read_to_string(dest.join("call.mjs")).unwrap(), "// mine");
}

#[test]
fn publish_honours_custom_dest() {
    let tmp = tempfile::tempdir().unwrap();
    run_ok(tmp.path(), &["publish", "--dest", "js/e2e"]);
    assert!(tmp.path().join("js/e2e/playwright.mjs").is_file());
}

#[test]
fn targets_lists_configured_entries() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(
        tmp.path().join("e2e-targets.yaml"),
        "targets:\n  frontend:\n    dir: web\n    command: npx playwright test\n    report: r/{runId}.json\n    filter: --grep\n",
    )
    .unwrap();
    let stdout = run_ok(tmp.path(), &["targets"]);
    assert!(stdout.starts_with("frontend\t"), "stdout:\n{stdout}");
    assert!(stdout.contains("filter=--grep"));
}

#[test]
fn unknown_target_fails_with_known_names() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(
        tmp.path().join("e2e-targets.yaml"),
        "targets:\n  frontend:\n    dir: .\n    command: 'true'\n    report: r.json\n",
    )
    .unwrap();
    let output = run(tmp.path(), &["run", "admin"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Unknown E2E target [admin]. Known: frontend"),
        "stderr:\n{stderr}"
    );
}

#[cfg(unix)]
#[test]
fn run_executes_target_and_prints_summary() {
    let tmp = tempfile::tempdir().unwrap();
    let app = tmp.path().join("app");
    fs::create_dir_all(&app).unwrap();
    fs::write(
        app.join("runner.sh"),
        r#"mkdir -p out
printf '{"schema":"pest-e2e.v1","target":"%s","runId":"%s","stats":{"passed":1,"failed":0,"skipped":0,"durationMs":12},"tests":[{"name":"checkout works","status":"passed","file":"checkout.spec.ts"}]}' "$PEST_E2E_TARGET" "$PEST_E2E_RUN_ID" > "out/$PEST_E2E_RUN_ID.json"
"#,
    )
    .unwrap();
    fs::write(
        tmp.path().join("e2e-targets.yaml"),
        "targets:\n  app:\n    dir: app\n    command: sh runner.sh\n    report: out/{runId}.json\n",
    )
    .unwrap();

    let stdout = run_ok(tmp.path(), &["run", "app", "--param", "locale=en"]);
    assert!(stdout.contains("✓ checkout works (checkout.spec.ts)"), "stdout:\n{stdout}");
    assert!(stdout.contains("passed=1 failed=0 skipped=0"));
}

#[cfg(unix)]
#[test]
fn run_reports_failed_tests() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(
        tmp.path().join("runner.sh"),
        r#"printf '{"schema":"pest-e2e.v1","target":"%s","runId":"%s","stats":{"passed":0,"failed":1,"skipped":0,"durationMs":3},"tests":[{"name":"it fails","status":"failed","error":{"message":"boom"}}]}' "$PEST_E2E_TARGET" "$PEST_E2E_RUN_ID" > report.json
exit 1
"#,
    )
    .unwrap();
    fs::write(
        tmp.path().join("e2e-targets.yaml"),
        "targets:\n  app:\n    dir: .\n    command: sh runner.sh\n    report: report.json\n",
    )
    .unwrap();

    let output = run(tmp.path(), &["run", "app"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("E2E failures for app"), "stderr:\n{stderr}");
    assert!(stderr.contains("it fails"));
}

#[test]
fn call_without_harness_explains_publish() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(
        tmp.path().join("e2e-targets.yaml"),
        "targets:\n  app:\n    dir: .\n    command: 'true'\n    report: r.json\n",
    )
    .unwrap();
    let output = run(tmp.path(), &["call", "app", "seed.mjs:run"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("E2E call harness not found"), "stderr:\n{stderr}");
}
