use anyhow::{Context, Result, anyhow};
use serde_json::{Value, json};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Workspace root, two levels above this crate's manifest (`libs/testutil`).
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Loads a JSON or YAML fixture relative to the workspace root.
pub fn load_fixture_value(path: &str) -> Result<Value> {
    let absolute = workspace_root().join(path);
    let content = fs::read_to_string(&absolute)
        .with_context(|| format!("failed to read {}", absolute.display()))?;
    let extension = absolute
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    match extension.as_str() {
        "json" => serde_json::from_str(&content)
            .with_context(|| format!("failed to parse json {}", absolute.display())),
        "yaml" | "yml" => {
            let yaml: serde_yaml::Value = serde_yaml::from_str(&content)
                .with_context(|| format!("failed to parse yaml {}", absolute.display()))?;
            serde_json::to_value(yaml)
                .with_context(|| format!("failed to convert yaml {}", absolute.display()))
        }
        other => Err(anyhow!("unsupported fixture extension: {other}")),
    }
}

/// Builds `pest-e2e.v1` documents; stats are derived from the tests added.
#[derive(Debug, Clone)]
pub struct ReportFixture {
    target: String,
    run_id: String,
    duration_ms: u64,
    tests: Vec<Value>,
}

impl ReportFixture {
    pub fn new(target: &str, run_id: &str) -> Self {
        Self {
            target: target.to_string(),
            run_id: run_id.to_string(),
            duration_ms: 5,
            tests: Vec::new(),
        }
    }

    pub fn passed(mut self, name: &str) -> Self {
        self.tests.push(json!({"name": name, "status": "passed"}));
        self
    }

    pub fn skipped(mut self, name: &str) -> Self {
        self.tests.push(json!({"name": name, "status": "skipped"}));
        self
    }

    pub fn failed(mut self, name: &str, file: &str, message: &str) -> Self {
        self.tests.push(json!({
            "name": name,
            "status": "failed",
            "file": file,
            "error": {"message": message}
        }));
        self
    }

    fn count(&self, status: &str) -> usize {
        self.tests
            .iter()
            .filter(|t| t["status"] == status)
            .count()
    }

    pub fn to_value(&self) -> Value {
        json!({
            "schema": "pest-e2e.v1",
            "target": self.target,
            "runId": self.run_id,
            "stats": {
                "passed": self.count("passed"),
                "failed": self.count("failed"),
                "skipped": self.count("skipped"),
                "durationMs": self.duration_ms
            },
            "tests": self.tests
        })
    }

    pub fn to_json(&self) -> String {
        self.to_value().to_string()
    }

    /// Writes the document, creating parent directories.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(path, self.to_json())
            .with_context(|| format!("failed to write {}", path.display()))
    }
}
