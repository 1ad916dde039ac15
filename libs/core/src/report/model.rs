use serde::{Deserialize, Serialize};

pub const REPORT_SCHEMA_V1: &str = "pest-e2e.v1";

/// Closed set of per-test outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Passed,
    Failed,
    Skipped,
}

impl TestStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "passed" => Some(TestStatus::Passed),
            "failed" => Some(TestStatus::Failed),
            "skipped" => Some(TestStatus::Skipped),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::Passed => "passed",
            TestStatus::Failed => "failed",
            TestStatus::Skipped => "skipped",
        }
    }

    /// Glyph used in console summaries.
    pub fn symbol(&self) -> &'static str {
        match self {
            TestStatus::Passed => "✓",
            TestStatus::Failed => "✗",
            TestStatus::Skipped => "-",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportStats {
    pub passed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestArtifacts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<String>,
    #[serde(default)]
    pub screenshots: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub name: String,
    pub status: TestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TestError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<TestArtifacts>,
}

/// A decoded, schema-checked report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonReport {
    pub schema: String,
    pub target: String,
    pub run_id: String,
    pub stats: ReportStats,
    #[serde(default)]
    pub tests: Vec<TestResult>,
}

/// Condensed view of a failed test for error messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedTest {
    pub name: String,
    pub file: Option<String>,
    pub message: Option<String>,
}

impl JsonReport {
    /// True when either the aggregate counter or any test reports a failure.
    pub fn has_failures(&self) -> bool {
        self.stats.failed > 0 || self.tests.iter().any(|t| t.status == TestStatus::Failed)
    }

    pub fn failed_tests(&self) -> Vec<FailedTest> {
        self.tests
            .iter()
            .filter(|t| t.status == TestStatus::Failed)
            .map(|t| FailedTest {
                name: t.name.clone(),
                file: t.file.clone(),
                message: t.error.as_ref().map(|e| e.message.clone()),
            })
            .collect()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// `passed=N failed=N skipped=N, 1.23s`
    pub fn summary_line(&self) -> String {
        format!(
            "passed={} failed={} skipped={}, {:.2}s",
            self.stats.passed,
            self.stats.failed,
            self.stats.skipped,
            self.stats.duration_ms as f64 / 1000.0
        )
    }
}
