use std::path::PathBuf;

use tracing::debug;

use super::{JsonReport, JsonReportParser, ReportError};
use crate::context::RunContext;

/// Loads the report belonging to a specific run and rejects stale ones.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonReportReader {
    parser: JsonReportParser,
}

impl JsonReportReader {
    pub fn new(parser: JsonReportParser) -> Self {
        Self { parser }
    }

    pub fn report_path(&self, ctx: &RunContext) -> PathBuf {
        ctx.target.report_path_for(&ctx.run_id)
    }

    pub fn read_for_run(&self, ctx: &RunContext) -> Result<JsonReport, ReportError> {
        let path = self.report_path(ctx);
        debug!(path = %path.display(), "reading e2e report");
        let report = self.parser.parse_file(&path)?;

        if report.target != ctx.target.name {
            return Err(ReportError::Mismatch {
                field: "target",
                expected: ctx.target.name.clone(),
                actual: report.target,
                path,
            });
        }
        if report.run_id != ctx.run_id {
            return Err(ReportError::Mismatch {
                field: "runId",
                expected: ctx.run_id.clone(),
                actual: report.run_id,
                path,
            });
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::TargetConfig;
    use serde_json::json;
    use std::{fs, sync::Arc};

    fn context(dir: &std::path::Path, run_id: &str) -> RunContext {
        let target = TargetConfig::builder("frontend")
            .dir(dir)
            .command("true")
            .json_report("out/{runId}.json")
            .build()
            .unwrap();
        RunContext::new(Arc::new(target), run_id)
    }

    fn write_report(dir: &std::path::Path, file_run_id: &str, target: &str, run_id: &str) {
        let out = dir.join("out");
        fs::create_dir_all(&out).unwrap();
        let doc = json!({
            "schema": "pest-e2e.v1",
            "target": target,
            "runId": run_id,
            "stats": {"passed": 1, "failed": 0, "skipped": 0, "durationMs": 1}
        });
        fs::write(out.join(format!("{file_run_id}.json")), doc.to_string()).unwrap();
    }

    #[test]
    fn resolves_relative_path_against_target_dir() {
        let tmp = tempfile::tempdir().unwrap();
        write_report(tmp.path(), "r1", "frontend", "r1");
        let report = JsonReportReader::default()
            .read_for_run(&context(tmp.path(), "r1"))
            .unwrap();
        assert_eq!(report.run_id, "r1");
    }

    #[test]
    fn stale_run_id_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        write_report(tmp.path(), "r2", "frontend", "r1");
        let err = JsonReportReader::default()
            .read_for_run(&context(tmp.path(), "r2"))
            .unwrap_err();
        let path = tmp.path().join("out").join("r2.json");
        assert_eq!(
            err.to_string(),
            format!(
                "JSON report runId mismatch in {}: expected r2, got r1",
                path.display()
            )
        );
    }

    #[test]
    fn foreign_target_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        write_report(tmp.path(), "r1", "admin", "r1");
        let err = JsonReportReader::default()
            .read_for_run(&context(tmp.path(), "r1"))
            .unwrap_err();
        assert!(matches!(
            &err,
            ReportError::Mismatch { path, .. } if path.ends_with("out/r1.json")
        ));
        assert!(
            err.to_string()
                .ends_with("r1.json: expected frontend, got admin")
        );
    }
}
