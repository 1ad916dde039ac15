use std::{collections::BTreeMap, path::PathBuf, time::Instant};

use tracing::{info, instrument, warn};

use crate::{
    context::RunContext,
    error::BridgeError,
    params::Params,
    params_file::ParamsFileCleanup,
    plan::{ProcessOptions, ProcessPlanBuilder, shell_quote},
    process::{ProcessResult, SharedProcessRunner},
    report::{JsonReport, JsonReportReader},
    run_id::SharedRunIdGenerator,
    target::TargetRegistry,
};

/// Per-invocation overrides layered on top of the target definition.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub env: BTreeMap<String, String>,
    pub params: Params,
    pub options: ProcessOptions,
    /// Generated when absent.
    pub run_id: Option<String>,
    pub test_filter: Option<String>,
}

/// A JS module export to execute through the call harness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallTarget {
    pub file: String,
    pub export: Option<String>,
}

impl CallTarget {
    /// Accepts `file:export` shorthand when `export` is not given.
    ///
    /// The suffix only counts as an export when both halves are non-empty
    /// and it contains no path separators, so `C:\x.mjs` stays a file.
    pub fn resolve(target: &str, export: Option<&str>) -> Self {
        if let Some(export) = export {
            return Self {
                file: target.to_string(),
                export: Some(export.to_string()),
            };
        }
        match target.rsplit_once(':') {
            Some((file, candidate))
                if !file.is_empty()
                    && !candidate.is_empty()
                    && !candidate.contains(['/', '\\']) =>
            {
                Self {
                    file: file.to_string(),
                    export: Some(candidate.to_string()),
                }
            }
            _ => Self {
                file: target.to_string(),
                export: None,
            },
        }
    }
}

impl std::fmt::Display for CallTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.export {
            Some(export) => write!(f, "{}:{export}", self.file),
            None => f.write_str(&self.file),
        }
    }
}

/// Result of a successful [`E2eRunner::call`].
#[derive(Debug, Clone)]
pub struct CallOutcome {
    pub run_id: String,
    pub call: CallTarget,
    pub process: ProcessResult,
}

/// Orchestrates plan -> process -> report -> verdict for registered targets.
pub struct E2eRunner {
    registry: TargetRegistry,
    plan_builder: ProcessPlanBuilder,
    process_runner: SharedProcessRunner,
    report_reader: JsonReportReader,
    run_ids: SharedRunIdGenerator,
    call_harness: PathBuf,
}

impl E2eRunner {
    pub fn new(
        registry: TargetRegistry,
        plan_builder: ProcessPlanBuilder,
        process_runner: SharedProcessRunner,
        run_ids: SharedRunIdGenerator,
    ) -> Self {
        Self {
            registry,
            plan_builder,
            process_runner,
            report_reader: JsonReportReader::default(),
            run_ids,
            call_harness: PathBuf::from(crate::bridge::DEFAULT_CALL_HARNESS),
        }
    }

    pub fn with_report_reader(mut self, reader: JsonReportReader) -> Self {
        self.report_reader = reader;
        self
    }

    pub fn with_call_harness(mut self, harness: impl Into<PathBuf>) -> Self {
        self.call_harness = harness.into();
        self
    }

    pub fn registry(&self) -> &TargetRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut TargetRegistry {
        &mut self.registry
    }

    pub fn generate_run_id(&self) -> String {
        self.run_ids.generate()
    }

    fn context(&self, target: &str, request: RunRequest) -> Result<RunContext, BridgeError> {
        let target = self.registry.get(target)?;
        let run_id = request
            .run_id
            .unwrap_or_else(|| self.run_ids.generate());
        Ok(RunContext::new(target, run_id)
            .with_env(&request.env)
            .with_params(&request.params)
            .with_test_filter(request.test_filter))
    }

    /// Runs `target` and returns its report when every test passed.
    #[instrument(name = "e2e.run", skip_all, fields(e2e_target = %target))]
    pub fn run(&self, target: &str, request: RunRequest) -> Result<JsonReport, BridgeError> {
        let options = request.options;
        let ctx = self.context(target, request)?;
        let plan = self.plan_builder.build(&ctx, options)?;
        let _cleanup = ParamsFileCleanup::new(plan.params_file());

        info!(run_id = %ctx.run_id, command = %plan.command.command, "running e2e target");
        let result = self.process_runner.run(&plan)?;

        let report = match self.report_reader.read_for_run(&ctx) {
            Ok(report) => report,
            Err(report) if !result.is_successful() => {
                warn!(run_id = %ctx.run_id, exit_code = result.exit_code, "e2e process failed without a readable report");
                return Err(BridgeError::ProcessFailed {
                    exit_code: result.exit_code,
                    command: plan.command.command.clone(),
                    cwd: plan.command.working_dir.clone(),
                    stdout: result.stdout,
                    stderr: result.stderr,
                    report,
                });
            }
            Err(report) => return Err(report.into()),
        };

        if report.has_failures() {
            warn!(run_id = %ctx.run_id, failed = report.stats.failed, "e2e target reported failures");
            return Err(BridgeError::TestFailures {
                target: ctx.target.name.clone(),
                run_id: ctx.run_id.clone(),
                failures: report.failed_tests(),
            });
        }
        if !result.is_successful() {
            warn!(run_id = %ctx.run_id, exit_code = result.exit_code, "e2e process exited non-zero but its report is clean");
        }

        info!(
            run_id = %ctx.run_id,
            exit_code = result.exit_code,
            duration_ms = result.duration.as_millis() as u64,
            summary = %report.summary_line(),
            "e2e target passed"
        );
        Ok(report)
    }

    /// Executes a JS export through the call harness in the target's dir.
    #[instrument(name = "e2e.call", skip_all, fields(e2e_target = %target))]
    pub fn call(
        &self,
        target: &str,
        call: CallTarget,
        request: RunRequest,
    ) -> Result<CallOutcome, BridgeError> {
        let options = request.options;
        let ctx = self.context(target, request)?;
        // child cwd is the target dir
        let harness =
            std::path::absolute(&self.call_harness).unwrap_or_else(|_| self.call_harness.clone());
        if !harness.is_file() {
            return Err(BridgeError::HarnessMissing(harness));
        }

        let mut command = format!(
            "node {} {}",
            shell_quote(&harness.display().to_string())?,
            shell_quote(&call.file)?
        );
        if let Some(export) = &call.export {
            command.push(' ');
            command.push_str(&shell_quote(export)?);
        }

        let started = Instant::now();
        let plan = self.plan_builder.build_command(&ctx, command, options)?;
        let _cleanup = ParamsFileCleanup::new(plan.params_file());

        info!(run_id = %ctx.run_id, call = %call, "calling e2e export");
        let result = self.process_runner.run(&plan)?;
        if !result.is_successful() {
            warn!(run_id = %ctx.run_id, exit_code = result.exit_code, "e2e call failed");
            return Err(BridgeError::CallFailed {
                exit_code: result.exit_code,
                call: call.to_string(),
                command: plan.command.command.clone(),
                cwd: plan.command.working_dir.clone(),
                stdout: result.stdout,
                stderr: result.stderr,
            });
        }

        info!(
            run_id = %ctx.run_id,
            duration_ms = started.elapsed().as_millis() as u64,
            "e2e call finished"
        );
        Ok(CallOutcome {
            run_id: ctx.run_id,
            call,
            process: result,
        })
    }
}
