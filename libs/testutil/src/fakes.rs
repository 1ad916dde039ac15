use std::{
    fs,
    path::PathBuf,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use e2e_auth::{Authenticatable, TokenIssuer, UserId};
use e2e_core::{
    BridgeError, ParamsDelivery, ParamsFileWriter, ProcessPlan, ProcessResult, ProcessRunner,
    RunIdGenerator, TempParamsFileWriter,
};

/// Always hands out the same run id.
#[derive(Debug, Clone)]
pub struct FixedRunIdGenerator(pub String);

impl FixedRunIdGenerator {
    pub fn new(run_id: &str) -> Self {
        Self(run_id.to_string())
    }
}

impl RunIdGenerator for FixedRunIdGenerator {
    fn generate(&self) -> String {
        self.0.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenParams {
    pub target: String,
    pub run_id: String,
    pub json: String,
    pub path: PathBuf,
}

/// Writes real files through [`TempParamsFileWriter`] and remembers each write.
#[derive(Debug)]
pub struct RecordingParamsFileWriter {
    inner: TempParamsFileWriter,
    writes: Mutex<Vec<WrittenParams>>,
}

impl RecordingParamsFileWriter {
    pub fn new(base_dir: PathBuf) -> Self {
        Self {
            inner: TempParamsFileWriter::new(Some(base_dir)),
            writes: Mutex::new(Vec::new()),
        }
    }

    pub fn writes(&self) -> Vec<WrittenParams> {
        self.writes.lock().unwrap().clone()
    }
}

impl ParamsFileWriter for RecordingParamsFileWriter {
    fn write(&self, target: &str, run_id: &str, json: &str) -> Result<PathBuf, BridgeError> {
        let path = self.inner.write(target, run_id, json)?;
        self.writes.lock().unwrap().push(WrittenParams {
            target: target.to_string(),
            run_id: run_id.to_string(),
            json: json.to_string(),
            path: path.clone(),
        });
        Ok(path)
    }
}

/// Process runner that never spawns anything.
///
/// It records every plan, snapshots the params payload the child would have
/// seen (inline JSON or params file contents) and optionally drops a report
/// file before returning the scripted result.
#[derive(Debug, Default)]
pub struct StubProcessRunner {
    exit_code: i32,
    stdout: String,
    stderr: String,
    report: Option<(PathBuf, String)>,
    plans: Mutex<Vec<ProcessPlan>>,
    params_seen: Mutex<Vec<Option<String>>>,
}

impl StubProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exit_code(mut self, exit_code: i32) -> Self {
        self.exit_code = exit_code;
        self
    }

    pub fn stdout(mut self, stdout: &str) -> Self {
        self.stdout = stdout.to_string();
        self
    }

    pub fn stderr(mut self, stderr: &str) -> Self {
        self.stderr = stderr.to_string();
        self
    }

    pub fn writes_report(mut self, path: PathBuf, json: String) -> Self {
        self.report = Some((path, json));
        self
    }

    pub fn plans(&self) -> Vec<ProcessPlan> {
        self.plans.lock().unwrap().clone()
    }

    pub fn params_seen(&self) -> Vec<Option<String>> {
        self.params_seen.lock().unwrap().clone()
    }
}

impl ProcessRunner for StubProcessRunner {
    fn run(&self, plan: &ProcessPlan) -> Result<ProcessResult, BridgeError> {
        let seen = match &plan.delivery {
            ParamsDelivery::None => None,
            ParamsDelivery::Inline(json) => Some(json.clone()),
            ParamsDelivery::File(path) => fs::read_to_string(path).ok(),
        };
        self.params_seen.lock().unwrap().push(seen);
        self.plans.lock().unwrap().push(plan.clone());

        if let Some((path, json)) = &self.report {
            if let Some(parent) = path.parent() {
                let _ = fs::create_dir_all(parent);
            }
            let _ = fs::write(path, json);
        }

        Ok(ProcessResult {
            exit_code: self.exit_code,
            stdout: self.stdout.clone(),
            stderr: self.stderr.clone(),
            duration: Duration::from_millis(1),
            timed_out: false,
        })
    }
}

/// User double; token issuance is opt-in.
#[derive(Debug)]
pub struct FakeUser {
    pub id: UserId,
    pub tokens: bool,
    issued: AtomicUsize,
}

impl FakeUser {
    pub fn new(id: impl Into<UserId>) -> Self {
        Self {
            id: id.into(),
            tokens: false,
            issued: AtomicUsize::new(0),
        }
    }

    pub fn with_tokens(mut self) -> Self {
        self.tokens = true;
        self
    }

    pub fn tokens_issued(&self) -> usize {
        self.issued.load(Ordering::SeqCst)
    }
}

impl Authenticatable for FakeUser {
    fn auth_identifier(&self) -> UserId {
        self.id.clone()
    }

    fn token_issuer(&self) -> Option<&dyn TokenIssuer> {
        self.tokens.then_some(self as &dyn TokenIssuer)
    }
}

impl TokenIssuer for FakeUser {
    fn create_token(&self, name: &str) -> anyhow::Result<String> {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("{n}|{name}-{}", self.id))
    }
}
