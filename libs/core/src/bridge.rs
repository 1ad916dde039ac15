use std::{collections::BTreeMap, path::PathBuf, sync::Arc};

use e2e_auth::{
    AuthMode, Authenticatable, DEFAULT_GUARD, NullAuthTicketIssuer, SharedAuthTicketIssuer,
};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::{
    error::BridgeError,
    params::{Params, deep_merge, merged},
    params_file::{SharedParamsFileWriter, TempParamsFileWriter},
    plan::{DEFAULT_MAX_INLINE_BYTES, ProcessOptions, ProcessPlanBuilder},
    process::{SharedProcessRunner, ShellProcessRunner},
    report::JsonReport,
    run_id::{RandomRunIdGenerator, SharedRunIdGenerator},
    runner::{CallOutcome, CallTarget, E2eRunner, RunRequest},
    target::{TargetConfigBuilder, TargetRegistry},
};

/// Where `publish` drops the call harness inside a host project.
pub const DEFAULT_CALL_HARNESS: &str = "resources/js/pest-e2e/call.mjs";

/// Bridge-level settings.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub max_inline_bytes: usize,
    /// Base directory for spilled params files; system temp dir when `None`.
    pub params_dir: Option<PathBuf>,
    pub call_harness: PathBuf,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            max_inline_bytes: DEFAULT_MAX_INLINE_BYTES,
            params_dir: None,
            call_harness: PathBuf::from(DEFAULT_CALL_HARNESS),
        }
    }
}

impl BridgeConfig {
    /// Reads `PEST_E2E_MAX_INLINE_BYTES`, `PEST_E2E_PARAMS_DIR` and
    /// `PEST_E2E_CALL_HARNESS`, keeping defaults for unset or invalid values.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(bytes) = std::env::var("PEST_E2E_MAX_INLINE_BYTES")
            .ok()
            .and_then(|raw| raw.trim().parse::<usize>().ok())
        {
            cfg.max_inline_bytes = bytes;
        }
        if let Ok(dir) = std::env::var("PEST_E2E_PARAMS_DIR")
            && !dir.trim().is_empty()
        {
            cfg.params_dir = Some(PathBuf::from(dir));
        }
        if let Ok(harness) = std::env::var("PEST_E2E_CALL_HARNESS")
            && !harness.trim().is_empty()
        {
            cfg.call_harness = PathBuf::from(harness);
        }
        cfg
    }
}

/// Composition root: owns the target registry and every collaborator.
///
/// Construct one per test process (or per suite) and hand out
/// [`TargetHandle`]s from it.
pub struct E2eBridge {
    runner: E2eRunner,
    issuer: SharedAuthTicketIssuer,
}

impl E2eBridge {
    pub fn new(config: BridgeConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: BridgeConfig) -> E2eBridgeBuilder {
        E2eBridgeBuilder::new(config)
    }

    /// Registers a target configured through `configure`.
    pub fn target<F>(&mut self, name: &str, configure: F) -> Result<(), BridgeError>
    where
        F: FnOnce(TargetConfigBuilder) -> TargetConfigBuilder,
    {
        let config = configure(TargetConfigBuilder::new(name)).build()?;
        debug!(e2e_target = %config.name, "registered e2e target");
        self.runner.registry_mut().put(config);
        Ok(())
    }

    /// Handle for running a registered target; fails for unknown names.
    pub fn handle(&self, name: &str) -> Result<TargetHandle<'_>, BridgeError> {
        self.runner.registry().get(name)?;
        Ok(TargetHandle {
            bridge: self,
            target: name.to_string(),
            env: BTreeMap::new(),
            params: Params::new(),
            options: ProcessOptions::default(),
            test_filter: None,
        })
    }

    pub fn registry(&self) -> &TargetRegistry {
        self.runner.registry()
    }

    pub fn runner(&self) -> &E2eRunner {
        &self.runner
    }

    pub fn auth_ticket_issuer(&self) -> &SharedAuthTicketIssuer {
        &self.issuer
    }
}

/// Swaps individual collaborators before building an [`E2eBridge`].
pub struct E2eBridgeBuilder {
    config: BridgeConfig,
    registry: TargetRegistry,
    params_writer: Option<SharedParamsFileWriter>,
    process_runner: SharedProcessRunner,
    run_ids: SharedRunIdGenerator,
    issuer: SharedAuthTicketIssuer,
}

impl E2eBridgeBuilder {
    fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            registry: TargetRegistry::new(),
            params_writer: None,
            process_runner: Arc::new(ShellProcessRunner),
            run_ids: Arc::new(RandomRunIdGenerator),
            issuer: Arc::new(NullAuthTicketIssuer),
        }
    }

    pub fn registry(mut self, registry: TargetRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn params_writer(mut self, writer: SharedParamsFileWriter) -> Self {
        self.params_writer = Some(writer);
        self
    }

    pub fn process_runner(mut self, runner: SharedProcessRunner) -> Self {
        self.process_runner = runner;
        self
    }

    pub fn run_ids(mut self, run_ids: SharedRunIdGenerator) -> Self {
        self.run_ids = run_ids;
        self
    }

    pub fn auth_ticket_issuer(mut self, issuer: SharedAuthTicketIssuer) -> Self {
        self.issuer = issuer;
        self
    }

    pub fn build(self) -> E2eBridge {
        let writer = self.params_writer.unwrap_or_else(|| {
            Arc::new(TempParamsFileWriter::new(self.config.params_dir.clone()))
        });
        let plan_builder =
            ProcessPlanBuilder::new(writer).with_max_inline_bytes(self.config.max_inline_bytes);
        let runner = E2eRunner::new(self.registry, plan_builder, self.process_runner, self.run_ids)
            .with_call_harness(self.config.call_harness);
        E2eBridge {
            runner,
            issuer: self.issuer,
        }
    }
}

/// Options for [`TargetHandle::acting_as`].
#[derive(Debug, Clone)]
pub struct AuthOptions {
    pub guard: String,
    pub mode: AuthMode,
    pub meta: Map<String, Value>,
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self {
            guard: DEFAULT_GUARD.to_string(),
            mode: AuthMode::Session,
            meta: Map::new(),
        }
    }
}

impl AuthOptions {
    pub fn guard(mut self, guard: impl Into<String>) -> Self {
        self.guard = guard.into();
        self
    }

    pub fn mode(mut self, mode: AuthMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn meta(mut self, meta: Map<String, Value>) -> Self {
        self.meta = meta;
        self
    }
}

/// Per-run view of a registered target. Every `with_*` call returns a new
/// handle; the original is untouched.
#[derive(Clone)]
pub struct TargetHandle<'a> {
    bridge: &'a E2eBridge,
    target: String,
    env: BTreeMap<String, String>,
    params: Params,
    options: ProcessOptions,
    test_filter: Option<String>,
}

impl<'a> TargetHandle<'a> {
    pub fn name(&self) -> &str {
        &self.target
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn with_env<K, V>(&self, vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut next = self.clone();
        next.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        next
    }

    pub fn with_params(&self, params: &Params) -> Self {
        let mut next = self.clone();
        next.params = merged(&self.params, params);
        next
    }

    pub fn with_options(&self, options: ProcessOptions) -> Self {
        let mut next = self.clone();
        next.options = options;
        next
    }

    /// Restricts the run to tests matching `test_name`.
    pub fn only(&self, test_name: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.test_filter = Some(test_name.into());
        next
    }

    /// Issues a single-use auth ticket for `user` and embeds it in the
    /// params under `auth`.
    pub fn acting_as(
        &self,
        user: &dyn Authenticatable,
        options: AuthOptions,
    ) -> Result<Self, BridgeError> {
        let mut issue_meta = Map::new();
        issue_meta.insert("guard".into(), Value::String(options.guard.clone()));
        issue_meta.insert("meta".into(), Value::Object(options.meta.clone()));
        let ticket = self.bridge.issuer.issue_for_user(user, &issue_meta)?;

        let mut auth = json!({
            "ticket": ticket,
            "mode": options.mode.as_str(),
            "guard": options.guard,
        });
        if !options.meta.is_empty() {
            auth["meta"] = Value::Object(options.meta);
        }
        let mut overlay = Params::new();
        overlay.insert("auth".into(), auth);
        Ok(self.with_params(&overlay))
    }

    pub fn login_as(
        &self,
        user: &dyn Authenticatable,
        options: AuthOptions,
    ) -> Result<Self, BridgeError> {
        self.acting_as(user, options)
    }

    fn request(&self) -> RunRequest {
        RunRequest {
            env: self.env.clone(),
            params: self.params.clone(),
            options: self.options,
            run_id: None,
            test_filter: self.test_filter.clone(),
        }
    }

    /// Runs the suite; errors on process, report or test failures.
    pub fn run(&self) -> Result<JsonReport, BridgeError> {
        self.bridge.runner.run(&self.target, self.request())
    }

    /// Shorthand for `only(test_name).run()`.
    pub fn run_test(&self, test_name: impl Into<String>) -> Result<JsonReport, BridgeError> {
        self.only(test_name).run()
    }

    /// Runs a standalone JS export; `file:export` shorthand is accepted
    /// when `export` is `None`.
    pub fn call(
        &self,
        file: &str,
        export: Option<&str>,
        params: &Params,
    ) -> Result<CallOutcome, BridgeError> {
        let mut request = self.request();
        deep_merge(&mut request.params, params);
        request.test_filter = None;
        self.bridge
            .runner
            .call(&self.target, CallTarget::resolve(file, export), request)
    }
}
