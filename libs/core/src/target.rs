use std::{
    collections::BTreeMap,
    fmt::Display,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::{Deserialize, Serialize};

use crate::{
    error::{BridgeError, TargetConfigError},
    params::{Params, deep_merge},
};

/// Placeholder replaced by the run id inside report paths.
pub const RUN_ID_PLACEHOLDER: &str = "{runId}";

/// Report formats the bridge knows how to read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    #[default]
    Json,
}

impl Display for ReportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportKind::Json => f.write_str("json"),
        }
    }
}

/// An immutable, validated E2E target definition.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetConfig {
    pub name: String,
    pub dir: PathBuf,
    pub command: String,
    pub report_kind: ReportKind,
    /// May contain [`RUN_ID_PLACEHOLDER`]; relative paths resolve against `dir`.
    pub report_path: String,
    pub env: BTreeMap<String, String>,
    pub params: Params,
    pub filter_flag: Option<String>,
}

impl TargetConfig {
    pub fn builder(name: impl Into<String>) -> TargetConfigBuilder {
        TargetConfigBuilder::new(name)
    }

    pub fn supports_filter(&self) -> bool {
        self.filter_flag.is_some()
    }

    /// Resolves the report location for `run_id`.
    pub fn report_path_for(&self, run_id: &str) -> PathBuf {
        let raw = self.report_path.replace(RUN_ID_PLACEHOLDER, run_id);
        let path = Path::new(&raw);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.dir.join(path)
        }
    }
}

/// Fluent builder used by the bridge's target registration hook.
#[derive(Debug, Clone)]
pub struct TargetConfigBuilder {
    name: String,
    dir: Option<PathBuf>,
    command: Option<String>,
    report: Option<(ReportKind, String)>,
    env: BTreeMap<String, String>,
    params: Params,
    filter_flag: Option<String>,
}

impl TargetConfigBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dir: None,
            command: None,
            report: None,
            env: BTreeMap::new(),
            params: Params::new(),
            filter_flag: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    pub fn command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn report(mut self, kind: ReportKind, path: impl Into<String>) -> Self {
        self.report = Some((kind, path.into()));
        self
    }

    pub fn json_report(self, path: impl Into<String>) -> Self {
        self.report(ReportKind::Json, path)
    }

    /// Adds target-level environment defaults; later calls win per key.
    pub fn env<K, V>(mut self, vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Deep-merges target-level parameter defaults.
    pub fn params(mut self, params: Params) -> Self {
        deep_merge(&mut self.params, &params);
        self
    }

    /// CLI flag used to forward a test filter, e.g. `--grep`.
    pub fn filter(mut self, flag: impl Into<String>) -> Self {
        let flag = flag.into();
        let flag = flag.trim();
        self.filter_flag = (!flag.is_empty()).then(|| flag.to_string());
        self
    }

    pub fn build(self) -> Result<TargetConfig, TargetConfigError> {
        if self.name.trim().is_empty() {
            return Err(TargetConfigError::EmptyName);
        }
        let missing = |field| TargetConfigError::MissingField {
            target: self.name.clone(),
            field,
        };
        let dir = self.dir.clone().ok_or_else(|| missing("dir()"))?;
        let command = self
            .command
            .clone()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| missing("command()"))?;
        let (report_kind, report_path) = self
            .report
            .clone()
            .filter(|(_, path)| !path.trim().is_empty())
            .ok_or_else(|| missing("report(type, path)"))?;

        Ok(TargetConfig {
            name: self.name,
            dir,
            command,
            report_kind,
            report_path,
            env: self.env,
            params: self.params,
            filter_flag: self.filter_flag,
        })
    }
}

/// Name-keyed collection of target definitions.
#[derive(Debug, Clone, Default)]
pub struct TargetRegistry {
    targets: BTreeMap<String, Arc<TargetConfig>>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `config`, replacing any target with the same name.
    pub fn put(&mut self, config: TargetConfig) {
        self.targets.insert(config.name.clone(), Arc::new(config));
    }

    pub fn has(&self, name: &str) -> bool {
        self.targets.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Result<Arc<TargetConfig>, BridgeError> {
        self.targets
            .get(name)
            .cloned()
            .ok_or_else(|| BridgeError::UnknownTarget {
                name: name.to_string(),
                known: self.names(),
            })
    }

    pub fn names(&self) -> Vec<String> {
        self.targets.keys().cloned().collect()
    }

    pub fn all(&self) -> impl Iterator<Item = &Arc<TargetConfig>> {
        self.targets.values()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}
