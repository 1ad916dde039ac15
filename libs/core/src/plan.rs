use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Duration,
};

use tracing::debug;

use crate::{
    context::RunContext,
    error::BridgeError,
    params::ParamsPayload,
    params_file::SharedParamsFileWriter,
};

pub const TARGET_ENV: &str = "PEST_E2E_TARGET";
pub const RUN_ID_ENV: &str = "PEST_E2E_RUN_ID";
pub const PARAMS_ENV: &str = "PEST_E2E_PARAMS";
pub const PARAMS_FILE_ENV: &str = "PEST_E2E_PARAMS_FILE";

/// Encoded payloads up to this many bytes travel through the environment.
pub const DEFAULT_MAX_INLINE_BYTES: usize = 8 * 1024;

/// Per-invocation process settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessOptions {
    /// `None` lets the process run to completion.
    pub timeout: Option<Duration>,
    /// Attach the child to the parent's terminal when one is available.
    pub inherit_tty: bool,
}

impl ProcessOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_inherit_tty(mut self, inherit_tty: bool) -> Self {
        self.inherit_tty = inherit_tty;
        self
    }
}

/// Shell command line plus its environment layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessCommand {
    pub command: String,
    pub working_dir: PathBuf,
    /// User-level variables (target defaults plus per-run overrides).
    pub env: BTreeMap<String, String>,
    /// Bridge-managed variables; these win over `env` on collision.
    pub injected_env: BTreeMap<String, String>,
}

impl ProcessCommand {
    pub fn new(
        command: impl Into<String>,
        working_dir: impl Into<PathBuf>,
        env: BTreeMap<String, String>,
    ) -> Self {
        Self {
            command: command.into(),
            working_dir: working_dir.into(),
            env,
            injected_env: BTreeMap::new(),
        }
    }

    pub fn with_injected_env<K, V>(mut self, vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.injected_env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Environment the child actually sees on top of the host environment.
    pub fn merged_env(&self) -> BTreeMap<String, String> {
        let mut env = self.env.clone();
        env.extend(
            self.injected_env
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        env
    }
}

/// How the params payload reaches the child. Never both.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ParamsDelivery {
    #[default]
    None,
    Inline(String),
    File(PathBuf),
}

/// Fully resolved, ready-to-execute invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessPlan {
    pub command: ProcessCommand,
    pub options: ProcessOptions,
    pub params: Option<ParamsPayload>,
    pub delivery: ParamsDelivery,
}

impl ProcessPlan {
    pub fn uses_params_inline(&self) -> bool {
        matches!(self.delivery, ParamsDelivery::Inline(_))
    }

    pub fn uses_params_file(&self) -> bool {
        matches!(self.delivery, ParamsDelivery::File(_))
    }

    pub fn params_file(&self) -> Option<&Path> {
        match &self.delivery {
            ParamsDelivery::File(path) => Some(path),
            _ => None,
        }
    }
}

/// Turns a [`RunContext`] into a [`ProcessPlan`].
#[derive(Clone)]
pub struct ProcessPlanBuilder {
    writer: SharedParamsFileWriter,
    max_inline_bytes: usize,
}

impl ProcessPlanBuilder {
    pub fn new(writer: SharedParamsFileWriter) -> Self {
        Self {
            writer,
            max_inline_bytes: DEFAULT_MAX_INLINE_BYTES,
        }
    }

    pub fn with_max_inline_bytes(mut self, max_inline_bytes: usize) -> Self {
        self.max_inline_bytes = max_inline_bytes;
        self
    }

    pub fn max_inline_bytes(&self) -> usize {
        self.max_inline_bytes
    }

    /// Plans the target's own command, forwarding the context's test filter.
    pub fn build(
        &self,
        ctx: &RunContext,
        options: ProcessOptions,
    ) -> Result<ProcessPlan, BridgeError> {
        let mut command = ctx.target.command.clone();
        if let Some(filter) = ctx.normalized_filter() {
            let flag = ctx
                .target
                .filter_flag
                .as_deref()
                .ok_or_else(|| BridgeError::FilterUnsupported {
                    target: ctx.target.name.clone(),
                })?;
            command = format!("{command} {flag} {}", shell_quote(filter)?);
        }
        self.build_command(ctx, command, options)
    }

    /// Plans an arbitrary command line in the target's directory and env.
    pub fn build_command(
        &self,
        ctx: &RunContext,
        command: String,
        options: ProcessOptions,
    ) -> Result<ProcessPlan, BridgeError> {
        let command = ProcessCommand::new(command, &ctx.target.dir, ctx.env.clone())
            .with_injected_env([
                (TARGET_ENV, ctx.target.name.as_str()),
                (RUN_ID_ENV, ctx.run_id.as_str()),
            ]);

        if ctx.params.is_empty() {
            return Ok(ProcessPlan {
                command,
                options,
                params: None,
                delivery: ParamsDelivery::None,
            });
        }

        let payload = ParamsPayload::new(&ctx.target.name, &ctx.run_id, ctx.params.clone());
        let json = payload
            .to_json()
            .map_err(|error| BridgeError::ParamsEncode {
                target: ctx.target.name.clone(),
                error,
            })?;

        let (command, delivery) = if json.len() <= self.max_inline_bytes {
            debug!(bytes = json.len(), "passing params inline");
            (
                command.with_injected_env([(PARAMS_ENV, json.as_str())]),
                ParamsDelivery::Inline(json),
            )
        } else {
            let path = self.writer.write(&payload.target, &payload.run_id, &json)?;
            debug!(bytes = json.len(), path = %path.display(), "passing params through file");
            (
                command.with_injected_env([(PARAMS_FILE_ENV, path.display().to_string())]),
                ParamsDelivery::File(path),
            )
        };

        Ok(ProcessPlan {
            command,
            options,
            params: Some(payload),
            delivery,
        })
    }
}

/// Quotes `value` as a single word for the platform shell.
pub fn shell_quote(value: &str) -> Result<String, BridgeError> {
    if cfg!(windows) {
        quote_for_cmd(value)
    } else {
        Ok(quote_for_sh(value))
    }
}

pub fn quote_for_sh(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// `cmd.exe` expands `%` and `!` even inside double quotes and has no escape
/// for `"` there, so such values are refused rather than altered.
pub fn quote_for_cmd(value: &str) -> Result<String, BridgeError> {
    let unsafe_char = |reason| BridgeError::UnsafeArgument {
        value: value.to_string(),
        reason,
    };
    if value.contains('"') {
        return Err(unsafe_char("double quotes cannot be escaped for cmd.exe"));
    }
    if value.contains(['%', '!']) {
        return Err(unsafe_char("cmd.exe would expand % or ! inside the argument"));
    }
    if value.contains(['\r', '\n', '\0']) {
        return Err(unsafe_char("line breaks and NUL end a cmd.exe command"));
    }
    // a trailing backslash would escape the closing quote
    let trailing = value.len() - value.trim_end_matches('\\').len();
    Ok(format!("\"{value}{}\"", "\\".repeat(trailing)))
}
