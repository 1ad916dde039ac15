use std::{collections::BTreeMap, sync::Arc};

use crate::{
    params::{Params, deep_merge},
    target::TargetConfig,
};

/// Everything needed to plan a single invocation of a target.
///
/// `env` and `params` already contain the target defaults with per-run
/// overrides applied on top.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub target: Arc<TargetConfig>,
    pub run_id: String,
    pub env: BTreeMap<String, String>,
    pub params: Params,
    pub test_filter: Option<String>,
}

impl RunContext {
    pub fn new(target: Arc<TargetConfig>, run_id: impl Into<String>) -> Self {
        let env = target.env.clone();
        let params = target.params.clone();
        Self {
            target,
            run_id: run_id.into(),
            env,
            params,
            test_filter: None,
        }
    }

    pub fn with_env(mut self, env: &BTreeMap<String, String>) -> Self {
        self.env
            .extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn with_params(mut self, params: &Params) -> Self {
        deep_merge(&mut self.params, params);
        self
    }

    pub fn with_test_filter(mut self, filter: Option<String>) -> Self {
        self.test_filter = filter;
        self
    }

    /// The filter to forward, or `None` when it is absent or whitespace-only.
    pub fn normalized_filter(&self) -> Option<&str> {
        self.test_filter
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn target() -> Arc<TargetConfig> {
        Arc::new(
            TargetConfig::builder("frontend")
                .dir("/app")
                .command("npm test")
                .json_report("r.json")
                .env([("BASE_URL", "http://a"), ("MODE", "ci")])
                .params(json!({"flags": {"a": 1, "b": 2}}).as_object().cloned().unwrap())
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn overrides_layer_on_target_defaults() {
        let ctx = RunContext::new(target(), "r1")
            .with_env(&BTreeMap::from([("MODE".to_string(), "local".to_string())]))
            .with_params(json!({"flags": {"b": 3}}).as_object().unwrap());
        assert_eq!(ctx.env["BASE_URL"], "http://a");
        assert_eq!(ctx.env["MODE"], "local");
        assert_eq!(ctx.params["flags"], json!({"a": 1, "b": 3}));
    }

    #[test]
    fn whitespace_filter_is_ignored() {
        let ctx = RunContext::new(target(), "r1").with_test_filter(Some("   ".into()));
        assert_eq!(ctx.normalized_filter(), None);
        let ctx = ctx.with_test_filter(Some("  checkout  ".into()));
        assert_eq!(ctx.normalized_filter(), Some("checkout"));
    }
}
