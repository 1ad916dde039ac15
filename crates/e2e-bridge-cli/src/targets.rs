use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use e2e_core::{BridgeConfig, E2eBridge, Params, ReportKind};
use serde::Deserialize;

/// Top-level shape of a targets file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetsFile {
    #[serde(default)]
    pub targets: BTreeMap<String, TargetSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetSpec {
    /// Relative to the targets file.
    pub dir: PathBuf,
    pub command: String,
    /// Report path, may contain `{runId}`.
    pub report: String,
    #[serde(default)]
    pub report_type: ReportKind,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub params: Params,
    /// Flag used to forward a test filter, e.g. `--grep`.
    #[serde(default)]
    pub filter: Option<String>,
}

impl TargetsFile {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading targets file {}", path.display()))?;
        let file: TargetsFile = serde_yaml::from_str(&raw)
            .with_context(|| format!("parsing targets file {}", path.display()))?;
        if file.targets.is_empty() {
            bail!("targets file {} defines no targets", path.display());
        }
        Ok(file)
    }

    /// Registers every target on a fresh bridge, resolving dirs against `base`.
    pub fn into_bridge(self, config: BridgeConfig, base: &Path) -> Result<E2eBridge> {
        let mut bridge = E2eBridge::new(config);
        for (name, spec) in self.targets {
            let dir = if spec.dir.is_absolute() {
                spec.dir
            } else {
                base.join(spec.dir)
            };
            bridge
                .target(&name, |builder| {
                    let builder = builder
                        .dir(dir)
                        .command(spec.command)
                        .report(spec.report_type, spec.report)
                        .env(spec.env)
                        .params(spec.params);
                    match spec.filter {
                        Some(flag) => builder.filter(flag),
                        None => builder,
                    }
                })
                .with_context(|| format!("target `{name}`"))?;
        }
        Ok(bridge)
    }
}

/// Parses `key=value`; values that read as JSON keep their type.
pub fn parse_param(raw: &str) -> Result<(String, serde_json::Value)> {
    let Some((key, value)) = raw.split_once('=') else {
        bail!("expected key=value, got `{raw}`");
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("empty parameter name in `{raw}`");
    }
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// Loads a JSON or YAML object of params.
pub fn load_params_file(path: &Path) -> Result<Params> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading params file {}", path.display()))?;
    let value: serde_json::Value = match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml" | "yml") => serde_yaml::from_str(&raw)
            .with_context(|| format!("parsing params file {}", path.display()))?,
        _ => serde_json::from_str(&raw)
            .with_context(|| format!("parsing params file {}", path.display()))?,
    };
    match value {
        serde_json::Value::Object(map) => Ok(map),
        _ => bail!("params file {} must contain an object", path.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TARGETS: &str = r#"
targets:
  frontend:
    dir: web
    command: npx playwright test
    report: reports/{runId}.json
    filter: --grep
    env:
      CI: "1"
    params:
      baseUrl: http://localhost:8000
  worker:
    dir: /srv/worker
    command: node run.mjs
    report: out.json
"#;

    #[test]
    fn registers_targets_relative_to_the_file() {
        let file: TargetsFile = serde_yaml::from_str(TARGETS).unwrap();
        let bridge = file
            .into_bridge(BridgeConfig::default(), Path::new("/project"))
            .unwrap();
        let registry = bridge.registry();
        assert_eq!(registry.names(), vec!["frontend", "worker"]);

        let frontend = registry.get("frontend").unwrap();
        assert_eq!(frontend.dir, PathBuf::from("/project/web"));
        assert!(frontend.supports_filter());
        assert_eq!(frontend.params["baseUrl"], json!("http://localhost:8000"));
        assert_eq!(frontend.env["CI"], "1");

        let worker = registry.get("worker").unwrap();
        assert_eq!(worker.dir, PathBuf::from("/srv/worker"));
        assert!(!worker.supports_filter());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = serde_yaml::from_str::<TargetsFile>("targets: {}\nprojects: {}\n");
        assert!(err.is_err());
    }

    #[test]
    fn params_keep_json_types() {
        assert_eq!(parse_param("retries=3").unwrap(), ("retries".into(), json!(3)));
        assert_eq!(
            parse_param("user=ada").unwrap(),
            ("user".into(), json!("ada"))
        );
        assert_eq!(
            parse_param("flags={\"a\":true}").unwrap().1,
            json!({"a": true})
        );
        assert!(parse_param("novalue").is_err());
        assert!(parse_param("=x").is_err());
    }

    #[test]
    fn params_file_accepts_yaml_objects_only() {
        let tmp = tempfile::tempdir().unwrap();
        let yaml = tmp.path().join("params.yaml");
        std::fs::write(&yaml, "locale: en\ncart:\n  items: 2\n").unwrap();
        let params = load_params_file(&yaml).unwrap();
        assert_eq!(params["cart"], json!({"items": 2}));

        let list = tmp.path().join("params.json");
        std::fs::write(&list, "[1, 2]").unwrap();
        assert!(load_params_file(&list).is_err());
    }
}
