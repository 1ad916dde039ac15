use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Free-form parameters handed to the external runner.
pub type Params = Map<String, Value>;

/// Recursively merges `overrides` into `base`.
///
/// Objects merge key by key; any other value (scalars, arrays, null) in
/// `overrides` replaces whatever `base` held at that key.
pub fn deep_merge(base: &mut Params, overrides: &Params) {
    for (key, value) in overrides {
        match (base.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                deep_merge(existing, incoming);
            }
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Non-mutating variant of [`deep_merge`].
pub fn merged(base: &Params, overrides: &Params) -> Params {
    let mut out = base.clone();
    deep_merge(&mut out, overrides);
    out
}

/// Envelope delivered to the external process through `PEST_E2E_PARAMS`
/// or the params file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParamsPayload {
    pub target: String,
    pub run_id: String,
    pub params: Params,
}

impl ParamsPayload {
    pub fn new(target: impl Into<String>, run_id: impl Into<String>, params: Params) -> Self {
        Self {
            target: target.into(),
            run_id: run_id.into(),
            params,
        }
    }

    /// Compact JSON; non-ASCII text and slashes are emitted unescaped.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
