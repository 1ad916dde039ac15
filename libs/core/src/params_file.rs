use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::{debug, warn};

use crate::error::BridgeError;

const PARAMS_SUBDIR: &str = "pest-e2e";

/// Persists oversized params payloads for the child to read.
pub trait ParamsFileWriter: Send + Sync {
    /// Writes `json` and returns the absolute path of the file.
    fn write(&self, target: &str, run_id: &str, json: &str) -> Result<PathBuf, BridgeError>;
}

pub type SharedParamsFileWriter = Arc<dyn ParamsFileWriter>;

/// Writes `<base>/pest-e2e/<target>/<runId>.json`, defaulting `base` to the
/// system temp dir.
#[derive(Debug, Clone, Default)]
pub struct TempParamsFileWriter {
    base_dir: Option<PathBuf>,
}

impl TempParamsFileWriter {
    pub fn new(base_dir: Option<PathBuf>) -> Self {
        Self { base_dir }
    }

    pub fn base_dir(&self) -> PathBuf {
        self.base_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl ParamsFileWriter for TempParamsFileWriter {
    fn write(&self, target: &str, run_id: &str, json: &str) -> Result<PathBuf, BridgeError> {
        let base = std::path::absolute(self.base_dir()).unwrap_or_else(|_| self.base_dir());
        let dir = base
            .join(PARAMS_SUBDIR)
            .join(sanitize_component(target));
        fs::create_dir_all(&dir).map_err(|error| BridgeError::ParamsDir {
            path: dir.clone(),
            error,
        })?;

        let path = dir.join(format!("{}.json", sanitize_component(run_id)));
        fs::write(&path, json).map_err(|error| BridgeError::ParamsWrite {
            path: path.clone(),
            error,
        })?;
        debug!(path = %path.display(), "wrote params file");
        Ok(path)
    }
}

/// Collapses every run of characters outside `[A-Za-z0-9._-]` into `-`.
pub fn sanitize_component(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut in_run = false;
    for ch in value.chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
            out.push(ch);
            in_run = false;
        } else if !in_run {
            out.push('-');
            in_run = true;
        }
    }
    if out.is_empty() || out == "." || out == ".." {
        return "target".to_string();
    }
    out
}

/// Removes a params file when dropped, on success and failure paths alike.
#[derive(Debug, Default)]
pub struct ParamsFileCleanup {
    path: Option<PathBuf>,
}

impl ParamsFileCleanup {
    pub fn new(path: Option<&Path>) -> Self {
        Self {
            path: path.map(Path::to_path_buf),
        }
    }
}

impl Drop for ParamsFileCleanup {
    fn drop(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        match fs::remove_file(&path) {
            Ok(()) => debug!(path = %path.display(), "removed params file"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!(path = %path.display(), error = %err, "failed to remove params file"),
        }
    }
}
