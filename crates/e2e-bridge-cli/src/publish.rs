use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use include_dir::{Dir, include_dir};

static ASSETS: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/assets");

pub const DEFAULT_DEST: &str = "resources/js/pest-e2e";

pub const NEXT_STEPS: &str = "\
Next steps:
1. Import globalSetup in your Playwright config:
   import { globalSetup } from './resources/js/pest-e2e/playwright.mjs';
2. Register it:
   export default defineConfig({ globalSetup });
3. Session mode:
   use: { storageState: process.env.PEST_E2E_STORAGE_STATE }
4. Sanctum mode:
   use: { extraHTTPHeaders: process.env.PEST_E2E_AUTH_TOKEN ? { Authorization: 'Bearer ' + process.env.PEST_E2E_AUTH_TOKEN } : {} }";

#[derive(Debug, Default)]
pub struct PublishOutcome {
    pub written: Vec<PathBuf>,
    /// Existing files left alone because `force` was off.
    pub skipped: Vec<PathBuf>,
}

pub fn asset_names() -> Vec<String> {
    let mut names: Vec<String> = ASSETS
        .files()
        .map(|file| file.path().display().to_string())
        .collect();
    names.sort();
    names
}

pub fn publish(dest: &Path, force: bool) -> Result<PublishOutcome> {
    fs::create_dir_all(dest).with_context(|| format!("creating {}", dest.display()))?;

    let mut files: Vec<_> = ASSETS.files().collect();
    files.sort_by(|a, b| a.path().cmp(b.path()));

    let mut outcome = PublishOutcome::default();
    for file in files {
        let target = dest.join(file.path());
        if target.exists() && !force {
            outcome.skipped.push(target);
            continue;
        }
        fs::write(&target, file.contents())
            .with_context(|| format!("writing {}", target.display()))?;
        outcome.written.push(target);
    }
    Ok(outcome)
}
