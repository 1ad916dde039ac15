mod publish;
mod targets;

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use e2e_core::{BridgeConfig, JsonReport, Params, ProcessOptions, deep_merge};
use e2e_telemetry::install as init_telemetry;
use tracing::debug;

use crate::publish::{DEFAULT_DEST, NEXT_STEPS, asset_names, publish};
use crate::targets::{TargetsFile, load_params_file, parse_param};

const DEFAULT_TARGETS_FILE: &str = "e2e-targets.yaml";

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_telemetry("e2e-bridge")?;
    match cli.command {
        CliCommand::Publish { dest, force } => handle_publish(&dest, force),
        CliCommand::Targets { config } => handle_targets(&config),
        CliCommand::Run {
            target,
            filter,
            common,
        } => handle_run(&target, filter, common),
        CliCommand::Call {
            target,
            file,
            export,
            harness,
            common,
        } => handle_call(&target, &file, export.as_deref(), harness, common),
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "e2e-bridge",
    version,
    about = "Drive external E2E runners from Rust test suites"
)]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Copy the bundled JS harness into the host project
    Publish {
        /// Destination directory.
        #[arg(long, value_name = "DIR", default_value = DEFAULT_DEST)]
        dest: PathBuf,
        /// Overwrite existing files.
        #[arg(long)]
        force: bool,
    },
    /// List targets defined in the targets file
    Targets {
        #[arg(long, value_name = "PATH", default_value = DEFAULT_TARGETS_FILE)]
        config: PathBuf,
    },
    /// Run a target and verify its JSON report
    Run {
        target: String,
        /// Only run tests matching this filter (target must define `filter`).
        #[arg(long)]
        filter: Option<String>,
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Execute a JS module export in a target's directory
    Call {
        target: String,
        /// Module path, or `file:export`.
        file: String,
        #[arg(long)]
        export: Option<String>,
        /// Path to call.mjs (defaults to the published location).
        #[arg(long, value_name = "PATH")]
        harness: Option<PathBuf>,
        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Targets file (YAML).
    #[arg(long, value_name = "PATH", default_value = DEFAULT_TARGETS_FILE)]
    config: PathBuf,
    /// Extra parameter as key=value; JSON values keep their type. Repeatable.
    #[arg(long = "param", value_name = "KEY=VALUE")]
    params: Vec<String>,
    /// JSON or YAML file with parameters, merged before --param.
    #[arg(long, value_name = "PATH")]
    params_file: Option<PathBuf>,
    /// Kill the runner after this many seconds.
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,
    /// Let the runner use this terminal directly.
    #[arg(long)]
    tty: bool,
}

impl CommonArgs {
    fn collect_params(&self) -> Result<Params> {
        let mut params = match &self.params_file {
            Some(path) => load_params_file(path)?,
            None => Params::new(),
        };
        for raw in &self.params {
            let (key, value) = parse_param(raw)?;
            let mut single = Params::new();
            single.insert(key, value);
            deep_merge(&mut params, &single);
        }
        Ok(params)
    }

    fn options(&self) -> ProcessOptions {
        let options = ProcessOptions::default().with_inherit_tty(self.tty);
        match self.timeout {
            Some(secs) => options.with_timeout(Duration::from_secs(secs)),
            None => options,
        }
    }

    fn load_targets(&self) -> Result<TargetsFile> {
        TargetsFile::load(&self.config)
    }
}

fn config_base(config: &Path) -> PathBuf {
    config
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn handle_publish(dest: &Path, force: bool) -> Result<()> {
    println!(
        "Publishing E2E JavaScript assets ({}) to {}",
        asset_names().join(", "),
        dest.display()
    );
    let outcome = publish(dest, force)?;
    for path in &outcome.written {
        println!("  wrote {}", path.display());
    }
    for path in &outcome.skipped {
        println!("  kept  {} (exists; pass --force to overwrite)", path.display());
    }
    println!();
    println!("{NEXT_STEPS}");
    Ok(())
}

fn handle_targets(config: &Path) -> Result<()> {
    let file = TargetsFile::load(config)?;
    let bridge = file.into_bridge(BridgeConfig::from_env(), &config_base(config))?;
    for target in bridge.registry().all() {
        let filter = target.filter_flag.as_deref().unwrap_or("-");
        println!(
            "{}\t{}\t{}\tfilter={}",
            target.name,
            target.dir.display(),
            target.command,
            filter
        );
    }
    Ok(())
}

fn handle_run(target: &str, filter: Option<String>, common: CommonArgs) -> Result<()> {
    let bridge = common
        .load_targets()?
        .into_bridge(BridgeConfig::from_env(), &config_base(&common.config))?;
    let mut handle = bridge
        .handle(target)?
        .with_params(&common.collect_params()?)
        .with_options(common.options());
    if let Some(filter) = filter {
        handle = handle.only(filter);
    }
    let report = handle.run()?;
    print_report(&report);
    Ok(())
}

fn handle_call(
    target: &str,
    file: &str,
    export: Option<&str>,
    harness: Option<PathBuf>,
    common: CommonArgs,
) -> Result<()> {
    let mut config = BridgeConfig::from_env();
    if let Some(harness) = harness {
        config.call_harness = harness;
    }
    let bridge = common
        .load_targets()?
        .into_bridge(config, &config_base(&common.config))?;
    let handle = bridge.handle(target)?.with_options(common.options());
    let outcome = handle
        .call(file, export, &common.collect_params()?)
        .with_context(|| format!("calling {file} on target `{target}`"))?;
    debug!(run_id = %outcome.run_id, "call finished");
    print!("{}", outcome.process.stdout);
    eprint!("{}", outcome.process.stderr);
    println!(
        "{} finished in {:.2}s (run {})",
        outcome.call,
        outcome.process.duration_seconds(),
        outcome.run_id
    );
    Ok(())
}

fn print_report(report: &JsonReport) {
    for test in &report.tests {
        match &test.file {
            Some(file) => println!("  {} {} ({file})", test.status.symbol(), test.name),
            None => println!("  {} {}", test.status.symbol(), test.name),
        }
    }
    println!("{} [{}] {}", report.target, report.run_id, report.summary_line());
}
