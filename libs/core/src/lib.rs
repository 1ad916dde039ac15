//! Drive external E2E suites from a host test process.
//!
//! A registered target describes how to launch the suite (directory, shell
//! command, report location). Each run plans a child process with merged
//! environment and a JSON params payload, executes it, then reads back the
//! canonical `pest-e2e.v1` report and turns any failure into a
//! [`BridgeError`] that names what went wrong.
pub mod bridge;
pub mod context;
pub mod error;
pub mod params;
pub mod params_file;
pub mod plan;
pub mod process;
pub mod report;
pub mod run_id;
pub mod runner;
pub mod target;

pub use bridge::*;
pub use context::*;
pub use error::*;
pub use params::*;
pub use params_file::*;
pub use plan::*;
pub use process::*;
pub use report::*;
pub use run_id::*;
pub use runner::*;
pub use target::*;
