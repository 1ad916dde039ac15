//! Test doubles shared by the e2e-bridge crates.

mod fakes;
mod fixtures;

pub use fakes::{
    FakeUser, FixedRunIdGenerator, RecordingParamsFileWriter, StubProcessRunner, WrittenParams,
};
pub use fixtures::{ReportFixture, load_fixture_value, workspace_root};
