//! Testing utilities for the Migra workspace
//!
//! Fake command runner, fake legacy database, deterministic oracles and
//! canned gateway fixtures.

#![allow(missing_docs)]

pub mod fixtures;
pub mod oracles;
pub mod runner;
pub mod source_db;

pub use fixtures::{
    fake_gateway, fake_gateway_with, init_tracing, legacy_credentials, standard_runner, standard_source,
};
pub use oracles::{PlaybookOracle, PlaybookSettings, RecordedRequest, ScriptedOracle};
pub use runner::{failed, ok, FakeRunner};
pub use source_db::{row, FakeSourceDb, RecordedQuery};
