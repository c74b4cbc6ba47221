//! mobiflow command line runner
//!
//! Loads a YAML suite and the framework config, opens a session per
//! device and drives the step executor. Exposes modules for integration
//! testing.

pub mod cli;
pub mod config;
pub mod devices;
pub mod report;
pub mod suite;

pub use config::FrameworkConfig;
pub use suite::{Suite, SuiteLoader};
