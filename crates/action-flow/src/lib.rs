//! Step execution layer
//!
//! Runs test cases step by step against one device: merges per-step
//! configuration over the run defaults, retries retryable failures, applies
//! blocking/non-blocking policy and bounds each test by its own deadline.
//! [`SuiteRunner`] fans a suite out across devices.

pub mod context;
pub mod errors;
pub mod executor;
pub mod hooks;
pub mod parallel;
pub mod strategies;
pub mod types;

pub use context::{DeviceSession, ExecutionContext};
pub use errors::FlowError;
pub use executor::{DefaultStepExecutor, StepExecutor};
pub use hooks::{CaptureHook, MemorySink, ResultSink};
pub use parallel::{DevicePlan, SuiteRunner};
pub use strategies::{DefaultFailureHandler, FailureHandler, FailureHandlerResult};
pub use types::*;
