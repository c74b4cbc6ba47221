//! Assertion engine - continuous watching of element conditions
//!
//! This crate implements the assertion side of a step:
//! - Typed assertion specs: element presence and text, stability and change,
//!   state flags, attributes, match counts, geometry, and device state
//! - Per-watch condition tracking across polls
//! - A bounded, cancellable watcher that re-resolves the element on every poll

pub mod conditions;
pub mod errors;
pub mod spec;
pub mod types;
pub mod watcher;

pub use conditions::*;
pub use errors::*;
pub use spec::*;
pub use types::*;
pub use watcher::*;
