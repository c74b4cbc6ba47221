//! Action dispatch - single UI actions against one device
//!
//! This crate performs the action half of a test step:
//! - Typed action specs validated at load time and again before dispatch
//! - Text input, taps and long presses on resolved elements
//! - Swipe searches with fallback direction and scroll reset
//! - Navigation and device control

pub mod errors;
pub mod geometry;
mod primitives;
pub mod spec;
pub mod types;

pub use errors::*;
pub use primitives::*;
pub use spec::*;
pub use types::*;
