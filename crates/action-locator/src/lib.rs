//! Locator resolution & self-heal
//!
//! This crate implements element location for both backends:
//! - Selector transformation into backend queries
//! - Interactability checks (exists, visible, on screen, minimum size)
//! - Declared fallback candidates in priority order
//! - Bounded heuristic healing with confidence scoring

pub mod catalog;
pub mod errors;
pub mod healer;
pub mod resolver;
pub mod similarity;
pub mod strategies;
pub mod transformer;
pub mod types;
pub mod visibility;

pub use catalog::*;
pub use errors::*;
pub use healer::*;
pub use resolver::*;
pub use similarity::*;
pub use strategies::*;
pub use transformer::*;
pub use types::*;
pub use visibility::*;
