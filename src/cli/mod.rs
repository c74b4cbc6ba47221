//! Command line interface

pub mod app;
pub mod commands;
pub mod context;
pub mod dispatch;
pub mod env;
pub mod export;
pub mod output;
pub mod run;
pub mod runtime;
pub mod schema;
pub mod selectors;
pub mod validate;

pub use app::run;
