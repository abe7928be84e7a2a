//! CLI command implementations.

pub mod paper;
pub mod run;
pub mod runtime;
pub mod scan;
pub mod validate;
