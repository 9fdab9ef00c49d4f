//! CLI command implementations

pub mod compile;
pub mod dry_run;
pub mod ops;
pub mod validate;
