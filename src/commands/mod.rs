//! Command implementations
//!
//! Each module corresponds to a subcommand in the CLI.

pub mod estimate;
pub mod reshape;

// Re-export commonly used types
pub use estimate::{run as estimate_run, EstimateArgs, EstimateSettings};
pub use reshape::{run as reshape_run, ReshapeArgs};
