//! Funnel Conversion Confidence Library
//!
//! This library provides tools to:
//! - Load daily funnel counts (starts and conversions) from CSV
//! - Fold them into a Beta posterior over the true conversion rate
//! - Report the credibility interval and its trend over time
//! - Decide whether the rate is confidently above a target rate
//! - Reshape wide event exports into the funnel input schema

pub mod analytics;
pub mod config;
pub mod error;
pub mod metrics;
pub mod reshape;

// Re-export common types
pub use analytics::{
    update, BetaPosterior, CredibilityInterval, FunnelDataset, FunnelReport, Observation,
    PosteriorUpdate, ReportFormat, StepResult,
};
pub use config::Config;
pub use error::{Error, Result};
pub use reshape::{reshape, reshape_file, NarrowRow, NarrowTable};

// Commands module uses re-exported types, so it must be declared after the re-exports
pub mod commands;
