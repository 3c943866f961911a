//! Conversion analytics
//!
//! Provides:
//! - Sequential Beta-Binomial posterior updating
//! - Funnel CSV loading and validation
//! - Confidence reports against a target conversion rate

pub mod funnel;
pub mod posterior;
pub mod report;

pub use funnel::{FunnelDataset, FunnelTotals};
pub use posterior::{
    update, BetaPosterior, CredibilityInterval, Observation, PosteriorUpdate, StepResult,
};
pub use report::{FunnelReport, ReportFormat};
