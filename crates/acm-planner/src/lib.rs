//! ACM Pass Planner
//!
//! Loads a run configuration and a batch of C/No passes, runs every pass
//! through the MODCOD decision engine, and assembles a JSON report of
//! per-sample decisions and per-pass statistics.
//!
//! # Input
//!
//! ```text
//! { "passes": [
//!     { "id": "sat-12-aos-0913", "start_time": 0.0, "cadence_s": 1.0,
//!       "cno_dbhz": [79.4, 80.1, null, 81.0] } ] }
//! ```
//!
//! `null` samples are gaps; the engine forces the fallback MODCOD for them.

use link_adaptation::AcmError;
use thiserror::Error;

pub mod loader;
pub mod report;

pub use report::{PlanReport, ReportMetadata};

#[derive(Error, Debug)]
pub enum PlannerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Acm(#[from] AcmError),
    #[error("Invalid pass at index {0}: {1}")]
    InvalidPass(usize, String),
    #[error("No passes found")]
    NoPasses,
}

pub type Result<T> = std::result::Result<T, PlannerError>;
