//! Link Adaptation Library
//!
//! Adaptive coding and modulation (ACM) control loop for satellite passes.
//! For every C/No sample of a pass the engine selects the MODCOD with the
//! highest information rate that still closes the link against a
//! Shannon-derived threshold, with hysteresis and a minimum dwell time to
//! keep it from chattering between neighbours.
//!
//! # Link Model
//!
//! ```text
//! Rs      = B / (1 + α)
//! Rb      = Rs · log2(M) · Rc
//! η       = log2(M) · Rc / (1 + α)
//! Eb/No*  = 10·log10((2^η − 1) / η) + G_impl
//! Eb/No   = C/No − 10·log10(Rb)
//! ```
//!
//! | Symbol  | Description |
//! |---------|-------------|
//! | B       | Occupied bandwidth (Hz) |
//! | α       | Root-raised-cosine roll-off |
//! | M, Rc   | Modulation order and code rate |
//! | G_impl  | Implementation gap to capacity (dB) |
//!
//! # Decision Rules (priority order)
//!
//! 1. Invalid sample: force the fallback MODCOD
//! 2. First valid sample: best feasible MODCOD (or forced fallback)
//! 3. Margin below `-downgrade_hysteresis_db`: immediate re-selection
//! 4. Dwell elapsed: upgrade if a faster MODCOD clears `+upgrade_hysteresis_db`
//! 5. Otherwise hold

use thiserror::Error;

pub mod config;
pub mod ebno;
pub mod engine;
pub mod grid;
pub mod pass;
pub mod summary;

pub use config::AcmConfig;
pub use engine::{Decision, DecisionState, HysteresisPolicy, LinkAdaptationEngine, Transition};
pub use grid::{Candidate, CandidateGrid};
pub use pass::{Pass, PassDriver, PassOutcome, PassRun};
pub use summary::PassSummary;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AcmError {
    #[error("Invalid configuration: {field} = {value} ({reason})")]
    Configuration {
        field: &'static str,
        value: String,
        reason: &'static str,
    },
    #[error("Invalid pass {0}: {1}")]
    InvalidPass(String, String),
}

pub type Result<T> = std::result::Result<T, AcmError>;

impl AcmError {
    pub(crate) fn config(field: &'static str, value: impl ToString, reason: &'static str) -> Self {
        AcmError::Configuration {
            field,
            value: value.to_string(),
            reason,
        }
    }
}

/// Convert a linear power ratio to decibels
#[inline]
pub fn to_db(ratio: f64) -> f64 {
    10.0 * ratio.log10()
}
