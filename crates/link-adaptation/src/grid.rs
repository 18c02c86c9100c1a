//! MODCOD candidate grid
//!
//! The grid is the cartesian product of the configured modulation orders and
//! code rates. Each entry carries its information rate and the Eb/No it needs
//! to close the link (Shannon bound plus implementation gap). Candidates are
//! kept sorted by rate, then by modulation order, so that index order is the
//! tie-break order used by the engine.

use crate::{to_db, AcmConfig, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::{debug, info};

/// Relative tolerance for treating two information rates as equal
///
/// Rates inside the tolerance sort by modulation order alone, so a
/// higher-order candidate whose rate is lower by less than the tolerance
/// still sorts after the lower-order one. The fallback is then the
/// minimum-rate entry only up to this tolerance. Code rates closer than
/// this are rejected as duplicates.
pub const RATE_TIE_TOLERANCE: f64 = 1e-9;

/// One operating point (modulation order, code rate)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub modulation_order: u32,
    pub code_rate: f64,
    /// Information bit rate (bps)
    pub info_bit_rate_bps: f64,
    /// Information bits per second per Hz of occupied bandwidth
    pub spectral_efficiency: f64,
    /// Eb/No needed to close the link (dB)
    pub required_ebno_db: f64,
}

impl Candidate {
    /// Build a candidate from the link parameters
    pub fn new(
        modulation_order: u32,
        code_rate: f64,
        bandwidth_hz: f64,
        roll_off: f64,
        implementation_gap_db: f64,
    ) -> Self {
        let bits = bits_per_symbol(modulation_order);
        let eta = spectral_efficiency(modulation_order, code_rate, roll_off);

        Self {
            modulation_order,
            code_rate,
            info_bit_rate_bps: symbol_rate(bandwidth_hz, roll_off) * bits * code_rate,
            spectral_efficiency: eta,
            required_ebno_db: required_ebno_db(eta, implementation_gap_db),
        }
    }

    pub fn bits_per_symbol(&self) -> f64 {
        bits_per_symbol(self.modulation_order)
    }

    /// Short name, e.g. `QPSK 3/4` or `64QAM 9/10`
    pub fn label(&self) -> String {
        modcod_label(self.modulation_order, self.code_rate)
    }

    /// True if both candidates carry the same information rate
    pub fn same_rate(&self, other: &Candidate) -> bool {
        rates_equal(self.info_bit_rate_bps, other.info_bit_rate_bps)
    }

    /// Grid order: rate ascending, then modulation order ascending
    pub fn grid_order(&self, other: &Candidate) -> Ordering {
        if self.same_rate(other) {
            self.modulation_order.cmp(&other.modulation_order)
        } else {
            self.info_bit_rate_bps.total_cmp(&other.info_bit_rate_bps)
        }
    }

    /// Selection preference: higher rate wins, lower modulation order
    /// breaks ties
    pub fn preferred_over(&self, other: &Candidate) -> bool {
        if self.same_rate(other) {
            self.modulation_order < other.modulation_order
        } else {
            self.info_bit_rate_bps > other.info_bit_rate_bps
        }
    }
}

/// Ordered, immutable set of MODCOD candidates
#[derive(Debug, Clone, Serialize)]
pub struct CandidateGrid {
    candidates: Vec<Candidate>,
    fallback: usize,
    bandwidth_hz: f64,
    roll_off: f64,
}

impl CandidateGrid {
    /// Build the grid from a validated configuration
    pub fn build(config: &AcmConfig) -> Result<Self> {
        config.validate()?;

        let mut candidates: Vec<Candidate> = config
            .modulation_orders
            .iter()
            .flat_map(|&m| {
                config.code_rates.iter().map(move |&rc| {
                    Candidate::new(
                        m,
                        rc,
                        config.bandwidth_hz,
                        config.roll_off,
                        config.implementation_gap_db,
                    )
                })
            })
            .collect();

        candidates.sort_by(|a, b| a.grid_order(b));

        for c in &candidates {
            debug!(
                "{:12} | Rb={:>12.0} bps | η={:.3} | Eb/No*={:.2} dB",
                c.label(),
                c.info_bit_rate_bps,
                c.spectral_efficiency,
                c.required_ebno_db
            );
        }

        // Sorted ascending with the tie-break applied, so the most robust
        // candidate is always first
        let fallback = 0;

        info!(
            "Built MODCOD grid: {} candidates, fallback {}",
            candidates.len(),
            candidates[fallback].label()
        );

        Ok(Self {
            candidates,
            fallback,
            bandwidth_hz: config.bandwidth_hz,
            roll_off: config.roll_off,
        })
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn get(&self, index: usize) -> Option<&Candidate> {
        self.candidates.get(index)
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn fallback_index(&self) -> usize {
        self.fallback
    }

    pub fn fallback(&self) -> &Candidate {
        &self.candidates[self.fallback]
    }

    pub fn bandwidth_hz(&self) -> f64 {
        self.bandwidth_hz
    }

    pub fn roll_off(&self) -> f64 {
        self.roll_off
    }

    pub fn symbol_rate(&self) -> f64 {
        symbol_rate(self.bandwidth_hz, self.roll_off)
    }

    /// Index of a MODCOD in the grid
    pub fn position(&self, modulation_order: u32, code_rate: f64) -> Option<usize> {
        self.candidates
            .iter()
            .position(|c| c.modulation_order == modulation_order && c.code_rate == code_rate)
    }
}

/// Symbol rate for an RRC-shaped carrier (Bd)
pub fn symbol_rate(bandwidth_hz: f64, roll_off: f64) -> f64 {
    bandwidth_hz / (1.0 + roll_off)
}

pub fn bits_per_symbol(modulation_order: u32) -> f64 {
    (modulation_order as f64).log2()
}

/// η = log2(M)·Rc / (1 + α)
pub fn spectral_efficiency(modulation_order: u32, code_rate: f64, roll_off: f64) -> f64 {
    bits_per_symbol(modulation_order) * code_rate / (1.0 + roll_off)
}

/// Shannon Eb/No bound at spectral efficiency η, plus the implementation gap
pub fn required_ebno_db(eta: f64, implementation_gap_db: f64) -> f64 {
    to_db((2f64.powf(eta) - 1.0) / eta) + implementation_gap_db
}

pub(crate) fn rates_equal(a: f64, b: f64) -> bool {
    (a - b).abs() <= RATE_TIE_TOLERANCE * a.abs().max(b.abs())
}

pub fn modcod_label(modulation_order: u32, code_rate: f64) -> String {
    format!(
        "{} {}",
        modulation_name(modulation_order),
        code_rate_fraction(code_rate)
    )
}

fn modulation_name(modulation_order: u32) -> String {
    match modulation_order {
        4 => "QPSK".to_string(),
        m => format!("{}QAM", m),
    }
}

/// Render a code rate as a small fraction when it is one (0.75 -> 3/4),
/// otherwise as its shortest exact decimal
///
/// Distinct validated rates never share a rendering: a fraction only
/// matches to within a few ulps, well inside the duplicate tolerance.
fn code_rate_fraction(code_rate: f64) -> String {
    for den in 1..=20u32 {
        let num = code_rate * den as f64;
        let rounded = num.round();
        if rounded >= 1.0 && (num - rounded).abs() <= 4.0 * f64::EPSILON * rounded {
            return format!("{}/{}", rounded as u32, den);
        }
    }
    format!("{}", code_rate)
}
