//! Run configuration for MODCOD selection

use crate::grid::rates_equal;
use crate::{AcmError, Result};
use serde::{Deserialize, Serialize};

/// Reference Ka-band downlink: 250 MHz occupied bandwidth
pub const DEFAULT_BANDWIDTH_HZ: f64 = 250.0e6;
pub const DEFAULT_ROLL_OFF: f64 = 0.9;
pub const DEFAULT_MODULATION_ORDERS: [u32; 4] = [4, 16, 64, 256];
pub const DEFAULT_CODE_RATES: [f64; 3] = [0.5, 0.75, 0.9];
pub const DEFAULT_IMPLEMENTATION_GAP_DB: f64 = 1.2;
pub const DEFAULT_UPGRADE_HYSTERESIS_DB: f64 = 1.0;
pub const DEFAULT_DOWNGRADE_HYSTERESIS_DB: f64 = 0.5;
pub const DEFAULT_MIN_DWELL_S: f64 = 5.0;

/// ACM configuration, supplied once per run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcmConfig {
    /// Occupied bandwidth (Hz)
    pub bandwidth_hz: f64,
    /// Pulse-shaping roll-off, exclusive (0, 1)
    pub roll_off: f64,
    /// Square-QAM modulation orders (4, 16, 64, ...)
    pub modulation_orders: Vec<u32>,
    /// Code rates in (0, 1]
    pub code_rates: Vec<f64>,
    /// Implementation gap to Shannon capacity (dB)
    pub implementation_gap_db: f64,
    /// Extra margin a faster MODCOD must show before an upgrade (dB)
    pub upgrade_hysteresis_db: f64,
    /// Margin deficit tolerated before a downgrade (dB)
    pub downgrade_hysteresis_db: f64,
    /// Minimum hold time before an upgrade (s)
    pub min_dwell_s: f64,
}

impl Default for AcmConfig {
    fn default() -> Self {
        Self {
            bandwidth_hz: DEFAULT_BANDWIDTH_HZ,
            roll_off: DEFAULT_ROLL_OFF,
            modulation_orders: DEFAULT_MODULATION_ORDERS.to_vec(),
            code_rates: DEFAULT_CODE_RATES.to_vec(),
            implementation_gap_db: DEFAULT_IMPLEMENTATION_GAP_DB,
            upgrade_hysteresis_db: DEFAULT_UPGRADE_HYSTERESIS_DB,
            downgrade_hysteresis_db: DEFAULT_DOWNGRADE_HYSTERESIS_DB,
            min_dwell_s: DEFAULT_MIN_DWELL_S,
        }
    }
}

impl AcmConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bandwidth_hz(mut self, hz: f64) -> Self {
        self.bandwidth_hz = hz;
        self
    }

    pub fn roll_off(mut self, alpha: f64) -> Self {
        self.roll_off = alpha;
        self
    }

    pub fn modulation_orders(mut self, orders: &[u32]) -> Self {
        self.modulation_orders = orders.to_vec();
        self
    }

    pub fn code_rates(mut self, rates: &[f64]) -> Self {
        self.code_rates = rates.to_vec();
        self
    }

    pub fn implementation_gap_db(mut self, db: f64) -> Self {
        self.implementation_gap_db = db;
        self
    }

    pub fn hysteresis_db(mut self, upgrade_db: f64, downgrade_db: f64) -> Self {
        self.upgrade_hysteresis_db = upgrade_db;
        self.downgrade_hysteresis_db = downgrade_db;
        self
    }

    pub fn min_dwell_s(mut self, seconds: f64) -> Self {
        self.min_dwell_s = seconds;
        self
    }

    /// Check every field of the configuration surface
    ///
    /// Fails on the first offending field; nothing is built from an
    /// invalid configuration.
    pub fn validate(&self) -> Result<()> {
        if !(self.bandwidth_hz.is_finite() && self.bandwidth_hz > 0.0) {
            return Err(AcmError::config("bandwidth_hz", self.bandwidth_hz, "must be finite and > 0"));
        }
        if !(self.roll_off > 0.0 && self.roll_off < 1.0) {
            return Err(AcmError::config("roll_off", self.roll_off, "must be in (0, 1)"));
        }

        if self.modulation_orders.is_empty() {
            return Err(AcmError::config("modulation_orders", "[]", "must not be empty"));
        }
        for (i, &m) in self.modulation_orders.iter().enumerate() {
            if !is_square_qam_order(m) {
                return Err(AcmError::config("modulation_orders", m, "must be a square-QAM order (4, 16, 64, ...)"));
            }
            if self.modulation_orders[..i].contains(&m) {
                return Err(AcmError::config("modulation_orders", m, "duplicate entry"));
            }
        }

        if self.code_rates.is_empty() {
            return Err(AcmError::config("code_rates", "[]", "must not be empty"));
        }
        for (i, &rc) in self.code_rates.iter().enumerate() {
            if !(rc > 0.0 && rc <= 1.0) {
                return Err(AcmError::config("code_rates", rc, "must be in (0, 1]"));
            }
            if self.code_rates[..i].iter().any(|&other| rates_equal(other, rc)) {
                return Err(AcmError::config("code_rates", rc, "duplicate entry"));
            }
        }

        check_non_negative("implementation_gap_db", self.implementation_gap_db)?;
        check_non_negative("upgrade_hysteresis_db", self.upgrade_hysteresis_db)?;
        check_non_negative("downgrade_hysteresis_db", self.downgrade_hysteresis_db)?;
        check_non_negative("min_dwell_s", self.min_dwell_s)
    }
}

/// Square constellations only: an even number of bits per symbol
pub fn is_square_qam_order(modulation_order: u32) -> bool {
    modulation_order >= 4 && modulation_order.is_power_of_two() && modulation_order.trailing_zeros() % 2 == 0
}

/// Shared bound for margins, gaps and dwell times
pub(crate) fn check_non_negative(field: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(AcmError::config(field, value, "must be finite and >= 0"))
    }
}
