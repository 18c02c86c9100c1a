//! Per-pass decision statistics

use crate::grid::modcod_label;
use crate::{Decision, Transition};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassSummary {
    pub pass_id: String,
    pub samples: usize,
    /// Samples without a C/No measurement
    pub invalid_samples: usize,
    pub forced_samples: usize,
    pub upgrades: usize,
    pub downgrades: usize,
    /// Forced moves onto the fallback MODCOD from another one
    pub fallbacks: usize,
    /// Mean selected information rate over all samples (bps)
    pub mean_info_bit_rate_bps: f64,
    /// Bits carried over samples whose margin closed the link
    pub delivered_bits: f64,
    /// Lowest finite margin of the pass (dB)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_margin_db: Option<f64>,
    /// Samples spent on each MODCOD, keyed by label (unique within a grid)
    pub occupancy: BTreeMap<String, usize>,
}

impl PassSummary {
    pub fn from_decisions(pass_id: &str, cadence_s: f64, decisions: &[Decision]) -> Self {
        let mut summary = Self {
            pass_id: pass_id.to_string(),
            samples: decisions.len(),
            invalid_samples: 0,
            forced_samples: 0,
            upgrades: 0,
            downgrades: 0,
            fallbacks: 0,
            mean_info_bit_rate_bps: 0.0,
            delivered_bits: 0.0,
            min_margin_db: None,
            occupancy: BTreeMap::new(),
        };

        let mut rate_sum = 0.0;

        for d in decisions {
            if !d.is_valid() {
                summary.invalid_samples += 1;
            }
            if d.forced {
                summary.forced_samples += 1;
            }
            match d.transition {
                Transition::Upgrade => summary.upgrades += 1,
                Transition::Downgrade => summary.downgrades += 1,
                Transition::Fallback => summary.fallbacks += 1,
                Transition::Hold | Transition::Initial => {}
            }

            rate_sum += d.info_bit_rate_bps;

            if d.margin_db.is_finite() {
                if d.margin_db >= 0.0 {
                    summary.delivered_bits += d.info_bit_rate_bps * cadence_s;
                }
                summary.min_margin_db = Some(match summary.min_margin_db {
                    Some(m) => m.min(d.margin_db),
                    None => d.margin_db,
                });
            }

            *summary.occupancy.entry(modcod_label(d.modulation_order, d.code_rate)).or_default() += 1;
        }

        if !decisions.is_empty() {
            summary.mean_info_bit_rate_bps = rate_sum / decisions.len() as f64;
        }

        summary
    }

    /// Share of samples spent on a forced fallback (0-1)
    pub fn forced_ratio(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            self.forced_samples as f64 / self.samples as f64
        }
    }

    /// MODCOD switches of any kind
    pub fn switches(&self) -> usize {
        self.upgrades + self.downgrades + self.fallbacks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AcmConfig, LinkAdaptationEngine, Pass, PassDriver};

    #[test]
    fn test_counts_and_occupancy() {
        let config = AcmConfig::default().hysteresis_db(0.0, 0.5).min_dwell_s(0.0);
        let engine = LinkAdaptationEngine::from_config(&config).unwrap();

        let mut cno = vec![85.0; 10];
        cno[4] = f64::NAN;
        let pass = Pass::at_1hz("s1", cno);
        let decisions: Vec<Decision> = PassDriver::new(&engine).run(&pass).collect();
        let summary = PassSummary::from_decisions("s1", 1.0, &decisions);

        assert_eq!(summary.samples, 10);
        assert_eq!(summary.invalid_samples, 1);
        assert_eq!(summary.forced_samples, 1);
        assert_eq!(summary.fallbacks, 1);
        assert_eq!(summary.upgrades, 1);
        assert_eq!(summary.downgrades, 0);
        assert_eq!(summary.switches(), 2);
        assert!((summary.forced_ratio() - 0.1).abs() < 1e-12);

        assert_eq!(summary.occupancy.get("QPSK 9/10"), Some(&9));
        assert_eq!(summary.occupancy.get("QPSK 1/2"), Some(&1));
        assert_eq!(summary.occupancy.values().sum::<usize>(), 10);

        let best_rate = decisions[0].info_bit_rate_bps;
        assert!((summary.delivered_bits - 9.0 * best_rate).abs() < 1.0);
        assert!(summary.min_margin_db.unwrap() >= 0.0);
    }

    #[test]
    fn test_occupancy_separates_close_code_rates() {
        let config = AcmConfig::default()
            .modulation_orders(&[4])
            .code_rates(&[1.0 / 3.0, 0.3333333])
            .hysteresis_db(0.0, 0.5)
            .min_dwell_s(0.0);
        let engine = LinkAdaptationEngine::from_config(&config).unwrap();

        let pass = Pass::at_1hz("close", vec![f64::NAN, 90.0, 90.0, 90.0]);
        let decisions: Vec<Decision> = PassDriver::new(&engine).run(&pass).collect();
        let summary = PassSummary::from_decisions("close", 1.0, &decisions);

        assert_eq!(summary.occupancy.len(), 2);
        assert_eq!(summary.occupancy.get("QPSK 0.3333333"), Some(&1));
        assert_eq!(summary.occupancy.get("QPSK 1/3"), Some(&3));
    }

    #[test]
    fn test_empty_summary() {
        let summary = PassSummary::from_decisions("none", 1.0, &[]);
        assert_eq!(summary.samples, 0);
        assert_eq!(summary.mean_info_bit_rate_bps, 0.0);
        assert_eq!(summary.min_margin_db, None);
        assert_eq!(summary.forced_ratio(), 0.0);
    }
}
