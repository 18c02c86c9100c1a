//! MODCOD decision engine
//!
//! Hysteresis state machine driven one C/No sample at a time. The caller owns
//! the [`DecisionState`] for a pass and threads it through [`LinkAdaptationEngine::step`];
//! the engine itself is immutable and can be shared across worker threads.
//!
//! Rules are evaluated in strict priority order:
//!
//! 1. Invalid sample: force the fallback MODCOD and restart the dwell clock
//! 2. Uninitialized: best feasible MODCOD, or forced fallback
//! 3. Margin below `-downgrade_hysteresis_db`: re-select immediately from the
//!    base feasible set (no dwell check)
//! 4. Dwell elapsed: move to the fastest MODCOD clearing
//!    `required + upgrade_hysteresis_db`, if any is faster than the active one
//! 5. Hold

use crate::ebno::{self, is_valid_sample};
use crate::config::check_non_negative;
use crate::{AcmConfig, Candidate, CandidateGrid, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Thresholds that keep the loop from chattering
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HysteresisPolicy {
    pub upgrade_hysteresis_db: f64,
    pub downgrade_hysteresis_db: f64,
    pub min_dwell_s: f64,
}

impl HysteresisPolicy {
    pub fn new(upgrade_hysteresis_db: f64, downgrade_hysteresis_db: f64, min_dwell_s: f64) -> Result<Self> {
        check_non_negative("upgrade_hysteresis_db", upgrade_hysteresis_db)?;
        check_non_negative("downgrade_hysteresis_db", downgrade_hysteresis_db)?;
        check_non_negative("min_dwell_s", min_dwell_s)?;

        Ok(Self {
            upgrade_hysteresis_db,
            downgrade_hysteresis_db,
            min_dwell_s,
        })
    }

    pub fn from_config(config: &AcmConfig) -> Result<Self> {
        Self::new(
            config.upgrade_hysteresis_db,
            config.downgrade_hysteresis_db,
            config.min_dwell_s,
        )
    }
}

/// Per-pass loop state, owned by whoever drives the pass
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecisionState {
    /// Grid index of the active MODCOD; `None` until the first sample
    pub active: Option<usize>,
    /// Time of the last change to `active` (pass start until then)
    pub last_transition_s: f64,
}

impl DecisionState {
    pub fn new(pass_start_s: f64) -> Self {
        Self {
            active: None,
            last_transition_s: pass_start_s,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }
}

/// What happened to the active MODCOD on a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transition {
    /// Unchanged
    Hold,
    /// First selection of the pass
    Initial,
    /// Moved to a faster MODCOD
    Upgrade,
    /// Moved to a slower, still feasible MODCOD
    Downgrade,
    /// Forced onto the fallback MODCOD
    Fallback,
}

/// Output for one sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Decision {
    pub time_s: f64,
    /// Input C/No (dB-Hz); NaN marks a missing measurement
    pub cno_dbhz: f64,
    /// Grid index of the selected MODCOD
    pub candidate: usize,
    pub modulation_order: u32,
    pub code_rate: f64,
    pub info_bit_rate_bps: f64,
    pub ebno_db: f64,
    pub required_ebno_db: f64,
    /// Eb/No minus required Eb/No; negative when under margin, NaN for an
    /// invalid sample
    pub margin_db: f64,
    /// Chosen by fallback rather than by feasibility/hysteresis
    pub forced: bool,
    pub transition: Transition,
}

impl Decision {
    pub fn is_valid(&self) -> bool {
        is_valid_sample(self.cno_dbhz)
    }
}

/// Rule that produced the next active candidate
enum Selection {
    /// Rules 1 and 2: always restamp the transition time
    Reset { candidate: usize, forced: bool },
    /// Rules 3 to 5: restamp only on change
    Keep { candidate: usize, forced: bool },
}

/// ACM decision engine
#[derive(Debug, Clone)]
pub struct LinkAdaptationEngine {
    grid: CandidateGrid,
    policy: HysteresisPolicy,
}

impl LinkAdaptationEngine {
    pub fn new(grid: CandidateGrid, policy: HysteresisPolicy) -> Self {
        Self { grid, policy }
    }

    /// Validate the configuration and build grid and policy from it
    pub fn from_config(config: &AcmConfig) -> Result<Self> {
        let grid = CandidateGrid::build(config)?;
        let policy = HysteresisPolicy::from_config(config)?;
        Ok(Self::new(grid, policy))
    }

    pub fn grid(&self) -> &CandidateGrid {
        &self.grid
    }

    pub fn policy(&self) -> &HysteresisPolicy {
        &self.policy
    }

    pub fn initial_state(&self, pass_start_s: f64) -> DecisionState {
        DecisionState::new(pass_start_s)
    }

    /// Consume one sample, advance `state`, and report the decision
    ///
    /// Never fails: invalid samples and deep fades are absorbed by the
    /// fallback MODCOD.
    pub fn step(&self, state: &mut DecisionState, time_s: f64, cno_dbhz: f64) -> Decision {
        let previous = state.active;
        let ebno = ebno::evaluate(cno_dbhz, &self.grid);
        let fallback = self.grid.fallback_index();

        let selection = match state.active {
            _ if !is_valid_sample(cno_dbhz) => Selection::Reset {
                candidate: fallback,
                forced: true,
            },
            None => match self.best_feasible(&ebno) {
                Some(candidate) => Selection::Reset { candidate, forced: false },
                None => Selection::Reset {
                    candidate: fallback,
                    forced: true,
                },
            },
            Some(active) => {
                let margin = self.margin_db(&ebno, active);
                if margin < -self.policy.downgrade_hysteresis_db {
                    match self.best_feasible(&ebno) {
                        Some(candidate) => Selection::Keep { candidate, forced: false },
                        None => Selection::Keep {
                            candidate: fallback,
                            forced: true,
                        },
                    }
                } else if time_s - state.last_transition_s >= self.policy.min_dwell_s {
                    Selection::Keep {
                        candidate: self.best_upgrade(&ebno, active).unwrap_or(active),
                        forced: false,
                    }
                } else {
                    Selection::Keep {
                        candidate: active,
                        forced: false,
                    }
                }
            }
        };

        let (next, forced) = match selection {
            Selection::Reset { candidate, forced } => {
                state.last_transition_s = time_s;
                (candidate, forced)
            }
            Selection::Keep { candidate, forced } => {
                if previous != Some(candidate) {
                    state.last_transition_s = time_s;
                }
                (candidate, forced)
            }
        };
        state.active = Some(next);

        let transition = self.classify(previous, next, forced);
        let selected = &self.grid.candidates()[next];
        let margin_db = self.margin_db(&ebno, next);

        if transition != Transition::Hold {
            debug!(
                "t={:.1}s {} -> {} ({:?}, C/No={:.2} dB-Hz, margin={:.2} dB)",
                time_s,
                previous
                    .map(|p| self.grid.candidates()[p].label())
                    .unwrap_or_else(|| "-".to_string()),
                selected.label(),
                transition,
                cno_dbhz,
                margin_db
            );
        } else {
            trace!("t={:.1}s hold {} margin={:.2} dB", time_s, selected.label(), margin_db);
        }

        Decision {
            time_s,
            cno_dbhz,
            candidate: next,
            modulation_order: selected.modulation_order,
            code_rate: selected.code_rate,
            info_bit_rate_bps: selected.info_bit_rate_bps,
            ebno_db: ebno[next],
            required_ebno_db: selected.required_ebno_db,
            margin_db,
            forced,
            transition,
        }
    }

    fn margin_db(&self, ebno: &[f64], index: usize) -> f64 {
        ebno[index] - self.grid.candidates()[index].required_ebno_db
    }

    /// Fastest candidate meeting its base threshold
    fn best_feasible(&self, ebno: &[f64]) -> Option<usize> {
        self.best_where(ebno, 0.0, |_| true)
    }

    /// Fastest candidate strictly faster than `active` that clears the
    /// upgrade threshold
    fn best_upgrade(&self, ebno: &[f64], active: usize) -> Option<usize> {
        let current = self.grid.candidates()[active];
        self.best_where(ebno, self.policy.upgrade_hysteresis_db, |c| {
            !c.same_rate(&current) && c.info_bit_rate_bps > current.info_bit_rate_bps
        })
    }

    fn best_where<F>(&self, ebno: &[f64], extra_margin_db: f64, eligible: F) -> Option<usize>
    where
        F: Fn(&Candidate) -> bool,
    {
        let candidates = self.grid.candidates();
        let mut best: Option<usize> = None;

        for (i, c) in candidates.iter().enumerate() {
            if !eligible(c) || !(ebno[i] >= c.required_ebno_db + extra_margin_db) {
                continue;
            }
            match best {
                Some(b) if !c.preferred_over(&candidates[b]) => {}
                _ => best = Some(i),
            }
        }

        best
    }

    fn classify(&self, previous: Option<usize>, next: usize, forced: bool) -> Transition {
        match previous {
            None => Transition::Initial,
            Some(p) if p == next => Transition::Hold,
            Some(_) if forced => Transition::Fallback,
            Some(p) => {
                let candidates = self.grid.candidates();
                if candidates[next].preferred_over(&candidates[p]) {
                    Transition::Upgrade
                } else {
                    Transition::Downgrade
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::to_db;

    fn engine(upgrade_db: f64, downgrade_db: f64, dwell_s: f64) -> LinkAdaptationEngine {
        let config = AcmConfig::default()
            .hysteresis_db(upgrade_db, downgrade_db)
            .min_dwell_s(dwell_s);
        LinkAdaptationEngine::from_config(&config).unwrap()
    }

    /// C/No that puts `index` at exactly `margin_db` above its threshold
    fn cno_for_margin(engine: &LinkAdaptationEngine, index: usize, margin_db: f64) -> f64 {
        let c = &engine.grid().candidates()[index];
        c.required_ebno_db + to_db(c.info_bit_rate_bps) + margin_db
    }

    fn run(engine: &LinkAdaptationEngine, samples: &[f64]) -> Vec<Decision> {
        let mut state = engine.initial_state(0.0);
        samples
            .iter()
            .enumerate()
            .map(|(t, &cno)| engine.step(&mut state, t as f64, cno))
            .collect()
    }

    #[test]
    fn test_policy_rejects_negative_values() {
        assert!(HysteresisPolicy::new(1.0, 0.5, 5.0).is_ok());
        assert!(HysteresisPolicy::new(-1.0, 0.5, 5.0).is_err());
        assert!(HysteresisPolicy::new(1.0, f64::NAN, 5.0).is_err());
        assert!(HysteresisPolicy::new(1.0, 0.5, -5.0).is_err());
    }

    #[test]
    fn test_policy_and_config_reject_alike() {
        for (up, down, dwell) in [(-0.1, 0.5, 5.0), (1.0, f64::INFINITY, 5.0), (1.0, 0.5, f64::NAN)] {
            let config = AcmConfig::default().hysteresis_db(up, down).min_dwell_s(dwell);
            let from_config = config.validate().unwrap_err();
            let from_policy = HysteresisPolicy::new(up, down, dwell).unwrap_err();
            assert_eq!(from_config, from_policy);
        }
    }

    #[test]
    fn test_equal_rate_selects_lower_modulation() {
        // 16QAM 3/4 and 64QAM 1/2 share rate and threshold; nothing faster closes
        let engine = engine(0.0, 0.5, 0.0);
        let grid = engine.grid();
        let qam16 = grid.position(16, 0.75).unwrap();
        let qam64 = grid.position(64, 0.5).unwrap();
        let cno = cno_for_margin(&engine, qam16, 0.1);
        assert!((cno_for_margin(&engine, qam64, 0.1) - cno).abs() < 1e-6);

        let initial = run(&engine, &[cno]);
        assert_eq!(initial[0].candidate, qam16);
        assert_eq!((initial[0].modulation_order, initial[0].code_rate), (16, 0.75));
        assert_eq!(initial[0].transition, Transition::Initial);
        assert!(!initial[0].forced);

        // Same pick when reached by an upgrade
        let low = cno_for_margin(&engine, grid.fallback_index(), 0.1);
        let decisions = run(&engine, &[low, cno, cno]);
        assert_eq!(decisions[1].candidate, qam16);
        assert_eq!(decisions[1].transition, Transition::Upgrade);
        assert_eq!(decisions[2].transition, Transition::Hold);

        // And by a downgrade from the top of the grid
        let top = cno_for_margin(&engine, grid.len() - 1, 3.0);
        let decisions = run(&engine, &[top, cno]);
        assert_eq!(decisions[0].candidate, grid.len() - 1);
        assert_eq!(decisions[1].candidate, qam16);
        assert_eq!(decisions[1].transition, Transition::Downgrade);
    }

    #[test]
    fn test_constant_cno_converges_to_best_feasible() {
        let engine = engine(1.0, 0.5, 5.0);
        let decisions = run(&engine, &[85.0; 100]);

        let grid = engine.grid();
        let expected = grid
            .candidates()
            .iter()
            .enumerate()
            .filter(|(_, c)| c.required_ebno_db <= 85.0 - to_db(c.info_bit_rate_bps))
            .max_by(|(_, a), (_, b)| a.info_bit_rate_bps.total_cmp(&b.info_bit_rate_bps))
            .map(|(i, _)| i)
            .unwrap();

        // QPSK 9/10 is the fastest MODCOD closing at 85 dB-Hz
        assert_eq!(expected, grid.position(4, 0.9).unwrap());
        assert_eq!(decisions[0].transition, Transition::Initial);
        assert!(decisions.iter().all(|d| d.candidate == expected && !d.forced));
        assert!(decisions[1..].iter().all(|d| d.transition == Transition::Hold));
        assert!(decisions.iter().all(|d| d.margin_db >= 0.0));
    }

    #[test]
    fn test_single_invalid_sample_forces_fallback_once() {
        let engine = engine(0.0, 0.5, 0.0);
        let mut samples = vec![95.0; 100];
        samples[50] = f64::NAN;
        let decisions = run(&engine, &samples);

        let fallback = engine.grid().fallback_index();
        for (i, d) in decisions.iter().enumerate() {
            assert_eq!(d.forced, i == 50, "forced flag at {}", i);
        }
        assert_eq!(decisions[50].candidate, fallback);
        assert_eq!(decisions[50].transition, Transition::Fallback);
        assert!(decisions[50].margin_db.is_nan());

        assert_eq!(decisions[51].transition, Transition::Upgrade);
        assert_eq!(decisions[51].candidate, decisions[49].candidate);
        assert_ne!(decisions[51].candidate, fallback);
    }

    #[test]
    fn test_invalid_first_sample() {
        let engine = engine(1.0, 0.5, 5.0);
        let decisions = run(&engine, &[f64::NAN, 85.0]);
        assert_eq!(decisions[0].transition, Transition::Initial);
        assert!(decisions[0].forced);
        assert_eq!(decisions[0].candidate, engine.grid().fallback_index());
        assert!(!decisions[1].forced);
    }

    #[test]
    fn test_step_down_downgrades_without_dwell() {
        let engine = engine(1.0, 0.5, 1000.0);
        let top = engine.grid().len() - 1;

        let high = cno_for_margin(&engine, top, 2.0);
        let low = cno_for_margin(&engine, top, -0.6);
        let decisions = run(&engine, &[high, low]);

        assert_eq!(decisions[0].candidate, top);
        assert_eq!(decisions[1].transition, Transition::Downgrade);
        assert!(decisions[1].candidate < top);
        assert!(!decisions[1].forced);
        assert!(decisions[1].margin_db >= 0.0);
    }

    #[test]
    fn test_mild_deficit_holds_with_negative_margin() {
        let engine = engine(1.0, 0.5, 0.0);
        let top = engine.grid().len() - 1;

        let high = cno_for_margin(&engine, top, 2.0);
        let sag = cno_for_margin(&engine, top, -0.3);
        let decisions = run(&engine, &[high, sag, sag]);

        assert!(decisions[1..].iter().all(|d| d.candidate == top));
        assert!(decisions[1..].iter().all(|d| d.transition == Transition::Hold));
        assert!((decisions[1].margin_db + 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_base_threshold_alone_never_upgrades() {
        let engine = engine(1.0, 0.5, 5.0);
        let grid = engine.grid();
        let faster = grid.position(16, 0.5).unwrap();

        let start = cno_for_margin(&engine, faster, -0.05);
        let step_up = cno_for_margin(&engine, faster, 0.5);

        let mut samples = vec![start];
        samples.extend(std::iter::repeat(step_up).take(200));
        let decisions = run(&engine, &samples);

        let initial = decisions[0].candidate;
        assert!(grid.candidates()[initial].info_bit_rate_bps < grid.candidates()[faster].info_bit_rate_bps);
        assert!(decisions.iter().all(|d| d.candidate == initial));
        assert!(decisions
            .iter()
            .all(|d| d.transition != Transition::Upgrade));
    }

    #[test]
    fn test_upgrade_waits_for_dwell() {
        let engine = engine(1.0, 0.5, 5.0);
        let top = engine.grid().len() - 1;

        let start = cno_for_margin(&engine, top, -3.0);
        let strong = cno_for_margin(&engine, top, 1.5);

        let mut samples = vec![start];
        samples.extend(std::iter::repeat(strong).take(9));
        let decisions = run(&engine, &samples);

        assert!(decisions[1..5].iter().all(|d| d.transition == Transition::Hold));
        assert_eq!(decisions[5].transition, Transition::Upgrade);
        assert_eq!(decisions[5].candidate, top);
        assert!(decisions[6..].iter().all(|d| d.transition == Transition::Hold));
    }

    #[test]
    fn test_invalid_sample_restarts_dwell_clock() {
        let engine = engine(1.0, 0.5, 5.0);
        let top = engine.grid().len() - 1;
        let strong = cno_for_margin(&engine, top, 1.5);

        let mut samples = vec![strong; 20];
        samples[10] = f64::NAN;
        let decisions = run(&engine, &samples);

        assert_eq!(decisions[10].candidate, engine.grid().fallback_index());
        assert!(decisions[11..15]
            .iter()
            .all(|d| d.candidate == engine.grid().fallback_index()));
        assert_eq!(decisions[15].transition, Transition::Upgrade);
        assert_eq!(decisions[15].candidate, top);
    }

    #[test]
    fn test_no_feasible_candidate_falls_back() {
        let engine = engine(1.0, 0.5, 5.0);
        let fallback = engine.grid().fallback_index();
        let top = engine.grid().len() - 1;

        let deep_fade = cno_for_margin(&engine, fallback, -2.0);
        let decisions = run(&engine, &[deep_fade]);
        assert_eq!(decisions[0].candidate, fallback);
        assert!(decisions[0].forced);
        assert_eq!(decisions[0].transition, Transition::Initial);
        assert!(decisions[0].margin_db < 0.0);

        let high = cno_for_margin(&engine, top, 2.0);
        let decisions = run(&engine, &[high, deep_fade, deep_fade]);
        assert_eq!(decisions[1].transition, Transition::Fallback);
        assert!(decisions[1].forced);
        // Still in deficit on the fallback: forced again, but no change
        assert_eq!(decisions[2].transition, Transition::Hold);
        assert!(decisions[2].forced);
    }

    #[test]
    fn test_step_threads_state() {
        let engine = engine(1.0, 0.5, 5.0);
        let mut state = engine.initial_state(100.0);
        assert!(!state.is_active());
        assert_eq!(state.last_transition_s, 100.0);

        let d = engine.step(&mut state, 100.0, 85.0);
        assert_eq!(state.active, Some(d.candidate));
        assert_eq!(state.last_transition_s, 100.0);

        engine.step(&mut state, 101.0, 85.0);
        assert_eq!(state.last_transition_s, 100.0);
    }
}
