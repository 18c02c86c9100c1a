//! Per-pass driver
//!
//! Feeds a pass's samples through the engine in order and yields one
//! decision per sample. Passes share nothing, so [`PassDriver::run_all`]
//! fans them out over a rayon pool.

use crate::{AcmError, Decision, DecisionState, LinkAdaptationEngine, PassSummary, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::iter::FusedIterator;
use std::slice;
use tracing::{debug, info, warn};

/// Fixed-cadence C/No time series for one satellite pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pass {
    pub id: String,
    /// Time of the first sample (s)
    pub start_s: f64,
    /// Sample spacing (s)
    pub cadence_s: f64,
    /// C/No samples (dB-Hz); NaN marks a gap
    pub cno_dbhz: Vec<f64>,
}

impl Pass {
    pub fn new(id: impl Into<String>, start_s: f64, cadence_s: f64, cno_dbhz: Vec<f64>) -> Result<Self> {
        let id = id.into();
        if !start_s.is_finite() {
            return Err(AcmError::InvalidPass(id, format!("start time {} is not finite", start_s)));
        }
        if !(cadence_s.is_finite() && cadence_s > 0.0) {
            return Err(AcmError::InvalidPass(id, format!("cadence {} must be finite and > 0", cadence_s)));
        }

        Ok(Self {
            id,
            start_s,
            cadence_s,
            cno_dbhz,
        })
    }

    /// 1 Hz pass starting at t = 0
    pub fn at_1hz(id: impl Into<String>, cno_dbhz: Vec<f64>) -> Self {
        Self {
            id: id.into(),
            start_s: 0.0,
            cadence_s: 1.0,
            cno_dbhz,
        }
    }

    pub fn len(&self) -> usize {
        self.cno_dbhz.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cno_dbhz.is_empty()
    }

    pub fn time_at(&self, index: usize) -> f64 {
        self.start_s + index as f64 * self.cadence_s
    }

    pub fn duration_s(&self) -> f64 {
        self.len() as f64 * self.cadence_s
    }
}

/// Lazy decision sequence for one pass
///
/// Clone before consuming to replay the pass from the start.
#[derive(Debug, Clone)]
pub struct PassRun<'a> {
    engine: &'a LinkAdaptationEngine,
    pass: &'a Pass,
    samples: std::iter::Enumerate<slice::Iter<'a, f64>>,
    state: DecisionState,
}

impl PassRun<'_> {
    /// Loop state after the samples consumed so far
    pub fn state(&self) -> &DecisionState {
        &self.state
    }
}

impl Iterator for PassRun<'_> {
    type Item = Decision;

    fn next(&mut self) -> Option<Decision> {
        let (i, &cno) = self.samples.next()?;
        Some(self.engine.step(&mut self.state, self.pass.time_at(i), cno))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.samples.size_hint()
    }
}

impl ExactSizeIterator for PassRun<'_> {}

impl FusedIterator for PassRun<'_> {}

/// Decisions and summary for one completed pass
#[derive(Debug, Clone, Serialize)]
pub struct PassOutcome {
    pub pass_id: String,
    pub decisions: Vec<Decision>,
    pub summary: PassSummary,
}

/// Runs passes through a shared engine
#[derive(Debug, Clone, Copy)]
pub struct PassDriver<'a> {
    engine: &'a LinkAdaptationEngine,
}

impl<'a> PassDriver<'a> {
    pub fn new(engine: &'a LinkAdaptationEngine) -> Self {
        Self { engine }
    }

    /// Decision sequence for `pass`, starting from a fresh state
    pub fn run(&self, pass: &'a Pass) -> PassRun<'a> {
        self.run_from(pass, self.engine.initial_state(pass.start_s))
    }

    /// Decision sequence for `pass`, starting from `state`
    pub fn run_from(&self, pass: &'a Pass, state: DecisionState) -> PassRun<'a> {
        PassRun {
            engine: self.engine,
            pass,
            samples: pass.cno_dbhz.iter().enumerate(),
            state,
        }
    }

    /// Run a pass to completion and summarize it
    pub fn complete(&self, pass: &Pass) -> PassOutcome {
        let decisions: Vec<Decision> = PassDriver::new(self.engine).run(pass).collect();
        let summary = PassSummary::from_decisions(&pass.id, pass.cadence_s, &decisions);

        debug!(
            "Pass {}: {} samples, {} upgrades, {} downgrades, {} forced",
            pass.id, summary.samples, summary.upgrades, summary.downgrades, summary.forced_samples
        );

        PassOutcome {
            pass_id: pass.id.clone(),
            decisions,
            summary,
        }
    }

    /// Run every pass, spreading them over `workers` threads
    ///
    /// `workers == 0` uses the available parallelism. Outcomes come back in
    /// input order.
    pub fn run_all(&self, passes: &[Pass], workers: usize) -> Vec<PassOutcome> {
        let workers = match workers {
            0 => available_workers(),
            n => n,
        }
        .min(passes.len())
        .max(1);

        info!("Running {} passes on {} workers", passes.len(), workers);

        if workers == 1 {
            return passes.iter().map(|p| self.complete(p)).collect();
        }

        let pool = match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
            Ok(pool) => pool,
            Err(e) => {
                warn!("Worker pool unavailable ({}), running sequentially", e);
                return passes.iter().map(|p| self.complete(p)).collect();
            }
        };

        pool.install(|| passes.par_iter().map(|p| self.complete(p)).collect())
    }
}

fn available_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
