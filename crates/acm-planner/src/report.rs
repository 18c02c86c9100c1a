//! Plan report assembly and export

use crate::Result;
use link_adaptation::{AcmConfig, Decision, PassOutcome, PassSummary};
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use tracing::info;

/// Full planning result
#[derive(Debug, Clone, Serialize)]
pub struct PlanReport {
    pub passes: Vec<PassReport>,
    pub metadata: ReportMetadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub pass_id: String,
    pub summary: PassSummary,
    /// Omitted in summary-only reports
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decisions: Option<Vec<Decision>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    pub total_passes: usize,
    pub total_samples: usize,
    pub total_forced_samples: usize,
    pub total_delivered_bits: f64,
    pub config: AcmConfig,
    pub generated_at: String,
}

/// Assemble the report, optionally dropping per-sample decisions
pub fn build_report(config: &AcmConfig, outcomes: Vec<PassOutcome>, summary_only: bool) -> PlanReport {
    let total_samples = outcomes.iter().map(|o| o.summary.samples).sum();
    let total_forced_samples = outcomes.iter().map(|o| o.summary.forced_samples).sum();
    let total_delivered_bits = outcomes.iter().map(|o| o.summary.delivered_bits).sum();

    let passes: Vec<PassReport> = outcomes
        .into_iter()
        .map(|o| PassReport {
            pass_id: o.pass_id,
            summary: o.summary,
            decisions: if summary_only { None } else { Some(o.decisions) },
        })
        .collect();

    PlanReport {
        metadata: ReportMetadata {
            total_passes: passes.len(),
            total_samples,
            total_forced_samples,
            total_delivered_bits,
            config: config.clone(),
            generated_at: chrono::Utc::now().to_rfc3339(),
        },
        passes,
    }
}

/// Write the report as pretty-printed JSON
pub fn write_report(report: &PlanReport, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    info!("Writing report to {:?}", path);

    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, report)?;

    Ok(())
}
