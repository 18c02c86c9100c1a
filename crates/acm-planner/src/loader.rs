//! Data loading from JSON files

use crate::{PlannerError, Result};
use link_adaptation::{AcmConfig, Pass};
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{info, warn};

const DEFAULT_CADENCE_S: f64 = 1.0;

/// Sanitize ID to prevent injection (alphanumeric, dash, underscore only)
fn sanitize_id(id: String) -> String {
    id.chars()
        .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
        .take(128) // Max length
        .collect()
}

/// Raw pass from JSON
#[derive(Debug, Deserialize)]
struct RawPass {
    id: Option<String>,
    #[serde(alias = "start_s")]
    start_time: Option<f64>,
    cadence_s: Option<f64>,
    #[serde(alias = "cno")]
    cno_dbhz: Option<Vec<Option<f64>>>,
}

/// Load and validate a run configuration
///
/// Fields missing from the file take their defaults.
pub fn load_config(path: impl AsRef<Path>) -> Result<AcmConfig> {
    let path = path.as_ref();
    info!("Loading ACM configuration from {:?}", path);

    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let config: AcmConfig = serde_json::from_reader(reader)?;
    config.validate()?;

    Ok(config)
}

/// Load passes from JSON file
///
/// Accepts either a bare array of passes or an object with a `passes` field.
pub fn load_passes(path: impl AsRef<Path>) -> Result<Vec<Pass>> {
    let path = path.as_ref();
    info!("Loading passes from {:?}", path);

    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let raw: serde_json::Value = serde_json::from_reader(reader)?;

    parse_passes(raw)
}

/// Convert parsed JSON into validated passes
pub fn parse_passes(raw: serde_json::Value) -> Result<Vec<Pass>> {
    let raw_passes: Vec<RawPass> = if let Some(p) = raw.get("passes") {
        serde_json::from_value(p.clone())?
    } else if raw.is_array() {
        serde_json::from_value(raw)?
    } else {
        return Err(PlannerError::NoPasses);
    };

    if raw_passes.is_empty() {
        return Err(PlannerError::NoPasses);
    }

    let mut passes = Vec::with_capacity(raw_passes.len());
    let mut total_gaps = 0;

    for (i, raw) in raw_passes.into_iter().enumerate() {
        let samples = match raw.cno_dbhz {
            Some(s) if !s.is_empty() => s,
            _ => return Err(PlannerError::InvalidPass(i, "no C/No samples".to_string())),
        };

        let gaps = samples.iter().filter(|s| s.is_none()).count();
        total_gaps += gaps;
        if gaps == samples.len() {
            warn!("Pass {} has no valid samples; every decision will be forced", i);
        }

        let id = sanitize_id(raw.id.unwrap_or_else(|| format!("pass-{}", i)));
        let id = if id.is_empty() { format!("pass-{}", i) } else { id };

        let cno: Vec<f64> = samples.into_iter().map(|s| s.unwrap_or(f64::NAN)).collect();
        let pass = Pass::new(
            id,
            raw.start_time.unwrap_or(0.0),
            raw.cadence_s.unwrap_or(DEFAULT_CADENCE_S),
            cno,
        )
        .map_err(|e| PlannerError::InvalidPass(i, e.to_string()))?;

        passes.push(pass);
    }

    info!(
        "Loaded {} passes ({} samples, {} gaps)",
        passes.len(),
        passes.iter().map(|p| p.len()).sum::<usize>(),
        total_gaps
    );

    Ok(passes)
}
