//! C/No to per-candidate Eb/No conversion

use crate::{to_db, CandidateGrid};

/// A C/No sample carries a measurement only when it is finite
#[inline]
pub fn is_valid_sample(cno_dbhz: f64) -> bool {
    cno_dbhz.is_finite()
}

/// Eb/No (dB) for one information rate; NaN for an invalid sample
#[inline]
pub fn ebno_db(cno_dbhz: f64, info_bit_rate_bps: f64) -> f64 {
    if !is_valid_sample(cno_dbhz) {
        return f64::NAN;
    }
    cno_dbhz - to_db(info_bit_rate_bps)
}

/// Eb/No for every candidate, in grid order
pub fn evaluate(cno_dbhz: f64, grid: &CandidateGrid) -> Vec<f64> {
    grid.candidates()
        .iter()
        .map(|c| ebno_db(cno_dbhz, c.info_bit_rate_bps))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AcmConfig;

    #[test]
    fn test_evaluate_normalizes_by_rate() {
        let grid = CandidateGrid::build(&AcmConfig::default()).unwrap();
        let ebno = evaluate(85.0, &grid);
        assert_eq!(ebno.len(), grid.len());

        for (value, c) in ebno.iter().zip(grid.candidates()) {
            let expected = 85.0 - 10.0 * c.info_bit_rate_bps.log10();
            assert!((value - expected).abs() < 1e-12);
        }

        // QPSK 1/2 at 250 MHz, α=0.9: 85 - 81.19 dB-bps
        assert!((ebno[grid.fallback_index()] - 3.808).abs() < 0.01);
    }

    #[test]
    fn test_faster_candidates_see_less_ebno() {
        let grid = CandidateGrid::build(&AcmConfig::default()).unwrap();
        let ebno = evaluate(80.0, &grid);
        for pair in ebno.windows(2) {
            assert!(pair[1] <= pair[0] + 1e-9);
        }
    }

    #[test]
    fn test_invalid_sample_is_all_nan() {
        let grid = CandidateGrid::build(&AcmConfig::default()).unwrap();
        for cno in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(!is_valid_sample(cno));
            assert!(evaluate(cno, &grid).iter().all(|v| v.is_nan()));
        }
    }
}
