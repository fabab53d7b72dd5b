//! SmO₂ normalization for the dynamic protocol.
//!
//! Raw SmO₂ is rescaled to 0–100 using the extrema of the whole session. The
//! parameters are computed once per run and passed to every consumer, so the
//! chart bands and the summary table always agree.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};
use crate::protocol::StartPhase;
use crate::{Session, TimeWindow};

/// Session-wide normalization parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizationParams {
    /// Lowest raw SmO₂ of the session
    pub smo2_min: f64,
    /// Highest raw SmO₂ of the session
    pub smo2_max: f64,
    /// Highest raw SmO₂ during the start phase, if the phase has samples
    pub start_max: Option<f64>,
    /// `start_max` on the normalized scale
    pub start_max_norm: Option<f64>,
}

impl NormalizationParams {
    /// Derive the parameters from a session.
    ///
    /// Returns [`AnalysisError::DegenerateRange`] when SmO₂ is constant.
    pub fn from_session(session: &Session, start_phase: &StartPhase) -> Result<Self> {
        let (smo2_min, smo2_max) = session.samples().iter().fold(
            (f64::INFINITY, f64::NEG_INFINITY),
            |(lo, hi), s| (lo.min(s.smo2), hi.max(s.smo2)),
        );

        if smo2_max <= smo2_min {
            return Err(AnalysisError::DegenerateRange { value: smo2_min });
        }

        let start_max = session
            .window(TimeWindow::closed(f64::NEG_INFINITY, start_phase.end))
            .map(|(_, s)| s.smo2)
            .reduce(f64::max);

        let mut params = Self {
            smo2_min,
            smo2_max,
            start_max,
            start_max_norm: None,
        };
        let start_max_norm = start_max.map(|v| params.normalize(v));
        params.start_max_norm = start_max_norm;

        debug!(
            "[Normalize] SmO2 range {:.1}-{:.1}%, start max {:?}",
            smo2_min, smo2_max, start_max
        );

        Ok(params)
    }

    /// Map a raw SmO₂ value onto the 0–100 scale.
    pub fn normalize(&self, value: f64) -> f64 {
        100.0 * (value - self.smo2_min) / (self.smo2_max - self.smo2_min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Sample;

    fn session(points: &[(f64, f64)]) -> Session {
        Session::new(
            points
                .iter()
                .map(|&(t, smo2)| Sample::new(t, smo2, 150.0))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_normalize_extrema() {
        let s = session(&[(0.0, 62.0), (60.0, 70.0), (300.0, 35.0), (600.0, 80.0)]);
        let params = NormalizationParams::from_session(&s, &StartPhase::default()).unwrap();

        assert_eq!(params.normalize(params.smo2_min), 0.0);
        assert_eq!(params.normalize(params.smo2_max), 100.0);
        assert!((params.normalize(57.5) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_start_phase_max() {
        let s = session(&[(0.0, 62.0), (60.0, 70.0), (120.0, 71.0), (121.0, 90.0), (400.0, 30.0)]);
        let params = NormalizationParams::from_session(&s, &StartPhase::default()).unwrap();

        assert_eq!(params.start_max, Some(71.0));
        let expected = 100.0 * (71.0 - 30.0) / 60.0;
        assert!((params.start_max_norm.unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_start_phase_without_samples() {
        let s = session(&[(200.0, 62.0), (300.0, 70.0)]);
        let params = NormalizationParams::from_session(&s, &StartPhase::default()).unwrap();
        assert_eq!(params.start_max, None);
        assert_eq!(params.start_max_norm, None);
    }

    #[test]
    fn test_degenerate_range() {
        let s = session(&[(0.0, 55.0), (10.0, 55.0), (20.0, 55.0)]);
        assert!(matches!(
            NormalizationParams::from_session(&s, &StartPhase::default()),
            Err(AnalysisError::DegenerateRange { .. })
        ));
    }
}
