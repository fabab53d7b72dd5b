//! Zone segmentation for both test protocols.
//!
//! ## Fixed-time zones (all-out 30s)
//! - T1 `[0, t1)`, T2 `[t1, t2)`, T3 `[t2, 30)` during the effort
//! - T4 `[30, max_time)` recovery, up to the post-effort SmO₂ peak
//!
//! ## Threshold bands (dynamic ramp)
//! The SmO₂ axis (normalized 0–100) is cut by the values sampled at S1 and S2
//! and by the start-phase peak:
//! - Recovery `[start_peak, 100]`
//! - Zone 1 `[S1, start_peak]`, Zone 2 `[S2, S1]`, Zone 3 `[0, S2]`
//!
//! No order is enforced between S1 and S2, so bands may come out inverted.
//!
//! ## Example
//! ```rust
//! use tzp_analysis::zones::segment_fixed_time;
//! use tzp_analysis::{AllOutBreakpoints, EffortWindow};
//!
//! let breakpoints = AllOutBreakpoints::new(3.0, 10.0);
//! let zones = segment_fixed_time(&breakpoints, &EffortWindow::default(), None).unwrap();
//! assert_eq!(zones.len(), 4);
//! assert_eq!(zones[3].end, 31.0); // no post-effort peak: recovery fallback
//! ```

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{OptionExt, Result};
use crate::metrics::PeakSample;
use crate::normalize::NormalizationParams;
use crate::protocol::{AllOutBreakpoints, DynamicBreakpoints, EffortWindow};
use crate::{Sample, Session, TimeWindow};

/// Axis a zone is measured on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneAxis {
    /// Seconds
    Time,
    /// Normalized SmO₂ (0–100)
    Smo2Normalized,
}

/// A named interval of the timeline or of the SmO₂ axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    /// Short name, e.g. "T2" or "Z1"
    pub name: String,
    /// Display label
    pub label: String,
    pub axis: ZoneAxis,
    pub start: f64,
    pub end: f64,
}

impl Zone {
    fn time(name: &str, start: f64, end: f64) -> Self {
        Self {
            name: name.to_string(),
            label: format!("Zone {}", name),
            axis: ZoneAxis::Time,
            start,
            end,
        }
    }

    fn band(name: &str, label: &str, start: f64, end: f64) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            axis: ZoneAxis::Smo2Normalized,
            start,
            end,
        }
    }

    /// Signed width (`end - start`); negative for inverted bands.
    pub fn width(&self) -> f64 {
        self.end - self.start
    }

    /// Half-open time window `[start, end)`.
    pub fn window(&self) -> TimeWindow {
        TimeWindow::half_open(self.start, self.end)
    }

    /// Samples of a time zone.
    pub fn samples<'a>(&self, session: &'a Session) -> impl Iterator<Item = &'a Sample> + 'a {
        let window = self.window();
        session.window(window).map(|(_, s)| s)
    }

    /// Summary statistics over the zone's samples.
    pub fn stats(&self, session: &Session) -> ZoneStats {
        let mut count = 0usize;
        let mut power_sum = 0.0;
        let mut peak_power: Option<f64> = None;
        let mut min_smo2: Option<f64> = None;
        let mut max_smo2: Option<f64> = None;

        for s in self.samples(session) {
            count += 1;
            power_sum += s.power;
            peak_power = Some(peak_power.map_or(s.power, |p| p.max(s.power)));
            min_smo2 = Some(min_smo2.map_or(s.smo2, |m| m.min(s.smo2)));
            max_smo2 = Some(max_smo2.map_or(s.smo2, |m| m.max(s.smo2)));
        }

        ZoneStats {
            zone: self.name.clone(),
            sample_count: count as u32,
            duration: self.width(),
            mean_power: (count > 0).then(|| power_sum / count as f64),
            peak_power,
            min_smo2,
            max_smo2,
        }
    }
}

/// Statistics over the samples of one time zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneStats {
    pub zone: String,
    pub sample_count: u32,
    /// Zone width in seconds
    pub duration: f64,
    pub mean_power: Option<f64>,
    pub peak_power: Option<f64>,
    pub min_smo2: Option<f64>,
    pub max_smo2: Option<f64>,
}

// ============================================================================
// Fixed-time zones
// ============================================================================

/// Cut the all-out timeline into T1–T4.
///
/// `peak` is the post-effort SmO₂ peak; without one the recovery zone ends at
/// the window's fallback time.
pub fn segment_fixed_time(
    breakpoints: &AllOutBreakpoints,
    window: &EffortWindow,
    peak: Option<&PeakSample>,
) -> Result<Vec<Zone>> {
    breakpoints.validate(window)?;

    let recovery_end = match peak {
        Some(p) => p.time,
        None => {
            debug!(
                "[Zones] No sample after {} s, recovery zone ends at {} s",
                window.effort_end, window.recovery_fallback
            );
            window.recovery_fallback
        }
    };

    Ok(vec![
        Zone::time("T1", 0.0, breakpoints.t1),
        Zone::time("T2", breakpoints.t1, breakpoints.t2),
        Zone::time("T3", breakpoints.t2, window.effort_end),
        Zone::time("T4", window.effort_end, recovery_end),
    ])
}

// ============================================================================
// Threshold bands
// ============================================================================

/// Values of the sample nearest to a breakpoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundarySample {
    /// Index in the session
    pub index: usize,
    pub time: f64,
    pub power: f64,
    pub heart_rate: Option<f64>,
    pub smo2: f64,
    pub smo2_norm: f64,
}

impl BoundarySample {
    fn from_sample(index: usize, sample: &Sample, params: &NormalizationParams) -> Self {
        Self {
            index,
            time: sample.time,
            power: sample.power,
            heart_rate: sample.heart_rate,
            smo2: sample.smo2,
            smo2_norm: params.normalize(sample.smo2),
        }
    }
}

/// Find the sample whose time is closest to `time`.
///
/// Ties go to the earliest sample. Returns `None` only for an empty slice.
pub fn nearest_sample(samples: &[Sample], time: f64) -> Option<(usize, &Sample)> {
    let mut best: Option<(usize, &Sample, f64)> = None;
    for (i, s) in samples.iter().enumerate() {
        let diff = (s.time - time).abs();
        match best {
            Some((_, _, best_diff)) if diff >= best_diff => {}
            _ => best = Some((i, s, diff)),
        }
    }
    best.map(|(i, s, _)| (i, s))
}

/// Boundary samples at S1, S2 and PMA and the resulting SmO₂ bands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdBands {
    pub s1: BoundarySample,
    pub s2: BoundarySample,
    pub pma: BoundarySample,
    /// Recovery (when the start phase has samples), Zone 1, Zone 2, Zone 3
    pub zones: Vec<Zone>,
}

impl ThresholdBands {
    /// Percentage of samples whose normalized SmO₂ falls in each band.
    ///
    /// Bands are tested in order and a sample counts once, for the first
    /// band that contains it (inclusive on both edges).
    pub fn distribution(&self, session: &Session, params: &NormalizationParams) -> Vec<f64> {
        let mut counts = vec![0u32; self.zones.len()];
        for s in session.samples() {
            let v = params.normalize(s.smo2);
            if let Some(i) = self.zones.iter().position(|z| {
                let (lo, hi) = (z.start.min(z.end), z.start.max(z.end));
                v >= lo && v <= hi
            }) {
                counts[i] += 1;
            }
        }
        let total = session.len() as f64;
        counts
            .iter()
            .map(|&c| (c as f64 / total) * 100.0)
            .collect()
    }
}

/// Sample the session at the dynamic breakpoints and build the bands.
pub fn segment_threshold_bands(
    session: &Session,
    breakpoints: &DynamicBreakpoints,
    params: &NormalizationParams,
) -> Result<ThresholdBands> {
    breakpoints.validate()?;

    let at = |time: f64| -> Result<BoundarySample> {
        let (index, sample) = nearest_sample(session.samples(), time).ok_or_empty(0)?;
        Ok(BoundarySample::from_sample(index, sample, params))
    };
    let s1 = at(breakpoints.s1)?;
    let s2 = at(breakpoints.s2)?;
    let pma = at(breakpoints.pma)?;

    let mut zones = Vec::with_capacity(4);
    let zone1_top = match params.start_max_norm {
        Some(start) => {
            zones.push(Zone::band("REC", "Réoxygénation post-effort", start, 100.0));
            start
        }
        None => {
            debug!("[Zones] No start-phase sample, Zone 1 extends to 100");
            100.0
        }
    };
    zones.push(Zone::band("Z1", "Zone 1 : Faible", s1.smo2_norm, zone1_top));
    zones.push(Zone::band("Z2", "Zone 2 : Modérée", s2.smo2_norm, s1.smo2_norm));
    zones.push(Zone::band("Z3", "Zone 3 : Sévère", 0.0, s2.smo2_norm));

    if s2.smo2_norm > s1.smo2_norm {
        debug!(
            "[Zones] S2 band edge {:.1} above S1 edge {:.1}, bands are inverted",
            s2.smo2_norm, s1.smo2_norm
        );
    }

    Ok(ThresholdBands { s1, s2, pma, zones })
}
