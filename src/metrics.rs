//! Derived metrics of the all-out 30s test.
//!
//! Every metric is computed from scratch on each run. Metrics that cannot be
//! defined for a session (empty window, zero denominator, no recovery
//! crossing) are `None`; they never abort the analysis.
//!
//! ## Metrics
//! - Power: peak, mean, minimum and per-bin (0–10, 10–20, 20–30 s) peak/mean
//! - Fatigue index: drop from peak power to the lowest power after it
//! - SmO₂: exertion minimum, post-effort peak, amplitude
//! - T½ reoxygenation: time after the effort until SmO₂ is back halfway
//!   between its minimum and its post-effort peak
//! - Reoxygenation slope: least-squares slope of SmO₂ over 30–45 s
//! - Ratio of SmO₂ amplitude to power amplitude

use log::info;
use serde::{Deserialize, Serialize};

use crate::fit::LinearFit;
use crate::protocol::{EffortWindow, FatigueIndexMethod};
use crate::zones::Zone;
use crate::{round_to, Session, TimeWindow};

/// A located SmO₂ extremum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeakSample {
    /// Index in the session
    pub index: usize,
    pub time: f64,
    pub smo2: f64,
}

/// Highest SmO₂ after the effort, first occurrence on ties.
///
/// `None` when no sample lies strictly after the effort end.
pub fn post_effort_peak(session: &Session, window: &EffortWindow) -> Option<PeakSample> {
    extremum(session, TimeWindow::after(window.effort_end), |candidate, best| {
        candidate > best
    })
}

/// Lowest SmO₂ during the effort `[0, effort_end]`, first occurrence on ties.
pub fn effort_minimum(session: &Session, window: &EffortWindow) -> Option<PeakSample> {
    extremum(session, effort(window), |candidate, best| candidate < best)
}

fn extremum(
    session: &Session,
    window: TimeWindow,
    better: impl Fn(f64, f64) -> bool,
) -> Option<PeakSample> {
    session
        .window(window)
        .fold(None, |best: Option<PeakSample>, (index, s)| match best {
            Some(b) if !better(s.smo2, b.smo2) => Some(b),
            _ => Some(PeakSample {
                index,
                time: s.time,
                smo2: s.smo2,
            }),
        })
}

fn effort(window: &EffortWindow) -> TimeWindow {
    TimeWindow::closed(0.0, window.effort_end)
}

// ============================================================================
// Half recovery
// ============================================================================

/// T½ reoxygenation result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HalfRecovery {
    /// SmO₂ level halfway between the minimum and the post-effort peak
    pub threshold: Option<f64>,
    /// Seconds after the effort end, rounded to 2 decimals
    pub t_half: Option<f64>,
    /// Absolute time of the first post-effort sample at or above threshold
    pub t_half_abs: Option<f64>,
}

impl HalfRecovery {
    fn undefined() -> Self {
        Self {
            threshold: None,
            t_half: None,
            t_half_abs: None,
        }
    }
}

/// Time to recover half of the SmO₂ amplitude after the effort.
pub fn half_recovery(
    session: &Session,
    window: &EffortWindow,
    sm_min: f64,
    sm_max: f64,
) -> HalfRecovery {
    let threshold = sm_min + (sm_max - sm_min) / 2.0;
    let crossing = session
        .window(TimeWindow::after(window.effort_end))
        .find(|(_, s)| s.smo2 >= threshold)
        .map(|(_, s)| s.time);

    HalfRecovery {
        threshold: Some(threshold),
        t_half: crossing.map(|t| round_to(t - window.effort_end, 2)),
        t_half_abs: crossing,
    }
}

// ============================================================================
// Reoxygenation slope
// ============================================================================

/// Least-squares line of SmO₂ against time over the reoxygenation window.
///
/// `None` with fewer than two samples in the window.
pub fn reoxygenation_slope(session: &Session, window: &EffortWindow) -> Option<LinearFit> {
    let points: Vec<(f64, f64)> = session
        .window(TimeWindow::closed(window.reox_start, window.reox_end))
        .map(|(_, s)| (s.time, s.smo2))
        .collect();
    LinearFit::fit(&points)
}

// ============================================================================
// Power
// ============================================================================

/// Peak power of the effort and the lowest power from the peak onward.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerDrop {
    pub p_max: f64,
    /// Index of the first sample at peak power
    pub p_max_index: usize,
    pub p_min_after_pmax: f64,
}

/// Locate the power peak in `[0, effort_end]` and the minimum after it.
pub fn power_drop(session: &Session, window: &EffortWindow) -> Option<PowerDrop> {
    let effort: Vec<(usize, f64)> = session
        .window(effort(window))
        .map(|(i, s)| (i, s.power))
        .collect();

    let (p_max_index, p_max) = effort.iter().copied().fold(None, |best, (i, p)| match best {
        Some((_, bp)) if p <= bp => best,
        _ => Some((i, p)),
    })?;

    let p_min_after_pmax = effort
        .iter()
        .filter(|(i, _)| *i >= p_max_index)
        .map(|(_, p)| *p)
        .reduce(f64::min)?;

    Some(PowerDrop {
        p_max,
        p_max_index,
        p_min_after_pmax,
    })
}

/// Fatigue index in percent, rounded to 1 decimal.
///
/// Defined only when both the peak and the minimum are positive.
pub fn fatigue_index(
    session: &Session,
    window: &EffortWindow,
    method: FatigueIndexMethod,
) -> Option<f64> {
    let (peak, low) = match method {
        FatigueIndexMethod::MinAfterPeak => {
            let drop = power_drop(session, window)?;
            (drop.p_max, drop.p_min_after_pmax)
        }
        FatigueIndexMethod::WholeWindow => {
            let first_bin = TimeWindow::half_open(0.0, window.bin_width);
            let peak = max_of(session.window(first_bin).map(|(_, s)| s.power))?;
            let low = min_of(session.window(effort(window)).map(|(_, s)| s.power))?;
            (peak, low)
        }
    };

    (peak > 0.0 && low > 0.0).then(|| round_to(100.0 * (peak - low) / peak, 1))
}

/// Peak and mean power over one bin of the effort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecileStats {
    /// e.g. "10–20s"
    pub label: String,
    pub window: TimeWindow,
    pub max: Option<f64>,
    pub mean: Option<f64>,
}

/// Split `[0, effort_end]` into bins of `bin_width`; only the last bin is
/// closed on the right.
pub fn decile_stats(session: &Session, window: &EffortWindow) -> Vec<DecileStats> {
    if window.bin_width <= 0.0 {
        return Vec::new();
    }
    let count = (window.effort_end / window.bin_width).ceil() as usize;
    (0..count)
        .map(|i| {
            let start = i as f64 * window.bin_width;
            let end = (start + window.bin_width).min(window.effort_end);
            let bin = if i + 1 == count {
                TimeWindow::closed(start, end)
            } else {
                TimeWindow::half_open(start, end)
            };
            let powers: Vec<f64> = session.window(bin).map(|(_, s)| s.power).collect();
            DecileStats {
                label: format!("{}–{}s", start, end),
                window: bin,
                max: max_of(powers.iter().copied()),
                mean: mean_of(&powers),
            }
        })
        .collect()
}

fn max_of(values: impl Iterator<Item = f64>) -> Option<f64> {
    values.reduce(f64::max)
}

fn min_of(values: impl Iterator<Item = f64>) -> Option<f64> {
    values.reduce(f64::min)
}

fn mean_of(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

// ============================================================================
// Combined metrics
// ============================================================================

/// Lookup key for a single scalar of [`AllOutMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKey {
    BinPowerMax(usize),
    BinPowerMean(usize),
    PowerMax,
    PowerMean,
    PowerMin,
    PowerMinAfterPeak,
    PowerAmplitude,
    Smo2Min,
    Smo2MinTime,
    Smo2Max,
    Smo2MaxTime,
    Smo2Amplitude,
    HalfRecoveryThreshold,
    HalfRecoveryTime,
    HalfRecoveryAbsTime,
    ReoxygenationSlope,
    ZoneDuration(usize),
    FatigueIndex,
    Smo2PowerRatio,
}

/// All scalars of one all-out analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllOutMetrics {
    pub p_max: Option<f64>,
    pub p_mean: Option<f64>,
    /// Lowest power over the whole effort
    pub p_min: Option<f64>,
    pub p_min_after_pmax: Option<f64>,
    pub bins: Vec<DecileStats>,
    pub amplitude_power: Option<f64>,

    /// SmO₂ minimum during the effort
    pub smo2_min: Option<PeakSample>,
    /// SmO₂ peak after the effort
    pub smo2_peak: Option<PeakSample>,
    pub amplitude_smo2: Option<f64>,
    pub half_recovery: HalfRecovery,
    /// Raw fitted line over the reoxygenation window
    pub reox_fit: Option<LinearFit>,
    /// Fitted slope in %/s, rounded to 2 decimals
    pub reox_slope: Option<f64>,

    pub fatigue_method: FatigueIndexMethod,
    pub fatigue_index: Option<f64>,
    /// SmO₂ amplitude over power amplitude, rounded to 3 decimals
    pub ratio: Option<f64>,
    /// Width of each time zone in seconds, rounded to 1 decimal
    pub zone_durations: Vec<f64>,
}

impl AllOutMetrics {
    /// Scalar value behind a key.
    pub fn get(&self, key: MetricKey) -> Option<f64> {
        match key {
            MetricKey::BinPowerMax(i) => self.bins.get(i).and_then(|b| b.max),
            MetricKey::BinPowerMean(i) => self.bins.get(i).and_then(|b| b.mean),
            MetricKey::PowerMax => self.p_max,
            MetricKey::PowerMean => self.p_mean,
            MetricKey::PowerMin => self.p_min,
            MetricKey::PowerMinAfterPeak => self.p_min_after_pmax,
            MetricKey::PowerAmplitude => self.amplitude_power,
            MetricKey::Smo2Min => self.smo2_min.map(|p| p.smo2),
            MetricKey::Smo2MinTime => self.smo2_min.map(|p| p.time),
            MetricKey::Smo2Max => self.smo2_peak.map(|p| p.smo2),
            MetricKey::Smo2MaxTime => self.smo2_peak.map(|p| p.time),
            MetricKey::Smo2Amplitude => self.amplitude_smo2,
            MetricKey::HalfRecoveryThreshold => self.half_recovery.threshold,
            MetricKey::HalfRecoveryTime => self.half_recovery.t_half,
            MetricKey::HalfRecoveryAbsTime => self.half_recovery.t_half_abs,
            MetricKey::ReoxygenationSlope => self.reox_slope,
            MetricKey::ZoneDuration(i) => self.zone_durations.get(i).copied(),
            MetricKey::FatigueIndex => self.fatigue_index,
            MetricKey::Smo2PowerRatio => self.ratio,
        }
    }
}

/// Compute every all-out metric for a session and its time zones.
pub fn compute_all_out_metrics(
    session: &Session,
    zones: &[Zone],
    window: &EffortWindow,
    method: FatigueIndexMethod,
) -> AllOutMetrics {
    let effort_powers: Vec<f64> = session.window(effort(window)).map(|(_, s)| s.power).collect();
    let drop = power_drop(session, window);

    let smo2_min = effort_minimum(session, window);
    let smo2_peak = post_effort_peak(session, window);
    let half_recovery = match (smo2_min, smo2_peak) {
        (Some(lo), Some(hi)) => half_recovery(session, window, lo.smo2, hi.smo2),
        _ => HalfRecovery::undefined(),
    };

    let reox_fit = reoxygenation_slope(session, window);
    let amplitude_power = drop.map(|d| d.p_max - d.p_min_after_pmax);
    let amplitude_smo2 = match (smo2_min, smo2_peak) {
        (Some(lo), Some(hi)) => Some(hi.smo2 - lo.smo2),
        _ => None,
    };
    let ratio = match (amplitude_smo2, amplitude_power) {
        (Some(sm), Some(pw)) if pw > 0.0 => Some(round_to(sm / pw, 3)),
        _ => None,
    };

    let metrics = AllOutMetrics {
        p_max: drop.map(|d| d.p_max),
        p_mean: mean_of(&effort_powers),
        p_min: min_of(effort_powers.iter().copied()),
        p_min_after_pmax: drop.map(|d| d.p_min_after_pmax),
        bins: decile_stats(session, window),
        amplitude_power,
        smo2_min,
        smo2_peak,
        amplitude_smo2,
        half_recovery,
        reox_slope: reox_fit.map(|f| round_to(f.slope, 2)),
        reox_fit,
        fatigue_method: method,
        fatigue_index: fatigue_index(session, window, method),
        ratio,
        zone_durations: zones.iter().map(|z| round_to(z.width(), 1)).collect(),
    };

    info!(
        "[Metrics] {} samples: Pmax={:?}W, FI={:?}%, T½={:?}s, slope={:?}%/s",
        session.len(),
        metrics.p_max,
        metrics.fatigue_index,
        metrics.half_recovery.t_half,
        metrics.reox_slope
    );

    metrics
}
