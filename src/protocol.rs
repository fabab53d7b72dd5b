//! Protocol definitions and breakpoints.
//!
//! A [`ProtocolSpec`] bundles everything that differs between test protocols:
//! how columns are resolved, how the timeline is cut into zones, which fatigue
//! index definition applies, which overlays are drawn and how the result table
//! is laid out. The presets reproduce the protocol variants used in the lab;
//! custom specs can be loaded from JSON.
//!
//! ## Example
//! ```rust
//! use tzp_analysis::{ProtocolSpec, TableLayout};
//!
//! let spec = ProtocolSpec::all_out();
//! assert_eq!(spec.table, TableLayout::Detailed);
//!
//! let json = serde_json::to_string(&spec).unwrap();
//! let parsed = ProtocolSpec::from_json(&json).unwrap();
//! assert_eq!(parsed, spec);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};
use crate::Session;

// ============================================================================
// Windows
// ============================================================================

/// Time constants of the all-out 30s protocol.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EffortWindow {
    /// End of the all-out effort in seconds.
    /// Default: 30.0
    pub effort_end: f64,
    /// End of the recovery zone when no sample follows the effort.
    /// Default: 31.0
    pub recovery_fallback: f64,
    /// Start of the reoxygenation fit window (inclusive).
    /// Default: 30.0
    pub reox_start: f64,
    /// End of the reoxygenation fit window (inclusive).
    /// Default: 45.0
    pub reox_end: f64,
    /// Width of the power bins inside the effort.
    /// Default: 10.0
    pub bin_width: f64,
    /// Number of points used to draw the fitted line.
    /// Default: 100
    pub fit_points: u32,
}

/// Upper bound on the number of power bins in one effort.
pub const MAX_POWER_BINS: f64 = 100.0;

/// Upper bound on the number of points of the fitted line.
pub const MAX_FIT_POINTS: u32 = 10_000;

fn config_error(message: String) -> AnalysisError {
    AnalysisError::Config { message }
}

impl EffortWindow {
    /// Reject windows that would yield unbounded bins or curves.
    pub fn validate(&self) -> Result<()> {
        let times = [
            self.effort_end,
            self.recovery_fallback,
            self.reox_start,
            self.reox_end,
            self.bin_width,
        ];
        if !times.iter().all(|v| v.is_finite()) {
            return Err(config_error(format!("effort window must be finite: {:?}", self)));
        }
        if self.effort_end <= 0.0 {
            return Err(config_error(format!(
                "effort_end must be positive, got {}",
                self.effort_end
            )));
        }
        if self.recovery_fallback < self.effort_end {
            return Err(config_error(format!(
                "recovery_fallback {} is before effort_end {}",
                self.recovery_fallback, self.effort_end
            )));
        }
        if self.reox_start > self.reox_end {
            return Err(config_error(format!(
                "reox_start {} is after reox_end {}",
                self.reox_start, self.reox_end
            )));
        }
        if self.bin_width <= 0.0 || self.effort_end / self.bin_width > MAX_POWER_BINS {
            return Err(config_error(format!(
                "bin_width {} must be positive and give at most {} bins over {} s",
                self.bin_width, MAX_POWER_BINS, self.effort_end
            )));
        }
        if self.fit_points > MAX_FIT_POINTS {
            return Err(config_error(format!(
                "fit_points {} exceeds {}",
                self.fit_points, MAX_FIT_POINTS
            )));
        }
        Ok(())
    }
}

impl Default for EffortWindow {
    fn default() -> Self {
        Self {
            effort_end: 30.0,
            recovery_fallback: 31.0,
            reox_start: 30.0,
            reox_end: 45.0,
            bin_width: 10.0,
            fit_points: 100,
        }
    }
}

/// Start phase of the dynamic protocol used for the reference SmO₂ peak.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StartPhase {
    /// Samples with `time <= end` belong to the start phase.
    /// Default: 120.0
    pub end: f64,
}

impl StartPhase {
    pub fn validate(&self) -> Result<()> {
        if self.end.is_finite() {
            Ok(())
        } else {
            Err(config_error(format!("start phase end must be finite, got {}", self.end)))
        }
    }
}

impl Default for StartPhase {
    fn default() -> Self {
        Self { end: 120.0 }
    }
}

// ============================================================================
// Protocol Spec
// ============================================================================

/// How raw headers map onto canonical fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnMode {
    ExactRename,
    KeywordMatch,
}

/// How the timeline is cut into zones.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum BoundaryRule {
    /// T1–T4 from fixed markers and the `t1`/`t2` breakpoints
    FixedTime(EffortWindow),
    /// Oxygenation bands from the `s1`/`s2` thresholds
    ThresholdBands(StartPhase),
}

/// Fatigue index definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FatigueIndexMethod {
    /// Peak power against the lowest power after the peak (current definition)
    MinAfterPeak,
    /// Peak of the first bin against the lowest power of the whole effort
    WholeWindow,
}

/// Result table layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableLayout {
    /// No table, chart only
    ChartOnly,
    /// Categorized rows with sub-intervals (`Type,Intervalle,Valeur`)
    Detailed,
    /// Short categorized summary (`Variable,Valeur`)
    Grouped,
    /// Early 13-row layout (`Type,Intervalle,Valeur`)
    Legacy,
    /// Values at S1, S2 and PMA (dynamic protocol)
    Thresholds,
}

/// Optional overlays beyond the zone spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationSet {
    /// SmO₂ min marker and T½ marker
    pub recovery_markers: bool,
    /// Fitted reoxygenation line over the fit window
    pub reoxygenation_fit: bool,
}

impl Default for AnnotationSet {
    fn default() -> Self {
        Self {
            recovery_markers: true,
            reoxygenation_fit: true,
        }
    }
}

/// Complete description of one test protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolSpec {
    /// Display title of the protocol
    pub name: String,
    pub column_mode: ColumnMode,
    pub boundary: BoundaryRule,
    pub fatigue: FatigueIndexMethod,
    pub table: TableLayout,
    pub annotations: AnnotationSet,
    /// Breakpoints that override user input (protocols without sliders)
    #[serde(default)]
    pub fixed_breakpoints: Option<AllOutBreakpoints>,
}

impl ProtocolSpec {
    /// Current all-out 30s protocol: full table, all overlays.
    pub fn all_out() -> Self {
        Self {
            name: "Analyse All-Out 30s : Puissance + SmO₂".to_string(),
            column_mode: ColumnMode::ExactRename,
            boundary: BoundaryRule::FixedTime(EffortWindow::default()),
            fatigue: FatigueIndexMethod::MinAfterPeak,
            table: TableLayout::Detailed,
            annotations: AnnotationSet::default(),
            fixed_breakpoints: None,
        }
    }

    /// All-out 30s with the short three-block summary.
    pub fn all_out_summary() -> Self {
        Self {
            name: "Analyse All-Out 30s : Intégration physiologique et mécanique".to_string(),
            table: TableLayout::Grouped,
            ..Self::all_out()
        }
    }

    /// Early all-out layout with the whole-window fatigue index.
    pub fn all_out_legacy() -> Self {
        Self {
            name: "Analyse All-Out 30s : SmO₂ + Puissance".to_string(),
            fatigue: FatigueIndexMethod::WholeWindow,
            table: TableLayout::Legacy,
            annotations: AnnotationSet {
                recovery_markers: false,
                reoxygenation_fit: false,
            },
            ..Self::all_out()
        }
    }

    /// First all-out version: zones at 3 s and 10 s, chart only.
    pub fn all_out_fixed() -> Self {
        Self {
            name: "Analyse All-Out 30s : SmO2 + Puissance".to_string(),
            table: TableLayout::ChartOnly,
            annotations: AnnotationSet {
                recovery_markers: false,
                reoxygenation_fit: false,
            },
            fixed_breakpoints: Some(AllOutBreakpoints::default()),
            ..Self::all_out()
        }
    }

    /// Dynamic ramp test with normalized SmO₂ bands.
    pub fn smo2_dynamic() -> Self {
        Self {
            name: "Analyse interactive de la SmO₂".to_string(),
            column_mode: ColumnMode::KeywordMatch,
            boundary: BoundaryRule::ThresholdBands(StartPhase::default()),
            fatigue: FatigueIndexMethod::MinAfterPeak,
            table: TableLayout::Thresholds,
            annotations: AnnotationSet {
                recovery_markers: false,
                reoxygenation_fit: false,
            },
            fixed_breakpoints: None,
        }
    }

    /// Parse a spec from JSON and check its window constants.
    pub fn from_json(json: &str) -> Result<Self> {
        let spec: Self = serde_json::from_str(json)?;
        spec.validate()?;
        Ok(spec)
    }

    pub fn validate(&self) -> Result<()> {
        match &self.boundary {
            BoundaryRule::FixedTime(window) => window.validate(),
            BoundaryRule::ThresholdBands(phase) => phase.validate(),
        }
    }

    /// Effort window if this is a fixed-time protocol.
    pub fn effort_window(&self) -> Option<&EffortWindow> {
        match &self.boundary {
            BoundaryRule::FixedTime(window) => Some(window),
            BoundaryRule::ThresholdBands(_) => None,
        }
    }

    /// Start phase if this is a threshold protocol.
    pub fn start_phase(&self) -> Option<&StartPhase> {
        match &self.boundary {
            BoundaryRule::ThresholdBands(phase) => Some(phase),
            BoundaryRule::FixedTime(_) => None,
        }
    }
}

impl Default for ProtocolSpec {
    fn default() -> Self {
        Self::all_out()
    }
}

// ============================================================================
// Breakpoints
// ============================================================================

/// Zone boundaries of the all-out protocol: T2 starts at `t1`, T3 at `t2`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AllOutBreakpoints {
    pub t1: f64,
    pub t2: f64,
}

impl AllOutBreakpoints {
    pub fn new(t1: f64, t2: f64) -> Self {
        Self { t1, t2 }
    }

    /// Accept `0 <= t1 <= t2 <= effort_end`; zero-width zones are allowed.
    pub fn validate(&self, window: &EffortWindow) -> Result<()> {
        if !self.t1.is_finite() || !self.t2.is_finite() {
            return Err(AnalysisError::InvalidBreakpoints {
                message: format!("t1={} and t2={} must be finite", self.t1, self.t2),
            });
        }
        if self.t1 < 0.0 || self.t1 > self.t2 || self.t2 > window.effort_end {
            return Err(AnalysisError::InvalidBreakpoints {
                message: format!(
                    "expected 0 <= t1 <= t2 <= {}, got t1={} t2={}",
                    window.effort_end, self.t1, self.t2
                ),
            });
        }
        Ok(())
    }
}

impl Default for AllOutBreakpoints {
    fn default() -> Self {
        Self { t1: 3.0, t2: 10.0 }
    }
}

/// Threshold positions of the dynamic protocol, in seconds.
///
/// No order is enforced between `s1`, `s2` and `pma`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DynamicBreakpoints {
    pub s1: f64,
    pub s2: f64,
    pub pma: f64,
}

impl DynamicBreakpoints {
    pub fn new(s1: f64, s2: f64, pma: f64) -> Self {
        Self { s1, s2, pma }
    }

    /// Slider defaults for a session (see [`BreakpointBounds::dynamic`]).
    pub fn defaults_for(session: &Session) -> Self {
        let [s1, s2, pma] = BreakpointBounds::dynamic(session);
        Self {
            s1: s1.default,
            s2: s2.default,
            pma: pma.default,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if [self.s1, self.s2, self.pma].iter().all(|v| v.is_finite()) {
            Ok(())
        } else {
            Err(AnalysisError::InvalidBreakpoints {
                message: format!(
                    "s1={} s2={} pma={} must be finite",
                    self.s1, self.s2, self.pma
                ),
            })
        }
    }
}

/// Breakpoints of either protocol.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "protocol", rename_all = "snake_case")]
pub enum Breakpoints {
    AllOut(AllOutBreakpoints),
    Dynamic(DynamicBreakpoints),
}

/// Range and default of one breakpoint input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BreakpointBounds {
    pub min: f64,
    pub max: f64,
    pub default: f64,
}

impl BreakpointBounds {
    fn clamped(min: f64, max: f64, default: f64) -> Self {
        Self {
            min,
            max,
            default: default.max(min).min(max),
        }
    }

    /// Start of T2: 1–15 s, default 3 s.
    pub fn t1() -> Self {
        Self::clamped(1.0, 15.0, 3.0)
    }

    /// Start of T3: one second after `t1` up to 25 s, default 10 s.
    pub fn t2(t1: f64) -> Self {
        Self::clamped(t1 + 1.0, 25.0, 10.0)
    }

    /// S1, S2 and PMA span the whole-second range of the session.
    ///
    /// Defaults sit 200 s and 600 s after the start and 100 s before the end.
    pub fn dynamic(session: &Session) -> [Self; 3] {
        let min = session.start_time().floor();
        let max = session.end_time().floor();
        [
            Self::clamped(min, max, min + 200.0),
            Self::clamped(min, max, min + 600.0),
            Self::clamped(min, max, max - 100.0),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Sample;

    #[test]
    fn test_all_out_validation() {
        let window = EffortWindow::default();
        assert!(AllOutBreakpoints::new(3.0, 10.0).validate(&window).is_ok());
        assert!(AllOutBreakpoints::new(0.0, 0.0).validate(&window).is_ok());
        assert!(AllOutBreakpoints::new(5.0, 5.0).validate(&window).is_ok());
        assert!(AllOutBreakpoints::new(10.0, 3.0).validate(&window).is_err());
        assert!(AllOutBreakpoints::new(-1.0, 3.0).validate(&window).is_err());
        assert!(AllOutBreakpoints::new(3.0, 31.0).validate(&window).is_err());
        assert!(AllOutBreakpoints::new(f64::NAN, 3.0).validate(&window).is_err());
    }

    #[test]
    fn test_dynamic_validation_accepts_any_order() {
        assert!(DynamicBreakpoints::new(900.0, 200.0, 100.0).validate().is_ok());
        assert!(DynamicBreakpoints::new(f64::INFINITY, 200.0, 100.0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_slider_bounds() {
        let t1 = BreakpointBounds::t1();
        assert_eq!((t1.min, t1.max, t1.default), (1.0, 15.0, 3.0));

        let t2 = BreakpointBounds::t2(12.0);
        assert_eq!(t2.min, 13.0);
        assert_eq!(t2.default, 13.0);
        assert_eq!(t2.max, 25.0);
    }

    #[test]
    fn test_dynamic_defaults() {
        let samples: Vec<Sample> = (0..=100)
            .map(|i| Sample::new(5.5 + i as f64 * 10.0, 60.0, 100.0))
            .collect();
        let session = Session::new(samples).unwrap();
        let bp = DynamicBreakpoints::defaults_for(&session);
        assert_eq!(bp.s1, 205.0);
        assert_eq!(bp.s2, 605.0);
        assert_eq!(bp.pma, 905.0);
    }

    #[test]
    fn test_dynamic_defaults_clamped_on_short_session() {
        let samples: Vec<Sample> = (0..=30)
            .map(|i| Sample::new(i as f64 * 10.0, 60.0, 100.0))
            .collect();
        let session = Session::new(samples).unwrap();
        let bp = DynamicBreakpoints::defaults_for(&session);
        assert_eq!(bp.s1, 200.0);
        assert_eq!(bp.s2, 300.0);
        assert_eq!(bp.pma, 200.0);
    }

    #[test]
    fn test_spec_json_roundtrip_and_error() {
        let spec = ProtocolSpec::smo2_dynamic();
        let json = serde_json::to_string(&spec).unwrap();
        assert_eq!(ProtocolSpec::from_json(&json).unwrap(), spec);

        assert!(matches!(
            ProtocolSpec::from_json("{\"name\": 3}"),
            Err(AnalysisError::Config { .. })
        ));
    }

    #[test]
    fn test_effort_window_validation() {
        assert!(EffortWindow::default().validate().is_ok());

        let rejected = [
            EffortWindow { fit_points: u32::MAX, ..EffortWindow::default() },
            EffortWindow { bin_width: 1e-6, ..EffortWindow::default() },
            EffortWindow { bin_width: 0.0, ..EffortWindow::default() },
            EffortWindow { bin_width: f64::NAN, ..EffortWindow::default() },
            EffortWindow { effort_end: 0.0, ..EffortWindow::default() },
            EffortWindow { effort_end: f64::INFINITY, ..EffortWindow::default() },
            EffortWindow { reox_start: 50.0, ..EffortWindow::default() },
            EffortWindow { recovery_fallback: 20.0, ..EffortWindow::default() },
        ];
        for window in rejected {
            assert!(
                matches!(window.validate(), Err(AnalysisError::Config { .. })),
                "accepted {:?}",
                window
            );
        }
        assert!(StartPhase { end: f64::NAN }.validate().is_err());
    }

    #[test]
    fn test_from_json_rejects_unbounded_window() {
        let mut spec = ProtocolSpec::all_out();
        spec.boundary = BoundaryRule::FixedTime(EffortWindow {
            fit_points: 4_294_967_295,
            ..EffortWindow::default()
        });
        let json = serde_json::to_string(&spec).unwrap();
        assert!(matches!(
            ProtocolSpec::from_json(&json),
            Err(AnalysisError::Config { .. })
        ));

        spec.boundary = BoundaryRule::FixedTime(EffortWindow {
            bin_width: 1e-6,
            ..EffortWindow::default()
        });
        let json = serde_json::to_string(&spec).unwrap();
        assert!(ProtocolSpec::from_json(&json).is_err());
    }

    #[test]
    fn test_presets() {
        assert_eq!(
            ProtocolSpec::all_out_legacy().fatigue,
            FatigueIndexMethod::WholeWindow
        );
        assert_eq!(
            ProtocolSpec::all_out_fixed().fixed_breakpoints,
            Some(AllOutBreakpoints::new(3.0, 10.0))
        );
        assert!(ProtocolSpec::smo2_dynamic().effort_window().is_none());
        assert_eq!(
            ProtocolSpec::all_out().effort_window().map(|w| w.effort_end),
            Some(30.0)
        );
    }
}
