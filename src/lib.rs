//! # TZP Analysis
//!
//! Zone segmentation and derived metrics for cycling performance tests
//! recorded with a muscle oxygenation sensor (SmO₂) and a power meter.
//!
//! This library provides:
//! - Column resolution from heterogeneous device exports
//! - Fixed-time zones for the all-out 30s (Wingate) test
//! - Oxygenation bands from user thresholds for the dynamic ramp test
//! - Fatigue index, T½ reoxygenation, reoxygenation slope and cross indicators
//! - Declarative chart annotations and exportable result tables
//!
//! ## Features
//!
//! - **`ffi`** - Enable JSON FFI bindings for host applications
//!
//! ## Quick Start
//!
//! ```rust
//! use tzp_analysis::{analyze_all_out, AllOutBreakpoints, ProtocolSpec, Sample, Session};
//!
//! let samples: Vec<Sample> = (0..=60)
//!     .map(|t| {
//!         let t = t as f64;
//!         let smo2 = if t <= 30.0 { 70.0 - t } else { 40.0 + (t - 30.0) };
//!         Sample::new(t, smo2, 900.0 - 10.0 * t.min(30.0))
//!     })
//!     .collect();
//! let session = Session::new(samples).unwrap();
//!
//! let analysis = analyze_all_out(
//!     &session,
//!     AllOutBreakpoints::new(3.0, 10.0),
//!     &ProtocolSpec::all_out(),
//! )
//! .unwrap();
//! println!("Fatigue index: {:?}%", analysis.metrics.fatigue_index);
//! ```

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{AnalysisError, OptionExt, Result};

// Column resolution (raw table -> session)
pub mod columns;
pub use columns::{
    resolve, resolve_exact, resolve_keywords, Cell, ColumnCandidates, ColumnSelection, RawTable,
};

// SmO2 normalization for the dynamic protocol
pub mod normalize;
pub use normalize::NormalizationParams;

// Protocol presets and breakpoints
pub mod protocol;
pub use protocol::{
    AllOutBreakpoints, AnnotationSet, BoundaryRule, BreakpointBounds, Breakpoints, ColumnMode,
    DynamicBreakpoints, EffortWindow, FatigueIndexMethod, ProtocolSpec, StartPhase, TableLayout,
};

// Zone segmentation
pub mod zones;
pub use zones::{
    nearest_sample, segment_fixed_time, segment_threshold_bands, BoundarySample, ThresholdBands,
    Zone, ZoneAxis, ZoneStats,
};

// Least-squares line fit
pub mod fit;
pub use fit::LinearFit;

// Derived metrics
pub mod metrics;
pub use metrics::{
    compute_all_out_metrics, fatigue_index, half_recovery, post_effort_peak, reoxygenation_slope,
    AllOutMetrics, DecileStats, HalfRecovery, MetricKey, PeakSample,
};

// Chart annotations
pub mod annotations;
pub use annotations::{Annotation, Axis, ChartSpec, LineStyle, Series};

// Result tables and export
pub mod table;
pub use table::{ResultRow, ResultTable, RowCategory, ThresholdRow, ThresholdSummary};

// Pipeline entry points
pub mod engine;
pub use engine::{
    analyze, analyze_all_out, analyze_dynamic, AllOutAnalysis, Analysis, AnalysisHandle,
    AnalysisRequest, AnalysisRunner, DynamicAnalysis,
};

// FFI bindings for host applications
#[cfg(feature = "ffi")]
pub mod ffi;

#[cfg(feature = "ffi")]
uniffi::setup_scaffolding!();

/// Initialize logging for Android (only used in FFI)
#[cfg(all(feature = "ffi", target_os = "android"))]
pub(crate) fn init_logging() {
    use android_logger::Config;
    use log::LevelFilter;

    android_logger::init_once(
        Config::default()
            .with_max_level(LevelFilter::Debug)
            .with_tag("TzpAnalysisRust"),
    );
}

#[cfg(all(feature = "ffi", not(target_os = "android")))]
pub(crate) fn init_logging() {
    // No-op on non-Android platforms
}

// ============================================================================
// Core Types
// ============================================================================

/// One recorded row: time, oxygenation, power and optional heart rate.
///
/// # Example
/// ```
/// use tzp_analysis::Sample;
/// let sample = Sample::new(12.0, 54.3, 820.0).with_heart_rate(168.0);
/// assert_eq!(sample.heart_rate, Some(168.0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Seconds since the start of the recording
    pub time: f64,
    /// SmO₂ in percent (raw sensor value)
    pub smo2: f64,
    /// Power in watts
    pub power: f64,
    /// Heart rate in bpm, when the export carries one
    pub heart_rate: Option<f64>,
}

impl Sample {
    /// Create a sample without heart rate.
    pub fn new(time: f64, smo2: f64, power: f64) -> Self {
        Self {
            time,
            smo2,
            power,
            heart_rate: None,
        }
    }

    /// Attach a heart rate value.
    pub fn with_heart_rate(mut self, heart_rate: f64) -> Self {
        self.heart_rate = Some(heart_rate);
        self
    }
}

/// A time interval used to restrict a session.
///
/// Each edge is either inclusive or exclusive so the protocol windows
/// (`[0,30]`, `[0,10)`, `(30,∞)`, ...) can be expressed exactly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: f64,
    pub end: f64,
    pub start_inclusive: bool,
    pub end_inclusive: bool,
}

impl TimeWindow {
    /// `[start, end]`
    pub fn closed(start: f64, end: f64) -> Self {
        Self {
            start,
            end,
            start_inclusive: true,
            end_inclusive: true,
        }
    }

    /// `[start, end)`
    pub fn half_open(start: f64, end: f64) -> Self {
        Self {
            start,
            end,
            start_inclusive: true,
            end_inclusive: false,
        }
    }

    /// `(start, +∞)`
    pub fn after(start: f64) -> Self {
        Self {
            start,
            end: f64::INFINITY,
            start_inclusive: false,
            end_inclusive: false,
        }
    }

    /// Check if a time falls inside the window.
    pub fn contains(&self, time: f64) -> bool {
        let above = if self.start_inclusive {
            time >= self.start
        } else {
            time > self.start
        };
        let below = if self.end_inclusive {
            time <= self.end
        } else {
            time < self.end
        };
        above && below
    }
}

/// Ordered samples from one uploaded file.
///
/// A session is never empty and its time column never decreases. It is
/// immutable once built; every analysis borrows it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    samples: Vec<Sample>,
}

impl Session {
    /// Build a session from cleaned samples.
    ///
    /// Returns [`AnalysisError::EmptyDataset`] for an empty input and
    /// [`AnalysisError::UnorderedTime`] if time goes backwards.
    pub fn new(samples: Vec<Sample>) -> Result<Self> {
        if samples.is_empty() {
            return Err(AnalysisError::EmptyDataset { rows_read: 0 });
        }
        for (i, pair) in samples.windows(2).enumerate() {
            if pair[1].time < pair[0].time {
                return Err(AnalysisError::UnorderedTime {
                    index: i + 1,
                    previous: pair[0].time,
                    current: pair[1].time,
                });
            }
        }
        Ok(Self { samples })
    }

    /// All samples in time order.
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Time of the first sample.
    pub fn start_time(&self) -> f64 {
        self.samples.first().map(|s| s.time).unwrap_or(0.0)
    }

    /// Time of the last sample.
    pub fn end_time(&self) -> f64 {
        self.samples.last().map(|s| s.time).unwrap_or(0.0)
    }

    /// Samples inside a window, with their index in the session.
    pub fn window(&self, window: TimeWindow) -> impl Iterator<Item = (usize, &Sample)> + '_ {
        self.samples
            .iter()
            .enumerate()
            .filter(move |(_, s)| window.contains(s.time))
    }

    /// True if any sample carries a heart rate.
    pub fn has_heart_rate(&self) -> bool {
        self.samples.iter().any(|s| s.heart_rate.is_some())
    }
}

/// Round to a fixed number of decimals, exact ties to even.
pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round_ties_even() / factor
}
