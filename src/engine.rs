//! # Analysis Engine
//!
//! Pipeline entry points: raw table and breakpoints in, zones, metrics, chart
//! description and result table out. Every run is a pure function of its
//! inputs; nothing is cached between runs.
//!
//! ## Background runs
//!
//! Interactive callers recompute on every breakpoint change. [`AnalysisRunner`]
//! moves each run to a worker thread and hands back an [`AnalysisHandle`].
//! Only the most recently submitted run is current: older handles yield
//! `None` once a newer run has been submitted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::annotations::{
    all_out_annotations, all_out_chart, dynamic_annotations, dynamic_chart, ChartSpec,
};
use crate::columns::{
    resolve_exact, resolve_keywords, ColumnCandidates, ColumnSelection, RawTable,
};
use crate::error::{AnalysisError, OptionExt, Result};
use crate::metrics::{compute_all_out_metrics, post_effort_peak, AllOutMetrics};
use crate::normalize::NormalizationParams;
use crate::protocol::{
    AllOutBreakpoints, BoundaryRule, Breakpoints, ColumnMode, DynamicBreakpoints, ProtocolSpec,
};
use crate::table::{ResultTable, ThresholdSummary};
use crate::zones::{
    segment_fixed_time, segment_threshold_bands, ThresholdBands, Zone, ZoneStats,
};
use crate::Session;

// ============================================================================
// Request / Results
// ============================================================================

/// One analysis run: protocol, column choice and breakpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub spec: ProtocolSpec,
    /// Keyword mode only; defaults to the first candidate per field
    #[serde(default)]
    pub selection: Option<ColumnSelection>,
    /// Defaults to the protocol's slider defaults
    #[serde(default)]
    pub breakpoints: Option<Breakpoints>,
}

impl AnalysisRequest {
    pub fn new(spec: ProtocolSpec) -> Self {
        Self {
            spec,
            selection: None,
            breakpoints: None,
        }
    }

    pub fn with_breakpoints(mut self, breakpoints: Breakpoints) -> Self {
        self.breakpoints = Some(breakpoints);
        self
    }

    pub fn with_selection(mut self, selection: ColumnSelection) -> Self {
        self.selection = Some(selection);
        self
    }
}

/// Result of an all-out 30s run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllOutAnalysis {
    /// Breakpoints actually applied
    pub breakpoints: AllOutBreakpoints,
    pub zones: Vec<Zone>,
    pub zone_stats: Vec<ZoneStats>,
    pub metrics: AllOutMetrics,
    pub chart: ChartSpec,
    /// `None` for chart-only protocols
    pub table: Option<ResultTable>,
}

/// Result of a dynamic ramp run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DynamicAnalysis {
    pub breakpoints: DynamicBreakpoints,
    pub params: NormalizationParams,
    pub bands: ThresholdBands,
    /// Share of samples per band, in percent, in band order
    pub distribution: Vec<f64>,
    pub chart: ChartSpec,
    pub summary: ThresholdSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "protocol", rename_all = "snake_case")]
pub enum Analysis {
    AllOut(AllOutAnalysis),
    Dynamic(DynamicAnalysis),
}

impl Analysis {
    pub fn chart(&self) -> &ChartSpec {
        match self {
            Analysis::AllOut(a) => &a.chart,
            Analysis::Dynamic(d) => &d.chart,
        }
    }

    /// Export the result table as CSV, or `None` when the protocol has none.
    pub fn table_csv(&self) -> Result<Option<String>> {
        match self {
            Analysis::AllOut(a) => a.table.as_ref().map(ResultTable::to_csv_string).transpose(),
            Analysis::Dynamic(d) => d.summary.to_csv_string().map(Some),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Resolve the columns of `table` and run the protocol of `request`.
pub fn analyze(table: &RawTable, request: &AnalysisRequest) -> Result<Analysis> {
    let spec = &request.spec;
    let session = match spec.column_mode {
        ColumnMode::ExactRename => resolve_exact(table)?,
        ColumnMode::KeywordMatch => {
            let selection = match &request.selection {
                Some(selection) => selection.clone(),
                None => {
                    let candidates = ColumnCandidates::discover(table)?;
                    ColumnSelection::first_candidates(&candidates)
                        .ok_or_no_column("time", "a column containing \"Time\"")?
                }
            };
            resolve_keywords(table, &selection)?
        }
    };
    debug!(
        "[Engine] Resolved {} of {} rows for '{}'",
        session.len(),
        table.row_count(),
        spec.name
    );

    match (&spec.boundary, request.breakpoints) {
        (BoundaryRule::FixedTime(_), None) => {
            analyze_all_out(&session, AllOutBreakpoints::default(), spec).map(Analysis::AllOut)
        }
        (BoundaryRule::FixedTime(_), Some(Breakpoints::AllOut(bp))) => {
            analyze_all_out(&session, bp, spec).map(Analysis::AllOut)
        }
        (BoundaryRule::ThresholdBands(_), None) => {
            let bp = DynamicBreakpoints::defaults_for(&session);
            analyze_dynamic(&session, bp, spec).map(Analysis::Dynamic)
        }
        (BoundaryRule::ThresholdBands(_), Some(Breakpoints::Dynamic(bp))) => {
            analyze_dynamic(&session, bp, spec).map(Analysis::Dynamic)
        }
        (BoundaryRule::FixedTime(_), Some(Breakpoints::Dynamic(_))) => {
            Err(AnalysisError::ProtocolMismatch {
                message: format!("'{}' expects t1/t2 breakpoints, got s1/s2/pma", spec.name),
            })
        }
        (BoundaryRule::ThresholdBands(_), Some(Breakpoints::AllOut(_))) => {
            Err(AnalysisError::ProtocolMismatch {
                message: format!("'{}' expects s1/s2/pma breakpoints, got t1/t2", spec.name),
            })
        }
    }
}

/// Run the all-out 30s protocol on a resolved session.
///
/// Protocols with fixed breakpoints ignore `breakpoints`.
pub fn analyze_all_out(
    session: &Session,
    breakpoints: AllOutBreakpoints,
    spec: &ProtocolSpec,
) -> Result<AllOutAnalysis> {
    let window = spec
        .effort_window()
        .ok_or_else(|| AnalysisError::ProtocolMismatch {
            message: format!("'{}' is not a fixed-time protocol", spec.name),
        })?;
    window.validate()?;
    let breakpoints = spec.fixed_breakpoints.unwrap_or(breakpoints);

    let peak = post_effort_peak(session, window);
    let zones = segment_fixed_time(&breakpoints, window, peak.as_ref())?;
    let zone_stats = zones.iter().map(|z| z.stats(session)).collect();
    let metrics = compute_all_out_metrics(session, &zones, window, spec.fatigue);

    let annotations = all_out_annotations(&zones, &metrics, window, &spec.annotations);
    let chart = all_out_chart(&spec.name, session, annotations);
    let table = ResultTable::build(spec.table, &metrics, window);

    info!(
        "[Engine] All-out run: t1={} t2={}, {} zones, {} table rows",
        breakpoints.t1,
        breakpoints.t2,
        zones.len(),
        table.as_ref().map_or(0, ResultTable::len)
    );

    Ok(AllOutAnalysis {
        breakpoints,
        zones,
        zone_stats,
        metrics,
        chart,
        table,
    })
}

/// Run the dynamic ramp protocol on a resolved session.
pub fn analyze_dynamic(
    session: &Session,
    breakpoints: DynamicBreakpoints,
    spec: &ProtocolSpec,
) -> Result<DynamicAnalysis> {
    let phase = spec
        .start_phase()
        .ok_or_else(|| AnalysisError::ProtocolMismatch {
            message: format!("'{}' is not a threshold protocol", spec.name),
        })?;
    phase.validate()?;

    let params = NormalizationParams::from_session(session, phase)?;
    let bands = segment_threshold_bands(session, &breakpoints, &params)?;
    let distribution = bands.distribution(session, &params);

    let annotations = dynamic_annotations(&bands, &breakpoints, &params);
    let chart = dynamic_chart(session, &params, annotations);
    let summary = ThresholdSummary::from_bands(&bands);

    info!(
        "[Engine] Dynamic run: S1={}s S2={}s PMA={}s, {} bands",
        breakpoints.s1,
        breakpoints.s2,
        breakpoints.pma,
        bands.zones.len()
    );

    Ok(DynamicAnalysis {
        breakpoints,
        params,
        bands,
        distribution,
        chart,
        summary,
    })
}

// ============================================================================
// Background Runner
// ============================================================================

/// Runs analyses off the calling thread, keeping only the latest one current.
#[derive(Debug, Clone, Default)]
pub struct AnalysisRunner {
    generation: Arc<AtomicU64>,
}

impl AnalysisRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a run on a worker thread. Any earlier handle becomes stale.
    pub fn submit(&self, table: RawTable, request: AnalysisRequest) -> AnalysisHandle {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            let result = analyze(&table, &request);
            // Receiver may already be gone if the handle was dropped
            tx.send(result).ok();
        });

        debug!("[Engine] Submitted run #{}", generation);
        AnalysisHandle {
            receiver: rx,
            generation,
            current: Arc::clone(&self.generation),
        }
    }

    /// Generation of the most recent submission (0 before any).
    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

/// Handle for a background analysis run.
pub struct AnalysisHandle {
    receiver: mpsc::Receiver<Result<Analysis>>,
    generation: u64,
    current: Arc<AtomicU64>,
}

impl AnalysisHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True once a newer run has been submitted.
    pub fn is_stale(&self) -> bool {
        self.current.load(Ordering::SeqCst) != self.generation
    }

    /// Check if the run is complete (non-blocking).
    ///
    /// Returns `None` while running and for stale runs.
    pub fn try_recv(&self) -> Option<Result<Analysis>> {
        if self.is_stale() {
            debug!("[Engine] Discarding stale run #{}", self.generation);
            return None;
        }
        self.receiver.try_recv().ok()
    }

    /// Wait for the run to complete (blocking).
    ///
    /// Returns `None` for stale runs, including runs superseded while waiting.
    pub fn recv(self) -> Option<Result<Analysis>> {
        if self.is_stale() {
            debug!("[Engine] Discarding stale run #{}", self.generation);
            return None;
        }
        let result = self.receiver.recv().ok()?;
        if self.is_stale() {
            debug!("[Engine] Run #{} superseded while running", self.generation);
            return None;
        }
        Some(result)
    }
}
