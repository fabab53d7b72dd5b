//! FFI bindings for host applications.
//!
//! The host UI talks to the engine through JSON strings so that the whole
//! result tree (zones, metrics, chart description, table) crosses the
//! boundary in one call. All FFI functions are prefixed with `ffi_`.

use log::{info, warn};
use serde::Deserialize;
use serde_json::json;

use crate::columns::RawTable;
use crate::engine::{analyze, AnalysisRequest};
use crate::error::Result;
use crate::init_logging;
use crate::protocol::{BreakpointBounds, ProtocolSpec};

/// Payload of [`ffi_analyze`].
#[derive(Debug, Deserialize)]
struct FfiAnalyzeInput {
    table: RawTable,
    #[serde(flatten)]
    request: AnalysisRequest,
}

fn error_json(message: impl std::fmt::Display) -> String {
    json!({ "error": message.to_string() }).to_string()
}

fn run(input_json: &str) -> Result<String> {
    let input: FfiAnalyzeInput = serde_json::from_str(input_json)?;
    info!(
        "[TzpAnalysisRust] ffi_analyze '{}' on {} rows",
        input.request.spec.name,
        input.table.row_count()
    );
    analyze(&input.table, &input.request)?.to_json()
}

/// Run one analysis.
///
/// Input: `{"table": {...}, "spec": {...}, "selection": ..., "breakpoints": ...}`.
/// Output: the serialized analysis, or `{"error": "..."}`.
#[uniffi::export]
pub fn ffi_analyze(input_json: String) -> String {
    init_logging();
    match run(&input_json) {
        Ok(json) => json,
        Err(e) => {
            warn!("[TzpAnalysisRust] ffi_analyze failed: {}", e);
            error_json(e)
        }
    }
}

/// Protocol presets as a JSON array.
#[uniffi::export]
pub fn ffi_protocol_presets() -> String {
    let presets = [
        ProtocolSpec::all_out(),
        ProtocolSpec::all_out_summary(),
        ProtocolSpec::all_out_legacy(),
        ProtocolSpec::all_out_fixed(),
        ProtocolSpec::smo2_dynamic(),
    ];
    serde_json::to_string(&presets).unwrap_or_else(|_| "[]".to_string())
}

/// Slider bounds of `t1` and of `t2` given `t1`.
#[uniffi::export]
pub fn ffi_all_out_bounds(t1: f64) -> String {
    let bounds = [BreakpointBounds::t1(), BreakpointBounds::t2(t1)];
    serde_json::to_string(&bounds).unwrap_or_else(|_| "[]".to_string())
}
