//! End-to-end pipeline tests.
//!
//! Drives the public API from delimited text: column resolution -> zones ->
//! metrics -> chart description -> result table export.
//!
//! Run with: `cargo test --test pipeline`

use tzp_analysis::{
    analyze, AllOutBreakpoints, Analysis, AnalysisError, AnalysisRequest, AnalysisRunner,
    Annotation, Breakpoints, ColumnSelection, DynamicBreakpoints, ProtocolSpec, RawTable,
    RowCategory,
};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// 5 s sampling over 50 s, with one unreadable row.
const WINGATE_CSV: &str = "\
Time[s],SmO2[%],Power -  2[W],Cadence
0,70,600,90
5,60,900,120
10,50,850,118
15,45,800,115
20,40,700,110
n/a,39,680,108
25,38,650,105
30,36,600,100
35,45,150,60
40,55,120,55
45,62,100,50
50,60,100,50
";

fn wingate_table(csv: &str) -> RawTable {
    RawTable::from_csv_reader(csv.as_bytes()).unwrap()
}

fn run_all_out(csv: &str, spec: ProtocolSpec) -> tzp_analysis::AllOutAnalysis {
    let request = AnalysisRequest::new(spec)
        .with_breakpoints(Breakpoints::AllOut(AllOutBreakpoints::new(3.0, 10.0)));
    match analyze(&wingate_table(csv), &request).unwrap() {
        Analysis::AllOut(a) => a,
        other => panic!("expected all-out analysis, got {:?}", other),
    }
}

// ============================================================================
// All-out 30s
// ============================================================================

#[test]
fn test_wingate_scenario() {
    init();
    let analysis = run_all_out(WINGATE_CSV, ProtocolSpec::all_out());

    let names: Vec<&str> = analysis.zones.iter().map(|z| z.name.as_str()).collect();
    assert_eq!(names, vec!["T1", "T2", "T3", "T4"]);
    // T4 ends at the post-effort SmO2 peak (62% at 45 s)
    let total: f64 = analysis.zones.iter().map(|z| z.width()).sum();
    assert!((total - 45.0).abs() < 1e-9);

    let m = &analysis.metrics;
    assert_eq!(m.p_max, Some(900.0));
    assert_eq!(m.fatigue_index, Some(33.3));
    assert_eq!(m.half_recovery.t_half, Some(10.0));
    assert!((m.reox_slope.unwrap() - 1.76).abs() < 1e-9);
    assert_eq!(m.zone_durations, vec![3.0, 7.0, 20.0, 15.0]);

    let table = analysis.table.unwrap();
    assert_eq!(table.len(), 26);
    assert_eq!(table.category(RowCategory::Mechanical).count(), 11);
    assert_eq!(table.rows.last().unwrap().label, "Ratio amplitude SmO₂ / puissance");
}

#[test]
fn test_wingate_legacy_table_order() {
    let analysis = run_all_out(WINGATE_CSV, ProtocolSpec::all_out_legacy());
    let table = analysis.table.unwrap();
    assert_eq!(table.len(), 13);

    let csv = table.to_csv_string().unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], "Type,Intervalle,Valeur");
    assert_eq!(lines[1], "Puissance max,0–10s,900");
    assert_eq!(lines[9], "Puissance min,0–30s,600");
    assert_eq!(lines[13], "Indice de fatigue,%,33.3");

    // legacy overlays: spans and the SmO2 max marker only
    assert_eq!(analysis.chart.annotations.len(), 5);
}

#[test]
fn test_wingate_without_recovery() {
    let truncated: String = WINGATE_CSV.lines().take(9).map(|l| format!("{}\n", l)).collect();
    let analysis = run_all_out(&truncated, ProtocolSpec::all_out());

    assert_eq!(analysis.zones[3].end, 31.0);
    assert_eq!(analysis.metrics.reox_slope, None);
    assert_eq!(analysis.metrics.half_recovery.t_half, None);
    assert!(analysis.metrics.fatigue_index.is_some());
    assert!(!analysis
        .chart
        .annotations
        .iter()
        .any(|a| matches!(a, Annotation::Curve { .. })));

    let csv = analysis.table.unwrap().to_csv_string().unwrap();
    assert!(csv.contains("T½ réoxygénation,s,\n"));
}

#[test]
fn test_wingate_invalid_breakpoints() {
    let request = AnalysisRequest::new(ProtocolSpec::all_out())
        .with_breakpoints(Breakpoints::AllOut(AllOutBreakpoints::new(12.0, 8.0)));
    assert!(matches!(
        analyze(&wingate_table(WINGATE_CSV), &request),
        Err(AnalysisError::InvalidBreakpoints { .. })
    ));
}

#[test]
fn test_all_rows_unreadable() {
    let csv = "Time[s],SmO2[%],Power -  2[W]\nx,y,z\n,,\n";
    let request = AnalysisRequest::new(ProtocolSpec::all_out());
    assert!(matches!(
        analyze(&wingate_table(csv), &request),
        Err(AnalysisError::EmptyDataset { rows_read: 2 })
    ));
}

// ============================================================================
// Dynamic ramp
// ============================================================================

fn ramp_csv() -> String {
    let mut csv = String::from("Time [s],SmO2 Sensor,Target Power [W],HR [bpm]\n");
    for i in 0..=90 {
        let t = i * 10;
        let smo2 = if t <= 600 { 75.0 - t as f64 / 12.0 } else { 25.0 + (t - 600) as f64 / 10.0 };
        let power = 100 + t / 3;
        let hr = 95 + t / 10;
        csv.push_str(&format!("{},{},{},{}\n", t, smo2, power, hr));
    }
    csv
}

#[test]
fn test_dynamic_pipeline() {
    init();
    let table = RawTable::from_csv_reader(ramp_csv().as_bytes()).unwrap();
    let request = AnalysisRequest::new(ProtocolSpec::smo2_dynamic())
        .with_breakpoints(Breakpoints::Dynamic(DynamicBreakpoints::new(204.0, 397.0, 600.0)));

    let analysis = match analyze(&table, &request).unwrap() {
        Analysis::Dynamic(d) => d,
        other => panic!("expected dynamic analysis, got {:?}", other),
    };

    assert_eq!(analysis.params.smo2_min, 25.0);
    assert_eq!(analysis.params.smo2_max, 75.0);
    assert_eq!(analysis.bands.s1.time, 200.0);
    assert_eq!(analysis.bands.s2.time, 400.0);
    assert_eq!(analysis.bands.pma.smo2_norm, 0.0);

    let labels: Vec<&str> = analysis.chart.annotations.iter().map(|a| a.label()).collect();
    assert!(labels.contains(&"S1 (166 W, 115 bpm)"));
    assert!(labels.contains(&"PMA (300 W, 155 bpm)"));
    assert!(labels.contains(&"SmO₂ max départ (~75.0%)"));

    let csv = analysis.summary.to_csv_string().unwrap();
    assert!(csv.lines().nth(3).unwrap().starts_with("PMA,600,300,155,25,0"));
}

#[test]
fn test_dynamic_rejects_foreign_selection() {
    let table = RawTable::from_csv_reader(ramp_csv().as_bytes()).unwrap();
    let selection = ColumnSelection {
        time: "Time [s]".to_string(),
        smo2: "HR [bpm]".to_string(),
        power: "Target Power [W]".to_string(),
        heart_rate: None,
    };
    let request = AnalysisRequest::new(ProtocolSpec::smo2_dynamic()).with_selection(selection);
    assert!(matches!(
        analyze(&table, &request),
        Err(AnalysisError::InvalidSelection { .. })
    ));
}

// ============================================================================
// JSON boundary and background runs
// ============================================================================

#[test]
fn test_request_from_json() {
    let json = r#"{
        "spec": {
            "name": "Custom all-out",
            "column_mode": "exact_rename",
            "boundary": {
                "rule": "fixed_time",
                "effort_end": 30.0,
                "recovery_fallback": 31.0,
                "reox_start": 30.0,
                "reox_end": 45.0,
                "bin_width": 10.0,
                "fit_points": 50
            },
            "fatigue": "whole_window",
            "table": "grouped",
            "annotations": { "recovery_markers": true, "reoxygenation_fit": true }
        },
        "breakpoints": { "protocol": "all_out", "t1": 4.0, "t2": 12.0 }
    }"#;
    let request: AnalysisRequest = serde_json::from_str(json).unwrap();
    let analysis = analyze(&wingate_table(WINGATE_CSV), &request).unwrap();

    match &analysis {
        Analysis::AllOut(a) => {
            assert_eq!(a.zones[1].start, 4.0);
            assert_eq!(a.table.as_ref().unwrap().len(), 11);
        }
        other => panic!("expected all-out analysis, got {:?}", other),
    }
    let curve_points = analysis
        .chart()
        .annotations
        .iter()
        .find_map(|a| match a {
            Annotation::Curve { points, .. } => Some(points.len()),
            _ => None,
        });
    assert_eq!(curve_points, Some(50));
}

#[test]
fn test_request_with_unbounded_window_is_rejected() {
    let json = r#"{
        "spec": {
            "name": "Broken all-out",
            "column_mode": "exact_rename",
            "boundary": {
                "rule": "fixed_time",
                "effort_end": 30.0,
                "recovery_fallback": 31.0,
                "reox_start": 30.0,
                "reox_end": 45.0,
                "bin_width": 0.000001,
                "fit_points": 4294967295
            },
            "fatigue": "min_after_peak",
            "table": "detailed",
            "annotations": { "recovery_markers": true, "reoxygenation_fit": true }
        }
    }"#;
    let request: AnalysisRequest = serde_json::from_str(json).unwrap();
    assert!(matches!(
        analyze(&wingate_table(WINGATE_CSV), &request),
        Err(AnalysisError::Config { .. })
    ));
}

#[test]
fn test_runner_discards_superseded_runs() {
    let runner = AnalysisRunner::new();
    let table = wingate_table(WINGATE_CSV);
    let handles: Vec<_> = [3.0, 5.0, 8.0]
        .iter()
        .map(|&t1| {
            let request = AnalysisRequest::new(ProtocolSpec::all_out())
                .with_breakpoints(Breakpoints::AllOut(AllOutBreakpoints::new(t1, 12.0)));
            runner.submit(table.clone(), request)
        })
        .collect();

    let mut results = handles.into_iter().map(|h| h.recv()).collect::<Vec<_>>();
    let latest = results.pop().unwrap();
    assert!(results.iter().all(Option::is_none));
    match latest {
        Some(Ok(Analysis::AllOut(a))) => assert_eq!(a.breakpoints.t1, 8.0),
        other => panic!("expected latest all-out result, got {:?}", other),
    }
}
