//! Declarative chart description.
//!
//! The rendering layer receives a [`ChartSpec`]: plotted series plus a list of
//! [`Annotation`]s (shaded spans, reference lines, markers, fitted curves).
//! Nothing here draws; positions come from the computed zones and metrics.

use serde::Serialize;

use crate::metrics::AllOutMetrics;
use crate::normalize::NormalizationParams;
use crate::protocol::{AnnotationSet, DynamicBreakpoints, EffortWindow};
use crate::zones::{BoundarySample, ThresholdBands, Zone, ZoneAxis};
use crate::Session;

/// Fill colors of T1–T4
const TIME_ZONE_COLORS: [&str; 4] = ["lightgreen", "khaki", "lightcoral", "lightblue"];
const TIME_ZONE_ALPHA: f64 = 0.3;

/// Which axis an annotation is positioned on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    /// Positions are times (vertical spans and lines)
    X,
    /// Positions are SmO₂ values (horizontal spans and lines)
    Y,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LineStyle {
    Solid,
    Dashed,
}

/// One overlay element.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Annotation {
    Span {
        axis: Axis,
        start: f64,
        end: f64,
        color: String,
        alpha: f64,
        label: String,
    },
    Line {
        axis: Axis,
        position: f64,
        color: String,
        style: LineStyle,
        width: f64,
        label: String,
    },
    Marker {
        x: f64,
        y: f64,
        color: String,
        label: String,
    },
    Curve {
        points: Vec<(f64, f64)>,
        color: String,
        style: LineStyle,
        label: String,
    },
}

impl Annotation {
    pub fn label(&self) -> &str {
        match self {
            Annotation::Span { label, .. }
            | Annotation::Line { label, .. }
            | Annotation::Marker { label, .. }
            | Annotation::Curve { label, .. } => label,
        }
    }
}

/// A plotted data series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub label: String,
    pub color: String,
    pub style: LineStyle,
    /// Drawn against the secondary y axis
    pub secondary_axis: bool,
    pub points: Vec<(f64, f64)>,
}

/// Everything the rendering layer needs for one chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSpec {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub y2_label: Option<String>,
    pub series: Vec<Series>,
    pub annotations: Vec<Annotation>,
}

// ============================================================================
// All-out 30s
// ============================================================================

fn zone_span(zone: &Zone, color: &str, alpha: f64) -> Annotation {
    Annotation::Span {
        axis: match zone.axis {
            ZoneAxis::Time => Axis::X,
            ZoneAxis::Smo2Normalized => Axis::Y,
        },
        start: zone.start,
        end: zone.end,
        color: color.to_string(),
        alpha,
        label: zone.label.clone(),
    }
}

/// Zone spans, SmO₂ extrema, T½ marker and the reoxygenation fit.
pub fn all_out_annotations(
    zones: &[Zone],
    metrics: &AllOutMetrics,
    window: &EffortWindow,
    set: &AnnotationSet,
) -> Vec<Annotation> {
    let mut annotations: Vec<Annotation> = zones
        .iter()
        .zip(TIME_ZONE_COLORS.iter().cycle())
        .map(|(zone, color)| zone_span(zone, color, TIME_ZONE_ALPHA))
        .collect();

    if let Some(peak) = metrics.smo2_peak {
        annotations.push(Annotation::Marker {
            x: peak.time,
            y: peak.smo2,
            color: "blue".to_string(),
            label: format!("SmO₂ max ({:.1}%)", peak.smo2),
        });
    }

    if set.recovery_markers {
        if let Some(low) = metrics.smo2_min {
            annotations.push(Annotation::Marker {
                x: low.time,
                y: low.smo2,
                color: "black".to_string(),
                label: format!("SmO₂ min ({:.1}%)", low.smo2),
            });
        }
        let recovery = &metrics.half_recovery;
        if let (Some(t_abs), Some(t_half), Some(threshold)) =
            (recovery.t_half_abs, recovery.t_half, recovery.threshold)
        {
            annotations.push(Annotation::Marker {
                x: t_abs,
                y: threshold,
                color: "purple".to_string(),
                label: format!("T½ réox ({:.2}s)", t_half),
            });
        }
    }

    if set.reoxygenation_fit {
        if let Some(fit) = metrics.reox_fit {
            annotations.push(Annotation::Curve {
                points: fit.sample(window.reox_start, window.reox_end, window.fit_points),
                color: "green".to_string(),
                style: LineStyle::Dashed,
                label: format!("Pente réox ({}–{}s)", window.reox_start, window.reox_end),
            });
        }
    }

    annotations
}

/// SmO₂ and power against time with the all-out overlays.
pub fn all_out_chart(title: &str, session: &Session, annotations: Vec<Annotation>) -> ChartSpec {
    let samples = session.samples();
    ChartSpec {
        title: title.to_string(),
        x_label: "Temps (s)".to_string(),
        y_label: "SmO₂ (%)".to_string(),
        y2_label: Some("Puissance (W)".to_string()),
        series: vec![
            Series {
                label: "SmO₂ (%)".to_string(),
                color: "blue".to_string(),
                style: LineStyle::Solid,
                secondary_axis: false,
                points: samples.iter().map(|s| (s.time, s.smo2)).collect(),
            },
            Series {
                label: "Puissance (W)".to_string(),
                color: "red".to_string(),
                style: LineStyle::Dashed,
                secondary_axis: true,
                points: samples.iter().map(|s| (s.time, s.power)).collect(),
            },
        ],
        annotations,
    }
}

// ============================================================================
// Dynamic ramp
// ============================================================================

fn band_style(zone: &Zone) -> (&'static str, f64) {
    match zone.name.as_str() {
        "REC" => ("lightblue", 0.3),
        "Z1" => ("green", 0.2),
        "Z2" => ("orange", 0.2),
        _ => ("red", 0.2),
    }
}

/// "S1 (250 W, 152 bpm)"; values are truncated to whole units.
fn breakpoint_label(name: &str, at: &BoundarySample) -> String {
    match at.heart_rate {
        Some(hr) => format!("{} ({} W, {} bpm)", name, at.power.trunc(), hr.trunc()),
        None => format!("{} ({} W)", name, at.power.trunc()),
    }
}

/// SmO₂ bands, breakpoint lines and the start-phase reference line.
pub fn dynamic_annotations(
    bands: &ThresholdBands,
    breakpoints: &DynamicBreakpoints,
    params: &NormalizationParams,
) -> Vec<Annotation> {
    let mut annotations: Vec<Annotation> = bands
        .zones
        .iter()
        .map(|zone| {
            let (color, alpha) = band_style(zone);
            zone_span(zone, color, alpha)
        })
        .collect();

    for (name, position, at, color) in [
        ("S1", breakpoints.s1, &bands.s1, "green"),
        ("S2", breakpoints.s2, &bands.s2, "red"),
        ("PMA", breakpoints.pma, &bands.pma, "black"),
    ] {
        annotations.push(Annotation::Line {
            axis: Axis::X,
            position,
            color: color.to_string(),
            style: LineStyle::Dashed,
            width: 1.5,
            label: breakpoint_label(name, at),
        });
    }

    if let (Some(raw), Some(norm)) = (params.start_max, params.start_max_norm) {
        annotations.push(Annotation::Line {
            axis: Axis::Y,
            position: norm,
            color: "purple".to_string(),
            style: LineStyle::Dashed,
            width: 1.0,
            label: format!("SmO₂ max départ (~{:.1}%)", raw),
        });
    }

    annotations
}

/// Normalized SmO₂ against time with the dynamic overlays.
pub fn dynamic_chart(
    session: &Session,
    params: &NormalizationParams,
    annotations: Vec<Annotation>,
) -> ChartSpec {
    ChartSpec {
        title: "SmO₂ – Zones d'intensité ajustées dynamiquement".to_string(),
        x_label: "Temps (s)".to_string(),
        y_label: "SmO₂ normalisée (%)".to_string(),
        y2_label: None,
        series: vec![Series {
            label: "SmO₂ normalisée (%)".to_string(),
            color: "blue".to_string(),
            style: LineStyle::Solid,
            secondary_axis: false,
            points: session
                .samples()
                .iter()
                .map(|s| (s.time, params.normalize(s.smo2)))
                .collect(),
        }],
        annotations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{compute_all_out_metrics, post_effort_peak};
    use crate::protocol::{AllOutBreakpoints, FatigueIndexMethod, StartPhase};
    use crate::zones::{segment_fixed_time, segment_threshold_bands};
    use crate::Sample;

    fn all_out_session(with_recovery: bool) -> Session {
        let end = if with_recovery { 60 } else { 30 };
        let samples = (0..=end)
            .map(|t| {
                let t = t as f64;
                let smo2 = if t <= 30.0 { 70.0 - t } else { 40.0 + (t - 30.0) };
                Sample::new(t, smo2, 900.0 - 10.0 * t.min(30.0))
            })
            .collect();
        Session::new(samples).unwrap()
    }

    fn build(session: &Session, set: AnnotationSet) -> Vec<Annotation> {
        let window = EffortWindow::default();
        let peak = post_effort_peak(session, &window);
        let zones =
            segment_fixed_time(&AllOutBreakpoints::new(3.0, 10.0), &window, peak.as_ref()).unwrap();
        let metrics =
            compute_all_out_metrics(session, &zones, &window, FatigueIndexMethod::MinAfterPeak);
        all_out_annotations(&zones, &metrics, &window, &set)
    }

    #[test]
    fn test_all_out_full_overlay() {
        let annotations = build(&all_out_session(true), AnnotationSet::default());

        let spans: Vec<&Annotation> = annotations
            .iter()
            .filter(|a| matches!(a, Annotation::Span { .. }))
            .collect();
        assert_eq!(spans.len(), 4);
        match spans[3] {
            Annotation::Span { start, end, color, .. } => {
                assert_eq!((*start, *end), (30.0, 60.0));
                assert_eq!(color, "lightblue");
            }
            _ => unreachable!(),
        }

        let labels: Vec<&str> = annotations.iter().map(Annotation::label).collect();
        assert!(labels.contains(&"SmO₂ max (70.0%)"));
        assert!(labels.contains(&"SmO₂ min (40.0%)"));
        assert!(labels.contains(&"T½ réox (15.00s)"));

        let curve = annotations
            .iter()
            .find_map(|a| match a {
                Annotation::Curve { points, .. } => Some(points),
                _ => None,
            })
            .unwrap();
        assert_eq!(curve.len(), 100);
        assert_eq!(curve[0].0, 30.0);
        assert_eq!(curve[99].0, 45.0);
    }

    #[test]
    fn test_all_out_without_recovery_data() {
        let annotations = build(&all_out_session(false), AnnotationSet::default());

        // Zones still render, recovery ends at the fallback
        match &annotations[3] {
            Annotation::Span { start, end, .. } => assert_eq!((*start, *end), (30.0, 31.0)),
            other => panic!("expected span, got {:?}", other),
        }
        assert!(!annotations
            .iter()
            .any(|a| matches!(a, Annotation::Curve { .. })));
        assert!(!annotations.iter().any(|a| a.label().starts_with("T½")));
        assert!(!annotations.iter().any(|a| a.label().starts_with("SmO₂ max")));
    }

    #[test]
    fn test_all_out_minimal_set() {
        let set = AnnotationSet {
            recovery_markers: false,
            reoxygenation_fit: false,
        };
        let annotations = build(&all_out_session(true), set);
        // four spans + SmO2 max marker
        assert_eq!(annotations.len(), 5);
    }

    #[test]
    fn test_dynamic_overlay() {
        let samples: Vec<Sample> = (0..=60)
            .map(|i| {
                let t = i as f64 * 10.0;
                Sample::new(t, 80.0 - t / 10.0, 100.0 + t / 2.0).with_heart_rate(100.0 + t / 10.0)
            })
            .collect();
        let session = Session::new(samples).unwrap();
        let params = NormalizationParams::from_session(&session, &StartPhase::default()).unwrap();
        let breakpoints = DynamicBreakpoints::new(203.0, 400.0, 590.0);
        let bands = segment_threshold_bands(&session, &breakpoints, &params).unwrap();
        let annotations = dynamic_annotations(&bands, &breakpoints, &params);

        assert_eq!(annotations.len(), 4 + 3 + 1);
        let s1_line = annotations
            .iter()
            .find(|a| a.label().starts_with("S1"))
            .unwrap();
        match s1_line {
            Annotation::Line { axis, position, label, .. } => {
                assert_eq!(*axis, Axis::X);
                // line sits at the requested position, label uses the nearest sample
                assert_eq!(*position, 203.0);
                assert_eq!(label, "S1 (200 W, 120 bpm)");
            }
            _ => unreachable!(),
        }
        assert!(annotations
            .iter()
            .any(|a| a.label() == "SmO₂ max départ (~80.0%)"));
    }
}
