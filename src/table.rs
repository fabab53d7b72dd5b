//! Result tables and delimited-text export.
//!
//! All-out layouts are fixed, ordered row lists filled from [`AllOutMetrics`];
//! the dynamic protocol summarizes the boundary samples at S1, S2 and PMA.
//! Undefined values are kept as `None` and exported as empty cells.

use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::metrics::{AllOutMetrics, MetricKey};
use crate::protocol::{EffortWindow, TableLayout};
use crate::zones::{BoundarySample, ThresholdBands};

/// Category a row is displayed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowCategory {
    Mechanical,
    Physiological,
    Zones,
    Cross,
}

impl RowCategory {
    pub fn title(&self) -> &'static str {
        match self {
            RowCategory::Mechanical => "Mécanique",
            RowCategory::Physiological => "Physiologique",
            RowCategory::Zones => "Zones",
            RowCategory::Cross => "Indicateurs croisés",
        }
    }
}

/// One labelled value, optionally tagged with the interval it covers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub category: RowCategory,
    pub label: String,
    pub interval: Option<String>,
    pub value: Option<f64>,
}

/// Ordered result rows of one all-out analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultTable {
    pub layout: TableLayout,
    pub rows: Vec<ResultRow>,
}

/// Collects rows while walking a layout.
struct RowBuilder<'a> {
    metrics: &'a AllOutMetrics,
    rows: Vec<ResultRow>,
}

impl<'a> RowBuilder<'a> {
    fn new(metrics: &'a AllOutMetrics) -> Self {
        Self {
            metrics,
            rows: Vec::new(),
        }
    }

    fn push(
        &mut self,
        category: RowCategory,
        label: &str,
        interval: Option<&str>,
        key: MetricKey,
    ) {
        self.rows.push(ResultRow {
            category,
            label: label.to_string(),
            interval: interval.map(str::to_string),
            value: self.metrics.get(key),
        });
    }

    fn per_bin(&mut self, label: &str, key: fn(usize) -> MetricKey) {
        let labels: Vec<String> = self.metrics.bins.iter().map(|b| b.label.clone()).collect();
        for (i, interval) in labels.iter().enumerate() {
            self.push(RowCategory::Mechanical, label, Some(interval.as_str()), key(i));
        }
    }

    fn finish(self, layout: TableLayout) -> ResultTable {
        ResultTable {
            layout,
            rows: self.rows,
        }
    }
}

impl ResultTable {
    /// Lay out the metrics; `None` for layouts without an all-out table.
    pub fn build(
        layout: TableLayout,
        metrics: &AllOutMetrics,
        window: &EffortWindow,
    ) -> Option<Self> {
        match layout {
            TableLayout::Detailed => Some(Self::detailed(metrics, window)),
            TableLayout::Grouped => Some(Self::grouped(metrics, window)),
            TableLayout::Legacy => Some(Self::legacy(metrics, window)),
            TableLayout::ChartOnly | TableLayout::Thresholds => None,
        }
    }

    fn detailed(metrics: &AllOutMetrics, window: &EffortWindow) -> Self {
        use MetricKey::*;
        use RowCategory::*;

        let effort = format!("0–{}s", window.effort_end);
        let post = format!("post-{}s", window.effort_end);
        let reox = format!("{}–{}s", window.reox_start, window.reox_end);
        let effort = Some(effort.as_str());
        let post = Some(post.as_str());

        let mut b = RowBuilder::new(metrics);
        b.per_bin("Puissance max", BinPowerMax);
        b.push(Mechanical, "Puissance max", effort, PowerMax);
        b.per_bin("Puissance moyenne", BinPowerMean);
        b.push(Mechanical, "Puissance moyenne", effort, PowerMean);
        b.push(Mechanical, "Puissance min", effort, PowerMin);
        b.push(Mechanical, "Puissance min après Pmax", effort, PowerMinAfterPeak);
        b.push(Mechanical, "Amplitude puissance", effort, PowerAmplitude);

        b.push(Physiological, "SmO₂ min", effort, Smo2Min);
        b.push(Physiological, "Temps SmO₂ min", effort, Smo2MinTime);
        b.push(Physiological, "SmO₂ max", post, Smo2Max);
        b.push(Physiological, "Temps SmO₂ max", post, Smo2MaxTime);
        b.push(Physiological, "Amplitude SmO₂", post, Smo2Amplitude);
        b.push(Physiological, "Seuil T½", Some("%"), HalfRecoveryThreshold);
        b.push(Physiological, "T½ réoxygénation", Some("s"), HalfRecoveryTime);
        b.push(Physiological, "Temps T½ absolu", Some("s"), HalfRecoveryAbsTime);
        b.push(Physiological, "Pente réox", Some(reox.as_str()), ReoxygenationSlope);

        for (i, label) in [
            "Durée zone verte (T1)",
            "Durée zone jaune (T2)",
            "Durée zone rouge (T3)",
            "Durée récupération (T4)",
        ]
        .iter()
        .enumerate()
        {
            b.push(Zones, label, Some("s"), ZoneDuration(i));
        }

        b.push(Cross, "Indice de fatigue", Some("%"), FatigueIndex);
        b.push(Cross, "Ratio amplitude SmO₂ / puissance", None, Smo2PowerRatio);
        b.finish(TableLayout::Detailed)
    }

    fn grouped(metrics: &AllOutMetrics, window: &EffortWindow) -> Self {
        use MetricKey::*;
        use RowCategory::*;

        let effort = format!("({}–{}s)", 0, window.effort_end);
        let reox = format!("({}–{}s)", window.reox_start, window.reox_end);

        let mut b = RowBuilder::new(metrics);
        b.push(Mechanical, &format!("Puissance max {}", effort), None, PowerMax);
        b.push(Mechanical, "Puissance min après Pmax", None, PowerMinAfterPeak);
        b.push(Mechanical, "Amplitude puissance", None, PowerAmplitude);
        b.push(Mechanical, &format!("Puissance moyenne {}", effort), None, PowerMean);

        b.push(Physiological, "SmO₂ min", None, Smo2Min);
        b.push(Physiological, "SmO₂ max", None, Smo2Max);
        b.push(Physiological, "Amplitude SmO₂", None, Smo2Amplitude);
        b.push(Physiological, "T½ réoxygénation (s)", None, HalfRecoveryTime);
        b.push(Physiological, &format!("Pente réox {} (%/s)", reox), None, ReoxygenationSlope);

        b.push(Cross, "Indice de fatigue (%)", None, FatigueIndex);
        b.push(Cross, "Ratio amplitude SmO₂ / puissance", None, Smo2PowerRatio);
        b.finish(TableLayout::Grouped)
    }

    fn legacy(metrics: &AllOutMetrics, window: &EffortWindow) -> Self {
        use MetricKey::*;
        use RowCategory::*;

        let effort = format!("0–{}s", window.effort_end);
        let post = format!("post-{}s", window.effort_end);
        let effort = Some(effort.as_str());
        let post = Some(post.as_str());

        let mut b = RowBuilder::new(metrics);
        b.per_bin("Puissance max", BinPowerMax);
        b.push(Mechanical, "Puissance max", effort, PowerMax);
        b.per_bin("Puissance moyenne", BinPowerMean);
        b.push(Mechanical, "Puissance moyenne", effort, PowerMean);
        b.push(Mechanical, "Puissance min", effort, PowerMin);
        b.push(Physiological, "SmO2 min", effort, Smo2Min);
        b.push(Physiological, "SmO2 max", post, Smo2Max);
        b.push(Physiological, "Temps SmO₂ max", post, Smo2MaxTime);
        b.push(Cross, "Indice de fatigue", Some("%"), FatigueIndex);
        b.finish(TableLayout::Legacy)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First row matching a label and interval.
    pub fn find(&self, label: &str, interval: Option<&str>) -> Option<&ResultRow> {
        self.rows
            .iter()
            .find(|r| r.label == label && r.interval.as_deref() == interval)
    }

    /// Rows of one category, in table order.
    pub fn category(&self, category: RowCategory) -> impl Iterator<Item = &ResultRow> + '_ {
        self.rows.iter().filter(move |r| r.category == category)
    }

    /// Write the table as CSV.
    ///
    /// `Grouped` tables use `Variable,Valeur`; the others `Type,Intervalle,Valeur`.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv = csv::Writer::from_writer(writer);
        match self.layout {
            TableLayout::Grouped => {
                csv.write_record(["Variable", "Valeur"])?;
                for row in &self.rows {
                    csv.write_record([row.label.as_str(), format_value(row.value).as_str()])?;
                }
            }
            _ => {
                csv.write_record(["Type", "Intervalle", "Valeur"])?;
                for row in &self.rows {
                    csv.write_record([
                        row.label.as_str(),
                        row.interval.as_deref().unwrap_or(""),
                        format_value(row.value).as_str(),
                    ])?;
                }
            }
        }
        csv.flush().map_err(csv::Error::from)?;
        Ok(())
    }

    pub fn to_csv_string(&self) -> Result<String> {
        let mut buf = Vec::new();
        self.write_csv(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

fn format_value(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

// ============================================================================
// Dynamic protocol
// ============================================================================

/// Values sampled at one dynamic breakpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRow {
    pub name: String,
    pub time: f64,
    pub power: f64,
    pub heart_rate: Option<f64>,
    pub smo2: f64,
    pub smo2_norm: f64,
}

impl ThresholdRow {
    fn new(name: &str, at: &BoundarySample) -> Self {
        Self {
            name: name.to_string(),
            time: at.time,
            power: at.power,
            heart_rate: at.heart_rate,
            smo2: at.smo2,
            smo2_norm: at.smo2_norm,
        }
    }
}

/// Summary rows "Seuil 1", "Seuil 2" and "PMA".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSummary {
    pub rows: Vec<ThresholdRow>,
}

impl ThresholdSummary {
    const HEADERS: [&'static str; 6] = [
        "",
        "Temps (s)",
        "Puissance (W)",
        "Fréquence cardiaque (bpm)",
        "SmO₂ (%)",
        "SmO₂ normalisée (%)",
    ];

    pub fn from_bands(bands: &ThresholdBands) -> Self {
        Self {
            rows: vec![
                ThresholdRow::new("Seuil 1", &bands.s1),
                ThresholdRow::new("Seuil 2", &bands.s2),
                ThresholdRow::new("PMA", &bands.pma),
            ],
        }
    }

    /// Write the summary as CSV with the row names as leading index column.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record(Self::HEADERS)?;
        for row in &self.rows {
            csv.write_record([
                row.name.clone(),
                row.time.to_string(),
                row.power.to_string(),
                format_value(row.heart_rate),
                row.smo2.to_string(),
                row.smo2_norm.to_string(),
            ])?;
        }
        csv.flush().map_err(csv::Error::from)?;
        Ok(())
    }

    pub fn to_csv_string(&self) -> Result<String> {
        let mut buf = Vec::new();
        self.write_csv(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}
