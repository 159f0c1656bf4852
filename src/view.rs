//! One dashboard selection, fully computed.
//!
//! A view is rebuilt from scratch for every (model, metric, power) selection.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::color::{color_for_value, ColorScale, TextColor};
use crate::interpret::{summarize, AxisExtremes};
use crate::labels::{category_map, sorted_labels, Side};
use crate::logging::log_view;
use crate::matrix::{build_matrix, Matrix};
use crate::observation::{Metric, PowerFilter};
use crate::state::{Config, DashboardState};
use crate::summary::{display_range, overall_stats, OverallStats};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Selection {
    pub model: String,
    pub metric: Metric,
    pub power: PowerFilter,
}

impl Selection {
    pub fn new(model: impl Into<String>, metric: Metric, power: PowerFilter) -> Self {
        Self {
            model: model.into(),
            metric,
            power,
        }
    }

    /// Stable key used to index bundles in the rendered page.
    pub fn key(&self) -> String {
        format!("{}|{}|{}", self.model, self.metric.key(), self.power.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricInfo {
    pub key: &'static str,
    pub label: &'static str,
    pub description: &'static str,
    pub scale: ColorScale,
    pub zmin: f64,
    pub zmax: f64,
}

/// Text overlay for one populated cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Annotation {
    pub row: usize,
    pub col: usize,
    pub text: String,
    pub background: String,
    pub text_color: TextColor,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewBundle {
    pub selection: Selection,
    pub title: String,
    pub metric: MetricInfo,
    pub matrix: Matrix,
    pub annotations: Vec<Annotation>,
    pub interpretation: BTreeMap<String, AxisExtremes>,
    pub stats: Option<OverallStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ViewOutcome {
    /// No aggregated pairs for the selection.
    Empty { selection: Selection },
    Ready(Box<ViewBundle>),
}

impl ViewOutcome {
    pub fn bundle(&self) -> Option<&ViewBundle> {
        match self {
            ViewOutcome::Ready(b) => Some(b.as_ref()),
            ViewOutcome::Empty { .. } => None,
        }
    }

    pub fn selection(&self) -> &Selection {
        match self {
            ViewOutcome::Ready(b) => &b.selection,
            ViewOutcome::Empty { selection } => selection,
        }
    }
}

fn scale_for(metric: Metric) -> ColorScale {
    match metric {
        Metric::CosineDistance => ColorScale::viridis(),
        Metric::Score => ColorScale::win_rate(),
    }
}

pub fn title_for(sel: &Selection) -> String {
    format!(
        "Heatmap of {} Across various Subject and Responder demography for Model: {} (Power Disparity: {})",
        sel.metric.label(),
        sel.model,
        sel.power.disparity()
    )
}

fn annotate(matrix: &Matrix, info: &MetricInfo, threshold: f64) -> Vec<Annotation> {
    matrix
        .populated()
        .filter_map(|(row, col, value)| {
            let bg = color_for_value(Some(value), info.zmin, info.zmax, &info.scale)?;
            Some(Annotation {
                row,
                col,
                text: format!("{:.2}", value),
                background: bg.to_css(),
                text_color: TextColor::for_background(bg, threshold),
            })
        })
        .collect()
}

pub fn build_view(state: &DashboardState, sel: &Selection, cfg: &Config) -> ViewOutcome {
    let Some(cells) = state.table.cells(&sel.model, sel.power) else {
        log_view(&sel.model, sel.metric.key(), sel.power.as_str(), "empty", 0);
        return ViewOutcome::Empty {
            selection: sel.clone(),
        };
    };

    // Labels and axes come from the rows behind this selection only.
    let rows: Vec<_> = state
        .rows_for(&sel.model)
        .filter(|o| sel.power.admits(o.power) && o.is_aggregable())
        .collect();
    let categories = category_map(rows.iter().copied());
    let subjects = sorted_labels(rows.iter().copied(), Side::Subject, &categories);
    let responders = sorted_labels(rows.iter().copied(), Side::Responder, &categories);

    let (zmin, zmax) = display_range(cells, sel.metric, cfg);
    let info = MetricInfo {
        key: sel.metric.key(),
        label: sel.metric.label(),
        description: sel.metric.description(),
        scale: scale_for(sel.metric),
        zmin,
        zmax,
    };
    let matrix = build_matrix(cells, &subjects, &responders, sel.metric);
    let annotations = annotate(&matrix, &info, cfg.luminance_threshold);
    log_view(
        &sel.model,
        sel.metric.key(),
        sel.power.as_str(),
        "ready",
        cells.len(),
    );

    ViewOutcome::Ready(Box::new(ViewBundle {
        selection: sel.clone(),
        title: title_for(sel),
        interpretation: summarize(cells, &categories, sel.metric),
        stats: overall_stats(cells, sel.metric),
        metric: info,
        matrix,
        annotations,
    }))
}

/// Every model x metric x power filter, models in sorted order.
pub fn all_selections(state: &DashboardState) -> Vec<Selection> {
    let mut out = Vec::new();
    for model in &state.models {
        for metric in Metric::ALL {
            for power in PowerFilter::ALL {
                out.push(Selection::new(model.as_str(), metric, power));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::{Observation, Power};

    fn state() -> DashboardState {
        let mut rows = vec![
            Observation::bare("A", "man", "woman", Power::Absent, 0.10, 1.0),
            Observation::bare("A", "woman", "man", Power::Absent, 0.30, 0.0),
            Observation::bare("A", "old", "young", Power::Present, 0.20, 0.5),
        ];
        for r in rows.iter_mut().take(2) {
            r.demographic_dim = "gender".into();
        }
        rows[2].demographic_dim = "age".into();
        DashboardState::new(vec!["A".into(), "B".into()], rows)
    }

    #[test]
    fn test_ready_view() {
        let st = state();
        let sel = Selection::new("A", Metric::CosineDistance, PowerFilter::All);
        let out = build_view(&st, &sel, &Config::default());
        let b = out.bundle().unwrap();
        assert_eq!(
            b.title,
            "Heatmap of Avg Cosine Distance Across various Subject and Responder demography for Model: A (Power Disparity: All)"
        );
        // age sorts before gender; rows are reversed with the mean row first
        assert_eq!(b.matrix.row_labels.last().unwrap(), "old");
        assert_eq!(b.matrix.col_labels[0], "young");
        assert_eq!(b.metric.zmin, 0.1);
        assert!((b.metric.zmax - 0.3).abs() < 1e-9);
        assert_eq!(b.annotations.len(), b.matrix.populated().count());
        assert_eq!(b.interpretation.len(), 2);
        assert_eq!(b.stats.unwrap().cells, 3);
    }

    #[test]
    fn test_power_slice_limits_labels() {
        let st = state();
        let sel = Selection::new("A", Metric::Score, PowerFilter::Present);
        let b = build_view(&st, &sel, &Config::default()).bundle().cloned().unwrap();
        assert!(b.title.ends_with("for Model: A (Power Disparity: Present)"));
        assert_eq!(b.matrix.rows(), 2);
        assert_eq!(b.matrix.cols(), 2);
        assert_eq!((b.metric.zmin, b.metric.zmax), (0.0, 1.0));
        let gray = &b.annotations[0];
        assert_eq!(gray.text, "0.50");
        assert_eq!(gray.background, "rgb(128,128,128)");
    }

    #[test]
    fn test_empty_selection() {
        let st = state();
        let sel = Selection::new("B", Metric::Score, PowerFilter::All);
        let out = build_view(&st, &sel, &Config::default());
        assert!(out.bundle().is_none());
        assert_eq!(out.selection(), &sel);
    }

    #[test]
    fn test_all_selections() {
        let st = state();
        let all = all_selections(&st);
        assert_eq!(all.len(), 2 * 2 * 3);
        assert_eq!(all[0].key(), "A|avgCosine|all");
    }
}
