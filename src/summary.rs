//! Dataset-wide summaries shown around the heatmap: per-selection spread,
//! display range, power-split averages, the scenario catalog and the
//! demographic axes.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::aggregate::CellMap;
use crate::observation::{Metric, Observation, Power};
use crate::state::Config;

const RANGE_STEP: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OverallStats {
    pub mean: f64,
    /// Population standard deviation; 0 for a single value.
    pub stdev: f64,
    pub cells: usize,
}

/// Unweighted mean and spread of the per-pair averages.
pub fn overall_stats(cells: &CellMap, metric: Metric) -> Option<OverallStats> {
    let values: Vec<f64> = cells
        .values()
        .map(|c| c.metric(metric))
        .filter(|v| !v.is_nan())
        .collect();
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let stdev = if values.len() > 1 {
        (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
    } else {
        0.0
    };
    Some(OverallStats {
        mean,
        stdev,
        cells: values.len(),
    })
}

/// Color range for a selection.
///
/// Win rate is always `[0, 1]`. Cosine distance is widened to the enclosing
/// 0.05 grid, never below zero.
pub fn display_range(cells: &CellMap, metric: Metric, cfg: &Config) -> (f64, f64) {
    if metric == Metric::Score {
        return (0.0, 1.0);
    }
    let (lo, hi) = cells
        .values()
        .map(|c| c.avg_cosine)
        .filter(|v| !v.is_nan())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if lo > hi {
        return (cfg.default_cosine_min, cfg.default_cosine_max);
    }
    let zmin = ((lo / RANGE_STEP).floor() * RANGE_STEP).max(0.0);
    let mut zmax = (hi / RANGE_STEP).ceil() * RANGE_STEP;
    if zmax <= zmin {
        zmax = zmin + RANGE_STEP;
    }
    (zmin, zmax)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PowerSlice {
    pub rows: usize,
    pub avg_cosine: Option<f64>,
    pub avg_score: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PowerFindings {
    pub absent: PowerSlice,
    pub present: PowerSlice,
}

/// Raw-row averages split by power differential, across every model.
pub fn power_findings(observations: &[Observation]) -> PowerFindings {
    let slice = |power: Power| {
        let rows: Vec<&Observation> = observations.iter().filter(|o| o.power == power).collect();
        let avg = |metric: Metric| {
            let vals: Vec<f64> = rows.iter().map(|o| metric.of(o)).filter(|v| !v.is_nan()).collect();
            if vals.is_empty() {
                None
            } else {
                Some(vals.iter().sum::<f64>() / vals.len() as f64)
            }
        };
        PowerSlice {
            rows: rows.len(),
            avg_cosine: avg(Metric::CosineDistance),
            avg_score: avg(Metric::Score),
        }
    };
    PowerFindings {
        absent: slice(Power::Absent),
        present: slice(Power::Present),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioEntry {
    pub id: i64,
    pub text: String,
    pub context: String,
    pub power: Power,
}

/// Unique scenarios grouped by contextual dimension.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScenarioCatalog {
    pub groups: BTreeMap<String, Vec<ScenarioEntry>>,
}

impl ScenarioCatalog {
    /// First occurrence of each scenario key wins.
    pub fn from_observations(observations: &[Observation]) -> Self {
        let mut seen = BTreeSet::new();
        let mut groups: BTreeMap<String, Vec<ScenarioEntry>> = BTreeMap::new();
        for obs in observations {
            let id = obs.scenario_key();
            if !seen.insert(id) {
                continue;
            }
            groups.entry(obs.contextual_dim.clone()).or_default().push(ScenarioEntry {
                id,
                text: obs.text.scenario.clone(),
                context: obs.contextual_dim.clone(),
                power: obs.power,
            });
        }
        for entries in groups.values_mut() {
            entries.sort_by_key(|e| e.id);
        }
        Self { groups }
    }

    pub fn len(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn get(&self, id: i64) -> Option<&ScenarioEntry> {
        self.groups.values().flatten().find(|e| e.id == id)
    }

    /// Entries visible for a search box query.
    ///
    /// All digits: exact id. Otherwise case-insensitive substring of the
    /// scenario text or its context. Empty keeps everything.
    pub fn filter(&self, query: &str) -> ScenarioCatalog {
        let q = query.trim().to_lowercase();
        if q.is_empty() {
            return self.clone();
        }
        let by_id = q.chars().all(|c| c.is_ascii_digit());
        let mut groups = BTreeMap::new();
        for (context, entries) in &self.groups {
            let context_hit = context.to_lowercase().contains(&q);
            let kept: Vec<ScenarioEntry> = entries
                .iter()
                .filter(|e| {
                    if by_id {
                        e.id.to_string() == q
                    } else {
                        context_hit || e.text.to_lowercase().contains(&q)
                    }
                })
                .cloned()
                .collect();
            if !kept.is_empty() {
                groups.insert(context.clone(), kept);
            }
        }
        ScenarioCatalog { groups }
    }
}

/// Demographic axis -> identities seen on either side.
pub fn demographics_structure(observations: &[Observation]) -> BTreeMap<String, BTreeSet<String>> {
    let mut out: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for obs in observations {
        if obs.demographic_dim.is_empty() {
            continue;
        }
        let ids = out.entry(obs.demographic_dim.clone()).or_default();
        for label in [&obs.subject, &obs.responder] {
            if !label.is_empty() {
                ids.insert(label.clone());
            }
        }
    }
    out
}
