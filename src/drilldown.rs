//! Raw examples behind a clicked heatmap cell.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::matrix::{CellLink, MeanType};
use crate::observation::{Observation, PowerFilter};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DrillTarget {
    Cell { subject: String, responder: String },
    /// Mean over every responder for one subject.
    RowMean { subject: String },
    /// Mean over every subject for one responder.
    ColumnMean { responder: String },
    Grand,
}

impl DrillTarget {
    pub fn from_link(link: &CellLink) -> Self {
        match (link.is_mean, link.mean_type) {
            (true, Some(MeanType::Row)) => DrillTarget::RowMean {
                subject: link.subject.clone(),
            },
            (true, Some(MeanType::Column)) => DrillTarget::ColumnMean {
                responder: link.responder.clone(),
            },
            (true, _) => DrillTarget::Grand,
            (false, _) => DrillTarget::Cell {
                subject: link.subject.clone(),
                responder: link.responder.clone(),
            },
        }
    }

    pub fn title(&self) -> String {
        match self {
            DrillTarget::Cell { subject, responder } => {
                format!("Examples: {} (SUB) vs {} (RES)", subject, responder)
            }
            DrillTarget::RowMean { subject } => {
                format!("Examples for Mean: {} (SUB) across all RES", subject)
            }
            DrillTarget::ColumnMean { responder } => {
                format!("Examples for Mean: {} (RES) across all SUB", responder)
            }
            DrillTarget::Grand => "Examples for Overall Mean".to_string(),
        }
    }

    fn matches(&self, obs: &Observation) -> bool {
        match self {
            DrillTarget::Cell { subject, responder } => {
                obs.subject == *subject && obs.responder == *responder
            }
            DrillTarget::RowMean { subject } => obs.subject == *subject,
            DrillTarget::ColumnMean { responder } => obs.responder == *responder,
            DrillTarget::Grand => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrillDown {
    pub title: String,
    pub target: DrillTarget,
    pub rows: Vec<Observation>,
}

/// One page of drill-down rows. Offsets are 1-based for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<'a> {
    pub items: &'a [Observation],
    pub first: usize,
    pub last: usize,
    pub total: usize,
    pub has_more: bool,
}

impl DrillDown {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Zero-based page `index` of size `per_page` (at least 1).
    pub fn page(&self, index: usize, per_page: usize) -> Page<'_> {
        let per_page = per_page.max(1);
        let total = self.rows.len();
        let start = index.saturating_mul(per_page).min(total);
        let end = start.saturating_add(per_page).min(total);
        Page {
            items: &self.rows[start..end],
            first: if start < end { start + 1 } else { 0 },
            last: end,
            total,
            has_more: end < total,
        }
    }
}

/// Rows behind `target` for one model and power filter, in load order.
///
/// `None` when nothing matches.
pub fn drill_down(
    observations: &[Observation],
    model: &str,
    power: PowerFilter,
    target: &DrillTarget,
) -> Option<DrillDown> {
    let rows: Vec<Observation> = observations
        .iter()
        .filter(|o| o.model == model && power.admits(o.power) && o.is_aggregable())
        .filter(|o| target.matches(o))
        .cloned()
        .collect();
    if rows.is_empty() {
        return None;
    }
    Some(DrillDown {
        title: target.title(),
        target: target.clone(),
        rows,
    })
}

/// Display bucket for a per-row win rate.
pub fn score_band(score: f64) -> &'static str {
    if score == 0.0 {
        "0"
    } else if score == 0.25 {
        "025"
    } else if score == 0.5 {
        "05"
    } else if score == 0.75 {
        "075"
    } else if score == 1.0 {
        "1"
    } else {
        "na"
    }
}

/// One drill-down row as the dashboard page shows it. Scenario text is looked
/// up from the scenario catalog by `scenario`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExampleRow {
    pub scenario: i64,
    pub power: u8,
    pub subject: String,
    pub responder: String,
    pub cosine: Option<f64>,
    pub score: Option<f64>,
    pub band: &'static str,
    pub response: String,
    pub baseline: String,
}

fn measured(v: f64) -> Option<f64> {
    if v.is_nan() {
        None
    } else {
        Some(v)
    }
}

impl ExampleRow {
    pub fn from_observation(obs: &Observation) -> Self {
        Self {
            scenario: obs.scenario_key(),
            power: obs.power.flag(),
            subject: obs.subject.clone(),
            responder: obs.responder.clone(),
            cosine: measured(obs.cosine_distance),
            score: measured(obs.score),
            band: score_band(obs.score),
            response: obs.text.response.trim().to_string(),
            baseline: obs.text.response_non_demog.trim().to_string(),
        }
    }
}

/// Aggregable rows of every model, in load order, for client-side drill-down.
pub fn examples_by_model(observations: &[Observation]) -> BTreeMap<String, Vec<ExampleRow>> {
    let mut out: BTreeMap<String, Vec<ExampleRow>> = BTreeMap::new();
    for obs in observations.iter().filter(|o| o.is_aggregable()) {
        out.entry(obs.model.clone())
            .or_default()
            .push(ExampleRow::from_observation(obs));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::{RESPONDER_MEAN_LABEL, SUBJECT_MEAN_LABEL};
    use crate::observation::Power;

    fn rows() -> Vec<Observation> {
        vec![
            Observation::bare("A", "man", "woman", Power::Absent, 0.1, 1.0),
            Observation::bare("A", "man", "old", Power::Present, 0.2, 0.5),
            Observation::bare("A", "woman", "old", Power::Absent, 0.3, 0.0),
            Observation::bare("B", "man", "woman", Power::Absent, 0.4, 0.25),
            Observation::bare("A", "", "old", Power::Absent, 0.5, 0.75),
        ]
    }

    fn link(sub: &str, res: &str, mean: Option<MeanType>) -> CellLink {
        CellLink {
            subject: sub.to_string(),
            responder: res.to_string(),
            raw_value: 0.0,
            count: 1,
            is_mean: mean.is_some(),
            mean_type: mean,
        }
    }

    #[test]
    fn test_cell_selection() {
        let target = DrillTarget::Cell {
            subject: "man".into(),
            responder: "woman".into(),
        };
        let d = drill_down(&rows(), "A", PowerFilter::All, &target).unwrap();
        assert_eq!(d.len(), 1);
        assert_eq!(d.title, "Examples: man (SUB) vs woman (RES)");
    }

    #[test]
    fn test_mean_selections() {
        let data = rows();
        let row = DrillTarget::from_link(&link("man", RESPONDER_MEAN_LABEL, Some(MeanType::Row)));
        assert_eq!(drill_down(&data, "A", PowerFilter::All, &row).unwrap().len(), 2);

        let col = DrillTarget::from_link(&link(SUBJECT_MEAN_LABEL, "old", Some(MeanType::Column)));
        // The row with an empty subject is not aggregable and never shown.
        assert_eq!(drill_down(&data, "A", PowerFilter::All, &col).unwrap().len(), 2);

        let grand = DrillTarget::from_link(&link(SUBJECT_MEAN_LABEL, RESPONDER_MEAN_LABEL, Some(MeanType::Grand)));
        let d = drill_down(&data, "A", PowerFilter::Absent, &grand).unwrap();
        assert_eq!(d.len(), 2);
        assert_eq!(d.title, "Examples for Overall Mean");
    }

    #[test]
    fn test_nothing_to_show() {
        let target = DrillTarget::Cell {
            subject: "man".into(),
            responder: "woman".into(),
        };
        assert!(drill_down(&rows(), "A", PowerFilter::Present, &target).is_none());
        assert!(drill_down(&rows(), "Z", PowerFilter::All, &DrillTarget::Grand).is_none());
    }

    #[test]
    fn test_pagination() {
        let d = DrillDown {
            title: String::new(),
            target: DrillTarget::Grand,
            rows: rows(),
        };
        let p0 = d.page(0, 2);
        assert_eq!((p0.first, p0.last, p0.total, p0.has_more), (1, 2, 5, true));
        let p2 = d.page(2, 2);
        assert_eq!(p2.items.len(), 1);
        assert_eq!((p2.first, p2.last, p2.has_more), (5, 5, false));
        let past = d.page(9, 2);
        assert!(past.items.is_empty());
        assert!(!past.has_more);
    }

    #[test]
    fn test_examples_by_model() {
        let mut data = rows();
        data[0].text.response = "  Sure.  ".into();
        data[1].score = f64::NAN;
        let ex = examples_by_model(&data);
        assert_eq!(ex.keys().collect::<Vec<_>>(), vec!["A", "B"]);
        let a = &ex["A"];
        // The row with an empty subject is left out.
        assert_eq!(a.len(), 3);
        assert_eq!(a[0].response, "Sure.");
        assert_eq!((a[0].band, a[0].power), ("1", 0));
        assert_eq!((a[1].score, a[1].band, a[1].power), (None, "na", 1));
        assert_eq!(a[2].band, "0");
        assert_eq!(ex["B"][0].band, "025");
    }

    #[test]
    fn test_score_band() {
        assert_eq!(score_band(0.0), "0");
        assert_eq!(score_band(0.75), "075");
        assert_eq!(score_band(1.0), "1");
        assert_eq!(score_band(0.6), "na");
        assert_eq!(score_band(f64::NAN), "na");
    }
}
