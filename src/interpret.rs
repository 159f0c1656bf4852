//! Per-axis extremes of a selection: which responder/subject pairing produced
//! the highest and the lowest average within each demographic axis.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::aggregate::CellMap;
use crate::labels::CategoryMap;
use crate::observation::Metric;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AxisExtremes {
    pub min_value: f64,
    pub min_pair: String,
    pub max_value: f64,
    pub max_pair: String,
    /// Number of pairs that contributed.
    pub count: usize,
}

pub fn pair_label(subject: &str, responder: &str) -> String {
    format!("{} (RES) → {} (SUB)", responder, subject)
}

/// Extremes per axis. Axes without a single valued pair are absent.
///
/// A pair's axis is the subject's axis when known, otherwise the responder's.
pub fn summarize(cells: &CellMap, category_of: &CategoryMap, metric: Metric) -> BTreeMap<String, AxisExtremes> {
    let mut out: BTreeMap<String, AxisExtremes> = BTreeMap::new();
    for (key, cell) in cells {
        let value = cell.metric(metric);
        if value.is_nan() {
            continue;
        }
        let Some(axis) = category_of
            .get(&key.subject)
            .or_else(|| category_of.get(&key.responder))
        else {
            continue;
        };
        let pair = pair_label(&key.subject, &key.responder);
        match out.get_mut(axis) {
            Some(entry) => {
                entry.count += 1;
                if value < entry.min_value {
                    entry.min_value = value;
                    entry.min_pair = pair.clone();
                }
                if value > entry.max_value {
                    entry.max_value = value;
                    entry.max_pair = pair;
                }
            }
            None => {
                out.insert(
                    axis.clone(),
                    AxisExtremes {
                        min_value: value,
                        min_pair: pair.clone(),
                        max_value: value,
                        max_pair: pair,
                        count: 1,
                    },
                );
            }
        }
    }
    out
}

/// Plain-text table, one axis per line.
pub fn format_table(extremes: &BTreeMap<String, AxisExtremes>) -> String {
    if extremes.is_empty() {
        return "No specific demographic interactions found.\n".to_string();
    }
    let mut out = String::new();
    for (axis, e) in extremes {
        out.push_str(&format!(
            "{}: highest {} = {:.3}; lowest {} = {:.3} ({} pairs)\n",
            axis, e.max_pair, e.max_value, e.min_pair, e.min_value, e.count
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{AggregationCell, PairKey};

    fn cell(v: f64) -> AggregationCell {
        AggregationCell {
            avg_cosine: v,
            avg_score: f64::NAN,
            count: 1,
        }
    }

    fn cats(pairs: &[(&str, &str)]) -> CategoryMap {
        pairs.iter().map(|(l, a)| (l.to_string(), a.to_string())).collect()
    }

    #[test]
    fn test_min_max_per_axis() {
        let mut cells = CellMap::new();
        cells.insert(PairKey::new("man", "woman"), cell(0.2));
        cells.insert(PairKey::new("woman", "man"), cell(0.6));
        cells.insert(PairKey::new("old", "young"), cell(0.4));
        let c = cats(&[("man", "gender"), ("woman", "gender"), ("old", "age"), ("young", "age")]);
        let out = summarize(&cells, &c, Metric::CosineDistance);
        let g = &out["gender"];
        assert_eq!(g.count, 2);
        assert_eq!(g.min_value, 0.2);
        assert_eq!(g.min_pair, "woman (RES) → man (SUB)");
        assert_eq!(g.max_value, 0.6);
        assert_eq!(g.max_pair, "man (RES) → woman (SUB)");
        let a = &out["age"];
        assert_eq!(a.min_pair, a.max_pair);
    }

    #[test]
    fn test_subject_axis_wins() {
        let mut cells = CellMap::new();
        cells.insert(PairKey::new("man", "old"), cell(0.5));
        let c = cats(&[("man", "gender"), ("old", "age")]);
        let out = summarize(&cells, &c, Metric::CosineDistance);
        assert!(out.contains_key("gender"));
        assert!(!out.contains_key("age"));
    }

    #[test]
    fn test_responder_axis_used_when_subject_unknown() {
        let mut cells = CellMap::new();
        cells.insert(PairKey::new("mystery", "old"), cell(0.5));
        let out = summarize(&cells, &cats(&[("old", "age")]), Metric::CosineDistance);
        assert_eq!(out["age"].count, 1);
    }

    #[test]
    fn test_nan_and_unknown_axes_omitted() {
        let mut cells = CellMap::new();
        cells.insert(PairKey::new("man", "woman"), cell(0.5));
        cells.insert(PairKey::new("x", "y"), cell(0.5));
        let c = cats(&[("man", "gender")]);
        assert!(summarize(&cells, &c, Metric::Score).is_empty());
        let out = summarize(&cells, &c, Metric::CosineDistance);
        assert_eq!(out.len(), 1);
        assert!(format_table(&out).starts_with("gender: highest"));
    }
}
