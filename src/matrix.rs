//! Dense heatmap matrix with marginal means.
//!
//! The matrix has one extra row (mean over subjects, per responder) and one
//! extra column (mean over responders, per subject). Their shared corner is the
//! grand mean. Means are count-weighted and skip cells whose metric is NaN.
//! Rows are emitted bottom-up: the first sorted subject ends up in the last row.

use serde::Serialize;

use crate::aggregate::{CellMap, PairKey};
use crate::observation::Metric;

/// Label of the synthetic row holding per-responder means.
pub const SUBJECT_MEAN_LABEL: &str = "RES Mean across all SUB";
/// Label of the synthetic column holding per-subject means.
pub const RESPONDER_MEAN_LABEL: &str = "SUB Mean across all RES";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MeanType {
    Row,
    Column,
    Grand,
}

/// Metadata attached to a matrix cell for drill-down.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellLink {
    pub subject: String,
    pub responder: String,
    /// Unconverted metric value; NaN serializes as `null`.
    pub raw_value: f64,
    pub count: u64,
    pub is_mean: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_type: Option<MeanType>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Matrix {
    pub row_labels: Vec<String>,
    pub col_labels: Vec<String>,
    pub values: Vec<Vec<Option<f64>>>,
    pub hover_text: Vec<Vec<String>>,
    pub link_data: Vec<Vec<Option<CellLink>>>,
}

impl Matrix {
    pub fn rows(&self) -> usize {
        self.row_labels.len()
    }

    pub fn cols(&self) -> usize {
        self.col_labels.len()
    }

    /// Iterate populated cells as `(row, col, value)`.
    pub fn populated(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.values.iter().enumerate().flat_map(|(i, row)| {
            row.iter()
                .enumerate()
                .filter_map(move |(j, v)| v.map(|v| (i, j, v)))
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct WeightedMean {
    sum: f64,
    count: u64,
}

impl WeightedMean {
    fn add(&mut self, value: f64, count: u64) {
        if !value.is_nan() && count > 0 {
            self.sum += value * count as f64;
            self.count += count;
        }
    }

    fn value(&self) -> f64 {
        if self.count > 0 {
            self.sum / self.count as f64
        } else {
            f64::NAN
        }
    }
}

fn display(value: f64) -> Option<f64> {
    if value.is_nan() {
        None
    } else {
        Some(value)
    }
}

fn format_value(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.3}", v))
        .unwrap_or_else(|| "N/A".to_string())
}

fn describe(subject: &str, responder: &str, metric: Metric, value: Option<f64>, count_line: &str, count: u64) -> String {
    format!(
        "SUB: {}\nRES: {}\n{}: {}\n{}: {}",
        subject,
        responder,
        metric.label(),
        format_value(value),
        count_line,
        count
    )
}

/// Build the rendered matrix for one selection.
pub fn build_matrix(
    cells: &CellMap,
    subject_labels: &[String],
    responder_labels: &[String],
    metric: Metric,
) -> Matrix {
    let mut row_labels: Vec<String> = subject_labels.to_vec();
    row_labels.push(SUBJECT_MEAN_LABEL.to_string());
    let mut col_labels: Vec<String> = responder_labels.to_vec();
    col_labels.push(RESPONDER_MEAN_LABEL.to_string());

    let n_rows = row_labels.len();
    let n_cols = col_labels.len();
    let mean_row = n_rows - 1;
    let mean_col = n_cols - 1;

    let mut values = vec![vec![None; n_cols]; n_rows];
    let mut hover_text = vec![vec![String::new(); n_cols]; n_rows];
    let mut link_data: Vec<Vec<Option<CellLink>>> = vec![vec![None; n_cols]; n_rows];

    // First occurrence wins should a label be listed twice.
    let index_of = |labels: &[String], needle: &str| labels.iter().position(|l| l == needle);

    for (key, cell) in cells {
        let (Some(i), Some(j)) = (
            index_of(subject_labels, &key.subject),
            index_of(responder_labels, &key.responder),
        ) else {
            continue;
        };
        let raw = cell.metric(metric);
        let shown = display(raw);
        values[i][j] = shown;
        hover_text[i][j] = describe(&key.subject, &key.responder, metric, shown, "Count", cell.count);
        link_data[i][j] = Some(CellLink {
            subject: key.subject.clone(),
            responder: key.responder.clone(),
            raw_value: raw,
            count: cell.count,
            is_mean: false,
            mean_type: None,
        });
    }

    let lookup = |sub: &str, res: &str| cells.get(&PairKey::new(sub, res));

    for (i, sub) in subject_labels.iter().enumerate() {
        let mut acc = WeightedMean::default();
        for res in responder_labels {
            if let Some(cell) = lookup(sub, res) {
                acc.add(cell.metric(metric), cell.count);
            }
        }
        let mean = acc.value();
        let shown = display(mean);
        values[i][mean_col] = shown;
        hover_text[i][mean_col] = describe(sub, "Mean", metric, shown, "Total Count", acc.count);
        link_data[i][mean_col] = Some(CellLink {
            subject: sub.clone(),
            responder: RESPONDER_MEAN_LABEL.to_string(),
            raw_value: mean,
            count: acc.count,
            is_mean: true,
            mean_type: Some(MeanType::Row),
        });
    }

    for (j, res) in responder_labels.iter().enumerate() {
        let mut acc = WeightedMean::default();
        for sub in subject_labels {
            if let Some(cell) = lookup(sub, res) {
                acc.add(cell.metric(metric), cell.count);
            }
        }
        let mean = acc.value();
        let shown = display(mean);
        values[mean_row][j] = shown;
        hover_text[mean_row][j] = describe("Mean", res, metric, shown, "Total Count", acc.count);
        link_data[mean_row][j] = Some(CellLink {
            subject: SUBJECT_MEAN_LABEL.to_string(),
            responder: res.clone(),
            raw_value: mean,
            count: acc.count,
            is_mean: true,
            mean_type: Some(MeanType::Column),
        });
    }

    let mut grand = WeightedMean::default();
    for cell in cells.values() {
        grand.add(cell.metric(metric), cell.count);
    }
    let grand_mean = grand.value();
    let shown = display(grand_mean);
    values[mean_row][mean_col] = shown;
    hover_text[mean_row][mean_col] = describe("Mean", "Mean", metric, shown, "Total Count", grand.count);
    link_data[mean_row][mean_col] = Some(CellLink {
        subject: SUBJECT_MEAN_LABEL.to_string(),
        responder: RESPONDER_MEAN_LABEL.to_string(),
        raw_value: grand_mean,
        count: grand.count,
        is_mean: true,
        mean_type: Some(MeanType::Grand),
    });

    row_labels.reverse();
    values.reverse();
    hover_text.reverse();
    link_data.reverse();

    Matrix {
        row_labels,
        col_labels,
        values,
        hover_text,
        link_data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::AggregationCell;

    fn cell(cos: f64, score: f64, count: u64) -> AggregationCell {
        AggregationCell {
            avg_cosine: cos,
            avg_score: score,
            count,
        }
    }

    fn labels(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn sample() -> CellMap {
        let mut cells = CellMap::new();
        cells.insert(PairKey::new("A", "X"), cell(1.0, 0.5, 2));
        cells.insert(PairKey::new("B", "X"), cell(3.0, f64::NAN, 1));
        cells.insert(PairKey::new("A", "Y"), cell(f64::NAN, 1.0, 4));
        cells
    }

    #[test]
    fn test_dimensions_and_reversed_rows() {
        let m = build_matrix(&sample(), &labels(&["A", "B"]), &labels(&["X", "Y"]), Metric::CosineDistance);
        assert_eq!(m.rows(), 3);
        assert_eq!(m.cols(), 3);
        assert_eq!(m.row_labels, labels(&[SUBJECT_MEAN_LABEL, "B", "A"]));
        assert_eq!(m.col_labels, labels(&["X", "Y", RESPONDER_MEAN_LABEL]));
        // A is now the bottom row
        assert_eq!(m.values[2][0], Some(1.0));
        assert_eq!(m.values[1][0], Some(3.0));
    }

    #[test]
    fn test_nan_becomes_none_and_missing_pair_is_empty() {
        let m = build_matrix(&sample(), &labels(&["A", "B"]), &labels(&["X", "Y"]), Metric::CosineDistance);
        // A/Y has NaN cosine
        assert_eq!(m.values[2][1], None);
        assert!(m.hover_text[2][1].contains("N/A"));
        let link = m.link_data[2][1].as_ref().unwrap();
        assert!(link.raw_value.is_nan());
        assert_eq!(link.count, 4);
        // B/Y does not exist
        assert_eq!(m.values[1][1], None);
        assert!(m.hover_text[1][1].is_empty());
        assert!(m.link_data[1][1].is_none());
    }

    #[test]
    fn test_marginal_means_weighted_and_nan_excluded() {
        let m = build_matrix(&sample(), &labels(&["A", "B"]), &labels(&["X", "Y"]), Metric::CosineDistance);
        // grand: (1*2 + 3*1) / 3
        let grand = m.values[0][2].unwrap();
        assert!((grand - 5.0 / 3.0).abs() < 1e-12);
        // row mean of A only sees A/X
        assert_eq!(m.values[2][2], Some(1.0));
        // column mean of X: (1*2 + 3*1) / 3
        assert!((m.values[0][0].unwrap() - 5.0 / 3.0).abs() < 1e-12);
        // column mean of Y: only NaN contributions
        assert_eq!(m.values[0][1], None);
        let link = m.link_data[0][1].as_ref().unwrap();
        assert_eq!(link.count, 0);
        assert_eq!(link.mean_type, Some(MeanType::Column));
        assert_eq!(link.subject, SUBJECT_MEAN_LABEL);
        assert_eq!(link.responder, "Y");
    }

    #[test]
    fn test_mean_links_name_their_axis() {
        let m = build_matrix(&sample(), &labels(&["A", "B"]), &labels(&["X", "Y"]), Metric::Score);
        let row = m.link_data[2][2].as_ref().unwrap();
        assert_eq!(row.mean_type, Some(MeanType::Row));
        assert_eq!(row.subject, "A");
        assert_eq!(row.responder, RESPONDER_MEAN_LABEL);
        // (0.5*2 + 1.0*4) / 6
        assert!((row.raw_value - 5.0 / 6.0).abs() < 1e-12);
        let grand = m.link_data[0][2].as_ref().unwrap();
        assert_eq!(grand.mean_type, Some(MeanType::Grand));
        assert_eq!(grand.count, 6);
        assert!(m.hover_text[0][2].contains("Total Count: 6"));
    }

    #[test]
    fn test_hover_text_format() {
        let m = build_matrix(&sample(), &labels(&["A", "B"]), &labels(&["X", "Y"]), Metric::CosineDistance);
        assert_eq!(
            m.hover_text[2][0],
            "SUB: A\nRES: X\nAvg Cosine Distance: 1.000\nCount: 2"
        );
    }

    #[test]
    fn test_grand_mean_covers_unlisted_pairs() {
        let mut cells = sample();
        cells.insert(PairKey::new("C", "Z"), cell(7.0, 0.0, 1));
        let m = build_matrix(&cells, &labels(&["A", "B"]), &labels(&["X", "Y"]), Metric::CosineDistance);
        // (1*2 + 3*1 + 7*1) / 4
        assert!((m.values[0][2].unwrap() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_inputs_yield_single_mean_cell() {
        let m = build_matrix(&CellMap::new(), &[], &[], Metric::Score);
        assert_eq!(m.rows(), 1);
        assert_eq!(m.cols(), 1);
        assert_eq!(m.values[0][0], None);
    }

    #[test]
    fn test_populated_iterates_values() {
        let m = build_matrix(&sample(), &labels(&["A", "B"]), &labels(&["X", "Y"]), Metric::CosineDistance);
        let n = m.populated().count();
        assert_eq!(n, 6);
    }
}
