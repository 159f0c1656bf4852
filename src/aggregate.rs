//! Grouped averages per (model, power filter, subject, responder).
//!
//! Rows are folded into sum/count accumulators first and reduced to averages
//! only once every row has been seen, since the `all` bucket depends on both
//! power subsets.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::observation::{Metric, Observation, PowerFilter};

/// Composite map key for a subject/responder pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PairKey {
    pub subject: String,
    pub responder: String,
}

impl PairKey {
    pub fn new(subject: impl Into<String>, responder: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            responder: responder.into(),
        }
    }
}

/// Reduced averages for one pair. A metric with no measurements is NaN.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AggregationCell {
    pub avg_cosine: f64,
    pub avg_score: f64,
    /// `max(cosine_count, score_count)`
    pub count: u64,
}

impl AggregationCell {
    pub fn metric(&self, metric: Metric) -> f64 {
        match metric {
            Metric::CosineDistance => self.avg_cosine,
            Metric::Score => self.avg_score,
        }
    }
}

pub type CellMap = BTreeMap<PairKey, AggregationCell>;

#[derive(Debug, Clone, Copy, Default)]
struct Accumulator {
    cosine_sum: f64,
    cosine_count: u64,
    score_sum: f64,
    score_count: u64,
}

impl Accumulator {
    fn push(&mut self, obs: &Observation) {
        if !obs.cosine_distance.is_nan() {
            self.cosine_sum += obs.cosine_distance;
            self.cosine_count += 1;
        }
        if !obs.score.is_nan() {
            self.score_sum += obs.score;
            self.score_count += 1;
        }
    }

    fn reduce(&self) -> AggregationCell {
        AggregationCell {
            avg_cosine: mean_or_nan(self.cosine_sum, self.cosine_count),
            avg_score: mean_or_nan(self.score_sum, self.score_count),
            count: self.cosine_count.max(self.score_count),
        }
    }
}

fn mean_or_nan(sum: f64, count: u64) -> f64 {
    if count > 0 {
        sum / count as f64
    } else {
        f64::NAN
    }
}

/// Reduced cells of one model, one map per power filter.
#[derive(Debug, Clone, Default)]
pub struct ModelBuckets {
    pub all: CellMap,
    pub absent: CellMap,
    pub present: CellMap,
}

impl ModelBuckets {
    pub fn get(&self, filter: PowerFilter) -> &CellMap {
        match filter {
            PowerFilter::All => &self.all,
            PowerFilter::Absent => &self.absent,
            PowerFilter::Present => &self.present,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }
}

#[derive(Default)]
struct ModelAccumulators {
    all: BTreeMap<PairKey, Accumulator>,
    absent: BTreeMap<PairKey, Accumulator>,
    present: BTreeMap<PairKey, Accumulator>,
}

impl ModelAccumulators {
    fn bucket_mut(&mut self, filter: PowerFilter) -> &mut BTreeMap<PairKey, Accumulator> {
        match filter {
            PowerFilter::All => &mut self.all,
            PowerFilter::Absent => &mut self.absent,
            PowerFilter::Present => &mut self.present,
        }
    }

    fn fold(&mut self, obs: &Observation) {
        let key = PairKey::new(obs.subject.as_str(), obs.responder.as_str());
        for filter in [PowerFilter::All, PowerFilter::specific(obs.power)] {
            self.bucket_mut(filter)
                .entry(key.clone())
                .or_default()
                .push(obs);
        }
    }

    fn reduce(self) -> ModelBuckets {
        let reduce_map = |m: BTreeMap<PairKey, Accumulator>| -> CellMap {
            m.into_iter().map(|(k, acc)| (k, acc.reduce())).collect()
        };
        ModelBuckets {
            all: reduce_map(self.all),
            absent: reduce_map(self.absent),
            present: reduce_map(self.present),
        }
    }
}

/// Per-model, per-filter reduced cells. Built once after load.
#[derive(Debug, Clone, Default)]
pub struct AggregationTable {
    models: BTreeMap<String, ModelBuckets>,
}

impl AggregationTable {
    /// Cells for a selection, `None` when the model is unknown or the bucket
    /// holds no pairs.
    pub fn cells(&self, model: &str, filter: PowerFilter) -> Option<&CellMap> {
        self.models
            .get(model)
            .map(|b| b.get(filter))
            .filter(|m| !m.is_empty())
    }

    pub fn buckets(&self, model: &str) -> Option<&ModelBuckets> {
        self.models.get(model)
    }

    pub fn models(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(|s| s.as_str())
    }

    /// Total number of reduced cells across every model and filter.
    pub fn cell_count(&self) -> usize {
        self.models
            .values()
            .map(|b| b.all.len() + b.absent.len() + b.present.len())
            .sum()
    }
}

/// Fold `observations` into averages for every model in `models`.
///
/// Models with no qualifying rows still get (empty) buckets. Rows without both
/// persona labels, or for a model not listed, are skipped.
pub fn aggregate(observations: &[Observation], models: &[String]) -> AggregationTable {
    let mut acc: BTreeMap<&str, ModelAccumulators> = models
        .iter()
        .map(|m| (m.as_str(), ModelAccumulators::default()))
        .collect();

    for obs in observations.iter().filter(|o| o.is_aggregable()) {
        if let Some(model_acc) = acc.get_mut(obs.model.as_str()) {
            model_acc.fold(obs);
        }
    }

    AggregationTable {
        models: acc
            .into_iter()
            .map(|(model, a)| (model.to_string(), a.reduce()))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::Power;

    fn obs(model: &str, sub: &str, res: &str, power: Power, cos: f64, score: f64) -> Observation {
        Observation::bare(model, sub, res, power, cos, score)
    }

    #[test]
    fn test_two_rows_average() {
        let rows = vec![
            obs("A", "X", "Y", Power::Absent, 0.2, 1.0),
            obs("A", "X", "Y", Power::Absent, 0.4, 0.0),
        ];
        let table = aggregate(&rows, &["A".to_string()]);
        let cell = table.cells("A", PowerFilter::All).unwrap()[&PairKey::new("X", "Y")];
        assert!((cell.avg_cosine - 0.3).abs() < 1e-12);
        assert!((cell.avg_score - 0.5).abs() < 1e-12);
        assert_eq!(cell.count, 2);
    }

    #[test]
    fn test_power_buckets_partition() {
        let rows = vec![
            obs("A", "X", "Y", Power::Absent, 0.1, 0.0),
            obs("A", "X", "Y", Power::Present, 0.5, 1.0),
        ];
        let table = aggregate(&rows, &["A".to_string()]);
        let key = PairKey::new("X", "Y");
        let absent = table.cells("A", PowerFilter::Absent).unwrap()[&key];
        let present = table.cells("A", PowerFilter::Present).unwrap()[&key];
        let all = table.cells("A", PowerFilter::All).unwrap()[&key];
        assert_eq!(absent.count, 1);
        assert!((absent.avg_cosine - 0.1).abs() < 1e-12);
        assert_eq!(present.count, 1);
        assert!((present.avg_cosine - 0.5).abs() < 1e-12);
        assert_eq!(all.count, 2);
        assert!((all.avg_cosine - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_nan_metrics_counted_independently() {
        let rows = vec![
            obs("A", "X", "Y", Power::Absent, 0.2, f64::NAN),
            obs("A", "X", "Y", Power::Absent, 0.4, f64::NAN),
            obs("A", "X", "Z", Power::Absent, f64::NAN, 0.75),
        ];
        let table = aggregate(&rows, &["A".to_string()]);
        let cells = table.cells("A", PowerFilter::All).unwrap();
        let xy = cells[&PairKey::new("X", "Y")];
        assert!((xy.avg_cosine - 0.3).abs() < 1e-12);
        assert!(xy.avg_score.is_nan());
        assert_eq!(xy.count, 2);
        let xz = cells[&PairKey::new("X", "Z")];
        assert!(xz.avg_cosine.is_nan());
        assert_eq!(xz.avg_score, 0.75);
        assert_eq!(xz.count, 1);
    }

    #[test]
    fn test_rows_missing_labels_dropped() {
        let rows = vec![
            obs("A", "", "Y", Power::Absent, 0.2, 1.0),
            obs("A", "X", "", Power::Absent, 0.2, 1.0),
        ];
        let table = aggregate(&rows, &["A".to_string()]);
        assert!(table.cells("A", PowerFilter::All).is_none());
        assert!(table.buckets("A").unwrap().is_empty());
    }

    #[test]
    fn test_model_without_rows_has_empty_buckets() {
        let rows = vec![obs("A", "X", "Y", Power::Absent, 0.2, 1.0)];
        let table = aggregate(&rows, &["A".to_string(), "B".to_string()]);
        assert!(table.buckets("B").is_some());
        assert!(table.cells("B", PowerFilter::All).is_none());
        assert!(table.cells("missing", PowerFilter::All).is_none());
        assert!(table.cells("A", PowerFilter::Present).is_none());
        assert_eq!(table.models().collect::<Vec<_>>(), vec!["A", "B"]);
    }

    #[test]
    fn test_unlisted_model_ignored() {
        let rows = vec![obs("C", "X", "Y", Power::Absent, 0.2, 1.0)];
        let table = aggregate(&rows, &["A".to_string()]);
        assert_eq!(table.cell_count(), 0);
    }
}
