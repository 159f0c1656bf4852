//! Axis label ordering for the heatmap.

use std::collections::{BTreeMap, BTreeSet};

use crate::observation::Observation;

/// Identity label -> demographic axis name.
pub type CategoryMap = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Subject,
    Responder,
}

impl Side {
    pub fn label_of<'a>(&self, obs: &'a Observation) -> &'a str {
        match self {
            Side::Subject => &obs.subject,
            Side::Responder => &obs.responder,
        }
    }
}

/// Build the label -> axis lookup. Later rows overwrite earlier ones.
pub fn category_map<'a, I>(observations: I) -> CategoryMap
where
    I: IntoIterator<Item = &'a Observation>,
{
    let mut map = CategoryMap::new();
    for obs in observations {
        if obs.demographic_dim.is_empty() {
            continue;
        }
        for label in [&obs.subject, &obs.responder] {
            if !label.is_empty() {
                map.insert(label.clone(), obs.demographic_dim.clone());
            }
        }
    }
    map
}

/// Distinct non-empty labels of one side, ordered by axis then label.
///
/// Labels with no known axis come after every known one.
pub fn sorted_labels<'a, I>(observations: I, side: Side, category_of: &CategoryMap) -> Vec<String>
where
    I: IntoIterator<Item = &'a Observation>,
{
    let distinct: BTreeSet<&str> = observations
        .into_iter()
        .map(|o| side.label_of(o))
        .filter(|l| !l.is_empty())
        .collect();

    let mut labels: Vec<&str> = distinct.into_iter().collect();
    labels.sort_by_key(|label| {
        let axis = category_of.get(*label);
        (axis.is_none(), axis.cloned().unwrap_or_default(), *label)
    });
    labels.into_iter().map(str::to_string).collect()
}
