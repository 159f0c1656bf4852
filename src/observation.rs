//! Experimental records and the small enums used to slice them.
//!
//! One `Observation` is one demographic-conditioned response: who the subject
//! persona was, who the responder persona was, which model answered, whether the
//! scenario carried a power differential, and the two measured metrics.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Power relationship flag of a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Power {
    Absent,
    Present,
}

impl Power {
    pub fn from_flag(flag: i64) -> Option<Self> {
        match flag {
            0 => Some(Power::Absent),
            1 => Some(Power::Present),
            _ => None,
        }
    }

    pub fn flag(&self) -> u8 {
        match self {
            Power::Absent => 0,
            Power::Present => 1,
        }
    }
}

/// Power slice of a selection. Every row lands in `All` and in exactly one of
/// the specific buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PowerFilter {
    #[serde(rename = "all")]
    All,
    #[serde(rename = "0")]
    Absent,
    #[serde(rename = "1")]
    Present,
}

impl PowerFilter {
    pub const ALL: [PowerFilter; 3] = [PowerFilter::All, PowerFilter::Absent, PowerFilter::Present];

    pub fn as_str(&self) -> &'static str {
        match self {
            PowerFilter::All => "all",
            PowerFilter::Absent => "0",
            PowerFilter::Present => "1",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "all" => Some(PowerFilter::All),
            "0" | "absent" => Some(PowerFilter::Absent),
            "1" | "present" => Some(PowerFilter::Present),
            _ => None,
        }
    }

    /// The specific (non-`All`) bucket a row with this power belongs to.
    pub fn specific(power: Power) -> Self {
        match power {
            Power::Absent => PowerFilter::Absent,
            Power::Present => PowerFilter::Present,
        }
    }

    pub fn admits(&self, power: Power) -> bool {
        match self {
            PowerFilter::All => true,
            other => *other == PowerFilter::specific(power),
        }
    }

    /// Short power-disparity wording of heatmap titles.
    pub fn disparity(&self) -> &'static str {
        match self {
            PowerFilter::All => "All",
            PowerFilter::Absent => "Absent",
            PowerFilter::Present => "Present",
        }
    }

    /// Human label of the power selector.
    pub fn describe(&self) -> &'static str {
        match self {
            PowerFilter::All => "All Scenarios",
            PowerFilter::Absent => "No Power Disparity",
            PowerFilter::Present => "Power Disparity",
        }
    }
}

impl fmt::Display for PowerFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two measured quantities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Metric {
    #[serde(rename = "avgCosine")]
    CosineDistance,
    #[serde(rename = "avgScore")]
    Score,
}

impl Metric {
    pub const ALL: [Metric; 2] = [Metric::CosineDistance, Metric::Score];

    pub fn key(&self) -> &'static str {
        match self {
            Metric::CosineDistance => "avgCosine",
            Metric::Score => "avgScore",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Metric::CosineDistance => "Avg Cosine Distance",
            Metric::Score => "Avg Win Rate",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Metric::CosineDistance => "Cosine Distance from the Non-Demog Response",
            Metric::Score => "Win Rate (Quality)",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "cosine" | "avgcosine" | "cosine_dist_from_no_demog" => Some(Metric::CosineDistance),
            "score" | "avgscore" | "winrate" | "win_rate" => Some(Metric::Score),
            _ => None,
        }
    }

    /// Raw per-row value of this metric (NaN when not measured).
    pub fn of(&self, obs: &Observation) -> f64 {
        match self {
            Metric::CosineDistance => obs.cosine_distance,
            Metric::Score => obs.score,
        }
    }
}

/// Display-only free text carried alongside a record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservationText {
    pub sub_persona_context: String,
    pub sub_persona_final: String,
    pub res_persona_context: String,
    pub res_persona_final: String,
    pub scenario: String,
    pub instruction: String,
    pub prompt: String,
    pub response: String,
    pub response_non_demog: String,
}

/// One experimental record, already type-converted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub scenario_id: i64,
    pub final_scenario_id: Option<i64>,
    pub contextual_dim: String,
    pub demographic_dim: String,
    pub power: Power,
    pub subject: String,
    pub responder: String,
    pub model: String,
    /// NaN when not measured.
    pub cosine_distance: f64,
    /// NaN when not measured.
    pub score: f64,
    #[serde(default)]
    pub text: ObservationText,
}

impl Observation {
    /// Record with only the aggregation-relevant fields filled in.
    pub fn bare(
        model: &str,
        subject: &str,
        responder: &str,
        power: Power,
        cosine_distance: f64,
        score: f64,
    ) -> Self {
        Self {
            scenario_id: 0,
            final_scenario_id: None,
            contextual_dim: String::new(),
            demographic_dim: String::new(),
            power,
            subject: subject.to_string(),
            responder: responder.to_string(),
            model: model.to_string(),
            cosine_distance,
            score,
            text: ObservationText::default(),
        }
    }

    /// Scenario identity used for lookups; prefers the final id.
    pub fn scenario_key(&self) -> i64 {
        self.final_scenario_id.unwrap_or(self.scenario_id)
    }

    pub fn is_aggregable(&self) -> bool {
        !self.subject.is_empty() && !self.responder.is_empty()
    }
}
