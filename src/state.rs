//! Runtime configuration and the loaded dashboard context.

use serde_json::json;

use crate::aggregate::{aggregate, AggregationTable};
use crate::logging::{log_aggregated, ProfileScope};
use crate::observation::Observation;

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: String,
    pub data_base_url: Option<String>,
    pub out_dir: String,
    pub luminance_threshold: f64,
    pub items_per_page: usize,
    pub default_cosine_min: f64,
    pub default_cosine_max: f64,
    pub fetch_retries: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: "data/split_by_model".to_string(),
            data_base_url: None,
            out_dir: "out/dashboard".to_string(),
            luminance_threshold: 0.35,
            items_per_page: 100,
            default_cosine_min: 0.0,
            default_cosine_max: 0.5,
            fetch_retries: 3,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            data_dir: std::env::var("DATA_DIR").unwrap_or(d.data_dir),
            data_base_url: std::env::var("DATA_BASE_URL").ok().filter(|v| !v.trim().is_empty()),
            out_dir: std::env::var("OUT_DIR").unwrap_or(d.out_dir),
            luminance_threshold: std::env::var("LUMINANCE_THRESHOLD").ok().and_then(|v| v.parse().ok()).unwrap_or(d.luminance_threshold),
            items_per_page: std::env::var("ITEMS_PER_PAGE").ok().and_then(|v| v.parse().ok()).filter(|n| *n > 0).unwrap_or(d.items_per_page),
            default_cosine_min: std::env::var("DEFAULT_COSINE_MIN").ok().and_then(|v| v.parse().ok()).unwrap_or(d.default_cosine_min),
            default_cosine_max: std::env::var("DEFAULT_COSINE_MAX").ok().and_then(|v| v.parse().ok()).unwrap_or(d.default_cosine_max),
            fetch_retries: std::env::var("FETCH_RETRIES").ok().and_then(|v| v.parse().ok()).unwrap_or(d.fetch_retries),
        }
    }
}

/// Everything a view needs: models, raw rows and the prebuilt aggregation.
///
/// Built once after every dataset has settled; never mutated afterwards.
#[derive(Debug, Clone, Default)]
pub struct DashboardState {
    pub models: Vec<String>,
    pub observations: Vec<Observation>,
    pub table: AggregationTable,
}

impl DashboardState {
    pub fn new(models: Vec<String>, observations: Vec<Observation>) -> Self {
        let _p = ProfileScope::with_context("aggregate", &[("rows", json!(observations.len()))]);
        let mut models = models;
        models.sort();
        models.dedup();
        let table = aggregate(&observations, &models);
        log_aggregated(models.len(), observations.len(), table.cell_count());
        Self {
            models,
            observations,
            table,
        }
    }

    /// Rows of one model, in load order.
    pub fn rows_for<'a>(&'a self, model: &'a str) -> impl Iterator<Item = &'a Observation> + 'a {
        self.observations.iter().filter(move |o| o.model == model)
    }

    pub fn has_model(&self, model: &str) -> bool {
        self.models.iter().any(|m| m == model)
    }
}
