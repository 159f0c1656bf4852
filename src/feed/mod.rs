//! Bulk dataset loading.
//!
//! The models index is read first, then every model's dataset is fetched
//! concurrently. A model whose dataset cannot be fetched or parsed contributes
//! no rows; the build only aborts when nothing usable was loaded at all.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures_util::future::join_all;
use serde_json::json;

use crate::data::{parse_dataset, ModelsIndex};
use crate::logging::{log, log_dataset_failed, log_dataset_loaded, obj, v_str, Domain, Level, ProfileScope};
use crate::observation::Observation;
use crate::state::{Config, DashboardState};

pub mod file;
pub mod http;
pub mod retry;

pub use file::FileSource;
pub use http::HttpSource;

#[async_trait]
pub trait DatasetSource {
    /// Location shown in logs.
    fn describe(&self) -> String;
    async fn fetch_index(&self) -> Result<ModelsIndex>;
    /// Raw CSV text of `<stem>_data.csv`.
    async fn fetch_dataset(&self, stem: &str) -> Result<String>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceKind {
    File,
    Http,
}

impl SourceKind {
    pub fn from_config(cfg: &Config) -> Self {
        if cfg.data_base_url.is_some() {
            SourceKind::Http
        } else {
            SourceKind::File
        }
    }

    pub fn build(self, cfg: &Config) -> Result<Box<dyn DatasetSource + Send + Sync>> {
        match self {
            SourceKind::File => Ok(Box::new(FileSource::new(&cfg.data_dir))),
            SourceKind::Http => {
                let base = cfg
                    .data_base_url
                    .as_deref()
                    .ok_or_else(|| anyhow!("DATA_BASE_URL not set"))?;
                Ok(Box::new(HttpSource::new(
                    base,
                    retry::RetryConfig::with_retries(cfg.fetch_retries),
                )?))
            }
        }
    }
}

/// Result of loading one model's dataset.
#[derive(Debug, Clone)]
pub struct ModelLoad {
    pub model: String,
    pub observations: Vec<Observation>,
    pub dropped: usize,
    /// Set when the dataset could not be used.
    pub error: Option<String>,
}

async fn load_model<S>(source: &S, index: &ModelsIndex, model: &str) -> ModelLoad
where
    S: DatasetSource + ?Sized + Sync,
{
    let failed = |error: String| ModelLoad {
        model: model.to_string(),
        observations: Vec::new(),
        dropped: 0,
        error: Some(error),
    };

    let Some(stem) = index.stem_for(model) else {
        log_dataset_failed(model, None, "no filename stem in index");
        return failed("no filename stem in index".to_string());
    };
    let text = match source.fetch_dataset(stem).await {
        Ok(t) => t,
        Err(e) => {
            let msg = format!("{:#}", e);
            log_dataset_failed(model, Some(stem), &msg);
            return failed(msg);
        }
    };
    match parse_dataset(&text) {
        Ok(parsed) => {
            log_dataset_loaded(model, parsed.observations.len(), parsed.dropped, &source.describe());
            ModelLoad {
                model: model.to_string(),
                observations: parsed.observations,
                dropped: parsed.dropped,
                error: None,
            }
        }
        Err(e) => {
            let msg = format!("{:#}", e);
            log_dataset_failed(model, Some(stem), &msg);
            failed(msg)
        }
    }
}

/// Fetch every model listed in `index` concurrently. Never fails; each
/// model's problems are reported in its own `ModelLoad`.
pub async fn load_all<S>(source: &S, index: &ModelsIndex) -> Vec<ModelLoad>
where
    S: DatasetSource + ?Sized + Sync,
{
    let _p = ProfileScope::with_context("load_all", &[("models", json!(index.models.len()))]);
    join_all(index.models.iter().map(|m| load_model(source, index, m))).await
}

/// Index, datasets, aggregation. Errors only when there is nothing to show.
pub async fn load_dashboard<S>(source: &S) -> Result<DashboardState>
where
    S: DatasetSource + ?Sized + Sync,
{
    let index = source
        .fetch_index()
        .await
        .map_err(|e| anyhow!("models index unavailable from {}: {:#}", source.describe(), e))?;
    if index.models.is_empty() {
        return Err(anyhow!("no models listed in index"));
    }

    let loads = load_all(source, &index).await;
    let failed = loads.iter().filter(|l| l.error.is_some()).count();
    let dropped: usize = loads.iter().map(|l| l.dropped).sum();
    let observations: Vec<Observation> = loads.into_iter().flat_map(|l| l.observations).collect();
    log(
        Level::Info,
        Domain::Load,
        "load_complete",
        obj(&[
            ("source", v_str(&source.describe())),
            ("models", json!(index.models.len())),
            ("failed_models", json!(failed)),
            ("rows", json!(observations.len())),
            ("dropped_rows", json!(dropped)),
        ]),
    );
    if observations.is_empty() {
        return Err(anyhow!("no valid data loaded"));
    }
    Ok(DashboardState::new(index.models, observations))
}
