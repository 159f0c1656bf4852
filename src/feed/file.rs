use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;

use crate::data::{ModelsIndex, MODELS_INDEX_FILE};
use crate::feed::DatasetSource;

/// Datasets laid out on local disk as written by `split_by_model`.
pub struct FileSource {
    root: PathBuf,
}

impl FileSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl DatasetSource for FileSource {
    fn describe(&self) -> String {
        self.root.display().to_string()
    }

    async fn fetch_index(&self) -> Result<ModelsIndex> {
        let path = self.root.join(MODELS_INDEX_FILE);
        let text = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("read models index {}", path.display()))?;
        ModelsIndex::from_json(&text)
    }

    async fn fetch_dataset(&self, stem: &str) -> Result<String> {
        let path = self.root.join(ModelsIndex::dataset_file(stem));
        tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("read dataset {}", path.display()))
    }
}
