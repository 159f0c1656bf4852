use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use tokio::time::Duration;
use url::Url;

use crate::data::{ModelsIndex, MODELS_INDEX_FILE};
use crate::feed::retry::{is_retryable_http_status, is_retryable_network_error, retry_async, Attempt, RetryConfig};
use crate::feed::DatasetSource;

/// Datasets served as static files under a base URL.
pub struct HttpSource {
    client: Client,
    base: Url,
    retry: RetryConfig,
}

impl HttpSource {
    pub fn new(base: &str, retry: RetryConfig) -> Result<Self> {
        // A base without a trailing slash would drop its last segment on join.
        let normalized = if base.ends_with('/') {
            base.to_string()
        } else {
            format!("{}/", base)
        };
        let base = Url::parse(&normalized).with_context(|| format!("invalid base url {}", base))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("build http client")?;
        Ok(Self { client, base, retry })
    }

    pub fn url_for(&self, file: &str) -> Result<Url> {
        self.base
            .join(file)
            .with_context(|| format!("join {} onto {}", file, self.base))
    }

    async fn get_text(&self, url: Url) -> Result<String> {
        let name = url.to_string();
        retry_async(&self.retry, &name, || {
            let url = url.clone();
            async move {
                let resp = self.client.get(url).send().await.map_err(|e| {
                    if is_retryable_network_error(&e) {
                        Attempt::Transient(e.into())
                    } else {
                        Attempt::Fatal(e.into())
                    }
                })?;
                let status = resp.status();
                if !status.is_success() {
                    let err = anyhow!("GET {} returned {}", resp.url(), status);
                    return Err(if is_retryable_http_status(status.as_u16()) {
                        Attempt::Transient(err)
                    } else {
                        Attempt::Fatal(err)
                    });
                }
                resp.text().await.map_err(|e| Attempt::Transient(e.into()))
            }
        })
        .await
    }
}

#[async_trait]
impl DatasetSource for HttpSource {
    fn describe(&self) -> String {
        self.base.to_string()
    }

    async fn fetch_index(&self) -> Result<ModelsIndex> {
        let text = self.get_text(self.url_for(MODELS_INDEX_FILE)?).await?;
        ModelsIndex::from_json(&text)
    }

    async fn fetch_dataset(&self, stem: &str) -> Result<String> {
        self.get_text(self.url_for(&ModelsIndex::dataset_file(stem))?).await
    }
}
