use anyhow::Result;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

use crate::services::traits::NameResolver;

#[derive(Debug, Deserialize)]
struct NameRecord {
    address: Option<String>,
}

/// Resolves names against `GET {base}/resolve/{name}`. A 404 or an empty
/// `address` field means the name is unregistered.
pub struct HttpNameResolver {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpNameResolver {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            http_client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl NameResolver for HttpNameResolver {
    async fn resolve(&self, query: &str) -> Result<Option<String>> {
        let url = format!("{}/resolve/{}", self.base_url, query);
        tracing::debug!("Resolving name via {}", url);

        let response = self.http_client.get(&url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let record: NameRecord = response.error_for_status()?.json().await?;
        Ok(record.address.filter(|address| !address.trim().is_empty()))
    }
}
