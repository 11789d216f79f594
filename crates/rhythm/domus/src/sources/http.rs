use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use super::{MiscDataSource, SourceResult};
use crate::error::DomusError;

/// Fetches misc data over HTTP, restricted to configured URL prefixes.
///
/// JSON bodies are returned as parsed values, anything else as a string.
#[derive(Debug, Clone)]
pub struct HttpMiscData {
    client: Client,
    allowed_prefixes: Vec<String>,
}

impl HttpMiscData {
    pub fn new(allowed_prefixes: Vec<String>, timeout: Duration) -> SourceResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            allowed_prefixes,
        })
    }

    pub fn is_allowed(&self, url: &str) -> bool {
        self.allowed_prefixes
            .iter()
            .any(|prefix| url.starts_with(prefix.as_str()))
    }
}

#[async_trait]
impl MiscDataSource for HttpMiscData {
    async fn fetch(&self, url: &str) -> SourceResult<Value> {
        if !self.is_allowed(url) {
            warn!(url, "Rejected misc data url outside the allowed prefixes");
            return Err(DomusError::UrlNotAllowed(url.to_string()));
        }

        debug!(url, "Fetching misc data");
        let response = self.client.get(url).send().await?.error_for_status()?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body).unwrap_or(Value::String(body)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn urls_outside_the_allowlist_are_rejected() {
        let source = HttpMiscData::new(
            vec!["https://data.cobalt.example/".to_string()],
            Duration::from_secs(1),
        )
        .unwrap();

        assert!(source.is_allowed("https://data.cobalt.example/weather.json"));
        assert!(!source.is_allowed("https://data.cobalt.example.evil/x"));

        let err = source.fetch("http://169.254.169.254/latest").await.unwrap_err();
        assert!(matches!(err, DomusError::UrlNotAllowed(_)));
    }
}
