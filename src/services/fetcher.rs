// src/services/fetcher.rs

//! Plain-HTTP page fetcher (no JavaScript rendering).

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Client, StatusCode, header::CONTENT_TYPE};

use super::collaborators::PageFetcher;
use crate::error::{AppError, Result};
use crate::models::CrawlerConfig;
use crate::utils::http::{backoff_delay, create_async_client, is_retryable};

/// [`PageFetcher`] over reqwest with retry and exponential backoff.
pub struct HttpFetcher {
    client: Client,
    max_retries: u32,
}

impl HttpFetcher {
    pub fn new(config: &CrawlerConfig) -> Result<Self> {
        Ok(Self {
            client: create_async_client(config)?,
            max_retries: config.max_retries,
        })
    }

    async fn fetch_once(&self, url: &str) -> std::result::Result<Attempt, reqwest::Error> {
        let response = self.client.get(url).send().await?;
        let status = response.status();

        if is_retryable(status) {
            return Ok(Attempt::Retry(status));
        }
        if !status.is_success() {
            return Ok(Attempt::Skip(format!("status {status}")));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        if let Some(ct) = content_type.as_deref().filter(|ct| !is_markup(ct)) {
            return Ok(Attempt::Skip(format!("content type {ct}")));
        }

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(Attempt::Skip("empty body".into()));
        }
        Ok(Attempt::Page(body))
    }
}

enum Attempt {
    Page(String),
    Skip(String),
    Retry(StatusCode),
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Option<String>> {
        let mut attempt = 0;
        loop {
            let failure = match self.fetch_once(url).await {
                Ok(Attempt::Page(body)) => return Ok(Some(body)),
                Ok(Attempt::Skip(reason)) => {
                    debug!("Skipping {}: {}", url, reason);
                    return Ok(None);
                }
                Ok(Attempt::Retry(status)) => AppError::collaborator(url, format!("status {status}")),
                Err(e) => AppError::from(e),
            };

            if attempt >= self.max_retries {
                return Err(failure);
            }
            let delay = backoff_delay(attempt);
            warn!(
                "Fetch attempt {} for {} failed ({}), retrying in {:?}",
                attempt + 1,
                url,
                failure,
                delay
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

/// Whether a Content-Type header names something worth parsing as a page.
fn is_markup(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime.is_empty() || mime.starts_with("text/") || mime.contains("html") || mime.contains("xml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_markup() {
        assert!(is_markup("text/html; charset=utf-8"));
        assert!(is_markup("application/xhtml+xml"));
        assert!(is_markup("text/plain"));
        assert!(!is_markup("application/pdf"));
        assert!(!is_markup("image/png"));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_error() {
        let config = CrawlerConfig {
            max_retries: 0,
            timeout_secs: 2,
            ..CrawlerConfig::default()
        };
        let fetcher = HttpFetcher::new(&config).unwrap();
        assert!(fetcher.fetch("http://127.0.0.1:9/summit").await.is_err());
    }
}
