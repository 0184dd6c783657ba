//! Market quote sources
//!
//! A quote source is a pure I/O boundary: it fetches one body from a remote
//! service and hands back the most recent price as decimal text.

mod extract;

pub use extract::PriceExtractor;

use crate::error::{ReporterError, Result};
use crate::types::Quote;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Quote source trait (allows mocking)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Fetch the latest quote
    async fn fetch(&self) -> Result<Quote>;
}

/// HTTP GET quote source with a configurable body shape
pub struct HttpQuoteSource {
    http: Client,
    url: String,
    extractor: PriceExtractor,
}

impl HttpQuoteSource {
    pub fn new(url: &str, extractor: PriceExtractor, timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            url: url.to_string(),
            extractor,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl QuoteSource for HttpQuoteSource {
    async fn fetch(&self) -> Result<Quote> {
        let response = self.http.get(&self.url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReporterError::Quote(format!(
                "{} returned {}",
                self.url, status
            )));
        }

        let bytes = response.bytes().await?;
        let body: serde_json::Value = serde_json::from_slice(&bytes)?;
        let quote = self.extractor.extract(&body)?;

        tracing::debug!(url = %self.url, price = %quote.price, "Fetched quote");
        Ok(quote)
    }
}
