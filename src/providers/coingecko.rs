use crate::core::error::FetchError;
use crate::core::market::{MarketProvider, MarketRecord, PROVIDER_PAGE_MAX};
use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, instrument, warn};

/// Stateless fetcher for a CoinGecko-compatible `/coins/markets` endpoint.
///
/// Issues exactly one request per call and performs no retries; pacing
/// between requests is the caller's responsibility.
pub struct CoinGeckoProvider {
    base_url: String,
    currency: String,
    client: reqwest::Client,
}

impl CoinGeckoProvider {
    pub fn new(base_url: &str, currency: &str) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("coinlens/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();

        CoinGeckoProvider {
            base_url: base_url.to_string(),
            currency: currency.to_string(),
            client,
        }
    }
}

#[async_trait]
impl MarketProvider for CoinGeckoProvider {
    #[instrument(name = "MarketsFetch", skip(self))]
    async fn fetch_page(&self, per_page: u32, page: u32) -> Result<Vec<MarketRecord>, FetchError> {
        // The provider rejects oversized pages; clamp rather than fail.
        let per_page = per_page.min(PROVIDER_PAGE_MAX);

        let url = format!(
            "{}/api/v3/coins/markets?vs_currency={}&order=market_cap_desc&per_page={}&page={}&sparkline=false&price_change_percentage=24h,7d,30d",
            self.base_url, self.currency, per_page, page
        );
        debug!("Requesting market data from {}", url);

        let response = self.client.get(&url).send().await?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            warn!("Provider rate limit reached");
            return Err(FetchError::RateLimited);
        }
        let response = response.error_for_status()?;

        let text = response.text().await?;
        let records: Vec<MarketRecord> = serde_json::from_str(&text).inspect_err(|e| {
            warn!(error = %e, "Failed to decode markets response");
        })?;

        debug!("Fetched {} market records (page {})", records.len(), page);
        Ok(records)
    }
}
