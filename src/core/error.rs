use thiserror::Error;

/// Failure modes of a single market-data fetch.
///
/// Rate limiting is distinguished so callers can back off instead of
/// hammering the provider; everything else collapses into decode vs
/// transport. No variant is retried by the fetcher itself.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("provider rate limit reached (HTTP 429)")]
    RateLimited,

    #[error("failed to decode market data: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("market data request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl FetchError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, FetchError::RateLimited)
    }
}
