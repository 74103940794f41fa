//! Market data model and fetcher abstraction

use crate::core::error::FetchError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

/// Largest page size the market-data provider accepts per request.
pub const PROVIDER_PAGE_MAX: u32 = 250;

/// One tradable asset's market snapshot as returned by the provider.
///
/// Rank and the per-period change fields may be absent for low-rank or newly
/// listed assets with insufficient history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketRecord {
    pub id: String,
    pub symbol: String,
    pub name: String,
    pub image: String,
    pub current_price: f64,
    pub market_cap: f64,
    pub market_cap_rank: Option<u32>,
    #[serde(rename = "price_change_percentage_24h_in_currency")]
    pub change_24h: Option<f64>,
    #[serde(rename = "price_change_percentage_7d_in_currency")]
    pub change_7d: Option<f64>,
    #[serde(rename = "price_change_percentage_30d_in_currency")]
    pub change_30d: Option<f64>,
}

impl MarketRecord {
    /// Percentage change for the given period, if the provider reported one.
    pub fn change_for(&self, period: ChangePeriod) -> Option<f64> {
        match period {
            ChangePeriod::Day => self.change_24h,
            ChangePeriod::Week => self.change_7d,
            ChangePeriod::Month => self.change_30d,
        }
    }
}

/// Time horizon used for percentage-change display and sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangePeriod {
    Day,
    Week,
    Month,
}

impl Display for ChangePeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                ChangePeriod::Day => "24h",
                ChangePeriod::Week => "7d",
                ChangePeriod::Month => "30d",
            }
        )
    }
}

impl FromStr for ChangePeriod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "24h" => Ok(ChangePeriod::Day),
            "7d" => Ok(ChangePeriod::Week),
            "30d" => Ok(ChangePeriod::Month),
            _ => Err(anyhow::anyhow!("Invalid period: {}", s)),
        }
    }
}

/// Column the market list is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    MarketCapRank,
    Change,
    Price,
}

impl Display for SortKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                SortKey::MarketCapRank => "rank",
                SortKey::Change => "change",
                SortKey::Price => "price",
            }
        )
    }
}

impl FromStr for SortKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rank" | "market-cap" => Ok(SortKey::MarketCapRank),
            "change" => Ok(SortKey::Change),
            "price" => Ok(SortKey::Price),
            _ => Err(anyhow::anyhow!("Invalid sort key: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn toggled(self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }
}

impl Display for SortDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                SortDirection::Ascending => "asc",
                SortDirection::Descending => "desc",
            }
        )
    }
}

#[async_trait]
pub trait MarketProvider: Send + Sync {
    /// Fetches one page of market records, ordered by descending market cap.
    async fn fetch_page(&self, per_page: u32, page: u32) -> Result<Vec<MarketRecord>, FetchError>;
}
