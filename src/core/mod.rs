//! Core business logic abstractions

pub mod config;
pub mod error;
pub mod log;
pub mod market;
pub mod state;

// Re-export main types for cleaner imports
pub use error::FetchError;
pub use market::{ChangePeriod, MarketProvider, MarketRecord, SortDirection, SortKey};
pub use state::{MarketsController, MarketsView};
