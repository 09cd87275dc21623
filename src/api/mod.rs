//! Resilient access to the FlipLens backend.
//!
//! Layers, leaf first:
//! - [`classify`] turns a failed attempt into a [`ClassifiedError`]
//! - [`RetryExecutor`] repeats an attempt under a bounded backoff policy
//! - [`ApiClient`] exposes one method per backend operation and falls back to
//!   cached reads when the network is unavailable
//!
//! Route groups beyond search, saved items and auth live in their own
//! modules: market trends, portfolio, alerts, and account (profile and settings).
//!
//! # Example
//!
//! ```ignore
//! use fliplens::api::ApiClient;
//!
//! let client = ApiClient::http(&config, storage);
//! let results = client.search_items("iPhone", 20).await?;
//! if results.cached {
//!     eprintln!("offline, showing cached results");
//! }
//! ```

mod account;
mod alerts;
mod classify;
mod client;
mod error;
mod market;
mod portfolio;
mod retry;
mod transport;
mod types;


pub use account::{
    PortfolioValue, Profile, ProfileResponse, ProfileStats, ProfileStatsResponse, ProfileUpdate,
    SettingsResponse,
};
pub use alerts::{
    AlertQuery, AlertResponse, AlertStats, AlertType, AlertsResponse, NewPriceAlert,
    NotificationMethod, PriceAlert, PriceAlertUpdate,
};
pub use classify::{DEFAULT_RETRY_AFTER_SECS, TransportFailure, classify, parse_retry_after_value};
pub use client::{
    ALERTS_CACHE_SLOT, ApiClient, CacheStats, MARKET_SUMMARY_CACHE_SLOT, MARKET_TRENDS_CACHE_SLOT,
    PORTFOLIO_CACHE_SLOT, SAVED_ITEMS_CACHE_SLOT, SEARCH_CACHE_SLOT, search_cache_key,
};
pub use error::{ClassifiedError, ErrorKind};
pub use market::{
    ConditionsResponse, DEFAULT_TREND_DAYS, ItemCondition, MAX_TREND_DAYS, MarketSummary,
    MarketSummaryResponse, MarketTrendsResponse, Platform, PlatformsResponse, PricePoint,
    TrendQuery,
};
pub use portfolio::{
    NewPortfolioItem, PORTFOLIO_CONDITIONS, PortfolioItem, PortfolioItemResponse,
    PortfolioItemUpdate, PortfolioQuery, PortfolioResponse, PortfolioStatus, PortfolioSummary,
    SortOrder,
};
pub use retry::{RetryExecutor, RetryPolicy};
pub use transport::{ApiRequest, ApiResponse, BearerToken, HttpTransport, Method, Transport};
pub use types::*;
