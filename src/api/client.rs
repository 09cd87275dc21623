//! Backend operations with retry and cache-backed degradation.

use super::alerts::AlertsResponse;
use super::classify::TransportFailure;
use super::error::{ClassifiedError, ErrorKind};
use super::market::{MarketSummaryResponse, MarketTrendsResponse};
use super::portfolio::PortfolioResponse;
use super::retry::{RetryExecutor, RetryPolicy};
use super::transport::{ApiRequest, BearerToken, HttpTransport, Method, Transport};
use super::types::{
    AuthResponse, Credentials, CurrentUserResponse, Fetched, HealthResponse, MAX_SEARCH_LIMIT,
    MIN_SEARCH_LIMIT, MessageResponse, MutationResponse, NewSavedItem, Registration,
    SavedItem, SavedItemResponse, SavedItemUpdate, SavedItemsResponse, SearchResponse,
};
use crate::cache::{CacheStore, KeyValueStorage};
use crate::config::Config;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Storage slot of the search-results cache.
pub const SEARCH_CACHE_SLOT: &str = "fliplens_search_cache";
/// Storage slot of the saved-items listing cache.
pub const SAVED_ITEMS_CACHE_SLOT: &str = "fliplens_saved_items_cache";
pub const MARKET_TRENDS_CACHE_SLOT: &str = "fliplens_market_trends_cache";
pub const MARKET_SUMMARY_CACHE_SLOT: &str = "fliplens_market_summary_cache";
pub const PORTFOLIO_CACHE_SLOT: &str = "fliplens_portfolio_cache";
pub const ALERTS_CACHE_SLOT: &str = "fliplens_alerts_cache";

const SAVED_ITEMS_KEY: &str = "saved_items";

/// Live entry counts, keyed by cache slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub enabled: bool,
    pub entries: BTreeMap<&'static str, usize>,
}

impl CacheStats {
    #[must_use]
    pub fn total(&self) -> usize {
        self.entries.values().sum()
    }
}

/// One method per backend interaction.
///
/// Idempotent reads (search, saved items, market trends, portfolio, alerts)
/// are cached; when such a read ends in a network or timeout failure the last
/// cached response is returned instead, marked as cached. Mutations never
/// fall back.
///
/// Saved items, portfolio and alerts belong to the logged-in user. Their
/// caches are dropped whenever the session identity changes: login,
/// register, logout, or one token replacing another.
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    executor: RetryExecutor,
    search_cache: CacheStore<SearchResponse>,
    saved_items_cache: CacheStore<SavedItemsResponse>,
    pub(super) market_trends_cache: CacheStore<MarketTrendsResponse>,
    pub(super) market_summary_cache: CacheStore<MarketSummaryResponse>,
    pub(super) portfolio_cache: CacheStore<PortfolioResponse>,
    pub(super) alerts_cache: CacheStore<AlertsResponse>,
    token: RwLock<Option<BearerToken>>,
}

impl ApiClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        storage: Arc<dyn KeyValueStorage>,
        config: &Config,
    ) -> Self {
        Self {
            transport,
            executor: RetryExecutor::new(RetryPolicy::from(&config.retry)),
            search_cache: CacheStore::new(SEARCH_CACHE_SLOT, storage.clone(), config.cache.clone()),
            saved_items_cache: CacheStore::new(
                SAVED_ITEMS_CACHE_SLOT,
                storage.clone(),
                config.cache.clone(),
            ),
            market_trends_cache: CacheStore::new(
                MARKET_TRENDS_CACHE_SLOT,
                storage.clone(),
                config.cache.clone(),
            ),
            market_summary_cache: CacheStore::new(
                MARKET_SUMMARY_CACHE_SLOT,
                storage.clone(),
                config.cache.clone(),
            ),
            portfolio_cache: CacheStore::new(
                PORTFOLIO_CACHE_SLOT,
                storage.clone(),
                config.cache.clone(),
            ),
            alerts_cache: CacheStore::new(ALERTS_CACHE_SLOT, storage, config.cache.clone()),
            token: RwLock::new(None),
        }
    }

    /// Client talking HTTP to `config.api_base_url`.
    pub fn http(config: &Config, storage: Arc<dyn KeyValueStorage>) -> Self {
        Self::new(Arc::new(HttpTransport::from_config(config)), storage, config)
    }

    /// Interrupt retry delays when `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.executor = self.executor.with_cancellation(token);
        self
    }

    /// Replace the retry policy. A cancellation token set earlier stays.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.executor = self.executor.with_policy(policy);
        self
    }

    /// Token attached to every subsequent request.
    ///
    /// Restoring a session (no token yet) keeps the per-user caches; swapping
    /// one token for another or clearing it drops them.
    pub async fn set_token(&self, token: Option<BearerToken>) {
        if self.store_token(token) {
            self.clear_user_caches().await;
        }
    }

    #[must_use]
    pub fn token(&self) -> Option<BearerToken> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn search_cache(&self) -> &CacheStore<SearchResponse> {
        &self.search_cache
    }

    #[must_use]
    pub fn saved_items_cache(&self) -> &CacheStore<SavedItemsResponse> {
        &self.saved_items_cache
    }

    /// Search listings. `limit` is clamped to 1..=100.
    pub async fn search_items(
        &self,
        query: &str,
        limit: u32,
    ) -> Result<Fetched<SearchResponse>, ClassifiedError> {
        let limit = limit.clamp(MIN_SEARCH_LIMIT, MAX_SEARCH_LIMIT);
        let key = search_cache_key(query, limit);
        let request = ApiRequest::new(Method::Post, "/search")
            .with_body(serde_json::json!({ "query": query, "limit": limit }));
        self.cached_read("search", &key, &self.search_cache, request)
            .await
    }

    pub async fn get_saved_items(&self) -> Result<Fetched<SavedItemsResponse>, ClassifiedError> {
        let request = ApiRequest::new(Method::Get, "/saved-items");
        self.cached_read(
            "saved-items",
            SAVED_ITEMS_KEY,
            &self.saved_items_cache,
            request,
        )
        .await
    }

    pub async fn get_saved_item(&self, item_id: &str) -> Result<SavedItem, ClassifiedError> {
        let request = ApiRequest::new(Method::Get, item_path(item_id));
        let response: SavedItemResponse = self.call("saved-item", request).await?;
        Ok(response.item)
    }

    pub async fn save_item(&self, item: &NewSavedItem) -> Result<MutationResponse, ClassifiedError> {
        let request = ApiRequest::new(Method::Post, "/saved-items").with_body(json_body(item)?);
        self.call("save-item", request).await
    }

    pub async fn update_saved_item(
        &self,
        item_id: &str,
        update: &SavedItemUpdate,
    ) -> Result<MutationResponse, ClassifiedError> {
        let request = ApiRequest::new(Method::Put, item_path(item_id)).with_body(json_body(update)?);
        self.call("update-item", request).await
    }

    pub async fn delete_saved_item(
        &self,
        item_id: &str,
    ) -> Result<MutationResponse, ClassifiedError> {
        let request = ApiRequest::new(Method::Delete, item_path(item_id));
        self.call("delete-item", request).await
    }

    pub async fn register(
        &self,
        registration: &Registration,
    ) -> Result<AuthResponse, ClassifiedError> {
        let request =
            ApiRequest::new(Method::Post, "/auth/register").with_body(json_body(registration)?);
        let response: AuthResponse = self.call("register", request).await?;
        self.start_session(&response).await;
        Ok(response)
    }

    /// Log in and attach the returned token to later requests.
    pub async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, ClassifiedError> {
        let request =
            ApiRequest::new(Method::Post, "/auth/login").with_body(json_body(credentials)?);
        let response: AuthResponse = self.call("login", request).await?;
        self.start_session(&response).await;
        Ok(response)
    }

    pub async fn current_user(&self) -> Result<CurrentUserResponse, ClassifiedError> {
        self.call("current-user", ApiRequest::new(Method::Get, "/auth/me"))
            .await
    }

    /// Tell the backend, then forget the token and the user's cached data
    /// whatever it answered.
    pub async fn logout(&self) -> Result<MessageResponse, ClassifiedError> {
        let result = self
            .call("logout", ApiRequest::new(Method::Post, "/auth/logout"))
            .await;
        self.store_token(None);
        self.clear_user_caches().await;
        result
    }

    pub async fn health(&self) -> Result<HealthResponse, ClassifiedError> {
        self.call("health", ApiRequest::new(Method::Get, "/health"))
            .await
    }

    pub async fn clear_caches(&self) {
        self.search_cache.clear().await;
        self.market_trends_cache.clear().await;
        self.market_summary_cache.clear().await;
        self.clear_user_caches().await;
    }

    pub async fn cache_stats(&self) -> CacheStats {
        let entries = BTreeMap::from([
            (SEARCH_CACHE_SLOT, self.search_cache.size().await),
            (SAVED_ITEMS_CACHE_SLOT, self.saved_items_cache.size().await),
            (MARKET_TRENDS_CACHE_SLOT, self.market_trends_cache.size().await),
            (MARKET_SUMMARY_CACHE_SLOT, self.market_summary_cache.size().await),
            (PORTFOLIO_CACHE_SLOT, self.portfolio_cache.size().await),
            (ALERTS_CACHE_SLOT, self.alerts_cache.size().await),
        ]);
        CacheStats {
            enabled: self.search_cache.is_enabled(),
            entries,
        }
    }

    /// Returns whether an existing token was replaced or removed.
    fn store_token(&self, token: Option<BearerToken>) -> bool {
        let mut slot = self.token.write().unwrap_or_else(PoisonError::into_inner);
        let changed = slot.is_some() && *slot != token;
        *slot = token;
        changed
    }

    async fn start_session(&self, response: &AuthResponse) {
        self.store_token(Some(BearerToken::new(response.token.clone())));
        self.clear_user_caches().await;
    }

    async fn clear_user_caches(&self) {
        debug!("Session changed, dropping per-user caches");
        self.saved_items_cache.clear().await;
        self.portfolio_cache.clear().await;
        self.alerts_cache.clear().await;
    }

    /// Read through `cache`: store on success, substitute on connectivity failure.
    pub(super) async fn cached_read<T>(
        &self,
        label: &str,
        key: &str,
        cache: &CacheStore<T>,
        request: ApiRequest,
    ) -> Result<Fetched<T>, ClassifiedError>
    where
        T: Serialize + DeserializeOwned + Clone + Send,
    {
        match self.call::<T>(label, request).await {
            Ok(data) => {
                cache.set(key, data.clone(), None).await;
                Ok(Fetched::fresh(data))
            }
            Err(err) if err.kind.is_connectivity() => match cache.get(key).await {
                Some(data) => {
                    warn!("{label}: {}, serving cached response", err.kind);
                    Ok(Fetched::from_cache(data))
                }
                None => {
                    debug!("{label}: {}, nothing cached for fallback", err.kind);
                    Err(err)
                }
            },
            Err(err) => Err(err),
        }
    }

    /// One logical request under the retry policy, decoded as `R`.
    pub(super) async fn call<R: DeserializeOwned>(
        &self,
        label: &str,
        request: ApiRequest,
    ) -> Result<R, ClassifiedError> {
        let request = request.with_bearer(self.token());
        let request = &request;
        let transport = self.transport.as_ref();

        self.executor
            .execute(label, move || async move {
                let response = transport.send(request).await?;
                serde_json::from_str(&response.body).map_err(|e| TransportFailure::Decode {
                    status: response.status,
                    detail: e.to_string(),
                })
            })
            .await
    }
}

/// Cache key for a search, e.g. `search_iPhone_20`.
#[must_use]
pub fn search_cache_key(query: &str, limit: u32) -> String {
    format!("search_{query}_{limit}")
}

fn item_path(item_id: &str) -> String {
    format!("/saved-items/{}", urlencoding::encode(item_id))
}

/// Append the set parameters of `params` as a query string.
pub(super) fn query_path(path: &str, params: &[(&str, Option<String>)]) -> String {
    let query: Vec<String> = params
        .iter()
        .filter_map(|(name, value)| {
            value
                .as_ref()
                .map(|v| format!("{name}={}", urlencoding::encode(v)))
        })
        .collect();
    if query.is_empty() {
        path.to_string()
    } else {
        format!("{path}?{}", query.join("&"))
    }
}

pub(super) fn json_body<B: Serialize>(body: &B) -> Result<serde_json::Value, ClassifiedError> {
    serde_json::to_value(body).map_err(|e| {
        ClassifiedError::new(ErrorKind::Validation).with_details(format!("Invalid request body: {e}"))
    })
}
