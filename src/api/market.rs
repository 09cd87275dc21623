//! Price history per item from `/market-trends`. Public data, shared by
//! every user of the client.

use super::client::{ApiClient, query_path};
use super::error::{ClassifiedError, ErrorKind};
use super::transport::{ApiRequest, Method};
use super::types::{EnvelopeStatus, Fetched, string_or_number};
use serde::{Deserialize, Serialize};

/// Days of history accepted by the backend.
pub const DEFAULT_TREND_DAYS: u32 = 30;
pub const MAX_TREND_DAYS: u32 = 365;

/// Filters for a trend or summary read. Unset filters are left to the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrendQuery {
    pub platform: Option<String>,
    pub condition: Option<String>,
    pub days_back: Option<u32>,
}

impl TrendQuery {
    fn days(&self) -> u32 {
        self.days_back.unwrap_or(DEFAULT_TREND_DAYS)
    }

    fn validate(&self) -> Result<(), ClassifiedError> {
        if (1..=MAX_TREND_DAYS).contains(&self.days()) {
            Ok(())
        } else {
            Err(ClassifiedError::new(ErrorKind::Validation).with_details(format!(
                "days_back must be between 1 and {MAX_TREND_DAYS}"
            )))
        }
    }

    fn params(&self) -> [(&'static str, Option<String>); 3] {
        [
            ("platform", self.platform.clone()),
            ("condition", self.condition.clone()),
            ("days_back", self.days_back.map(|d| d.to_string())),
        ]
    }

    /// e.g. `iPhone 12_ebay_all_30`
    fn cache_key(&self, item: &str) -> String {
        format!(
            "{item}_{}_{}_{}",
            self.platform.as_deref().unwrap_or("all"),
            self.condition.as_deref().unwrap_or("all"),
            self.days()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    /// Recorded points have numeric ids; generated ones look like `mock-3`.
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub item_identifier: String,
    pub platform: String,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub listing_count: u32,
    #[serde(default)]
    pub sold_count: u32,
    #[serde(default)]
    pub confidence_score: Option<f64>,
    #[serde(default)]
    pub recorded_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSummary {
    pub average: f64,
    pub median: f64,
    pub lowest: f64,
    pub highest: f64,
    pub count: u64,
    pub period_days: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketTrendsResponse {
    pub item_identifier: String,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub condition: Option<String>,
    pub time_range_days: u32,
    pub trends: Vec<PricePoint>,
    #[serde(default)]
    pub summary: Option<MarketSummary>,
    #[serde(default)]
    pub status: EnvelopeStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSummaryResponse {
    pub item_identifier: String,
    #[serde(default)]
    pub summary: Option<MarketSummary>,
    #[serde(default)]
    pub status: EnvelopeStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Platform {
    pub id: String,
    pub name: String,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformsResponse {
    pub platforms: Vec<Platform>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemCondition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionsResponse {
    pub conditions: Vec<ItemCondition>,
}

fn trends_path(item: &str, suffix: &str, query: &TrendQuery) -> String {
    let path = format!("/market-trends/{}{suffix}", urlencoding::encode(item));
    query_path(&path, &query.params())
}

impl ApiClient {
    /// Price history and summary for one item. A `days_back` outside
    /// 1..=365 is rejected without a request.
    pub async fn market_trends(
        &self,
        item: &str,
        query: &TrendQuery,
    ) -> Result<Fetched<MarketTrendsResponse>, ClassifiedError> {
        query.validate()?;
        let request = ApiRequest::new(Method::Get, trends_path(item, "", query));
        let key = format!("market_trends_{}", query.cache_key(item));
        self.cached_read("market-trends", &key, &self.market_trends_cache, request)
            .await
    }

    pub async fn market_summary(
        &self,
        item: &str,
        query: &TrendQuery,
    ) -> Result<Fetched<MarketSummaryResponse>, ClassifiedError> {
        query.validate()?;
        let request = ApiRequest::new(Method::Get, trends_path(item, "/summary", query));
        let key = format!("market_summary_{}", query.cache_key(item));
        self.cached_read("market-summary", &key, &self.market_summary_cache, request)
            .await
    }

    pub async fn market_platforms(&self) -> Result<PlatformsResponse, ClassifiedError> {
        self.call(
            "market-platforms",
            ApiRequest::new(Method::Get, "/market-trends/platforms"),
        )
        .await
    }

    pub async fn market_conditions(&self) -> Result<ConditionsResponse, ClassifiedError> {
        self.call(
            "market-conditions",
            ApiRequest::new(Method::Get, "/market-trends/conditions"),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_generated_points_decode() {
        let response: MarketTrendsResponse = serde_json::from_value(json!({
            "item_identifier": "iPhone 12",
            "platform": null,
            "condition": null,
            "time_range_days": 7,
            "trends": [
                {"id": "mock-0", "item_identifier": "iPhone 12", "platform": "ebay",
                 "condition": "good", "price": 210.5, "currency": "USD",
                 "listing_count": 12, "sold_count": 3, "confidence_score": 0.8,
                 "recorded_at": "2024-05-01T00:00:00", "created_at": "2024-05-01T00:00:00"},
                {"id": 17, "item_identifier": "iPhone 12", "platform": "ebay",
                 "condition": "good", "price": 199.0, "currency": "USD",
                 "listing_count": 1, "sold_count": 0, "confidence_score": 0.5,
                 "average_days_to_sell": null, "data_source": "ebay",
                 "recorded_at": "2024-05-02T00:00:00", "created_at": "2024-05-02T00:00:00"}
            ],
            "summary": {"average": 204.75, "median": 210.5, "lowest": 199.0,
                        "highest": 210.5, "count": 2, "period_days": 2},
            "status": "success"
        }))
        .unwrap();
        assert_eq!(response.trends[0].id, "mock-0");
        assert_eq!(response.trends[1].id, "17");
        assert_eq!(response.summary.unwrap().count, 2);
    }

    #[test]
    fn test_days_back_bounds() {
        let query = |days| TrendQuery {
            days_back: Some(days),
            ..Default::default()
        };
        assert!(query(1).validate().is_ok());
        assert!(query(MAX_TREND_DAYS).validate().is_ok());
        assert_eq!(
            query(0).validate().unwrap_err().kind,
            ErrorKind::Validation
        );
        assert!(query(366).validate().is_err());
        assert!(TrendQuery::default().validate().is_ok());
    }

    #[test]
    fn test_trends_path_and_key() {
        let query = TrendQuery {
            platform: Some("ebay".into()),
            condition: None,
            days_back: Some(7),
        };
        assert_eq!(
            trends_path("iPhone 12", "/summary", &query),
            "/market-trends/iPhone%2012/summary?platform=ebay&days_back=7"
        );
        assert_eq!(query.cache_key("iPhone 12"), "iPhone 12_ebay_all_7");
        assert_eq!(
            trends_path("lamp", "", &TrendQuery::default()),
            "/market-trends/lamp"
        );
    }
}
