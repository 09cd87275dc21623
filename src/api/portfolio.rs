//! Owned inventory under `/portfolio`: what was bought, listed and sold.

use super::client::{ApiClient, json_body, query_path};
use super::error::{ClassifiedError, ErrorKind};
use super::transport::{ApiRequest, Method};
use super::types::{EnvelopeStatus, Fetched, MAX_PAGE_SIZE, MessageResponse, Pagination};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Conditions the backend accepts for a portfolio item.
pub const PORTFOLIO_CONDITIONS: &[&str] = &["new", "excellent", "very good", "good", "fair", "poor"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortfolioStatus {
    Owned,
    Listed,
    Sold,
}

impl fmt::Display for PortfolioStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Owned => "owned",
            Self::Listed => "listed",
            Self::Sold => "sold",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        })
    }
}

/// Page and filters for `GET /portfolio`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortfolioQuery {
    pub page: u32,
    pub per_page: u32,
    pub status: Option<PortfolioStatus>,
    pub sort_by: Option<String>,
    pub sort_order: Option<SortOrder>,
}

impl Default for PortfolioQuery {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 20,
            status: None,
            sort_by: None,
            sort_order: None,
        }
    }
}

impl PortfolioQuery {
    fn path(&self) -> String {
        query_path(
            "/portfolio",
            &[
                ("page", Some(self.page.max(1).to_string())),
                ("per_page", Some(self.per_page.clamp(1, MAX_PAGE_SIZE).to_string())),
                ("status", self.status.map(|s| s.to_string())),
                ("sort_by", self.sort_by.clone()),
                ("sort_order", self.sort_order.map(|o| o.to_string())),
            ],
        )
    }

    fn cache_key(&self) -> String {
        format!(
            "portfolio_{}_{}_{}_{}_{}",
            self.page.max(1),
            self.per_page.clamp(1, MAX_PAGE_SIZE),
            self.status.map_or_else(|| "all".to_string(), |s| s.to_string()),
            self.sort_by.as_deref().unwrap_or("created_at"),
            self.sort_order.unwrap_or_default()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioItem {
    pub id: u64,
    pub item_name: String,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    pub condition: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub purchase_price: Option<f64>,
    #[serde(default)]
    pub purchase_date: Option<String>,
    #[serde(default)]
    pub purchase_platform: Option<String>,
    #[serde(default)]
    pub purchase_location: Option<String>,
    #[serde(default)]
    pub current_market_price: Option<f64>,
    #[serde(default)]
    pub last_price_update: Option<String>,
    /// 0.0 to 10.0, with the per-factor breakdown alongside.
    #[serde(default)]
    pub fliplens_rating: Option<f64>,
    #[serde(default)]
    pub rating_factors: Option<serde_json::Value>,
    pub status: PortfolioStatus,
    #[serde(default)]
    pub listing_price: Option<f64>,
    #[serde(default)]
    pub listing_platform: Option<String>,
    #[serde(default)]
    pub listing_date: Option<String>,
    #[serde(default)]
    pub sale_price: Option<f64>,
    #[serde(default)]
    pub sale_date: Option<String>,
    #[serde(default)]
    pub sale_platform: Option<String>,
    #[serde(default)]
    pub profit_loss: Option<f64>,
    #[serde(default)]
    pub profit_percentage: Option<f64>,
    #[serde(default)]
    pub images: Option<Vec<String>>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub total_items: u64,
    pub owned_items: u64,
    pub listed_items: u64,
    pub sold_items: u64,
    pub total_investment: f64,
    pub current_value: f64,
    pub total_profit_loss: f64,
    pub profit_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioResponse {
    pub items: Vec<PortfolioItem>,
    pub pagination: Pagination,
    pub summary: PortfolioSummary,
    #[serde(default)]
    pub status: EnvelopeStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioItemResponse {
    pub item: PortfolioItem,
    #[serde(default)]
    pub message: String,
}

/// Body for `POST /portfolio`. Tags travel comma-joined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPortfolioItem {
    pub item_name: String,
    pub purchase_price: f64,
    /// ISO 8601 date or datetime.
    pub purchase_date: String,
    pub condition: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase_platform: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase_location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
}

impl NewPortfolioItem {
    fn validate(&self) -> Result<(), ClassifiedError> {
        let invalid =
            |detail: &str| Err(ClassifiedError::new(ErrorKind::Validation).with_details(detail));
        if self.item_name.trim().is_empty() {
            return invalid("item_name is required");
        }
        if self.purchase_price.is_nan() || self.purchase_price < 0.0 {
            return invalid("purchase_price must be zero or more");
        }
        check_condition(&self.condition)
    }
}

/// Body for `PUT /portfolio/<id>`. Only set fields are sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioItemUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_market_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<PortfolioStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listing_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listing_platform: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sale_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sale_platform: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
}

fn check_condition(condition: &str) -> Result<(), ClassifiedError> {
    if PORTFOLIO_CONDITIONS.contains(&condition) {
        Ok(())
    } else {
        Err(ClassifiedError::new(ErrorKind::Validation).with_details(format!(
            "condition must be one of: {}",
            PORTFOLIO_CONDITIONS.join(", ")
        )))
    }
}

fn item_path(id: u64) -> String {
    format!("/portfolio/{id}")
}

impl ApiClient {
    /// One page of the user's portfolio with totals across all of it.
    pub async fn portfolio(
        &self,
        query: &PortfolioQuery,
    ) -> Result<Fetched<PortfolioResponse>, ClassifiedError> {
        let request = ApiRequest::new(Method::Get, query.path());
        self.cached_read("portfolio", &query.cache_key(), &self.portfolio_cache, request)
            .await
    }

    pub async fn portfolio_item(&self, id: u64) -> Result<PortfolioItem, ClassifiedError> {
        let response: PortfolioItemResponse = self
            .call("portfolio-item", ApiRequest::new(Method::Get, item_path(id)))
            .await?;
        Ok(response.item)
    }

    pub async fn add_portfolio_item(
        &self,
        item: &NewPortfolioItem,
    ) -> Result<PortfolioItemResponse, ClassifiedError> {
        item.validate()?;
        let request = ApiRequest::new(Method::Post, "/portfolio").with_body(json_body(item)?);
        self.call("add-portfolio-item", request).await
    }

    pub async fn update_portfolio_item(
        &self,
        id: u64,
        update: &PortfolioItemUpdate,
    ) -> Result<PortfolioItemResponse, ClassifiedError> {
        if let Some(condition) = &update.condition {
            check_condition(condition)?;
        }
        let request = ApiRequest::new(Method::Put, item_path(id)).with_body(json_body(update)?);
        self.call("update-portfolio-item", request).await
    }

    pub async fn delete_portfolio_item(&self, id: u64) -> Result<MessageResponse, ClassifiedError> {
        self.call(
            "delete-portfolio-item",
            ApiRequest::new(Method::Delete, item_path(id)),
        )
        .await
    }
}
