//! Price alerts under `/alerts`.

use super::client::{ApiClient, json_body, query_path};
use super::error::{ClassifiedError, ErrorKind};
use super::transport::{ApiRequest, Method};
use super::types::{EnvelopeStatus, Fetched, MAX_PAGE_SIZE, MessageResponse, Pagination};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    PriceDrop,
    PriceIncrease,
    Threshold,
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PriceDrop => "price_drop",
            Self::PriceIncrease => "price_increase",
            Self::Threshold => "threshold",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationMethod {
    #[default]
    Email,
    Push,
    Both,
}

/// Page and filters for `GET /alerts`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertQuery {
    pub page: u32,
    pub per_page: u32,
    pub is_active: Option<bool>,
    pub alert_type: Option<AlertType>,
}

impl Default for AlertQuery {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 20,
            is_active: None,
            alert_type: None,
        }
    }
}

impl AlertQuery {
    /// The backend reads `is_active` as truthy-if-non-empty, so inactive is
    /// sent as an empty value.
    fn path(&self) -> String {
        query_path(
            "/alerts",
            &[
                ("page", Some(self.page.max(1).to_string())),
                ("per_page", Some(self.per_page.clamp(1, MAX_PAGE_SIZE).to_string())),
                (
                    "is_active",
                    self.is_active
                        .map(|active| if active { "true".to_string() } else { String::new() }),
                ),
                ("alert_type", self.alert_type.map(|t| t.to_string())),
            ],
        )
    }

    fn cache_key(&self) -> String {
        let active = match self.is_active {
            Some(true) => "active",
            Some(false) => "inactive",
            None => "all",
        };
        format!(
            "alerts_{}_{}_{active}_{}",
            self.page.max(1),
            self.per_page.clamp(1, MAX_PAGE_SIZE),
            self.alert_type
                .map_or_else(|| "all".to_string(), |t| t.to_string())
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceAlert {
    pub id: u64,
    pub item_identifier: String,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub condition: Option<String>,
    pub alert_type: AlertType,
    #[serde(default)]
    pub threshold_price: Option<f64>,
    #[serde(default)]
    pub percentage_change: Option<f64>,
    pub is_active: bool,
    #[serde(default)]
    pub notification_method: NotificationMethod,
    #[serde(default)]
    pub baseline_price: Option<f64>,
    #[serde(default)]
    pub last_checked_price: Option<f64>,
    #[serde(default)]
    pub last_triggered: Option<String>,
    #[serde(default)]
    pub trigger_count: u32,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertStats {
    pub total_alerts: u64,
    pub active_alerts: u64,
    pub triggered_alerts: u64,
    pub inactive_alerts: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertsResponse {
    pub alerts: Vec<PriceAlert>,
    pub pagination: Pagination,
    pub stats: AlertStats,
    #[serde(default)]
    pub status: EnvelopeStatus,
}

/// Response to create, get, update and toggle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertResponse {
    pub alert: PriceAlert,
    #[serde(default)]
    pub message: String,
}

/// Body for `POST /alerts`.
///
/// Threshold alerts need `threshold_price`; price drop and increase alerts
/// need `percentage_change` and `baseline_price`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPriceAlert {
    pub item_identifier: String,
    pub alert_type: AlertType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentage_change: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_method: Option<NotificationMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl NewPriceAlert {
    fn validate(&self) -> Result<(), ClassifiedError> {
        if self.item_identifier.trim().is_empty() {
            return Err(invalid("item_identifier is required"));
        }
        match self.alert_type {
            AlertType::Threshold if self.threshold_price.is_none() => {
                Err(invalid("threshold_price is required for threshold alerts"))
            }
            AlertType::PriceDrop | AlertType::PriceIncrease if self.percentage_change.is_none() => {
                Err(invalid("percentage_change is required for percentage-based alerts"))
            }
            AlertType::PriceDrop | AlertType::PriceIncrease if self.baseline_price.is_none() => {
                Err(invalid("baseline_price is required for percentage-based alerts"))
            }
            _ => check_percentage(self.percentage_change),
        }
    }
}

/// Body for `PUT /alerts/<id>`. Only set fields are sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceAlertUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentage_change: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_method: Option<NotificationMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

fn invalid(detail: &str) -> ClassifiedError {
    ClassifiedError::new(ErrorKind::Validation).with_details(detail)
}

fn check_percentage(change: Option<f64>) -> Result<(), ClassifiedError> {
    match change {
        Some(p) if !(0.0..=100.0).contains(&p) => {
            Err(invalid("percentage_change must be between 0 and 100"))
        }
        _ => Ok(()),
    }
}

fn alert_path(id: u64) -> String {
    format!("/alerts/{id}")
}

impl ApiClient {
    /// One page of the user's alerts with counts across all of them.
    pub async fn alerts(
        &self,
        query: &AlertQuery,
    ) -> Result<Fetched<AlertsResponse>, ClassifiedError> {
        let request = ApiRequest::new(Method::Get, query.path());
        self.cached_read("alerts", &query.cache_key(), &self.alerts_cache, request)
            .await
    }

    pub async fn alert(&self, id: u64) -> Result<PriceAlert, ClassifiedError> {
        let response: AlertResponse = self
            .call("alert", ApiRequest::new(Method::Get, alert_path(id)))
            .await?;
        Ok(response.alert)
    }

    pub async fn create_alert(&self, alert: &NewPriceAlert) -> Result<AlertResponse, ClassifiedError> {
        alert.validate()?;
        let request = ApiRequest::new(Method::Post, "/alerts").with_body(json_body(alert)?);
        self.call("create-alert", request).await
    }

    pub async fn update_alert(
        &self,
        id: u64,
        update: &PriceAlertUpdate,
    ) -> Result<AlertResponse, ClassifiedError> {
        check_percentage(update.percentage_change)?;
        let request = ApiRequest::new(Method::Put, alert_path(id)).with_body(json_body(update)?);
        self.call("update-alert", request).await
    }

    pub async fn delete_alert(&self, id: u64) -> Result<MessageResponse, ClassifiedError> {
        self.call("delete-alert", ApiRequest::new(Method::Delete, alert_path(id)))
            .await
    }

    /// Flip an alert between active and inactive.
    pub async fn toggle_alert(&self, id: u64) -> Result<AlertResponse, ClassifiedError> {
        let path = format!("{}/toggle", alert_path(id));
        self.call("toggle-alert", ApiRequest::new(Method::Post, path))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drop_alert() -> NewPriceAlert {
        NewPriceAlert {
            item_identifier: "iPhone 12".into(),
            alert_type: AlertType::PriceDrop,
            platform: Some("ebay".into()),
            condition: None,
            threshold_price: None,
            percentage_change: Some(10.0),
            notification_method: None,
            baseline_price: Some(250.0),
            notes: None,
        }
    }

    #[test]
    fn test_type_specific_requirements() {
        assert!(drop_alert().validate().is_ok());

        let mut alert = drop_alert();
        alert.baseline_price = None;
        assert_eq!(alert.validate().unwrap_err().kind, ErrorKind::Validation);

        alert.alert_type = AlertType::Threshold;
        assert!(alert.validate().is_err());
        alert.threshold_price = Some(180.0);
        assert!(alert.validate().is_ok());

        let mut alert = drop_alert();
        alert.percentage_change = Some(140.0);
        assert!(alert.validate().is_err());
    }

    #[test]
    fn test_inactive_filter_sent_empty() {
        let query = AlertQuery {
            is_active: Some(false),
            alert_type: Some(AlertType::Threshold),
            ..Default::default()
        };
        assert_eq!(
            query.path(),
            "/alerts?page=1&per_page=20&is_active=&alert_type=threshold"
        );
        assert_eq!(query.cache_key(), "alerts_1_20_inactive_threshold");
        assert_eq!(AlertQuery::default().cache_key(), "alerts_1_20_all_all");
    }

    #[test]
    fn test_body_wire_names() {
        let body = serde_json::to_value(drop_alert()).unwrap();
        assert_eq!(body["alert_type"], "price_drop");
        assert!(body.get("threshold_price").is_none());
    }
}
