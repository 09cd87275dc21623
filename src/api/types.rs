//! Backend response envelopes and request bodies.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Search limits accepted by the backend.
pub const MIN_SEARCH_LIMIT: u32 = 1;
pub const MAX_SEARCH_LIMIT: u32 = 100;
pub const DEFAULT_SEARCH_LIMIT: u32 = 20;

/// A response, marked when it was served from cache instead of the network.
///
/// Serializes as the flattened payload plus `"_cached": true` for cached
/// responses; fresh responses carry no marker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fetched<T> {
    #[serde(flatten)]
    pub data: T,
    #[serde(rename = "_cached", skip_serializing_if = "std::ops::Not::not")]
    pub cached: bool,
}

impl<T> Fetched<T> {
    #[must_use]
    pub fn fresh(data: T) -> Self {
        Self {
            data,
            cached: false,
        }
    }

    #[must_use]
    pub fn from_cache(data: T) -> Self {
        Self { data, cached: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeStatus {
    #[default]
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    #[serde(rename = "itemId")]
    pub item_id: String,
    pub title: String,
    #[serde(deserialize_with = "string_or_number")]
    pub price: String,
    #[serde(default)]
    pub currency: String,
    #[serde(rename = "galleryURL", default)]
    pub gallery_url: String,
    #[serde(rename = "viewItemURL", default)]
    pub view_item_url: String,
    #[serde(default)]
    pub condition: String,
    #[serde(default)]
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub total: u64,
    pub query: String,
    pub limit: u32,
    #[serde(default)]
    pub status: EnvelopeStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedItem {
    pub id: String,
    pub title: String,
    #[serde(deserialize_with = "string_or_number")]
    pub price: String,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub item_url: String,
    #[serde(default)]
    pub condition: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub saved_at: String,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedItemsResponse {
    pub items: Vec<SavedItem>,
    pub total: u64,
    #[serde(default)]
    pub status: EnvelopeStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedItemResponse {
    pub item: SavedItem,
    #[serde(default)]
    pub status: EnvelopeStatus,
}

/// Page position of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
    pub pages: u32,
    pub has_next: bool,
    pub has_prev: bool,
}

/// Page size ceiling of paginated listings.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Response to create, update and delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationResponse {
    pub message: String,
    #[serde(alias = "deleted_item")]
    pub item: Option<SavedItem>,
    #[serde(default)]
    pub status: EnvelopeStatus,
}

/// Body for `POST /saved-items`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSavedItem {
    pub item_id: String,
    pub title: String,
    pub price: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl From<&SearchResult> for NewSavedItem {
    fn from(result: &SearchResult) -> Self {
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        Self {
            item_id: result.item_id.clone(),
            title: result.title.clone(),
            price: result.price.clone(),
            currency: non_empty(&result.currency),
            image_url: non_empty(&result.gallery_url),
            item_url: non_empty(&result.view_item_url),
            condition: non_empty(&result.condition),
            location: non_empty(&result.location),
            notes: None,
        }
    }
}

/// Body for `PUT /saved-items/<id>`. Only set fields are sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SavedItemUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl SavedItemUpdate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub last_login: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
    #[serde(default)]
    pub status: EnvelopeStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentUserResponse {
    pub user: User,
    #[serde(default)]
    pub status: EnvelopeStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: EnvelopeStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Login by email or username.
#[derive(Clone, Serialize)]
pub struct Credentials {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub password: String,
}

impl Credentials {
    /// Sends `email` when the identifier contains `@`, else `username`.
    #[must_use]
    pub fn new(identifier: &str, password: impl Into<String>) -> Self {
        let identifier = identifier.trim().to_string();
        let (email, username) = if identifier.contains('@') {
            (Some(identifier), None)
        } else {
            (None, Some(identifier))
        };
        Self {
            email,
            username,
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[derive(Clone, Serialize)]
pub struct Registration {
    pub email: String,
    pub username: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("email", &self.email)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

/// Prices arrive as strings from search and as whatever the client saved.
pub(super) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_search_response_from_backend() {
        let body = json!({
            "results": [{
                "title": "iPhone 12 64GB",
                "itemId": "1234",
                "viewItemURL": "https://ebay.example/itm/1234",
                "galleryURL": "https://ebay.example/img/1234.jpg",
                "price": "199.99",
                "currency": "USD",
                "location": "Austin, TX",
                "condition": "Used",
                "confidence": 1.0
            }],
            "total": 1,
            "query": "iPhone",
            "limit": 20,
            "status": "success"
        });
        let response: SearchResponse = serde_json::from_value(body).unwrap();
        assert_eq!(response.results[0].item_id, "1234");
        assert_eq!(response.results[0].gallery_url, "https://ebay.example/img/1234.jpg");
        assert_eq!(response.results[0].confidence, Some(1.0));
        assert_eq!(response.status, EnvelopeStatus::Success);
    }

    #[test]
    fn test_numeric_price_accepted() {
        let item: SavedItem = serde_json::from_value(json!({
            "id": "1", "title": "Lamp", "price": 12.5
        }))
        .unwrap();
        assert_eq!(item.price, "12.5");
        assert_eq!(item.notes, "");
    }

    #[test]
    fn test_delete_response_alias() {
        let response: MutationResponse = serde_json::from_value(json!({
            "message": "Item deleted successfully",
            "deleted_item": {"id": "1", "title": "Lamp", "price": "12"},
            "status": "success"
        }))
        .unwrap();
        assert_eq!(response.item.unwrap().id, "1");
    }

    #[test]
    fn test_cached_marker_only_when_cached() {
        let health = HealthResponse {
            status: "healthy".into(),
            service: "FlipLens Backend".into(),
            version: "1.0.0".into(),
        };
        let fresh = serde_json::to_value(Fetched::fresh(health.clone())).unwrap();
        assert!(fresh.get("_cached").is_none());
        assert_eq!(fresh["service"], "FlipLens Backend");

        let cached = serde_json::to_value(Fetched::from_cache(health)).unwrap();
        assert_eq!(cached["_cached"], true);
    }

    #[test]
    fn test_credentials_pick_field_and_redact() {
        let by_email = Credentials::new(" ann@example.com ", "hunter22");
        let json = serde_json::to_value(&by_email).unwrap();
        assert_eq!(json["email"], "ann@example.com");
        assert!(json.get("username").is_none());

        let by_name = Credentials::new("ann", "hunter22");
        assert_eq!(by_name.username.as_deref(), Some("ann"));
        assert!(!format!("{by_name:?}").contains("hunter22"));
    }

    #[test]
    fn test_update_serializes_only_set_fields() {
        let update = SavedItemUpdate {
            notes: Some("resell at 40".into()),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&update).unwrap(),
            json!({"notes": "resell at 40"})
        );
        assert!(SavedItemUpdate::default().is_empty());
    }
}
