//! The logged-in user's profile and settings.

use super::client::{ApiClient, json_body};
use super::error::{ClassifiedError, ErrorKind};
use super::transport::{ApiRequest, Method};
use super::types::EnvelopeStatus;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: u64,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub profile_picture: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub last_login: Option<String>,
    #[serde(default)]
    pub is_verified: bool,
    /// Same shape as [`SettingsResponse::settings`].
    #[serde(default)]
    pub settings: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub profile: Profile,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub status: EnvelopeStatus,
}

/// Body for `PUT /profile`. Only set fields are sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PortfolioValue {
    pub total_investment: f64,
    pub estimated_value: f64,
    pub profit_loss: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileStats {
    pub saved_items: u64,
    pub portfolio_items: u64,
    pub active_alerts: u64,
    pub total_searches: u64,
    pub portfolio_value: PortfolioValue,
    #[serde(default)]
    pub member_since: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileStatsResponse {
    pub stats: ProfileStats,
}

/// Settings are nested groups (notifications, display, privacy, ...) that the
/// client passes through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsResponse {
    pub settings: serde_json::Value,
    #[serde(default)]
    pub message: Option<String>,
}

impl ApiClient {
    pub async fn profile(&self) -> Result<ProfileResponse, ClassifiedError> {
        self.call("profile", ApiRequest::new(Method::Get, "/profile"))
            .await
    }

    pub async fn update_profile(
        &self,
        update: &ProfileUpdate,
    ) -> Result<ProfileResponse, ClassifiedError> {
        let request = ApiRequest::new(Method::Put, "/profile").with_body(json_body(update)?);
        self.call("update-profile", request).await
    }

    pub async fn profile_stats(&self) -> Result<ProfileStatsResponse, ClassifiedError> {
        self.call("profile-stats", ApiRequest::new(Method::Get, "/profile/stats"))
            .await
    }

    pub async fn settings(&self) -> Result<SettingsResponse, ClassifiedError> {
        self.call("settings", ApiRequest::new(Method::Get, "/settings"))
            .await
    }

    /// Send a partial settings object; the backend merges it per group.
    pub async fn update_settings(
        &self,
        changes: &serde_json::Value,
    ) -> Result<SettingsResponse, ClassifiedError> {
        if !changes.is_object() {
            return Err(ClassifiedError::new(ErrorKind::Validation)
                .with_details("Settings changes must be a JSON object"));
        }
        let request = ApiRequest::new(Method::Put, "/settings").with_body(changes.clone());
        self.call("update-settings", request).await
    }

    pub async fn reset_settings(&self) -> Result<SettingsResponse, ClassifiedError> {
        self.call("reset-settings", ApiRequest::new(Method::Post, "/settings/reset"))
            .await
    }
}
