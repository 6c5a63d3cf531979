//! HTTP client for the skin configuration API

use super::{SyncError, SyncResult};
use crate::model::SkinConfig;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

const API_KEY_HEADER: &str = "X-API-Key";

/// Authoritative source of skin configs
#[async_trait]
pub trait SkinSource: Send + Sync {
    /// `Ok(None)` means the remote has no skin for this subject
    async fn fetch_skin_config(&self, subject: Uuid) -> SyncResult<Option<SkinConfig>>;

    async fn generate_token(&self, subject: Uuid, name: &str) -> SyncResult<TokenResponse>;
}

/// One-time dashboard login link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenResponse {
    pub token: String,
    pub dashboard_url: String,
    pub expires_in_hours: u32,
}

#[derive(Deserialize)]
struct SkinEnvelope {
    #[serde(default)]
    success: bool,
    skin: Option<SkinConfig>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct TokenEnvelope {
    #[serde(default)]
    success: bool,
    token: Option<String>,
    dashboard_url: Option<String>,
    #[serde(default)]
    expires_in_hours: u32,
    error: Option<String>,
}

/// Strip trailing slashes from a configured base URL
pub fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

#[derive(Debug, Clone)]
pub struct SkinApiClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
    server_id: String,
}

impl SkinApiClient {
    pub fn new(base_url: &str, api_key: &str, server_id: &str, timeout: Duration) -> SyncResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("skinmotion/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::RemoteUnavailable { reason: e.to_string() })?;
        Ok(Self {
            http_client,
            base_url: normalize_base_url(base_url),
            api_key: api_key.to_string(),
            server_id: server_id.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn is_healthy(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self.http_client.get(&url).header(API_KEY_HEADER, &self.api_key).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("Health check failed: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl SkinSource for SkinApiClient {
    async fn fetch_skin_config(&self, subject: Uuid) -> SyncResult<Option<SkinConfig>> {
        let url = format!("{}/skins/{}", self.base_url, subject);
        let response = self
            .http_client
            .get(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!("No remote skin for {}", subject);
            return Ok(None);
        }
        if !status.is_success() {
            warn!("❌ Skin fetch for {} failed: HTTP {}", subject, status.as_u16());
            return Err(SyncError::HttpStatus { status: status.as_u16() });
        }

        let envelope: SkinEnvelope = response.json().await?;
        if !envelope.success {
            debug!(
                "Remote reports no skin for {}: {}",
                subject,
                envelope.error.as_deref().unwrap_or("no error given")
            );
            return Ok(None);
        }
        Ok(envelope.skin)
    }

    async fn generate_token(&self, subject: Uuid, name: &str) -> SyncResult<TokenResponse> {
        let url = format!("{}/tokens/generate", self.base_url);
        let body = json!({
            "minecraft_uuid": subject,
            "minecraft_username": name,
            "server_id": self.server_id,
        });
        let response = self
            .http_client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::HttpStatus { status: status.as_u16() });
        }

        let envelope: TokenEnvelope = response.json().await?;
        match (envelope.success, envelope.token, envelope.dashboard_url) {
            (true, Some(token), Some(dashboard_url)) => {
                info!("🔑 Issued dashboard token for {}", name);
                Ok(TokenResponse {
                    token,
                    dashboard_url,
                    expires_in_hours: envelope.expires_in_hours,
                })
            }
            _ => Err(SyncError::Api {
                reason: envelope.error.unwrap_or_else(|| "token response incomplete".to_string()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_slash_stripped() {
        assert_eq!(normalize_base_url("https://api.example.com/"), "https://api.example.com");
        assert_eq!(normalize_base_url("https://api.example.com//"), "https://api.example.com");
    }

    #[test]
    fn test_skin_envelope_parsing() {
        let text = r#"{"success":true,"skin":{"minecraft_uuid":"069a79f4-44e9-4726-a5be-fca90e38aaf5","minecraft_username":"Notch","frames":[]}}"#;
        let envelope: SkinEnvelope = serde_json::from_str(text).unwrap();
        assert!(envelope.success);
        assert_eq!(envelope.skin.unwrap().minecraft_username, "Notch");

        let failed: SkinEnvelope = serde_json::from_str(r#"{"success":false,"error":"not found"}"#).unwrap();
        assert!(!failed.success);
        assert!(failed.skin.is_none());
    }
}
