//! Clients for the cape texture generation backends
//!
//! Generation itself happens remotely; only the signed result is consumed.

use super::api::normalize_base_url;
use super::{SyncError, SyncResult};
use crate::model::{CapeType, SkinVariant, TextureProperty};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const MINESKIN_URL: &str = "https://api.mineskin.org";

const USER_AGENT: &str = concat!("SkinMotion/", env!("CARGO_PKG_VERSION"));

/// Which generation backend the client talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiBackend {
    #[default]
    Customcapes,
    Mineskin,
}

impl ApiBackend {
    pub fn display_name(&self) -> &'static str {
        match self {
            ApiBackend::Customcapes => "CustomCapes API",
            ApiBackend::Mineskin => "MineSkin API",
        }
    }

    pub fn supports(&self, cape: CapeType) -> bool {
        match self {
            ApiBackend::Customcapes => true,
            ApiBackend::Mineskin => mineskin_cape_id(cape).is_some(),
        }
    }
}

/// MineSkin's identifier for `cape`, as listed by its `/v2/capes` endpoint
pub fn mineskin_cape_id(cape: CapeType) -> Option<&'static str> {
    let id = match cape {
        CapeType::Vanilla => return None,
        CapeType::Minecon2011 => "953cac8b-779d-476d-b5e3-04e8f3d2b6d0",
        CapeType::Minecon2012 => "afd553b6-72fb-4a2c-a2ae-eab6f4e4a38d",
        CapeType::Minecon2013 => "83d9b08d-62b0-41c3-8e54-27e2c57c8f88",
        CapeType::Minecon2015 => "fdd24b54-cbb4-4a1c-8a33-5f0f1ee72b9c",
        CapeType::Minecon2016 => "e7dfea16-07e2-43b0-898e-ea8c5c517113",
        CapeType::Mojang => "b77d9b9d-2391-4745-9d34-1a152b46fdfa",
        CapeType::MojangClassic => "8f120319-3586-4b8a-b4df-20e4fc8c2f12",
        CapeType::MojangStudios => "bcfbe84c-9446-4c37-a5d9-c4914f391cce",
        CapeType::Translator => "1bf91499-e9ac-4e60-8d2e-ae67c4d2b42e",
        CapeType::Cobalt => "ca29f5dd-9b4c-4f5a-b3b6-3a3073a85e5e",
        CapeType::Scrolls => "d8f8d973-0749-4a49-887e-6756c13981c2",
        CapeType::RealmsMapmaker => "17912790-c5eb-46bf-aaed-9ac47f9dc6e1",
        CapeType::MillionthCustomer => "a2e8d97e-c35f-4b6e-b24a-a8f5cc5f2d2d",
        CapeType::Prismarine => "d7a1c2c8-4ccf-4f52-95db-5a3c91e7f8b1",
        CapeType::Birthday => "2eec10f2-6315-4c51-b4c1-7b5a61fdaff3",
        CapeType::Migrator => "cd2b3c3e-e4d4-4e71-ab3e-dcb4b2f3bea9",
        CapeType::CherryBlossom => "a45e0e7a-8f96-48dd-8330-6159de5e7a9e",
        CapeType::Anniversary15th => "ef9e95b6-48a3-4fd7-93d4-7e7d9448d2f1",
    };
    Some(id)
}

/// Signed texture produced by the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedTexture {
    pub property: TextureProperty,
    pub texture_url: Option<String>,
    pub cached: bool,
}

/// Anything that can composite a cape onto a skin and return the signed texture
#[async_trait]
pub trait CapeGenerator: Send + Sync {
    async fn generate(&self, skin_url: &str, cape: CapeType, variant: SkinVariant) -> SyncResult<GeneratedTexture>;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    skin_url: &'a str,
    cape_type: &'a str,
    variant: &'a str,
}

#[derive(Deserialize)]
struct GenerateEnvelope {
    #[serde(default)]
    success: bool,
    data: Option<TextureData>,
    error: Option<String>,
    delay_seconds: Option<u64>,
}

#[derive(Deserialize)]
struct TextureData {
    value: String,
    signature: String,
    texture_url: Option<String>,
    #[serde(default)]
    cached: bool,
}

#[derive(Serialize)]
struct MineskinRequest<'a> {
    url: &'a str,
    variant: &'a str,
    visibility: &'a str,
    cape: &'a str,
}

#[derive(Deserialize)]
struct MineskinEnvelope {
    #[serde(default)]
    success: bool,
    skin: Option<MineskinSkin>,
    #[serde(default)]
    errors: Vec<MineskinError>,
}

#[derive(Deserialize)]
struct MineskinSkin {
    texture: Option<MineskinTexture>,
    #[serde(default)]
    duplicate: bool,
}

#[derive(Deserialize)]
struct MineskinTexture {
    data: Option<MineskinTextureData>,
    url: Option<MineskinTextureUrls>,
}

#[derive(Deserialize)]
struct MineskinTextureData {
    value: String,
    signature: String,
}

#[derive(Deserialize)]
struct MineskinTextureUrls {
    skin: Option<String>,
}

#[derive(Deserialize)]
struct MineskinError {
    code: Option<String>,
    message: Option<String>,
}

/// Entry of the backend's cape catalogue
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CapeInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub available: bool,
}

#[derive(Deserialize)]
struct CapesEnvelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    capes: Vec<CapeInfo>,
}

fn signed_texture(value: String, signature: String) -> SyncResult<TextureProperty> {
    TextureProperty::new(value, signature).ok_or_else(|| SyncError::Decode {
        reason: "generated texture has an empty value or signature".to_string(),
    })
}

fn parse_customcapes(status: u16, body: &str) -> SyncResult<GeneratedTexture> {
    let envelope: GenerateEnvelope = serde_json::from_str(body).map_err(|e| {
        if (200..300).contains(&status) {
            SyncError::Decode { reason: e.to_string() }
        } else {
            SyncError::HttpStatus { status }
        }
    })?;

    if !envelope.success {
        let mut reason = envelope.error.unwrap_or_else(|| format!("HTTP {}", status));
        if let Some(delay) = envelope.delay_seconds {
            reason = format!("{} (retry in {}s)", reason, delay);
        }
        return Err(SyncError::Api { reason });
    }

    let data = envelope.data.ok_or_else(|| SyncError::Decode {
        reason: "generation succeeded without texture data".to_string(),
    })?;
    Ok(GeneratedTexture {
        property: signed_texture(data.value, data.signature)?,
        texture_url: data.texture_url,
        cached: data.cached,
    })
}

fn parse_mineskin(status: u16, body: &str) -> SyncResult<GeneratedTexture> {
    let envelope: MineskinEnvelope = serde_json::from_str(body).map_err(|e| {
        if (200..300).contains(&status) {
            SyncError::Decode { reason: e.to_string() }
        } else {
            SyncError::HttpStatus { status }
        }
    })?;

    if !envelope.success || status != 200 {
        let reason = envelope
            .errors
            .into_iter()
            .next()
            .and_then(|e| e.message.or(e.code))
            .unwrap_or_else(|| format!("unknown error (HTTP {})", status));
        return Err(SyncError::Api {
            reason: format!("MineSkin: {}", reason),
        });
    }

    let missing = |what: &str| SyncError::Decode {
        reason: format!("MineSkin response missing {}", what),
    };
    let skin = envelope.skin.ok_or_else(|| missing("skin"))?;
    let texture = skin.texture.ok_or_else(|| missing("skin.texture"))?;
    let data = texture.data.ok_or_else(|| missing("skin.texture.data"))?;
    Ok(GeneratedTexture {
        property: signed_texture(data.value, data.signature)?,
        texture_url: texture.url.and_then(|u| u.skin),
        cached: skin.duplicate,
    })
}

#[derive(Debug, Clone)]
pub struct CapesApiClient {
    http_client: reqwest::Client,
    base_url: String,
    backend: ApiBackend,
    api_key: Option<String>,
}

impl CapesApiClient {
    pub fn new(base_url: &str, backend: ApiBackend, timeout: Duration) -> SyncResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| SyncError::RemoteUnavailable { reason: e.to_string() })?;
        Ok(Self {
            http_client,
            base_url: normalize_base_url(base_url),
            backend,
            api_key: None,
        })
    }

    /// Bearer key sent to MineSkin for higher rate limits; blank keys are ignored
    pub fn with_api_key(mut self, key: &str) -> Self {
        let key = key.trim();
        self.api_key = (!key.is_empty()).then(|| key.to_string());
        self
    }

    pub fn backend(&self) -> ApiBackend {
        self.backend
    }

    /// Request a texture combining `skin_url` with `cape`
    pub async fn generate(&self, skin_url: &str, cape: CapeType, variant: SkinVariant) -> SyncResult<GeneratedTexture> {
        debug!("🧵 Requesting {} cape for {} via {}", cape.id(), skin_url, self.backend.display_name());
        let outcome = match self.backend {
            ApiBackend::Customcapes => self.generate_customcapes(skin_url, cape, variant).await,
            ApiBackend::Mineskin => self.generate_mineskin(skin_url, cape, variant).await,
        };
        match &outcome {
            Ok(generated) => info!("🧵 Generated {} cape texture (cached: {})", cape.id(), generated.cached),
            Err(e) => warn!("❌ Cape generation failed: {}", e),
        }
        outcome
    }

    async fn generate_customcapes(&self, skin_url: &str, cape: CapeType, variant: SkinVariant) -> SyncResult<GeneratedTexture> {
        let request = GenerateRequest {
            skin_url,
            cape_type: cape.id(),
            variant: variant.as_str(),
        };
        let response = self
            .http_client
            .post(format!("{}/generate", self.base_url))
            .json(&request)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        parse_customcapes(status, &body)
    }

    async fn generate_mineskin(&self, skin_url: &str, cape: CapeType, variant: SkinVariant) -> SyncResult<GeneratedTexture> {
        let cape_id = mineskin_cape_id(cape).ok_or_else(|| SyncError::Api {
            reason: format!("Cape type '{}' is not supported by MineSkin", cape.id()),
        })?;
        let request = MineskinRequest {
            url: skin_url,
            variant: variant.as_str(),
            visibility: "unlisted",
            cape: cape_id,
        };
        let mut builder = self
            .http_client
            .post(format!("{}/v2/generate", self.base_url))
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        parse_mineskin(status, &body)
    }

    /// Capes the backend can composite; MineSkin's set is fixed, so it is answered locally
    pub async fn list_capes(&self) -> SyncResult<Vec<CapeInfo>> {
        if self.backend == ApiBackend::Mineskin {
            return Ok(CapeType::ALL
                .iter()
                .map(|cape| CapeInfo {
                    id: cape.id().to_string(),
                    name: cape.display_name().to_string(),
                    available: mineskin_cape_id(*cape).is_some(),
                })
                .collect());
        }

        let url = format!("{}/capes", self.base_url);
        let response = self.http_client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::HttpStatus { status: status.as_u16() });
        }
        let envelope: CapesEnvelope = response.json().await?;
        if !envelope.success {
            return Err(SyncError::Api {
                reason: "cape catalogue unavailable".to_string(),
            });
        }
        Ok(envelope.capes)
    }

    pub async fn is_healthy(&self) -> bool {
        let url = match self.backend {
            ApiBackend::Customcapes => format!("{}/health", self.base_url),
            ApiBackend::Mineskin => format!("{}/", self.base_url),
        };
        self.http_client
            .get(&url)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

#[async_trait]
impl CapeGenerator for CapesApiClient {
    async fn generate(&self, skin_url: &str, cape: CapeType, variant: SkinVariant) -> SyncResult<GeneratedTexture> {
        CapesApiClient::generate(self, skin_url, cape, variant).await
    }
}
