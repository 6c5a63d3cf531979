use crate::sync::capes::{ApiBackend, MINESKIN_URL};
use crate::sync::{normalize_base_url, stream_url, StreamSettings, SyncResult};
use config::{Config, ConfigError, Environment, File, FileFormat};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use url::Url;

const CONFIG_FILE: &str = "skinmotion.toml";

/// Prefix for environment overrides, e.g. `SKINMOTION__API__URL`
pub const ENV_PREFIX: &str = "SKINMOTION";

// =============================================================================
// Remote API
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub url: String,
    pub plugin_api_key: String,
    pub server_id: String,
    pub timeout_seconds: u64,
    pub send_link_on_join: bool,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:3000".to_string(),
            plugin_api_key: String::new(),
            server_id: "default".to_string(),
            timeout_seconds: 30,
            send_link_on_join: false,
        }
    }
}

impl ApiSettings {
    pub fn base_url(&self) -> String {
        normalize_base_url(&self.url)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.max(1))
    }

    /// Websocket endpoint derived from the HTTP base URL
    pub fn stream_url(&self) -> SyncResult<Url> {
        stream_url(&self.url)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapesSettings {
    pub enabled: bool,
    pub api_url: String,
    pub timeout_seconds: u64,
    pub backend: ApiBackend,
    pub mineskin_url: String,
    /// Optional; raises MineSkin rate limits
    pub mineskin_api_key: String,
}

impl Default for CapesSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            api_url: "https://ccapi.thomas.md".to_string(),
            timeout_seconds: 30,
            backend: ApiBackend::Customcapes,
            mineskin_url: MINESKIN_URL.to_string(),
            mineskin_api_key: String::new(),
        }
    }
}

impl CapesSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.max(1))
    }

    /// Base URL of whichever backend is selected
    pub fn endpoint(&self) -> &str {
        match self.backend {
            ApiBackend::Customcapes => &self.api_url,
            ApiBackend::Mineskin => &self.mineskin_url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSection {
    pub enabled: bool,
    pub reconnect_step_seconds: u64,
    pub reconnect_cap_seconds: u64,
    pub heartbeat_seconds: u64,
    pub liveness_timeout_seconds: u64,
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            enabled: true,
            reconnect_step_seconds: 5,
            reconnect_cap_seconds: 60,
            heartbeat_seconds: 30,
            liveness_timeout_seconds: 60,
        }
    }
}

impl StreamSection {
    pub fn to_stream_settings(&self) -> StreamSettings {
        StreamSettings {
            reconnect_step: Duration::from_secs(self.reconnect_step_seconds.max(1)),
            reconnect_cap: Duration::from_secs(self.reconnect_cap_seconds.max(self.reconnect_step_seconds).max(1)),
            heartbeat_interval: Duration::from_secs(self.heartbeat_seconds.max(1)),
            liveness_timeout: Duration::from_secs(self.liveness_timeout_seconds.max(1)),
        }
    }
}

// =============================================================================
// Simulation-side tuning
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationSettings {
    /// Viewers farther than this (blocks) receive no frame updates
    pub visibility_radius: f64,
    pub start_delay_ticks: u64,
}

impl Default for AnimationSettings {
    fn default() -> Self {
        Self {
            visibility_radius: 64.0,
            start_delay_ticks: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolSettings {
    pub spawn_deregister_delay_ticks: u64,
    pub update_deregister_delay_ticks: u64,
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self {
            spawn_deregister_delay_ticks: 40,
            update_deregister_delay_ticks: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkinSettings {
    /// Ticks between hiding a subject from bystanders and showing it again
    pub refresh_delay_ticks: u64,
}

impl Default for SkinSettings {
    fn default() -> Self {
        Self { refresh_delay_ticks: 2 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub database_file: String,
    /// Overrides the platform data directory
    pub data_dir: Option<PathBuf>,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            database_file: "skins.db".to_string(),
            data_dir: None,
        }
    }
}

impl StorageSettings {
    pub fn database_path(&self) -> PathBuf {
        let dir = self
            .data_dir
            .clone()
            .or_else(|| project_dirs().map(|p| p.data_dir().to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."));
        dir.join(&self.database_file)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    /// Also write plain-text logs to this file
    pub file: Option<PathBuf>,
    pub verbose: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            verbose: false,
        }
    }
}

// =============================================================================
// Root
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api: ApiSettings,
    pub capes: CapesSettings,
    pub stream: StreamSection,
    pub animation: AnimationSettings,
    pub protocol: ProtocolSettings,
    pub skin: SkinSettings,
    pub storage: StorageSettings,
    pub logging: LoggingSettings,
}

impl Settings {
    /// Defaults, then the optional TOML file, then `SKINMOTION__*` variables
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_prefix(file, ENV_PREFIX)
    }

    pub fn load_with_prefix(file: Option<&Path>, env_prefix: &str) -> Result<Self, ConfigError> {
        let mut builder = Config::builder().add_source(Config::try_from(&Settings::default())?);
        if let Some(path) = file {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(false));
        }
        builder
            .add_source(
                Environment::with_prefix(env_prefix)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Whether the event stream can be opened at all
    pub fn stream_enabled(&self) -> bool {
        self.stream.enabled && !self.api.plugin_api_key.trim().is_empty()
    }
}

pub type SettingsHandle = Arc<RwLock<Settings>>;

pub fn create_settings_handle(settings: Settings) -> SettingsHandle {
    Arc::new(RwLock::new(settings))
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "skinmotion", "skinmotion")
}

/// Default settings file in the platform config directory
pub fn settings_path() -> Option<PathBuf> {
    project_dirs().map(|proj| proj.config_dir().join(CONFIG_FILE))
}

pub fn save_settings_to(settings: &Settings, path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let toml = toml::to_string_pretty(settings)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    fs::write(path, toml)
}

pub fn save_settings(settings: &Settings) -> std::io::Result<()> {
    if let Some(path) = settings_path() {
        save_settings_to(settings, &path)?;
    }
    Ok(())
}

/// Settings from the default location, if present and parseable
pub fn load_settings() -> Option<Settings> {
    let path = settings_path()?;
    if !path.exists() {
        return None;
    }
    Settings::load(Some(&path)).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let settings = Settings::default();
        assert_eq!(settings.stream.reconnect_step_seconds, 5);
        assert_eq!(settings.stream.reconnect_cap_seconds, 60);
        assert_eq!(settings.stream.heartbeat_seconds, 30);
        assert_eq!(settings.stream.liveness_timeout_seconds, 60);
        assert_eq!(settings.animation.visibility_radius, 64.0);
        assert_eq!(settings.protocol.spawn_deregister_delay_ticks, 40);
        assert_eq!(settings.storage.database_file, "skins.db");
    }

    #[test]
    fn test_stream_requires_api_key() {
        let mut settings = Settings::default();
        assert!(!settings.stream_enabled());
        settings.api.plugin_api_key = "secret".to_string();
        assert!(settings.stream_enabled());
        settings.stream.enabled = false;
        assert!(!settings.stream_enabled());
    }

    #[test]
    fn test_stream_url_follows_api_url() {
        let mut api = ApiSettings::default();
        api.url = "http://localhost:3000/".to_string();
        assert_eq!(api.base_url(), "http://localhost:3000");
        assert_eq!(api.stream_url().unwrap().as_str(), "ws://localhost:3000/ws/plugin");
    }

    #[test]
    fn test_data_dir_override() {
        let mut storage = StorageSettings::default();
        storage.data_dir = Some(PathBuf::from("/srv/skins"));
        assert_eq!(storage.database_path(), PathBuf::from("/srv/skins/skins.db"));
    }
}
