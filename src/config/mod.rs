pub mod settings;
pub mod concurrency;

// Re-export commonly used types
pub use settings::{
    ApiSettings, CapesSettings, StreamSection, AnimationSettings, ProtocolSettings,
    SkinSettings, StorageSettings, LoggingSettings, Settings, SettingsHandle, ENV_PREFIX,
    create_settings_handle, settings_path, save_settings, save_settings_to, load_settings,
};
pub use concurrency::{WorkerPool, WorkerPoolConfig, WorkerPoolStats};
