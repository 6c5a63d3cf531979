// SkinMotion: animated skins for game servers
// Host-agnostic core; host adapters implement `host::HostServer`

pub mod animation;
pub mod config;
pub mod host;
pub mod model;
pub mod protocol;
pub mod service;
pub mod simulation;
pub mod skin;
pub mod storage;
pub mod sync;
pub mod utils;

// Re-export commonly used types for convenience
pub use config::{Settings, WorkerPool, WorkerPoolConfig};
pub use host::{HostServer, Location, SessionSnapshot};
pub use model::{CapeType, LoopMode, SkinConfig, SkinFrame, TextureProperty};
pub use service::{Collaborators, ServiceError, SkinMotion};
pub use simulation::{SimHandle, SimLoop};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
