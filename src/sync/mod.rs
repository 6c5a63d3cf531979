//! Remote sync engine
//!
//! Keeps each subject's [`SkinConfig`](crate::model::SkinConfig) in step with
//! the remote authority: one-shot HTTP calls, a persistent event stream with
//! automatic reconnection, and reconciliation against the local cache.

pub mod api;
pub mod cache;
pub mod capes;
pub mod connection;
pub mod engine;
pub mod messages;
pub mod state_machine;

use thiserror::Error;

pub use api::{normalize_base_url, SkinApiClient, SkinSource, TokenResponse};
pub use cache::ConfigCache;
pub use capes::{ApiBackend, CapeGenerator, CapesApiClient, GeneratedTexture};
pub use connection::{reconnect_delay, stream_url, StreamClient, StreamConnector, StreamSettings, StreamTransport, WebSocketConnector};
pub use engine::{ReconcileOutcome, SyncEngine};
pub use messages::WsMessage;
pub use state_machine::{ConnectionState, ConnectionStateMachine};

#[derive(Debug, Clone, Error)]
pub enum SyncError {
    #[error("Remote unavailable: {reason}")]
    RemoteUnavailable { reason: String },

    #[error("Remote returned HTTP {status}")]
    HttpStatus { status: u16 },

    #[error("Remote rejected request: {reason}")]
    Api { reason: String },

    #[error("Failed to decode remote response: {reason}")]
    Decode { reason: String },

    #[error("Stream transport error: {reason}")]
    Transport { reason: String },

    #[error("Invalid connection transition from {from} to {to}")]
    InvalidTransition {
        from: ConnectionState,
        to: ConnectionState,
    },
}

pub type SyncResult<T> = Result<T, SyncError>;

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            SyncError::Decode { reason: e.to_string() }
        } else {
            SyncError::RemoteUnavailable { reason: e.to_string() }
        }
    }
}
