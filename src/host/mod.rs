//! Host game-server capability surface
//!
//! The host process is never linked against; an adapter implements
//! [`HostServer`] and hands it to the core. Everything the core needs from the
//! host (session snapshots, visibility, raw packet delivery and the probe
//! points used for capability negotiation) goes through this trait.

pub mod symbols;

use crate::model::ProfileProperty;
use crate::protocol::schema::ProtocolSchema;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

pub use symbols::{Member, MemberId, MemberKind, ObjectRef, SymbolTable, TypeRef, Value, ValueKind};

/// Errors reported by a host adapter
#[derive(Debug, Clone, Error)]
pub enum HostError {
    #[error("Session {subject} is no longer connected")]
    SessionGone { subject: Uuid },

    #[error("Host binding call failed: {reason}")]
    Binding { reason: String },

    #[error("Failed to deliver packet to {viewer}: {reason}")]
    Send { viewer: Uuid, reason: String },

    #[error("Host symbol not found: {name}")]
    MissingSymbol { name: String },
}

pub type HostResult<T> = Result<T, HostError>;

/// Kind of host process the adapter fronts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKind {
    /// Simulation server owning entities and a tick loop
    Server,
    /// Proxy relaying sessions between backend servers
    Proxy,
}

impl fmt::Display for HostKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostKind::Server => write!(f, "Server"),
            HostKind::Proxy => write!(f, "Proxy"),
        }
    }
}

/// Identification of the running host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostDescriptor {
    pub kind: HostKind,
    pub brand: String,
    pub version: String,
}

/// Session game mode as shown in the roster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GameMode {
    #[default]
    Survival,
    Creative,
    Adventure,
    Spectator,
}

impl GameMode {
    pub fn wire_id(&self) -> i32 {
        match self {
            GameMode::Survival => 0,
            GameMode::Creative => 1,
            GameMode::Adventure => 2,
            GameMode::Spectator => 3,
        }
    }
}

/// Position and orientation inside a named region
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub region: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f32,
    pub pitch: f32,
}

impl Location {
    pub fn new(region: impl Into<String>, x: f64, y: f64, z: f64) -> Self {
        Self {
            region: region.into(),
            x,
            y,
            z,
            yaw: 0.0,
            pitch: 0.0,
        }
    }

    pub fn with_rotation(mut self, yaw: f32, pitch: f32) -> Self {
        self.yaw = yaw;
        self.pitch = pitch;
        self
    }

    pub fn same_region(&self, other: &Location) -> bool {
        self.region == other.region
    }

    pub fn distance_squared(&self, other: &Location) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }
}

/// Point-in-time view of one connected session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub name: String,
    pub entity_id: i32,
    pub location: Location,
    pub latency_ms: i32,
    pub game_mode: GameMode,
    pub properties: Vec<ProfileProperty>,
}

/// Encoded clientbound packet ready for a viewer's connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacket {
    pub packet_id: i32,
    pub name: String,
    pub payload: Bytes,
}

/// Stable, supported profile mutation surface (native capability)
pub trait ProfileApi: Send + Sync {
    /// Current profile properties of a connected session
    fn properties(&self, subject: Uuid) -> HostResult<Vec<ProfileProperty>>;

    /// Replace the profile properties of a connected session
    fn set_properties(&self, subject: Uuid, properties: Vec<ProfileProperty>) -> HostResult<()>;

    /// Push the updated profile to the owning client
    fn refresh_self(&self, _subject: Uuid) -> HostResult<()> {
        Ok(())
    }
}

/// Capability surface of the host process
pub trait HostServer: Send + Sync {
    fn descriptor(&self) -> HostDescriptor;

    fn session(&self, id: Uuid) -> Option<SessionSnapshot>;

    fn online_sessions(&self) -> Vec<SessionSnapshot>;

    fn is_online(&self, id: Uuid) -> bool {
        self.session(id).is_some()
    }

    /// Whether `viewer` is currently allowed to see `target`
    fn can_see(&self, viewer: Uuid, target: Uuid) -> bool;

    fn hide_subject(&self, viewer: Uuid, target: Uuid);

    fn show_subject(&self, viewer: Uuid, target: Uuid);

    /// Write one packet to a viewer's connection
    fn send_raw(&self, viewer: Uuid, packet: &RawPacket) -> HostResult<()>;

    /// Send a single chat line to a session
    fn send_message(&self, viewer: Uuid, message: &str);

    /// Native profile surface, when the host exposes one
    fn profile_api(&self) -> Option<Arc<dyn ProfileApi>> {
        None
    }

    /// Runtime symbol table over host internals, when reachable
    fn symbols(&self) -> Option<Arc<dyn SymbolTable>> {
        None
    }

    /// Packet registry of the running protocol revision
    fn protocol_schema(&self) -> Option<ProtocolSchema> {
        None
    }
}
