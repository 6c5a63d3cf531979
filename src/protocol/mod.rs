//! Synthetic entity protocol layer
//!
//! Builds raw clientbound packets that register an identity, place an entity
//! for it and later drop the roster entry, both for observer-only synthetic
//! entities and for forcing bystanders to re-render a real subject.
//!
//! Shapes are bound once per process by [`ProtocolLayer::discover`]; when no
//! compatible shape exists the layer is disabled and every call returns
//! [`ProtocolError::ExternalBinding`].

pub mod bindings;
pub mod broadcast;
pub mod buffer;
pub mod messages;
pub mod schema;
pub mod synthetic;

use crate::host::{HostError, HostServer, RawPacket};
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

pub use bindings::ProtocolBindings;
pub use broadcast::SkinBroadcaster;
pub use messages::{ClientboundMessage, EntityPose, ProfileIdentity, SkinParts};
pub use schema::{MessageKind, ProtocolSchema};
pub use synthetic::{SyntheticEntity, SyntheticTimings};

#[derive(Debug, Clone, Error)]
pub enum ProtocolError {
    #[error("No compatible packet shapes for protocol revision {revision}: {reason}")]
    DiscoveryFailure { revision: i32, reason: String },

    #[error("Protocol layer unavailable: {reason}")]
    ExternalBinding { reason: String },

    #[error("Send to viewer {viewer} failed: {reason}")]
    PerCallBindingFailure { viewer: Uuid, reason: String },

    #[error("Viewer {viewer} disconnected")]
    StaleViewer { viewer: Uuid },

    #[error("Packet encode failed: {reason}")]
    Encode { reason: String },
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Process-lifetime result of shape discovery
#[derive(Debug)]
pub enum ProtocolLayer {
    Bound(ProtocolBindings),
    Disabled { reason: String },
}

impl ProtocolLayer {
    /// Probe the host's packet registry. Logs the outcome once.
    pub fn discover(host: &dyn HostServer) -> Self {
        let Some(schema) = host.protocol_schema() else {
            let reason = "host publishes no protocol schema".to_string();
            error!("❌ Synthetic entity protocol disabled: {}", reason);
            return ProtocolLayer::Disabled { reason };
        };

        match ProtocolBindings::discover(&schema) {
            Ok(bindings) => {
                info!("✅ Synthetic entity protocol bound for revision {}", bindings.revision());
                ProtocolLayer::Bound(bindings)
            }
            Err(e) => {
                error!("❌ Synthetic entity protocol disabled: {}", e);
                ProtocolLayer::Disabled { reason: e.to_string() }
            }
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, ProtocolLayer::Bound(_))
    }

    pub fn bindings(&self) -> ProtocolResult<&ProtocolBindings> {
        match self {
            ProtocolLayer::Bound(bindings) => Ok(bindings),
            ProtocolLayer::Disabled { reason } => Err(ProtocolError::ExternalBinding {
                reason: reason.clone(),
            }),
        }
    }

    fn encode_all(&self, messages: &[ClientboundMessage]) -> ProtocolResult<Vec<RawPacket>> {
        let bindings = self.bindings()?;
        let mut packets = Vec::with_capacity(messages.len());
        for message in messages {
            packets.extend(bindings.encode(message)?);
        }
        Ok(packets)
    }

    fn overlay(&self, entity_id: i32) -> ProtocolResult<Option<ClientboundMessage>> {
        let bindings = self.bindings()?;
        Ok(bindings.supports(MessageKind::SetEntityData).then(|| ClientboundMessage::SetEntityData {
            entity_id,
            skin_parts: SkinParts::all(),
        }))
    }

    /// Register, place and unveil overlays; deregistration is scheduled separately
    pub fn spawn_sequence(&self, identity: &ProfileIdentity, pose: &EntityPose) -> ProtocolResult<Vec<RawPacket>> {
        let mut messages = vec![
            ClientboundMessage::PlayerInfoUpdate { entries: vec![identity.clone()] },
            ClientboundMessage::AddEntity(pose.clone()),
        ];
        messages.extend(self.overlay(pose.entity_id)?);
        self.encode_all(&messages)
    }

    /// Tear down and rebuild an entity with a new appearance
    pub fn replace_sequence(&self, identity: &ProfileIdentity, pose: &EntityPose) -> ProtocolResult<Vec<RawPacket>> {
        let mut messages = vec![
            ClientboundMessage::RemoveEntities { entity_ids: vec![pose.entity_id] },
            ClientboundMessage::PlayerInfoRemove { profile_ids: vec![identity.profile_id] },
            ClientboundMessage::PlayerInfoUpdate { entries: vec![identity.clone()] },
            ClientboundMessage::AddEntity(pose.clone()),
        ];
        messages.extend(self.overlay(pose.entity_id)?);
        self.encode_all(&messages)
    }

    pub fn despawn_sequence(&self, entity_id: i32, profile_id: Uuid) -> ProtocolResult<Vec<RawPacket>> {
        self.encode_all(&[
            ClientboundMessage::RemoveEntities { entity_ids: vec![entity_id] },
            ClientboundMessage::PlayerInfoRemove { profile_ids: vec![profile_id] },
        ])
    }

    /// Drop the roster entry while the entity stays rendered
    pub fn deregister(&self, profile_id: Uuid) -> ProtocolResult<Vec<RawPacket>> {
        self.encode_all(&[ClientboundMessage::PlayerInfoRemove { profile_ids: vec![profile_id] }])
    }
}

/// Write packets to one viewer in order without yielding
pub fn deliver(host: &dyn HostServer, viewer: Uuid, packets: &[RawPacket]) -> ProtocolResult<()> {
    if !host.is_online(viewer) {
        return Err(ProtocolError::StaleViewer { viewer });
    }
    for packet in packets {
        host.send_raw(viewer, packet).map_err(|e| match e {
            HostError::SessionGone { .. } => ProtocolError::StaleViewer { viewer },
            other => ProtocolError::PerCallBindingFailure {
                viewer,
                reason: other.to_string(),
            },
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::GameMode;
    use crate::protocol::schema::sample_schema;

    fn layer() -> ProtocolLayer {
        ProtocolLayer::Bound(ProtocolBindings::discover(&sample_schema()).unwrap())
    }

    fn identity() -> ProfileIdentity {
        ProfileIdentity {
            profile_id: Uuid::new_v4(),
            name: "Steve".to_string(),
            properties: vec![],
            listed: true,
            latency: 12,
            game_mode: GameMode::Creative,
        }
    }

    fn pose(profile_id: Uuid) -> EntityPose {
        EntityPose {
            entity_id: 42,
            profile_id,
            x: 0.0,
            y: 70.0,
            z: 0.0,
            yaw: 0.0,
            pitch: 0.0,
            head_yaw: 0.0,
        }
    }

    fn ids(packets: &[RawPacket]) -> Vec<i32> {
        packets.iter().map(|p| p.packet_id).collect()
    }

    #[test]
    fn test_spawn_sequence_order() {
        let identity = identity();
        let packets = layer().spawn_sequence(&identity, &pose(identity.profile_id)).unwrap();
        assert_eq!(ids(&packets), vec![0x3C, 0x01, 0x56]);
    }

    #[test]
    fn test_replace_sequence_order() {
        let identity = identity();
        let packets = layer().replace_sequence(&identity, &pose(identity.profile_id)).unwrap();
        assert_eq!(ids(&packets), vec![0x40, 0x3B, 0x3C, 0x01, 0x56]);
    }

    #[test]
    fn test_overlay_skipped_when_unsupported() {
        let mut schema = sample_schema();
        schema.skin_parts_index = None;
        let layer = ProtocolLayer::Bound(ProtocolBindings::discover(&schema).unwrap());
        let identity = identity();
        let packets = layer.spawn_sequence(&identity, &pose(identity.profile_id)).unwrap();
        assert_eq!(ids(&packets), vec![0x3C, 0x01]);
    }

    #[test]
    fn test_disabled_layer_fails_soft() {
        let layer = ProtocolLayer::Disabled { reason: "no schema".into() };
        assert!(!layer.is_available());
        let err = layer.deregister(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, ProtocolError::ExternalBinding { .. }));
    }
}
