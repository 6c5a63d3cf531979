//! Revision-independent clientbound messages

use crate::host::{GameMode, Location, SessionSnapshot};
use crate::model::ProfileProperty;
use bitflags::bitflags;
use uuid::Uuid;

bitflags! {
    /// Overlay layers drawn on top of the base skin
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SkinParts: u8 {
        const CAPE = 0x01;
        const JACKET = 0x02;
        const LEFT_SLEEVE = 0x04;
        const RIGHT_SLEEVE = 0x08;
        const LEFT_PANTS = 0x10;
        const RIGHT_PANTS = 0x20;
        const HAT = 0x40;
    }
}

/// Roster identity carried by a registration message
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileIdentity {
    pub profile_id: Uuid,
    pub name: String,
    pub properties: Vec<ProfileProperty>,
    pub listed: bool,
    pub latency: i32,
    pub game_mode: GameMode,
}

impl ProfileIdentity {
    /// Identity of a real session, with its properties replaced by `properties`
    pub fn of_session(session: &SessionSnapshot, properties: Vec<ProfileProperty>) -> Self {
        Self {
            profile_id: session.id,
            name: session.name.clone(),
            properties,
            listed: true,
            latency: session.latency_ms,
            game_mode: session.game_mode,
        }
    }
}

/// Where an entity instance is placed and which identity it renders
#[derive(Debug, Clone, PartialEq)]
pub struct EntityPose {
    pub entity_id: i32,
    pub profile_id: Uuid,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f32,
    pub pitch: f32,
    pub head_yaw: f32,
}

impl EntityPose {
    pub fn at(entity_id: i32, profile_id: Uuid, location: &Location) -> Self {
        Self {
            entity_id,
            profile_id,
            x: location.x,
            y: location.y,
            z: location.z,
            yaw: location.yaw,
            pitch: location.pitch,
            head_yaw: location.yaw,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientboundMessage {
    PlayerInfoUpdate { entries: Vec<ProfileIdentity> },
    PlayerInfoRemove { profile_ids: Vec<Uuid> },
    AddEntity(EntityPose),
    SetEntityData { entity_id: i32, skin_parts: SkinParts },
    RemoveEntities { entity_ids: Vec<i32> },
}
