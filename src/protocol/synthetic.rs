//! Observer-only placeholder entities
//!
//! A synthetic entity exists only in the packets sent to its viewers. Its
//! viewer set is shared between the simulation loop and workers; membership
//! changes are atomic and a viewer is only ever added or removed by its own
//! spawn or despawn call.

use super::broadcast::schedule_deregister;
use super::messages::{EntityPose, ProfileIdentity};
use super::{deliver, ProtocolError, ProtocolLayer, ProtocolResult};
use crate::host::{GameMode, HostServer, Location};
use crate::model::TextureProperty;
use crate::simulation::SimHandle;
use rand::Rng;
use std::collections::HashSet;
use std::ops::Range;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};
use uuid::Uuid;

/// Local ids are drawn from a band host-managed entities never reach
pub const SYNTHETIC_ID_RANGE: Range<i32> = 1_000_000..(i32::MAX / 2 + 1_000_000);

/// Delays between registration and roster removal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyntheticTimings {
    /// Long enough for the client to download and cache the texture
    pub spawn_deregister_delay_ticks: u64,
    pub update_deregister_delay_ticks: u64,
}

impl Default for SyntheticTimings {
    fn default() -> Self {
        Self {
            spawn_deregister_delay_ticks: 40,
            update_deregister_delay_ticks: 2,
        }
    }
}

pub struct SyntheticEntity {
    local_id: i32,
    profile_id: Uuid,
    name: String,
    location: Location,
    skin: Mutex<TextureProperty>,
    viewers: Mutex<HashSet<Uuid>>,
    protocol: Arc<ProtocolLayer>,
    host: Arc<dyn HostServer>,
    sim: SimHandle,
    timings: SyntheticTimings,
}

impl std::fmt::Debug for SyntheticEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyntheticEntity")
            .field("local_id", &self.local_id)
            .field("profile_id", &self.profile_id)
            .field("name", &self.name)
            .field("location", &self.location)
            .field("viewers", &self.viewer_count())
            .finish()
    }
}

impl SyntheticEntity {
    /// Create an entity with a random local id, profile id and name
    pub fn new(
        location: Location,
        skin: TextureProperty,
        protocol: Arc<ProtocolLayer>,
        host: Arc<dyn HostServer>,
        sim: SimHandle,
        timings: SyntheticTimings,
    ) -> Self {
        let mut rng = rand::rng();
        let local_id = rng.random_range(SYNTHETIC_ID_RANGE);
        let name = format!("NPC{:x}", rng.random_range(0..0xFFFF));
        Self {
            local_id,
            profile_id: Uuid::new_v4(),
            name,
            location,
            skin: Mutex::new(skin),
            viewers: Mutex::new(HashSet::new()),
            protocol,
            host,
            sim,
            timings,
        }
    }

    pub fn local_id(&self) -> i32 {
        self.local_id
    }

    pub fn profile_id(&self) -> Uuid {
        self.profile_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn current_skin(&self) -> TextureProperty {
        self.skin.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn is_viewer(&self, viewer: Uuid) -> bool {
        self.viewers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&viewer)
    }

    pub fn viewers(&self) -> Vec<Uuid> {
        self.viewers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .copied()
            .collect()
    }

    pub fn viewer_count(&self) -> usize {
        self.viewers.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn identity(&self, skin: &TextureProperty) -> ProfileIdentity {
        ProfileIdentity {
            profile_id: self.profile_id,
            name: self.name.clone(),
            properties: vec![skin.to_profile_property()],
            listed: true,
            latency: 0,
            game_mode: GameMode::Survival,
        }
    }

    fn pose(&self) -> EntityPose {
        EntityPose::at(self.local_id, self.profile_id, &self.location)
    }

    fn insert_viewer(&self, viewer: Uuid) -> bool {
        self.viewers.lock().unwrap_or_else(PoisonError::into_inner).insert(viewer)
    }

    fn remove_viewer(&self, viewer: Uuid) -> bool {
        self.viewers.lock().unwrap_or_else(PoisonError::into_inner).remove(&viewer)
    }

    /// Show the entity to `viewer`. Returns false if it was already shown.
    pub fn spawn(&self, viewer: Uuid) -> ProtocolResult<bool> {
        if !self.insert_viewer(viewer) {
            return Ok(false);
        }

        let skin = self.current_skin();
        let result = self
            .protocol
            .spawn_sequence(&self.identity(&skin), &self.pose())
            .and_then(|packets| deliver(self.host.as_ref(), viewer, &packets));

        if let Err(e) = result {
            self.remove_viewer(viewer);
            return Err(e);
        }

        schedule_deregister(
            &self.sim,
            self.timings.spawn_deregister_delay_ticks,
            self.protocol.clone(),
            self.host.clone(),
            viewer,
            self.profile_id,
        );
        debug!("👤 Spawned {} ({}) for {}", self.name, self.local_id, viewer);
        Ok(true)
    }

    /// Hide the entity from `viewer`. Returns false if it was not shown.
    pub fn despawn(&self, viewer: Uuid) -> ProtocolResult<bool> {
        if !self.remove_viewer(viewer) {
            return Ok(false);
        }
        let packets = self.protocol.despawn_sequence(self.local_id, self.profile_id)?;
        match deliver(self.host.as_ref(), viewer, &packets) {
            Ok(()) | Err(ProtocolError::StaleViewer { .. }) => Ok(true),
            Err(e) => Err(e),
        }
    }

    /// Despawn for every current viewer
    pub fn despawn_all(&self) {
        for viewer in self.viewers() {
            if let Err(e) = self.despawn(viewer) {
                warn!("Failed to despawn {} for {}: {}", self.name, viewer, e);
            }
        }
    }

    /// Swap the appearance and rebuild the entity for every viewer.
    /// Returns how many viewers received the update.
    pub fn update_skin(&self, skin: TextureProperty) -> usize {
        *self.skin.lock().unwrap_or_else(PoisonError::into_inner) = skin.clone();

        let packets = match self.protocol.replace_sequence(&self.identity(&skin), &self.pose()) {
            Ok(packets) => packets,
            Err(e) => {
                debug!("Skin update for {} not sent: {}", self.name, e);
                return 0;
            }
        };

        let mut updated = 0;
        for viewer in self.viewers() {
            match deliver(self.host.as_ref(), viewer, &packets) {
                Ok(()) => {
                    updated += 1;
                    schedule_deregister(
                        &self.sim,
                        self.timings.update_deregister_delay_ticks,
                        self.protocol.clone(),
                        self.host.clone(),
                        viewer,
                        self.profile_id,
                    );
                }
                Err(ProtocolError::StaleViewer { .. }) => {}
                Err(e) => warn!("Skin update of {} for {} failed: {}", self.name, viewer, e),
            }
        }
        updated
    }
}
