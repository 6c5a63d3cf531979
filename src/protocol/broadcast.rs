//! Appearance replacement for real subjects, as seen by one bystander

use super::messages::{EntityPose, ProfileIdentity};
use super::{deliver, ProtocolLayer, ProtocolResult};
use crate::host::{HostServer, SessionSnapshot};
use crate::model::{with_texture, TextureProperty};
use crate::simulation::SimHandle;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Pushes a real subject's new appearance to individual viewers
pub struct SkinBroadcaster {
    protocol: Arc<ProtocolLayer>,
    host: Arc<dyn HostServer>,
    sim: SimHandle,
    deregister_delay_ticks: u64,
}

impl SkinBroadcaster {
    pub fn new(
        protocol: Arc<ProtocolLayer>,
        host: Arc<dyn HostServer>,
        sim: SimHandle,
        deregister_delay_ticks: u64,
    ) -> Self {
        Self {
            protocol,
            host,
            sim,
            deregister_delay_ticks,
        }
    }

    pub fn protocol(&self) -> &ProtocolLayer {
        &self.protocol
    }

    /// Replace `target`'s rendered appearance for `viewer` without reconnecting.
    ///
    /// The five replacement packets are written back to back; the roster entry
    /// is dropped again after the configured delay.
    pub fn send_skin_update(
        &self,
        viewer: Uuid,
        target: &SessionSnapshot,
        skin: &TextureProperty,
    ) -> ProtocolResult<()> {
        let identity = ProfileIdentity::of_session(target, with_texture(&target.properties, skin));
        let pose = EntityPose::at(target.entity_id, target.id, &target.location);
        let packets = self.protocol.replace_sequence(&identity, &pose)?;
        deliver(self.host.as_ref(), viewer, &packets)?;
        schedule_deregister(
            &self.sim,
            self.deregister_delay_ticks,
            self.protocol.clone(),
            self.host.clone(),
            viewer,
            target.id,
        );
        Ok(())
    }
}

/// Fire-and-forget roster removal; a viewer that left in the meantime is skipped
pub(crate) fn schedule_deregister(
    sim: &SimHandle,
    delay_ticks: u64,
    protocol: Arc<ProtocolLayer>,
    host: Arc<dyn HostServer>,
    viewer: Uuid,
    profile_id: Uuid,
) {
    sim.submit_later(delay_ticks, move |_| {
        if !host.is_online(viewer) {
            return;
        }
        let result = protocol
            .deregister(profile_id)
            .and_then(|packets| deliver(host.as_ref(), viewer, &packets));
        if let Err(e) = result {
            debug!("Deferred roster removal of {} for {} skipped: {}", profile_id, viewer, e);
        }
    });
}
