//! Skin application on live sessions
//!
//! [`SkinApplier`] lives inside the simulation loop context. It captures a
//! subject's original appearance the first time an override is applied and
//! can put it back later. All host mutations go through the capability chosen
//! at startup by [`detect_capability`].

pub mod capability;

use crate::host::HostServer;
use crate::model::{find_texture, with_texture, TextureProperty};
use crate::simulation::SimHandle;
use crate::utils::log_once::LogOnce;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

pub use capability::{detect_capability, DynamicBinding, SkinCapability};

#[derive(Debug, Clone, Error)]
pub enum SkinError {
    #[error("Skin application unavailable: {reason}")]
    BindingUnavailable { reason: String },

    #[error("Skin binding call failed: {reason}")]
    PerCallBindingFailure { reason: String },

    #[error("Subject {subject} is no longer connected")]
    SubjectGone { subject: Uuid },
}

pub type SkinResult<T> = Result<T, SkinError>;

/// Pre-override appearance per subject
#[derive(Debug, Default)]
pub struct OriginalSkinStore {
    originals: HashMap<Uuid, TextureProperty>,
}

impl OriginalSkinStore {
    /// Store `original` unless one is already held. Returns true if stored.
    pub fn capture(&mut self, subject: Uuid, original: TextureProperty) -> bool {
        if self.originals.contains_key(&subject) {
            return false;
        }
        self.originals.insert(subject, original);
        true
    }

    pub fn contains(&self, subject: Uuid) -> bool {
        self.originals.contains_key(&subject)
    }

    pub fn get(&self, subject: Uuid) -> Option<&TextureProperty> {
        self.originals.get(&subject)
    }

    pub fn take(&mut self, subject: Uuid) -> Option<TextureProperty> {
        self.originals.remove(&subject)
    }

    pub fn len(&self) -> usize {
        self.originals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.originals.is_empty()
    }
}

pub struct SkinApplier {
    capability: SkinCapability,
    originals: OriginalSkinStore,
    host: Arc<dyn HostServer>,
    sim: SimHandle,
    refresh_delay_ticks: u64,
    failures: LogOnce<(Uuid, &'static str)>,
    unavailable_logged: bool,
}

impl SkinApplier {
    pub fn new(
        capability: SkinCapability,
        host: Arc<dyn HostServer>,
        sim: SimHandle,
        refresh_delay_ticks: u64,
    ) -> Self {
        Self {
            capability,
            originals: OriginalSkinStore::default(),
            host,
            sim,
            refresh_delay_ticks,
            failures: LogOnce::new(),
            unavailable_logged: false,
        }
    }

    pub fn capability(&self) -> &SkinCapability {
        &self.capability
    }

    pub fn originals(&self) -> &OriginalSkinStore {
        &self.originals
    }

    fn report(&mut self, subject: Uuid, operation: &'static str, error: &SkinError) {
        match error {
            SkinError::SubjectGone { .. } => debug!("{} skipped, {} left", operation, subject),
            SkinError::BindingUnavailable { .. } => {
                if !self.unavailable_logged {
                    self.unavailable_logged = true;
                    warn!("Skin {} requested but {}", operation, error);
                }
            }
            SkinError::PerCallBindingFailure { .. } => {
                if self.failures.first((subject, operation)) {
                    warn!("⚠️ Skin {} failed for {}: {}", operation, subject, error);
                }
            }
        }
    }

    /// Currently applied appearance, if the host holds one
    pub fn current_skin(&mut self, subject: Uuid) -> Option<TextureProperty> {
        match self.capability.read_properties(subject) {
            Ok(properties) => find_texture(&properties),
            Err(e) => {
                self.report(subject, "read", &e);
                None
            }
        }
    }

    fn write(&mut self, subject: Uuid, property: &TextureProperty) -> SkinResult<()> {
        let current = self.capability.read_properties(subject)?;
        self.capability
            .write_properties(subject, with_texture(&current, property))
    }

    /// Apply `property` to a live subject and refresh bystanders.
    ///
    /// Captures the pre-override appearance on the first call. No-op if the
    /// subject is gone; binding failures leave the session unchanged.
    pub fn apply_skin(&mut self, subject: Uuid, property: &TextureProperty) -> bool {
        if !self.host.is_online(subject) {
            return false;
        }
        if !self.originals.contains(subject) {
            if let Some(original) = self.current_skin(subject) {
                self.originals.capture(subject, original);
            }
        }

        match self.write(subject, property) {
            Ok(()) => {
                self.refresh_visual_for_observers(subject);
                true
            }
            Err(e) => {
                self.report(subject, "apply", &e);
                false
            }
        }
    }

    /// Re-apply the captured original. False if none was captured.
    pub fn restore_original_skin(&mut self, subject: Uuid) -> bool {
        let Some(original) = self.originals.take(subject) else {
            return false;
        };
        if !self.host.is_online(subject) {
            return false;
        }
        match self.write(subject, &original) {
            Ok(()) => {
                self.refresh_visual_for_observers(subject);
                true
            }
            Err(e) => {
                self.report(subject, "restore", &e);
                false
            }
        }
    }

    /// Hide the subject from every bystander, then show it again a few ticks later
    pub fn refresh_visual_for_observers(&self, subject: Uuid) {
        for other in self.host.online_sessions() {
            if other.id == subject || !self.host.can_see(other.id, subject) {
                continue;
            }
            self.host.hide_subject(other.id, subject);
            let viewer = other.id;
            self.sim.submit_later(self.refresh_delay_ticks, move |ctx| {
                if ctx.host.is_online(viewer) && ctx.host.is_online(subject) {
                    ctx.host.show_subject(viewer, subject);
                }
            });
        }
    }

    /// Drop per-subject state on disconnect
    pub fn forget(&mut self, subject: Uuid) {
        self.originals.take(subject);
        self.failures.reset(&(subject, "apply"));
        self.failures.reset(&(subject, "read"));
        self.failures.reset(&(subject, "restore"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prop(v: &str) -> TextureProperty {
        TextureProperty::new(v, format!("{}-sig", v)).unwrap()
    }

    #[test]
    fn test_original_captured_once() {
        let mut store = OriginalSkinStore::default();
        let id = Uuid::new_v4();
        assert!(store.capture(id, prop("first")));
        assert!(!store.capture(id, prop("second")));
        assert_eq!(store.take(id), Some(prop("first")));
        assert_eq!(store.take(id), None);
    }
}
