//! Reconciliation between the remote authority, the local store and the
//! in-memory cache
//!
//! All I/O runs on the worker runtime. Anything that touches a live session
//! is marshaled onto the simulation loop through [`SimHandle`].

use super::api::SkinSource;
use super::cache::ConfigCache;
use super::connection::StreamClient;
use super::messages::WsMessage;
use super::SyncError;
use crate::host::HostServer;
use crate::model::SkinConfig;
use crate::simulation::SimHandle;
use crate::storage::SkinStorage;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// What a reconciliation pass did to the subject's config
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Remote matches the cache exactly
    Unchanged,
    /// Cache and store replaced; `reapplied` when the first frame was pushed again
    Replaced { reapplied: bool },
    /// Remote has no skin; local state dropped and the original restored
    Removed,
    /// Remote unreachable; local state kept
    Unavailable,
    /// Subject left before the pass finished; only the store was updated
    Departed,
}

#[derive(Clone)]
pub struct SyncEngine {
    source: Arc<dyn SkinSource>,
    storage: Option<Arc<SkinStorage>>,
    cache: ConfigCache,
    host: Arc<dyn HostServer>,
    sim: SimHandle,
    stream: Option<Arc<StreamClient>>,
    runtime: tokio::runtime::Handle,
    send_link_on_join: bool,
}

impl SyncEngine {
    pub fn new(
        source: Arc<dyn SkinSource>,
        storage: Option<Arc<SkinStorage>>,
        cache: ConfigCache,
        host: Arc<dyn HostServer>,
        sim: SimHandle,
        runtime: tokio::runtime::Handle,
    ) -> Self {
        Self {
            source,
            storage,
            cache,
            host,
            sim,
            stream: None,
            runtime,
            send_link_on_join: false,
        }
    }

    pub fn with_stream(mut self, stream: Arc<StreamClient>) -> Self {
        self.stream = Some(stream);
        self
    }

    pub fn with_link_on_join(mut self, enabled: bool) -> Self {
        self.send_link_on_join = enabled;
        self
    }

    pub fn cache(&self) -> &ConfigCache {
        &self.cache
    }

    pub fn stream(&self) -> Option<&Arc<StreamClient>> {
        self.stream.as_ref()
    }

    fn notify(&self, message: WsMessage) {
        if let Some(stream) = &self.stream {
            if stream.is_connected() {
                stream.send(message);
            }
        }
    }

    async fn load_local(&self, subject: Uuid) -> Option<SkinConfig> {
        let storage = self.storage.clone()?;
        match tokio::task::spawn_blocking(move || storage.load_skin(subject)).await {
            Ok(Ok(config)) => config,
            Ok(Err(e)) => {
                warn!("💾 Failed to load stored skin for {}: {}", subject, e);
                None
            }
            Err(e) => {
                warn!("💾 Storage task failed for {}: {}", subject, e);
                None
            }
        }
    }

    async fn persist(&self, config: SkinConfig) {
        let Some(storage) = self.storage.clone() else {
            return;
        };
        let subject = config.subject();
        match tokio::task::spawn_blocking(move || storage.save_skin(&config)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("💾 Failed to persist skin for {}: {}", subject, e),
            Err(e) => warn!("💾 Storage task failed for {}: {}", subject, e),
        }
    }

    async fn forget_persisted(&self, subject: Uuid) {
        let Some(storage) = self.storage.clone() else {
            return;
        };
        match tokio::task::spawn_blocking(move || storage.delete_skin(subject)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!("💾 Failed to delete stored skin for {}: {}", subject, e),
            Err(e) => warn!("💾 Storage task failed for {}: {}", subject, e),
        }
    }

    /// Cache `config` only while its subject still has a session; quit may race this
    fn cache_if_online(&self, config: SkinConfig) -> bool {
        let subject = config.subject();
        if !self.host.is_online(subject) {
            return false;
        }
        self.cache.replace(config);
        if !self.host.is_online(subject) {
            self.cache.remove(subject);
            return false;
        }
        true
    }

    fn schedule_first_frame(&self, subject: Uuid) {
        self.sim.submit(move |ctx| {
            ctx.apply_first_frame(subject);
        });
    }

    /// Fetch the authoritative config and bring cache, store and session in line
    pub async fn reconcile(&self, subject: Uuid) -> ReconcileOutcome {
        match self.source.fetch_skin_config(subject).await {
            Ok(Some(mut remote)) => {
                if remote.minecraft_uuid != subject {
                    debug!("Remote config for {} carried id {}", subject, remote.minecraft_uuid);
                    remote.minecraft_uuid = subject;
                }
                self.adopt(remote).await
            }
            Ok(None) => self.remove(subject).await,
            Err(e) => {
                warn!("🌐 Skin fetch for {} failed: {}", subject, e);
                ReconcileOutcome::Unavailable
            }
        }
    }

    async fn adopt(&self, remote: SkinConfig) -> ReconcileOutcome {
        let subject = remote.subject();
        let previous = self.cache.get(subject);
        if previous.as_deref() == Some(&remote) {
            return ReconcileOutcome::Unchanged;
        }

        let reapply = previous.as_deref().map_or(true, |p| p.appearance_differs(&remote));
        info!(
            "🎨 {} skin for {} ({} frames)",
            if previous.is_some() { "Updated" } else { "Fetched" },
            remote.minecraft_username,
            remote.frame_count()
        );
        self.persist(remote.clone()).await;
        if !self.cache_if_online(remote) {
            debug!("{} went offline during reconciliation", subject);
            return ReconcileOutcome::Departed;
        }

        if reapply {
            self.schedule_first_frame(subject);
        } else {
            self.sim.submit(move |ctx| ctx.animator.reset(subject));
        }
        ReconcileOutcome::Replaced { reapplied: reapply }
    }

    async fn remove(&self, subject: Uuid) -> ReconcileOutcome {
        let had_cached = self.cache.remove(subject).is_some();
        self.forget_persisted(subject).await;
        if had_cached {
            info!("🗑️ Remote skin for {} removed, restoring original", subject);
        }
        self.sim.submit(move |ctx| {
            ctx.animator.reset(subject);
            ctx.applier.restore_original_skin(subject);
        });
        ReconcileOutcome::Removed
    }

    /// Cache-first load: apply any stored config at once, then reconcile with the remote
    pub async fn load_on_join(&self, subject: Uuid) -> ReconcileOutcome {
        if let Some(local) = self.load_local(subject).await {
            info!(
                "💾 Loaded persisted skin for {} ({} frames)",
                local.minecraft_username,
                local.frame_count()
            );
            if self.cache_if_online(local) {
                self.schedule_first_frame(subject);
            }
        }
        self.reconcile(subject).await
    }

    /// Join hook; returns immediately, the load runs on the worker runtime
    pub fn on_subject_join(&self, subject: Uuid, name: &str) {
        self.notify(WsMessage::PlayerOnline {
            subject,
            name: name.to_string(),
        });

        let engine = self.clone();
        let name = name.to_string();
        self.runtime.spawn(async move {
            engine.load_on_join(subject).await;
            if engine.send_link_on_join {
                if let Err(e) = engine.send_dashboard_link(subject, &name).await {
                    warn!("🔗 Failed to generate dashboard link for {}: {}", name, e);
                }
            }
        });
    }

    pub fn on_subject_quit(&self, subject: Uuid) {
        self.cache.remove(subject);
        self.notify(WsMessage::PlayerOffline { subject });
    }

    /// Generate a dashboard token and message the link to the subject
    pub async fn send_dashboard_link(&self, subject: Uuid, name: &str) -> Result<(), SyncError> {
        let token = self.source.generate_token(subject, name).await?;
        let line = format!("[SkinMotion] Click here to customize your skin: {}", token.dashboard_url);
        self.sim.submit(move |ctx| {
            if !ctx.host.is_online(subject) {
                return;
            }
            ctx.host.send_message(subject, &line);
        });
        Ok(())
    }

    /// React to one stream event
    pub async fn handle_message(&self, message: WsMessage) -> Option<ReconcileOutcome> {
        match message {
            WsMessage::SkinUpdated { subject, .. } | WsMessage::ConfigChanged { subject } => {
                if !self.host.is_online(subject) {
                    debug!("Ignoring {} for offline subject {}", message.type_name(), subject);
                    return None;
                }
                info!("📥 {} for {}", message.type_name(), subject);
                Some(self.reconcile(subject).await)
            }
            WsMessage::Ping | WsMessage::Pong => None,
            other => {
                debug!("Ignoring stream message {}", other.type_name());
                None
            }
        }
    }

    /// Consume stream events until the sender side closes
    pub async fn run_event_loop(self, mut events: mpsc::UnboundedReceiver<WsMessage>) {
        while let Some(message) = events.recv().await {
            self.handle_message(message).await;
        }
        debug!("Stream event loop finished");
    }
}
