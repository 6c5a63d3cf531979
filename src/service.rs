//! Host-agnostic core wiring
//!
//! A host adapter builds one [`SkinMotion`], drives the returned
//! [`SimLoop`] from its own tick, and forwards join/quit events.

use crate::animation::AnimationScheduler;
use crate::config::Settings;
use crate::host::{HostServer, Location};
use crate::model::{CapeType, TextureProperty};
use crate::protocol::{ProtocolLayer, SkinBroadcaster, SyntheticEntity, SyntheticTimings};
use crate::simulation::{SimContext, SimHandle, SimLoop};
use crate::skin::{detect_capability, SkinApplier};
use crate::storage::SkinStorage;
use crate::sync::capes::{CapeGenerator, CapesApiClient};
use crate::sync::{
    ConfigCache, ConnectionState, SkinApiClient, SkinSource, StreamClient, StreamConnector, SyncEngine,
    WebSocketConnector,
};
use anyhow::Context;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("Cape generation is disabled")]
    CapesDisabled,

    #[error("Synthetic entities unavailable: {reason}")]
    SyntheticUnavailable { reason: String },
}

/// Externally supplied collaborators; `SkinMotion::build` fills these from settings
pub struct Collaborators {
    pub source: Arc<dyn SkinSource>,
    pub storage: Option<Arc<SkinStorage>>,
    pub connector: Option<Arc<dyn StreamConnector>>,
    pub capes: Option<Arc<dyn CapeGenerator>>,
}

impl Collaborators {
    /// Real HTTP/websocket clients and the on-disk store described by `settings`
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let client = SkinApiClient::new(
            &settings.api.url,
            &settings.api.plugin_api_key,
            &settings.api.server_id,
            settings.api.timeout(),
        )
        .context("Failed to build skin API client")?;

        let db_path = settings.storage.database_path();
        let storage = match SkinStorage::open(&db_path) {
            Ok(storage) => Some(Arc::new(storage)),
            Err(e) => {
                warn!("💾 Local skin storage disabled ({}): {}", db_path.display(), e);
                None
            }
        };

        let connector: Option<Arc<dyn StreamConnector>> = if settings.stream_enabled() {
            let url = settings.api.stream_url().context("Invalid stream URL")?;
            Some(Arc::new(WebSocketConnector::new(url, settings.api.plugin_api_key.clone())))
        } else {
            warn!("📡 No plugin_api_key configured or stream disabled; event stream off");
            None
        };

        let capes: Option<Arc<dyn CapeGenerator>> = if settings.capes.enabled {
            let section = &settings.capes;
            match CapesApiClient::new(section.endpoint(), section.backend, section.timeout()) {
                Ok(client) => {
                    info!("🧥 Cape generation via {}", section.backend.display_name());
                    let generator: Arc<dyn CapeGenerator> = Arc::new(client.with_api_key(&section.mineskin_api_key));
                    Some(generator)
                }
                Err(e) => {
                    warn!("🧥 Cape generation disabled: {}", e);
                    None
                }
            }
        } else {
            None
        };

        Ok(Self {
            source: Arc::new(client),
            storage,
            connector,
            capes,
        })
    }
}

pub struct SkinMotion {
    settings: Settings,
    host: Arc<dyn HostServer>,
    sim: SimHandle,
    runtime: Handle,
    protocol: Arc<ProtocolLayer>,
    engine: SyncEngine,
    capes: Option<Arc<dyn CapeGenerator>>,
    synthetic: Mutex<HashMap<i32, Arc<SyntheticEntity>>>,
    event_task: Mutex<Option<JoinHandle<()>>>,
}

impl SkinMotion {
    /// Build the core from settings. The caller drives the returned loop.
    pub fn build(settings: Settings, host: Arc<dyn HostServer>, runtime: Handle) -> anyhow::Result<(Self, SimLoop)> {
        let collaborators = Collaborators::from_settings(&settings)?;
        Ok(Self::build_with(settings, host, runtime, collaborators))
    }

    pub fn build_with(
        settings: Settings,
        host: Arc<dyn HostServer>,
        runtime: Handle,
        collaborators: Collaborators,
    ) -> (Self, SimLoop) {
        let (sim, receiver) = SimHandle::channel();

        let capability = detect_capability(host.as_ref());
        let protocol = Arc::new(ProtocolLayer::discover(host.as_ref()));
        let configs = ConfigCache::new();

        let applier = SkinApplier::new(capability, host.clone(), sim.clone(), settings.skin.refresh_delay_ticks);
        let animator = AnimationScheduler::new(settings.animation.visibility_radius, settings.animation.start_delay_ticks);
        let broadcaster = SkinBroadcaster::new(
            protocol.clone(),
            host.clone(),
            sim.clone(),
            settings.protocol.update_deregister_delay_ticks,
        );
        let ctx = SimContext::new(host.clone(), configs.clone(), applier, animator, broadcaster, sim.clone());
        let sim_loop = SimLoop::new(ctx, receiver);

        let mut engine = SyncEngine::new(
            collaborators.source,
            collaborators.storage,
            configs,
            host.clone(),
            sim.clone(),
            runtime.clone(),
        )
        .with_link_on_join(settings.api.send_link_on_join);

        let mut event_task = None;
        if let Some(connector) = collaborators.connector {
            let (events_tx, events_rx) = mpsc::unbounded_channel();
            let stream = StreamClient::start(&runtime, connector, settings.stream.to_stream_settings(), events_tx);
            engine = engine.with_stream(Arc::new(stream));
            event_task = Some(runtime.spawn(engine.clone().run_event_loop(events_rx)));
        }

        info!(
            "✨ SkinMotion core ready (protocol: {}, stream: {})",
            if protocol.is_available() { "bound" } else { "disabled" },
            if event_task.is_some() { "on" } else { "off" }
        );

        let service = Self {
            settings,
            host,
            sim,
            runtime,
            protocol,
            engine,
            capes: collaborators.capes,
            synthetic: Mutex::new(HashMap::new()),
            event_task: Mutex::new(event_task),
        };
        (service, sim_loop)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn sim_handle(&self) -> &SimHandle {
        &self.sim
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    pub fn protocol(&self) -> &ProtocolLayer {
        &self.protocol
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.engine
            .stream()
            .map(|s| s.state())
            .unwrap_or(ConnectionState::Disconnected)
    }

    pub fn on_subject_join(&self, subject: Uuid, name: &str) {
        self.engine.on_subject_join(subject, name);
    }

    /// Drop every trace of the subject, including synthetic-entity viewership
    pub fn on_subject_quit(&self, subject: Uuid) {
        self.engine.on_subject_quit(subject);
        let entities = self.synthetic_entities();
        self.sim.submit(move |ctx| {
            ctx.applier.forget(subject);
            ctx.animator.reset(subject);
            for entity in entities {
                if let Err(e) = entity.despawn(subject) {
                    warn!("Failed to despawn {} for departing {}: {}", entity.name(), subject, e);
                }
            }
        });
    }

    /// Apply `property` on the next tick
    pub fn apply_skin(&self, subject: Uuid, property: TextureProperty) {
        self.sim.submit(move |ctx| {
            ctx.applier.apply_skin(subject, &property);
        });
    }

    /// Stop animating the subject and put back its pre-override appearance
    pub fn restore_original_skin(&self, subject: Uuid) {
        self.engine.cache().remove(subject);
        self.sim.submit(move |ctx| {
            ctx.animator.reset(subject);
            ctx.applier.restore_original_skin(subject);
        });
    }

    /// Combine the subject's current skin with `cape` remotely, then apply the result
    pub fn apply_cape(&self, subject: Uuid, cape: CapeType) -> Result<(), ServiceError> {
        let capes = self.capes.clone().ok_or(ServiceError::CapesDisabled)?;
        let runtime = self.runtime.clone();

        self.sim.submit(move |ctx| {
            let Some(current) = ctx.applier.current_skin(subject) else {
                ctx.host.send_message(subject, "Failed to apply cape: no current skin");
                return;
            };
            let Some(skin_url) = current.skin_url() else {
                ctx.host.send_message(subject, "Failed to apply cape: skin has no texture URL");
                return;
            };
            let variant = current.variant();
            ctx.host.send_message(subject, "Applying cape, please wait...");

            let sim = ctx.handle.clone();
            runtime.spawn(async move {
                let outcome = capes.generate(&skin_url, cape, variant).await;
                sim.submit(move |ctx| {
                    let line = match outcome {
                        Ok(generated) => {
                            if ctx.applier.apply_skin(subject, &generated.property) {
                                info!("🧥 Applied {} cape to {}", cape.id(), subject);
                                "Cape applied successfully!".to_string()
                            } else {
                                "Failed to apply cape: skin could not be applied".to_string()
                            }
                        }
                        Err(e) => format!("Failed to apply cape: {}", e),
                    };
                    ctx.host.send_message(subject, &line);
                });
            });
        });
        Ok(())
    }

    /// Create a synthetic entity; show it to viewers with [`SyntheticEntity::spawn`]
    pub fn create_synthetic(&self, location: Location, skin: TextureProperty) -> Result<Arc<SyntheticEntity>, ServiceError> {
        if let ProtocolLayer::Disabled { reason } = self.protocol.as_ref() {
            return Err(ServiceError::SyntheticUnavailable { reason: reason.clone() });
        }
        let timings = SyntheticTimings {
            spawn_deregister_delay_ticks: self.settings.protocol.spawn_deregister_delay_ticks,
            update_deregister_delay_ticks: self.settings.protocol.update_deregister_delay_ticks,
        };
        let entity = Arc::new(SyntheticEntity::new(
            location,
            skin,
            self.protocol.clone(),
            self.host.clone(),
            self.sim.clone(),
            timings,
        ));
        self.synthetic
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(entity.local_id(), entity.clone());
        Ok(entity)
    }

    pub fn synthetic(&self, local_id: i32) -> Option<Arc<SyntheticEntity>> {
        self.synthetic
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&local_id)
            .cloned()
    }

    pub fn synthetic_entities(&self) -> Vec<Arc<SyntheticEntity>> {
        self.synthetic
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Forget the entity and despawn it for everyone on the next tick
    pub fn remove_synthetic(&self, local_id: i32) -> bool {
        let removed = self
            .synthetic
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&local_id);
        match removed {
            Some(entity) => {
                self.sim.submit(move |_| entity.despawn_all());
                true
            }
            None => false,
        }
    }

    pub fn send_dashboard_link(&self, subject: Uuid, name: &str) {
        let engine = self.engine.clone();
        let name = name.to_string();
        self.runtime.spawn(async move {
            if let Err(e) = engine.send_dashboard_link(subject, &name).await {
                warn!("🔗 Failed to generate dashboard link for {}: {}", name, e);
            }
        });
    }

    /// Close the event stream, stop reconnecting and despawn synthetic entities
    pub async fn shutdown(&self) {
        if let Some(stream) = self.engine.stream() {
            stream.shutdown().await;
        }
        let task = self.event_task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(task) = task {
            task.abort();
        }

        let entities: Vec<_> = self
            .synthetic
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, e)| e)
            .collect();
        if !entities.is_empty() {
            self.sim.submit(move |_| {
                for entity in entities {
                    entity.despawn_all();
                }
            });
        }
        info!("✨ SkinMotion core stopped");
    }
}
