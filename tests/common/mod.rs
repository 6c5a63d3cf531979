#![allow(dead_code)]

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use skinmotion::host::{
    GameMode, HostDescriptor, HostError, HostKind, HostResult, HostServer, Location, ProfileApi, RawPacket,
    SessionSnapshot, SymbolTable,
};
use skinmotion::model::{find_texture, with_texture, ProfileProperty, SkinConfig, SkinFrame, TextureProperty};
use skinmotion::protocol::schema::{
    DataValueLayout, EntryField, FieldKind, InfoAction, MessageShape, ProtocolSchema, RegistryIds,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub const PLAYER_INFO_UPDATE: i32 = 0x3C;
pub const PLAYER_INFO_REMOVE: i32 = 0x3B;
pub const ADD_ENTITY: i32 = 0x01;
pub const SET_ENTITY_DATA: i32 = 0x56;
pub const REMOVE_ENTITIES: i32 = 0x40;

/// Packet registry of a 1.20.4-style host
pub fn modern_schema() -> ProtocolSchema {
    use FieldKind::*;
    ProtocolSchema {
        revision: 765,
        messages: vec![
            MessageShape::new("game.ClientboundPlayerInfoUpdatePacket", PLAYER_INFO_UPDATE, vec![ActionSet, InfoEntries]),
            MessageShape::new("game.ClientboundPlayerInfoRemovePacket", PLAYER_INFO_REMOVE, vec![UuidList]),
            MessageShape::new(
                "game.ClientboundAddEntityPacket",
                ADD_ENTITY,
                vec![VarInt, Uuid, EntityType, Double, Double, Double, Angle, Angle, Angle, VarInt, Velocity],
            ),
            MessageShape::new("game.ClientboundSetEntityDataPacket", SET_ENTITY_DATA, vec![VarInt, DataValues]),
            MessageShape::new("game.ClientboundRemoveEntitiesPacket", REMOVE_ENTITIES, vec![VarIntArray]),
        ],
        entry_layout: vec![
            EntryField::ProfileId,
            EntryField::Profile,
            EntryField::ChatSession,
            EntryField::GameMode,
            EntryField::Listed,
            EntryField::Latency,
            EntryField::DisplayName,
        ],
        info_actions: vec![
            InfoAction::AddPlayer,
            InfoAction::InitializeChat,
            InfoAction::UpdateGameMode,
            InfoAction::UpdateListed,
            InfoAction::UpdateLatency,
            InfoAction::UpdateDisplayName,
        ],
        data_layout: DataValueLayout::IndexSerializerValue,
        registries: RegistryIds {
            player_entity_type: 122,
            byte_serializer: 0,
        },
        skin_parts_index: Some(17),
    }
}

/// Signed texture whose payload points at `skin_url`
pub fn texture(skin_url: &str, signature: &str) -> TextureProperty {
    let json = format!(r#"{{"textures":{{"SKIN":{{"url":"{}"}}}}}}"#, skin_url);
    TextureProperty::new(STANDARD.encode(json), signature).unwrap()
}

pub fn frames(count: usize, tag: &str) -> Vec<SkinFrame> {
    (0..count)
        .map(|i| {
            let t = texture(&format!("https://textures.example/{}/{}", tag, i), &format!("{}-sig-{}", tag, i));
            SkinFrame::new(i as u32, &t, None)
        })
        .collect()
}

pub fn animated_config(subject: Uuid, name: &str, count: usize, tag: &str) -> SkinConfig {
    SkinConfig::new(subject, name, frames(count, tag)).with_frame_duration(1)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisibilityEvent {
    Hide { viewer: Uuid, target: Uuid },
    Show { viewer: Uuid, target: Uuid },
}

/// Shared mutable state of the in-memory host
#[derive(Default)]
pub struct HostState {
    pub sessions: Mutex<HashMap<Uuid, SessionSnapshot>>,
    pub packets: Mutex<Vec<(Uuid, RawPacket)>>,
    pub visibility: Mutex<Vec<VisibilityEvent>>,
    pub messages: Mutex<Vec<(Uuid, String)>>,
    pub failing_viewers: Mutex<HashSet<Uuid>>,
    pub hidden_pairs: Mutex<HashSet<(Uuid, Uuid)>>,
}

impl ProfileApi for HostState {
    fn properties(&self, subject: Uuid) -> HostResult<Vec<ProfileProperty>> {
        self.sessions
            .lock()
            .unwrap()
            .get(&subject)
            .map(|s| s.properties.clone())
            .ok_or(HostError::SessionGone { subject })
    }

    fn set_properties(&self, subject: Uuid, properties: Vec<ProfileProperty>) -> HostResult<()> {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions.get_mut(&subject).ok_or(HostError::SessionGone { subject })?;
        session.properties = properties;
        Ok(())
    }
}

pub struct MockHost {
    pub state: Arc<HostState>,
    native_profile: bool,
    schema: Option<ProtocolSchema>,
    symbols: Option<Arc<dyn SymbolTable>>,
    next_entity_id: AtomicI32,
}

impl MockHost {
    /// Host with a native profile API and a modern packet registry
    pub fn new() -> Self {
        Self {
            state: Arc::new(HostState::default()),
            native_profile: true,
            schema: Some(modern_schema()),
            symbols: None,
            next_entity_id: AtomicI32::new(100),
        }
    }

    pub fn without_protocol(mut self) -> Self {
        self.schema = None;
        self
    }

    pub fn with_schema(mut self, schema: ProtocolSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn without_profile_api(mut self) -> Self {
        self.native_profile = false;
        self
    }

    pub fn with_symbols(mut self, symbols: Arc<dyn SymbolTable>) -> Self {
        self.native_profile = false;
        self.symbols = Some(symbols);
        self
    }

    /// Connect a session wearing `original` at `location`
    pub fn join(&self, name: &str, location: Location, original: &TextureProperty) -> SessionSnapshot {
        self.join_with_id(Uuid::new_v4(), name, location, original)
    }

    pub fn join_with_id(&self, id: Uuid, name: &str, location: Location, original: &TextureProperty) -> SessionSnapshot {
        let session = SessionSnapshot {
            id,
            name: name.to_string(),
            entity_id: self.next_entity_id.fetch_add(1, Ordering::SeqCst),
            location,
            latency_ms: 20,
            game_mode: GameMode::Survival,
            properties: vec![original.to_profile_property()],
        };
        self.state.sessions.lock().unwrap().insert(id, session.clone());
        session
    }

    pub fn leave(&self, id: Uuid) {
        self.state.sessions.lock().unwrap().remove(&id);
    }

    pub fn fail_sends_to(&self, viewer: Uuid) {
        self.state.failing_viewers.lock().unwrap().insert(viewer);
    }

    pub fn set_hidden(&self, viewer: Uuid, target: Uuid) {
        self.state.hidden_pairs.lock().unwrap().insert((viewer, target));
    }

    pub fn textures_of(&self, subject: Uuid) -> Option<TextureProperty> {
        let sessions = self.state.sessions.lock().unwrap();
        find_texture(&sessions.get(&subject)?.properties)
    }

    pub fn session_properties(&self, subject: Uuid) -> Vec<ProfileProperty> {
        self.state
            .sessions
            .lock()
            .unwrap()
            .get(&subject)
            .map(|s| s.properties.clone())
            .unwrap_or_default()
    }

    pub fn set_textures(&self, subject: Uuid, texture: &TextureProperty) {
        let mut sessions = self.state.sessions.lock().unwrap();
        if let Some(session) = sessions.get_mut(&subject) {
            session.properties = with_texture(&session.properties, texture);
        }
    }

    pub fn packets_for(&self, viewer: Uuid) -> Vec<RawPacket> {
        self.state
            .packets
            .lock()
            .unwrap()
            .iter()
            .filter(|(v, _)| *v == viewer)
            .map(|(_, p)| p.clone())
            .collect()
    }

    pub fn packet_ids_for(&self, viewer: Uuid) -> Vec<i32> {
        self.packets_for(viewer).iter().map(|p| p.packet_id).collect()
    }

    pub fn total_packets(&self) -> usize {
        self.state.packets.lock().unwrap().len()
    }

    pub fn clear_packets(&self) {
        self.state.packets.lock().unwrap().clear();
    }

    pub fn visibility_events(&self) -> Vec<VisibilityEvent> {
        self.state.visibility.lock().unwrap().clone()
    }

    pub fn messages_for(&self, viewer: Uuid) -> Vec<String> {
        self.state
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(v, _)| *v == viewer)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

impl HostServer for MockHost {
    fn descriptor(&self) -> HostDescriptor {
        HostDescriptor {
            kind: HostKind::Server,
            brand: "MockServer".to_string(),
            version: "1.20.4".to_string(),
        }
    }

    fn session(&self, id: Uuid) -> Option<SessionSnapshot> {
        self.state.sessions.lock().unwrap().get(&id).cloned()
    }

    fn online_sessions(&self) -> Vec<SessionSnapshot> {
        let mut sessions: Vec<_> = self.state.sessions.lock().unwrap().values().cloned().collect();
        sessions.sort_by_key(|s| s.entity_id);
        sessions
    }

    fn can_see(&self, viewer: Uuid, target: Uuid) -> bool {
        !self.state.hidden_pairs.lock().unwrap().contains(&(viewer, target))
    }

    fn hide_subject(&self, viewer: Uuid, target: Uuid) {
        self.state
            .visibility
            .lock()
            .unwrap()
            .push(VisibilityEvent::Hide { viewer, target });
    }

    fn show_subject(&self, viewer: Uuid, target: Uuid) {
        self.state
            .visibility
            .lock()
            .unwrap()
            .push(VisibilityEvent::Show { viewer, target });
    }

    fn send_raw(&self, viewer: Uuid, packet: &RawPacket) -> HostResult<()> {
        if !self.state.sessions.lock().unwrap().contains_key(&viewer) {
            return Err(HostError::SessionGone { subject: viewer });
        }
        if self.state.failing_viewers.lock().unwrap().contains(&viewer) {
            return Err(HostError::Send {
                viewer,
                reason: "channel closed".to_string(),
            });
        }
        self.state.packets.lock().unwrap().push((viewer, packet.clone()));
        Ok(())
    }

    fn send_message(&self, viewer: Uuid, message: &str) {
        self.state.messages.lock().unwrap().push((viewer, message.to_string()));
    }

    fn profile_api(&self) -> Option<Arc<dyn ProfileApi>> {
        if self.native_profile {
            Some(self.state.clone() as Arc<dyn ProfileApi>)
        } else {
            None
        }
    }

    fn symbols(&self) -> Option<Arc<dyn SymbolTable>> {
        self.symbols.clone()
    }

    fn protocol_schema(&self) -> Option<ProtocolSchema> {
        self.schema.clone()
    }
}

use skinmotion::animation::AnimationScheduler;
use skinmotion::protocol::{ProtocolLayer, SkinBroadcaster};
use skinmotion::simulation::{SimContext, SimHandle, SimLoop};
use skinmotion::skin::{detect_capability, SkinApplier};
use skinmotion::sync::{ConfigCache, SkinSource, SyncError, SyncResult, TokenResponse};

pub const REFRESH_DELAY_TICKS: u64 = 2;
pub const UPDATE_DEREGISTER_TICKS: u64 = 2;

/// Simulation loop over `host` sharing `configs`, with no animation warmup
pub fn sim_loop(host: &Arc<MockHost>, configs: ConfigCache, start_delay_ticks: u64) -> SimLoop {
    let (sim, receiver) = SimHandle::channel();
    let dyn_host: Arc<dyn HostServer> = host.clone();
    let capability = detect_capability(dyn_host.as_ref());
    let protocol = Arc::new(ProtocolLayer::discover(dyn_host.as_ref()));
    let applier = SkinApplier::new(capability, dyn_host.clone(), sim.clone(), REFRESH_DELAY_TICKS);
    let animator = AnimationScheduler::new(64.0, start_delay_ticks);
    let broadcaster = SkinBroadcaster::new(protocol, dyn_host.clone(), sim.clone(), UPDATE_DEREGISTER_TICKS);
    let ctx = SimContext::new(dyn_host, configs, applier, animator, broadcaster, sim);
    SimLoop::new(ctx, receiver)
}

#[derive(Debug, Clone)]
pub enum Reply {
    Config(SkinConfig),
    Absent,
    Unavailable,
}

/// Scripted remote authority
#[derive(Default)]
pub struct MockSource {
    replies: Mutex<HashMap<Uuid, Reply>>,
    pub fetches: Mutex<Vec<Uuid>>,
}

impl MockSource {
    pub fn set(&self, subject: Uuid, reply: Reply) {
        self.replies.lock().unwrap().insert(subject, reply);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl SkinSource for MockSource {
    async fn fetch_skin_config(&self, subject: Uuid) -> SyncResult<Option<SkinConfig>> {
        self.fetches.lock().unwrap().push(subject);
        match self.replies.lock().unwrap().get(&subject).cloned().unwrap_or(Reply::Absent) {
            Reply::Config(config) => Ok(Some(config)),
            Reply::Absent => Ok(None),
            Reply::Unavailable => Err(SyncError::RemoteUnavailable {
                reason: "connection refused".to_string(),
            }),
        }
    }

    async fn generate_token(&self, subject: Uuid, _name: &str) -> SyncResult<TokenResponse> {
        Ok(TokenResponse {
            token: "tok".to_string(),
            dashboard_url: format!("https://dash.example/{}", subject),
            expires_in_hours: 24,
        })
    }
}
