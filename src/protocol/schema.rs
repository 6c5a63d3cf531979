//! Packet registry published by the host for its running protocol revision
//!
//! The schema only describes shapes: packet ids, field order and the layout of
//! nested structures. Discovery matches these shapes structurally.

use std::fmt;

/// Logical clientbound messages used by the synthetic entity layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    PlayerInfoUpdate,
    PlayerInfoRemove,
    AddEntity,
    SetEntityData,
    RemoveEntities,
}

impl MessageKind {
    /// Enclosing names this kind has carried across revisions
    pub fn name_hints(&self) -> &'static [&'static str] {
        match self {
            MessageKind::PlayerInfoUpdate => &["PlayerInfoUpdate", "PlayerInfo"],
            MessageKind::PlayerInfoRemove => &["PlayerInfoRemove"],
            MessageKind::AddEntity => &["AddEntity", "AddPlayer", "SpawnPlayer", "NamedEntitySpawn"],
            MessageKind::SetEntityData => &["SetEntityData", "EntityMetadata"],
            MessageKind::RemoveEntities => &["RemoveEntities", "RemoveEntity", "EntityDestroy"],
        }
    }

    /// Whether the spawn/update sequences cannot run without this message
    pub fn is_required(&self) -> bool {
        !matches!(self, MessageKind::SetEntityData)
    }

    pub const ALL: [MessageKind; 5] = [
        MessageKind::PlayerInfoUpdate,
        MessageKind::PlayerInfoRemove,
        MessageKind::AddEntity,
        MessageKind::SetEntityData,
        MessageKind::RemoveEntities,
    ];
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageKind::PlayerInfoUpdate => "PlayerInfoUpdate",
            MessageKind::PlayerInfoRemove => "PlayerInfoRemove",
            MessageKind::AddEntity => "AddEntity",
            MessageKind::SetEntityData => "SetEntityData",
            MessageKind::RemoveEntities => "RemoveEntities",
        };
        f.write_str(name)
    }
}

/// Wire type of a top-level message field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    VarInt,
    Int,
    Long,
    Float,
    Double,
    /// Rotation packed into one byte (256 steps per turn)
    Angle,
    Bool,
    Uuid,
    String,
    /// Entity type registry id
    EntityType,
    /// Three big-endian shorts
    Velocity,
    VarIntArray,
    UuidList,
    /// Bitset of roster actions
    ActionSet,
    /// Roster entries laid out per [`EntryField`]
    InfoEntries,
    /// Entity data values laid out per [`DataValueLayout`]
    DataValues,
}

impl FieldKind {
    pub fn is_integer(&self) -> bool {
        matches!(self, FieldKind::VarInt | FieldKind::Int)
    }
}

/// Per-entry field of a roster update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryField {
    ProfileId,
    /// Name followed by the property list
    Profile,
    ChatSession,
    GameMode,
    Listed,
    Latency,
    DisplayName,
}

/// Roster action bit; the bit position is the action's index in the schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoAction {
    AddPlayer,
    InitializeChat,
    UpdateGameMode,
    UpdateListed,
    UpdateLatency,
    UpdateDisplayName,
}

impl InfoAction {
    /// Entry field written when this action is present
    pub fn entry_field(&self) -> EntryField {
        match self {
            InfoAction::AddPlayer => EntryField::Profile,
            InfoAction::InitializeChat => EntryField::ChatSession,
            InfoAction::UpdateGameMode => EntryField::GameMode,
            InfoAction::UpdateListed => EntryField::Listed,
            InfoAction::UpdateLatency => EntryField::Latency,
            InfoAction::UpdateDisplayName => EntryField::DisplayName,
        }
    }
}

/// Encoding of entity data lists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataValueLayout {
    /// `u8 index`, `varint serializer`, value; terminated by `0xFF`
    IndexSerializerValue,
    /// `u8 (serializer << 5 | index)`, value; terminated by `0x7F`
    PackedIndexType,
}

/// One packet as registered by the running revision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageShape {
    pub name: String,
    pub packet_id: i32,
    pub fields: Vec<FieldKind>,
}

impl MessageShape {
    pub fn new(name: impl Into<String>, packet_id: i32, fields: Vec<FieldKind>) -> Self {
        Self {
            name: name.into(),
            packet_id,
            fields,
        }
    }

    fn simple_name(&self) -> &str {
        self.name
            .rsplit(|c| c == '.' || c == '$' || c == '/')
            .next()
            .unwrap_or(&self.name)
    }

    /// Name match ignoring package prefixes and `Clientbound`/`Packet` affixes
    pub fn matches_hint(&self, hint: &str) -> bool {
        let simple = self.simple_name();
        let core = simple
            .trim_start_matches("Clientbound")
            .trim_start_matches("PacketPlayOut")
            .trim_end_matches("Packet");
        core == hint
    }
}

/// Registry ids referenced from message bodies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryIds {
    pub player_entity_type: i32,
    pub byte_serializer: i32,
}

/// Full packet registry of one protocol revision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolSchema {
    pub revision: i32,
    pub messages: Vec<MessageShape>,
    pub entry_layout: Vec<EntryField>,
    pub info_actions: Vec<InfoAction>,
    pub data_layout: DataValueLayout,
    pub registries: RegistryIds,
    /// Metadata index of the displayed skin parts byte on player entities
    pub skin_parts_index: Option<u8>,
}

#[cfg(test)]
pub(crate) fn sample_schema() -> ProtocolSchema {
    use FieldKind::*;
    ProtocolSchema {
        revision: 765,
        messages: vec![
            MessageShape::new("game.ClientboundPlayerInfoUpdatePacket", 0x3C, vec![ActionSet, InfoEntries]),
            MessageShape::new("game.ClientboundPlayerInfoRemovePacket", 0x3B, vec![UuidList]),
            MessageShape::new(
                "game.ClientboundAddEntityPacket",
                0x01,
                vec![VarInt, Uuid, EntityType, Double, Double, Double, Angle, Angle, Angle, VarInt, Velocity],
            ),
            MessageShape::new("game.ClientboundSetEntityDataPacket", 0x56, vec![VarInt, DataValues]),
            MessageShape::new("game.ClientboundRemoveEntitiesPacket", 0x40, vec![VarIntArray]),
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
