//! Structural discovery of message shapes and revision-aware encoding
//!
//! Each logical message is bound to the first registered packet whose name
//! matches one of its historical names and whose field list has the expected
//! structure. Encoding then walks the bound field list in order, so field
//! order and arity differences between revisions are absorbed here.

use super::buffer::PacketWriter;
use super::messages::{ClientboundMessage, EntityPose, ProfileIdentity, SkinParts};
use super::schema::{
    DataValueLayout, EntryField, FieldKind, InfoAction, MessageKind, MessageShape, ProtocolSchema,
    RegistryIds,
};
use super::{ProtocolError, ProtocolResult};
use crate::host::RawPacket;
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

/// Message shapes bound for the running revision
#[derive(Debug, Clone)]
pub struct ProtocolBindings {
    revision: i32,
    shapes: HashMap<MessageKind, MessageShape>,
    entry_layout: Vec<EntryField>,
    info_actions: Vec<InfoAction>,
    data_layout: DataValueLayout,
    registries: RegistryIds,
    skin_parts_index: Option<u8>,
}

fn count(fields: &[FieldKind], kind: FieldKind) -> usize {
    fields.iter().filter(|f| **f == kind).count()
}

/// Structural predicate a candidate shape must satisfy
fn shape_fits(kind: MessageKind, shape: &MessageShape, schema: &ProtocolSchema) -> bool {
    let fields = shape.fields.as_slice();
    match kind {
        MessageKind::PlayerInfoUpdate => {
            count(fields, FieldKind::ActionSet) == 1
                && count(fields, FieldKind::InfoEntries) == 1
                && schema.info_actions.contains(&InfoAction::AddPlayer)
                && schema.entry_layout.contains(&EntryField::ProfileId)
                && schema.entry_layout.contains(&EntryField::Profile)
        }
        MessageKind::PlayerInfoRemove => fields == [FieldKind::UuidList],
        MessageKind::AddEntity => {
            fields.len() >= 6
                && fields[0].is_integer()
                && fields[1] == FieldKind::Uuid
                && count(fields, FieldKind::Double) >= 3
        }
        MessageKind::SetEntityData => {
            fields.len() == 2 && fields[0].is_integer() && fields[1] == FieldKind::DataValues
        }
        MessageKind::RemoveEntities => {
            fields == [FieldKind::VarIntArray] || (fields.len() == 1 && fields[0].is_integer())
        }
    }
}

impl ProtocolBindings {
    /// Bind every message kind against the schema
    pub fn discover(schema: &ProtocolSchema) -> ProtocolResult<Self> {
        let mut shapes = HashMap::new();

        for kind in MessageKind::ALL {
            let found = kind.name_hints().iter().find_map(|hint| {
                schema
                    .messages
                    .iter()
                    .find(|shape| shape.matches_hint(hint) && shape_fits(kind, shape, schema))
            });

            match found {
                Some(shape) => {
                    debug!("🔗 Bound {} to {} (id 0x{:02X})", kind, shape.name, shape.packet_id);
                    shapes.insert(kind, shape.clone());
                }
                None if kind.is_required() => {
                    return Err(ProtocolError::DiscoveryFailure {
                        revision: schema.revision,
                        reason: format!("no compatible shape for {}", kind),
                    });
                }
                None => debug!("Optional message {} not available in revision {}", kind, schema.revision),
            }
        }

        Ok(Self {
            revision: schema.revision,
            shapes,
            entry_layout: schema.entry_layout.clone(),
            info_actions: schema.info_actions.clone(),
            data_layout: schema.data_layout,
            registries: schema.registries,
            skin_parts_index: schema.skin_parts_index,
        })
    }

    pub fn revision(&self) -> i32 {
        self.revision
    }

    pub fn supports(&self, kind: MessageKind) -> bool {
        match kind {
            MessageKind::SetEntityData => {
                self.shapes.contains_key(&kind) && self.skin_parts_index.is_some()
            }
            _ => self.shapes.contains_key(&kind),
        }
    }

    pub fn shape(&self, kind: MessageKind) -> Option<&MessageShape> {
        self.shapes.get(&kind)
    }

    fn bound(&self, kind: MessageKind) -> ProtocolResult<&MessageShape> {
        self.shapes.get(&kind).ok_or_else(|| ProtocolError::Encode {
            reason: format!("{} is not bound for revision {}", kind, self.revision),
        })
    }

    /// Encode one logical message; a few revisions need more than one packet
    pub fn encode(&self, message: &ClientboundMessage) -> ProtocolResult<Vec<RawPacket>> {
        match message {
            ClientboundMessage::PlayerInfoUpdate { entries } => {
                let shape = self.bound(MessageKind::PlayerInfoUpdate)?;
                let mut w = PacketWriter::new();
                for field in &shape.fields {
                    match field {
                        FieldKind::ActionSet => self.write_action_set(&mut w),
                        FieldKind::InfoEntries => {
                            w.put_len(entries.len())?;
                            for entry in entries {
                                self.write_entry(&mut w, entry)?;
                            }
                        }
                        other => write_default(&mut w, *other, shape)?,
                    }
                }
                Ok(vec![packet(shape, w)])
            }
            ClientboundMessage::PlayerInfoRemove { profile_ids } => {
                let shape = self.bound(MessageKind::PlayerInfoRemove)?;
                let mut w = PacketWriter::new();
                w.put_len(profile_ids.len())?;
                for id in profile_ids {
                    w.put_uuid(*id);
                }
                Ok(vec![packet(shape, w)])
            }
            ClientboundMessage::AddEntity(pose) => {
                let shape = self.bound(MessageKind::AddEntity)?;
                let mut w = PacketWriter::new();
                self.write_add_entity(&mut w, shape, pose)?;
                Ok(vec![packet(shape, w)])
            }
            ClientboundMessage::SetEntityData { entity_id, skin_parts } => {
                let shape = self.bound(MessageKind::SetEntityData)?;
                let index = self.skin_parts_index.ok_or_else(|| ProtocolError::Encode {
                    reason: "skin parts metadata index unknown".to_string(),
                })?;
                let mut w = PacketWriter::new();
                write_integer(&mut w, shape.fields[0], *entity_id);
                self.write_skin_parts(&mut w, index, *skin_parts);
                Ok(vec![packet(shape, w)])
            }
            ClientboundMessage::RemoveEntities { entity_ids } => {
                let shape = self.bound(MessageKind::RemoveEntities)?;
                if shape.fields[0] == FieldKind::VarIntArray {
                    let mut w = PacketWriter::new();
                    w.put_len(entity_ids.len())?;
                    for id in entity_ids {
                        w.put_var_int(*id);
                    }
                    Ok(vec![packet(shape, w)])
                } else {
                    // single-id revisions: one packet per entity
                    Ok(entity_ids
                        .iter()
                        .map(|id| {
                            let mut w = PacketWriter::new();
                            write_integer(&mut w, shape.fields[0], *id);
                            packet(shape, w)
                        })
                        .collect())
                }
            }
        }
    }

    fn write_action_set(&self, w: &mut PacketWriter) {
        let mut bits = vec![0u8; (self.info_actions.len() + 7) / 8];
        for position in 0..self.info_actions.len() {
            bits[position / 8] |= 1 << (position % 8);
        }
        for byte in bits {
            w.put_u8(byte);
        }
    }

    fn write_entry(&self, w: &mut PacketWriter, entry: &ProfileIdentity) -> ProtocolResult<()> {
        for field in &self.entry_layout {
            let present = *field == EntryField::ProfileId
                || self.info_actions.iter().any(|a| a.entry_field() == *field);
            if !present {
                continue;
            }
            match field {
                EntryField::ProfileId => w.put_uuid(entry.profile_id),
                EntryField::Profile => {
                    w.put_string(&entry.name)?;
                    w.put_len(entry.properties.len())?;
                    for property in &entry.properties {
                        w.put_string(&property.name)?;
                        w.put_string(&property.value)?;
                        w.put_bool(property.signature.is_some());
                        if let Some(signature) = &property.signature {
                            w.put_string(signature)?;
                        }
                    }
                }
                EntryField::ChatSession => w.put_bool(false),
                EntryField::GameMode => w.put_var_int(entry.game_mode.wire_id()),
                EntryField::Listed => w.put_bool(entry.listed),
                EntryField::Latency => w.put_var_int(entry.latency),
                EntryField::DisplayName => w.put_bool(false),
            }
        }
        Ok(())
    }

    fn write_add_entity(&self, w: &mut PacketWriter, shape: &MessageShape, pose: &EntityPose) -> ProtocolResult<()> {
        let rotations: Vec<f32> = match count(&shape.fields, FieldKind::Angle) + count(&shape.fields, FieldKind::Float) {
            2 => vec![pose.yaw, pose.pitch],
            _ => vec![pose.pitch, pose.yaw, pose.head_yaw],
        };
        let positions = [pose.x, pose.y, pose.z];
        let (mut ints, mut doubles, mut rots) = (0usize, 0usize, 0usize);

        for field in &shape.fields {
            match field {
                FieldKind::VarInt | FieldKind::Int => {
                    let value = if ints == 0 { pose.entity_id } else { 0 };
                    write_integer(w, *field, value);
                    ints += 1;
                }
                FieldKind::Uuid => w.put_uuid(pose.profile_id),
                FieldKind::EntityType => w.put_var_int(self.registries.player_entity_type),
                FieldKind::Double => {
                    w.put_f64(positions.get(doubles).copied().unwrap_or_default());
                    doubles += 1;
                }
                FieldKind::Angle | FieldKind::Float => {
                    let degrees = rotations.get(rots).copied().unwrap_or_default();
                    if *field == FieldKind::Angle {
                        w.put_angle(degrees);
                    } else {
                        w.put_f32(degrees);
                    }
                    rots += 1;
                }
                FieldKind::Velocity => {
                    w.put_i16(0);
                    w.put_i16(0);
                    w.put_i16(0);
                }
                other => write_default(w, *other, shape)?,
            }
        }
        Ok(())
    }

    fn write_skin_parts(&self, w: &mut PacketWriter, index: u8, parts: SkinParts) {
        let serializer = self.registries.byte_serializer;
        match self.data_layout {
            DataValueLayout::IndexSerializerValue => {
                w.put_u8(index);
                w.put_var_int(serializer);
                w.put_u8(parts.bits());
                w.put_u8(0xFF);
            }
            DataValueLayout::PackedIndexType => {
                w.put_u8(((serializer as u8) << 5) | (index & 0x1F));
                w.put_u8(parts.bits());
                w.put_u8(0x7F);
            }
        }
    }
}

fn packet(shape: &MessageShape, w: PacketWriter) -> RawPacket {
    RawPacket {
        packet_id: shape.packet_id,
        name: shape.name.clone(),
        payload: w.freeze(),
    }
}

fn write_integer(w: &mut PacketWriter, kind: FieldKind, value: i32) {
    if kind == FieldKind::Int {
        w.put_i32(value);
    } else {
        w.put_var_int(value);
    }
}

/// Zero value for scalar fields the message does not populate
fn write_default(w: &mut PacketWriter, kind: FieldKind, shape: &MessageShape) -> ProtocolResult<()> {
    match kind {
        FieldKind::VarInt => w.put_var_int(0),
        FieldKind::Int => w.put_i32(0),
        FieldKind::Long => w.put_i64(0),
        FieldKind::Float => w.put_f32(0.0),
        FieldKind::Double => w.put_f64(0.0),
        FieldKind::Angle => w.put_u8(0),
        FieldKind::Bool => w.put_bool(false),
        FieldKind::Uuid => w.put_uuid(Uuid::nil()),
        FieldKind::String => w.put_string("")?,
        FieldKind::Velocity => {
            w.put_i16(0);
            w.put_i16(0);
            w.put_i16(0);
        }
        other => {
            return Err(ProtocolError::Encode {
                reason: format!("cannot default field {:?} in {}", other, shape.name),
            })
        }
    }
    Ok(())
}
