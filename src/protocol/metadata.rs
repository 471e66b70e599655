//! Entity metadata: a list of `(index, type, value)` entries closed by index 255.
//!
//! The type id on the wire is derived from the [`MetadataValue`] variant, so an
//! entry can never carry a value whose shape disagrees with its declared type.

use super::buffer::MinecraftPacketBuffer;
use super::nbt::Tag;
use super::types::{BlockFace, BlockState, ItemStack, Position, Rotation};
use crate::error::{LodestoneError, Result};
use uuid::Uuid;

pub const METADATA_TERMINATOR: u8 = 255;

#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    Byte(i8),
    VarInt(i32),
    Float(f32),
    String(String),
    Chat(String),
    Item(Option<ItemStack>),
    Boolean(bool),
    Rotation(Rotation),
    Position(Position),
    OptionalPosition(Option<Position>),
    BlockFace(BlockFace),
    OptionalUuid(Option<Uuid>),
    BlockState(BlockState),
    Nbt(Option<Tag>),
}

impl MetadataValue {
    pub fn type_id(&self) -> i32 {
        match self {
            MetadataValue::Byte(_) => 0,
            MetadataValue::VarInt(_) => 1,
            MetadataValue::Float(_) => 2,
            MetadataValue::String(_) => 3,
            MetadataValue::Chat(_) => 4,
            MetadataValue::Item(_) => 5,
            MetadataValue::Boolean(_) => 6,
            MetadataValue::Rotation(_) => 7,
            MetadataValue::Position(_) => 8,
            MetadataValue::OptionalPosition(_) => 9,
            MetadataValue::BlockFace(_) => 10,
            MetadataValue::OptionalUuid(_) => 11,
            MetadataValue::BlockState(_) => 12,
            MetadataValue::Nbt(_) => 13,
        }
    }

    fn read(buffer: &mut MinecraftPacketBuffer, type_id: i32) -> Result<Self> {
        let value = match type_id {
            0 => MetadataValue::Byte(buffer.read_i8()?),
            1 => MetadataValue::VarInt(buffer.read_varint()?),
            2 => MetadataValue::Float(buffer.read_f32()?),
            3 => MetadataValue::String(buffer.read_string()?),
            4 => MetadataValue::Chat(buffer.read_string()?),
            5 => MetadataValue::Item(buffer.read_item()?),
            6 => MetadataValue::Boolean(buffer.read_bool()?),
            7 => MetadataValue::Rotation(buffer.read_rotation()?),
            8 => MetadataValue::Position(buffer.read_position()?),
            9 => MetadataValue::OptionalPosition(if buffer.read_bool()? {
                Some(buffer.read_position()?)
            } else {
                None
            }),
            10 => {
                let face = buffer.read_varint()?;
                MetadataValue::BlockFace(BlockFace::from_id(face).ok_or_else(|| {
                    LodestoneError::decode(format!("Unknown block face id: {}", face))
                })?)
            }
            11 => MetadataValue::OptionalUuid(if buffer.read_bool()? {
                Some(buffer.read_uuid()?)
            } else {
                None
            }),
            12 => MetadataValue::BlockState(buffer.read_block_state()?),
            13 => MetadataValue::Nbt(buffer.read_nbt()?),
            other => return Err(LodestoneError::UnknownMetadataType(other)),
        };
        Ok(value)
    }

    fn write(&self, buffer: &mut MinecraftPacketBuffer) -> Result<()> {
        match self {
            MetadataValue::Byte(v) => buffer.write_i8(*v),
            MetadataValue::VarInt(v) => buffer.write_varint(*v),
            MetadataValue::Float(v) => buffer.write_f32(*v),
            MetadataValue::String(v) | MetadataValue::Chat(v) => buffer.write_string(v),
            MetadataValue::Item(item) => buffer.write_item(item.as_ref())?,
            MetadataValue::Boolean(v) => buffer.write_bool(*v),
            MetadataValue::Rotation(v) => buffer.write_rotation(*v),
            MetadataValue::Position(v) => buffer.write_position(*v),
            MetadataValue::OptionalPosition(v) => {
                buffer.write_bool(v.is_some());
                if let Some(position) = v {
                    buffer.write_position(*position);
                }
            }
            MetadataValue::BlockFace(face) => buffer.write_varint(face.id()),
            MetadataValue::OptionalUuid(v) => {
                buffer.write_bool(v.is_some());
                if let Some(uuid) = v {
                    buffer.write_uuid(*uuid);
                }
            }
            MetadataValue::BlockState(state) => buffer.write_block_state(*state)?,
            MetadataValue::Nbt(tag) => buffer.write_nbt(tag.as_ref())?,
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntityMetadata {
    pub index: u8,
    pub value: MetadataValue,
}

impl EntityMetadata {
    pub fn new(index: u8, value: MetadataValue) -> Self {
        EntityMetadata { index, value }
    }
}

pub fn read_entity_metadata(buffer: &mut MinecraftPacketBuffer) -> Result<Vec<EntityMetadata>> {
    let mut entries = Vec::new();
    loop {
        let index = buffer.read_u8()?;
        if index == METADATA_TERMINATOR {
            break;
        }
        let type_id = buffer.read_varint()?;
        let value = MetadataValue::read(buffer, type_id)?;
        entries.push(EntityMetadata { index, value });
    }
    Ok(entries)
}

pub fn write_entity_metadata(
    buffer: &mut MinecraftPacketBuffer,
    entries: &[EntityMetadata],
) -> Result<()> {
    for entry in entries {
        if entry.index == METADATA_TERMINATOR {
            return Err(LodestoneError::decode(
                "Metadata index 255 is reserved for the terminator",
            ));
        }
        buffer.write_u8(entry.index);
        buffer.write_varint(entry.value.type_id());
        entry.value.write(buffer)?;
    }
    buffer.write_u8(METADATA_TERMINATOR);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::collections::HashMap;

    fn every_kind() -> Vec<EntityMetadata> {
        let mut compound = HashMap::new();
        compound.insert("Health".to_owned(), Tag::Float(20.0));
        vec![
            EntityMetadata::new(0, MetadataValue::Byte(0x20)),
            EntityMetadata::new(1, MetadataValue::VarInt(300)),
            EntityMetadata::new(2, MetadataValue::Float(1.5)),
            EntityMetadata::new(3, MetadataValue::String("Steve".to_owned())),
            EntityMetadata::new(4, MetadataValue::Chat("{\"text\":\"hi\"}".to_owned())),
            EntityMetadata::new(5, MetadataValue::Item(Some(ItemStack::new(1, 64, 0)))),
            EntityMetadata::new(6, MetadataValue::Item(None)),
            EntityMetadata::new(7, MetadataValue::Boolean(true)),
            EntityMetadata::new(
                8,
                MetadataValue::Rotation(Rotation {
                    pitch: 1.0,
                    yaw: 2.0,
                    roll: 3.0,
                }),
            ),
            EntityMetadata::new(9, MetadataValue::Position(Position::new(-5, 70, 9))),
            EntityMetadata::new(10, MetadataValue::OptionalPosition(None)),
            EntityMetadata::new(
                11,
                MetadataValue::OptionalPosition(Some(Position::new(1, 2, 3))),
            ),
            EntityMetadata::new(12, MetadataValue::BlockFace(BlockFace::West)),
            EntityMetadata::new(13, MetadataValue::OptionalUuid(None)),
            EntityMetadata::new(
                14,
                MetadataValue::OptionalUuid(Some(Uuid::new_v3(&Uuid::NAMESPACE_DNS, b"x"))),
            ),
            EntityMetadata::new(15, MetadataValue::BlockState(BlockState::new(35, 4))),
            EntityMetadata::new(16, MetadataValue::Nbt(Some(Tag::Compound(compound)))),
            EntityMetadata::new(17, MetadataValue::Nbt(None)),
        ]
    }

    #[test]
    fn test_every_value_kind() {
        let entries = every_kind();
        let mut buffer = MinecraftPacketBuffer::new();
        write_entity_metadata(&mut buffer, &entries).unwrap();

        let mut read = MinecraftPacketBuffer::from_bytes(buffer.buffer);
        assert_eq!(read_entity_metadata(&mut read).unwrap(), entries);
        assert!(read.is_exhausted());
    }

    #[test]
    fn test_empty_metadata_is_only_terminator() {
        let mut buffer = MinecraftPacketBuffer::new();
        write_entity_metadata(&mut buffer, &[]).unwrap();
        assert_eq!(buffer.buffer, vec![0xFF]);

        let mut read = MinecraftPacketBuffer::from_bytes(buffer.buffer);
        assert!(read_entity_metadata(&mut read).unwrap().is_empty());
    }

    #[test]
    fn test_wire_layout() {
        let mut buffer = MinecraftPacketBuffer::new();
        write_entity_metadata(
            &mut buffer,
            &[EntityMetadata::new(6, MetadataValue::Boolean(true))],
        )
        .unwrap();
        assert_eq!(buffer.buffer, vec![6, 6, 1, 0xFF]);
    }

    #[test]
    fn test_unknown_type_is_fatal() {
        let mut read = MinecraftPacketBuffer::from_bytes(vec![0, 42, 0, 0xFF]);
        let err = read_entity_metadata(&mut read).unwrap_err();
        assert_matches!(err, LodestoneError::UnknownMetadataType(42));
        assert!(err.to_string().contains("42"));
    }

    #[test]
    fn test_missing_terminator() {
        let mut read = MinecraftPacketBuffer::from_bytes(vec![0, 0, 5]);
        assert!(read_entity_metadata(&mut read).is_err());
    }

    #[test]
    fn test_reserved_index_rejected_on_write() {
        let mut buffer = MinecraftPacketBuffer::new();
        let entries = [EntityMetadata::new(255, MetadataValue::Byte(0))];
        assert!(write_entity_metadata(&mut buffer, &entries).is_err());
    }
}
