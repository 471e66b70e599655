//! In-game packets this crate interprets. Everything else in the game state
//! travels as a `RawPacket`.

use super::buffer::MinecraftPacketBuffer;
use super::chat;
use super::chunk::{read_column, write_column, Column};
use super::metadata::{read_entity_metadata, write_entity_metadata, EntityMetadata};
use super::packet::Packet;
use crate::error::{LodestoneError, Result};

/// Keep alive packet sent by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerKeepAlivePacket {
    pub ping_id: i64,
}

impl Packet for ServerKeepAlivePacket {
    fn packet_id() -> i32 {
        0x1F
    }

    fn read_from_buffer(buffer: &mut MinecraftPacketBuffer) -> Result<Self> {
        Ok(ServerKeepAlivePacket {
            ping_id: buffer.read_i64()?,
        })
    }

    fn write_to_buffer(&self, buffer: &mut MinecraftPacketBuffer) -> Result<()> {
        buffer.write_i64(self.ping_id);
        Ok(())
    }
}

/// Keep alive answer sent by the client, echoing the server's id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientKeepAlivePacket {
    pub ping_id: i64,
}

impl Packet for ClientKeepAlivePacket {
    fn packet_id() -> i32 {
        0x0B
    }

    fn read_from_buffer(buffer: &mut MinecraftPacketBuffer) -> Result<Self> {
        Ok(ClientKeepAlivePacket {
            ping_id: buffer.read_i64()?,
        })
    }

    fn write_to_buffer(&self, buffer: &mut MinecraftPacketBuffer) -> Result<()> {
        buffer.write_i64(self.ping_id);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerDisconnectPacket {
    pub reason: String,
}

impl ServerDisconnectPacket {
    pub fn new(reason: &str) -> Self {
        ServerDisconnectPacket {
            reason: chat::escape(reason),
        }
    }
}

impl Packet for ServerDisconnectPacket {
    fn packet_id() -> i32 {
        0x1A
    }

    fn read_from_buffer(buffer: &mut MinecraftPacketBuffer) -> Result<Self> {
        Ok(ServerDisconnectPacket {
            reason: buffer.read_string()?,
        })
    }

    fn write_to_buffer(&self, buffer: &mut MinecraftPacketBuffer) -> Result<()> {
        buffer.write_string(&self.reason);
        Ok(())
    }
}

/// Game-phase compression change. Gone from vanilla 1.12.2 but still accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSetCompressionPacket {
    pub threshold: i32,
}

impl Packet for ServerSetCompressionPacket {
    fn packet_id() -> i32 {
        0x46
    }

    fn read_from_buffer(buffer: &mut MinecraftPacketBuffer) -> Result<Self> {
        Ok(ServerSetCompressionPacket {
            threshold: buffer.read_varint()?,
        })
    }

    fn write_to_buffer(&self, buffer: &mut MinecraftPacketBuffer) -> Result<()> {
        buffer.write_varint(self.threshold);
        Ok(())
    }
}

const FLAG_INVINCIBLE: u8 = 0x01;
const FLAG_FLYING: u8 = 0x02;
const FLAG_CAN_FLY: u8 = 0x04;
const FLAG_CREATIVE: u8 = 0x08;

/// Ability flags shared by both player abilities packets.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlayerAbilities {
    pub invincible: bool,
    pub flying: bool,
    pub can_fly: bool,
    pub creative: bool,
    pub fly_speed: f32,
    pub walk_speed: f32,
}

impl PlayerAbilities {
    fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.invincible {
            flags |= FLAG_INVINCIBLE;
        }
        if self.flying {
            flags |= FLAG_FLYING;
        }
        if self.can_fly {
            flags |= FLAG_CAN_FLY;
        }
        if self.creative {
            flags |= FLAG_CREATIVE;
        }
        flags
    }

    fn read(buffer: &mut MinecraftPacketBuffer) -> Result<Self> {
        let flags = buffer.read_u8()?;
        Ok(PlayerAbilities {
            invincible: flags & FLAG_INVINCIBLE != 0,
            flying: flags & FLAG_FLYING != 0,
            can_fly: flags & FLAG_CAN_FLY != 0,
            creative: flags & FLAG_CREATIVE != 0,
            fly_speed: buffer.read_f32()?,
            walk_speed: buffer.read_f32()?,
        })
    }

    fn write(&self, buffer: &mut MinecraftPacketBuffer) {
        buffer.write_u8(self.flags());
        buffer.write_f32(self.fly_speed);
        buffer.write_f32(self.walk_speed);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerPlayerAbilitiesPacket {
    pub abilities: PlayerAbilities,
}

impl Packet for ServerPlayerAbilitiesPacket {
    fn packet_id() -> i32 {
        0x2C
    }

    fn read_from_buffer(buffer: &mut MinecraftPacketBuffer) -> Result<Self> {
        Ok(ServerPlayerAbilitiesPacket {
            abilities: PlayerAbilities::read(buffer)?,
        })
    }

    fn write_to_buffer(&self, buffer: &mut MinecraftPacketBuffer) -> Result<()> {
        self.abilities.write(buffer);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientPlayerAbilitiesPacket {
    pub abilities: PlayerAbilities,
}

impl Packet for ClientPlayerAbilitiesPacket {
    fn packet_id() -> i32 {
        0x13
    }

    fn read_from_buffer(buffer: &mut MinecraftPacketBuffer) -> Result<Self> {
        Ok(ClientPlayerAbilitiesPacket {
            abilities: PlayerAbilities::read(buffer)?,
        })
    }

    fn write_to_buffer(&self, buffer: &mut MinecraftPacketBuffer) -> Result<()> {
        self.abilities.write(buffer);
        Ok(())
    }
}

/// Chunk column data. Received columns are decoded without assuming sky light,
/// so overworld columns go through the sky light retry.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerChunkDataPacket {
    pub column: Column,
    pub full_chunk: bool,
}

impl ServerChunkDataPacket {
    pub fn new(column: Column, full_chunk: bool) -> Self {
        ServerChunkDataPacket { column, full_chunk }
    }
}

impl Packet for ServerChunkDataPacket {
    fn packet_id() -> i32 {
        0x20
    }

    fn read_from_buffer(buffer: &mut MinecraftPacketBuffer) -> Result<Self> {
        let x = buffer.read_i32()?;
        let z = buffer.read_i32()?;
        let full_chunk = buffer.read_bool()?;
        let mask = buffer.read_varint()?;
        let data = buffer.read_byte_array()?;

        let count = buffer.read_varint()?;
        if count < 0 {
            return Err(LodestoneError::decode(format!(
                "Negative block entity count: {}",
                count
            )));
        }
        let mut block_entities = Vec::with_capacity(count.min(1024) as usize);
        for _ in 0..count {
            let tag = buffer
                .read_nbt()?
                .ok_or_else(|| LodestoneError::decode("Block entity without a compound"))?;
            block_entities.push(tag);
        }

        let column = read_column(&data, x, z, full_chunk, false, mask, &block_entities)?;
        Ok(ServerChunkDataPacket { column, full_chunk })
    }

    fn write_to_buffer(&self, buffer: &mut MinecraftPacketBuffer) -> Result<()> {
        let mut data = MinecraftPacketBuffer::new();
        let mask = write_column(
            &mut data,
            &self.column,
            self.full_chunk,
            self.column.has_skylight(),
        )?;

        buffer.write_i32(self.column.x);
        buffer.write_i32(self.column.z);
        buffer.write_bool(self.full_chunk);
        buffer.write_varint(mask);
        buffer.write_byte_array(&data.into_inner());
        buffer.write_varint(self.column.block_entities.len() as i32);
        for tag in &self.column.block_entities {
            buffer.write_nbt(Some(tag))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerEntityMetadataPacket {
    pub entity_id: i32,
    pub metadata: Vec<EntityMetadata>,
}

impl Packet for ServerEntityMetadataPacket {
    fn packet_id() -> i32 {
        0x3C
    }

    fn read_from_buffer(buffer: &mut MinecraftPacketBuffer) -> Result<Self> {
        Ok(ServerEntityMetadataPacket {
            entity_id: buffer.read_varint()?,
            metadata: read_entity_metadata(buffer)?,
        })
    }

    fn write_to_buffer(&self, buffer: &mut MinecraftPacketBuffer) -> Result<()> {
        buffer.write_varint(self.entity_id);
        write_entity_metadata(buffer, &self.metadata)
    }
}
