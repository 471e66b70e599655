use super::buffer::MinecraftPacketBuffer;
use super::packet::Packet;
use super::{GAME_VERSION, PROTOCOL_VERSION};
use crate::auth::GameProfile;
use crate::error::{LodestoneError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub name: String,
    pub protocol: i32,
}

impl VersionInfo {
    pub fn current() -> Self {
        VersionInfo {
            name: GAME_VERSION.to_owned(),
            protocol: PROTOCOL_VERSION,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub max: i32,
    pub online: i32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sample: Vec<GameProfile>,
}

/// The JSON document a server answers a status query with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerStatusInfo {
    pub version: VersionInfo,
    pub players: PlayerInfo,
    /// Chat component, usually `{"text": ...}`.
    pub description: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
}

impl ServerStatusInfo {
    pub fn new(online: i32, max: i32, motd: &str) -> Self {
        ServerStatusInfo {
            version: VersionInfo::current(),
            players: PlayerInfo {
                max,
                online,
                sample: Vec::new(),
            },
            description: json!({ "text": motd }),
            favicon: None,
        }
    }
}

impl Default for ServerStatusInfo {
    fn default() -> Self {
        ServerStatusInfo::new(0, 20, "A Minecraft Server")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusQueryPacket;

impl Packet for StatusQueryPacket {
    fn packet_id() -> i32 {
        0x00
    }

    fn read_from_buffer(_buffer: &mut MinecraftPacketBuffer) -> Result<Self> {
        Ok(StatusQueryPacket)
    }

    fn write_to_buffer(&self, _buffer: &mut MinecraftPacketBuffer) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusResponsePacket {
    pub info: ServerStatusInfo,
}

impl Packet for StatusResponsePacket {
    fn packet_id() -> i32 {
        0x00
    }

    fn read_from_buffer(buffer: &mut MinecraftPacketBuffer) -> Result<Self> {
        let response = buffer.read_string()?;
        let info = serde_json::from_str(&response)
            .map_err(|e| LodestoneError::decode(format!("Invalid status response: {}", e)))?;
        Ok(StatusResponsePacket { info })
    }

    fn write_to_buffer(&self, buffer: &mut MinecraftPacketBuffer) -> Result<()> {
        let response = serde_json::to_string(&self.info)
            .map_err(|e| LodestoneError::encode(e.to_string()))?;
        buffer.write_string(&response);
        Ok(())
    }
}

/// Client ping, carrying the client's clock in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusPingPacket {
    pub time: i64,
}

impl Packet for StatusPingPacket {
    fn packet_id() -> i32 {
        0x01
    }

    fn read_from_buffer(buffer: &mut MinecraftPacketBuffer) -> Result<Self> {
        Ok(StatusPingPacket {
            time: buffer.read_i64()?,
        })
    }

    fn write_to_buffer(&self, buffer: &mut MinecraftPacketBuffer) -> Result<()> {
        buffer.write_i64(self.time);
        Ok(())
    }
}

/// Echo of the ping payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusPongPacket {
    pub time: i64,
}

impl Packet for StatusPongPacket {
    fn packet_id() -> i32 {
        0x01
    }

    fn read_from_buffer(buffer: &mut MinecraftPacketBuffer) -> Result<Self> {
        Ok(StatusPongPacket {
            time: buffer.read_i64()?,
        })
    }

    fn write_to_buffer(&self, buffer: &mut MinecraftPacketBuffer) -> Result<()> {
        buffer.write_i64(self.time);
        Ok(())
    }
}
