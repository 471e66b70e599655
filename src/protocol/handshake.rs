use super::buffer::MinecraftPacketBuffer;
use super::packet::Packet;
use super::state::HandshakeIntent;
use crate::error::Result;

/// Handshake packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakePacket {
    pub protocol_version: i32,
    pub server_address: String,
    pub server_port: u16,
    pub intent: HandshakeIntent,
}

/// Handshake packet impl
impl Packet for HandshakePacket {
    /// Packet ID
    fn packet_id() -> i32 {
        0x00
    }

    /// Reads the packet from the buffer. An unknown intent fails the whole packet.
    fn read_from_buffer(buffer: &mut MinecraftPacketBuffer) -> Result<Self> {
        Ok(HandshakePacket {
            protocol_version: buffer.read_varint()?,
            server_address: buffer.read_string()?,
            server_port: buffer.read_u16()?,
            intent: HandshakeIntent::from_id(buffer.read_varint()?)?,
        })
    }

    /// Writes the packet to the buffer
    fn write_to_buffer(&self, buffer: &mut MinecraftPacketBuffer) -> Result<()> {
        buffer.write_varint(self.protocol_version);
        buffer.write_string(&self.server_address);
        buffer.write_u16(self.server_port);
        buffer.write_varint(self.intent.id());
        Ok(())
    }
}
