use super::buffer::MinecraftPacketBuffer;
use super::game::*;
use super::handshake::HandshakePacket;
use super::login::*;
use super::state::{Direction, SubProtocol};
use super::status::*;
use crate::error::{LodestoneError, Result};

/// Packet trait. Contains the packet ID and the functions to read and write the packet body.
/// The packet ID itself is written by the framing layer, not by `write_to_buffer`.
pub trait Packet {
    fn packet_id() -> i32
    where
        Self: Sized;

    fn read_from_buffer(buffer: &mut MinecraftPacketBuffer) -> Result<Self>
    where
        Self: Sized;

    fn write_to_buffer(&self, buffer: &mut MinecraftPacketBuffer) -> Result<()>;
}

/// A frame that has been split into id and body but not interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacket {
    pub id: i32,
    pub body: Vec<u8>,
}

/// One closed family of packets: everything that can travel in one direction.
pub trait PacketFamily: Sized + Send + std::fmt::Debug + 'static {
    const DIRECTION: Direction;

    /// Interprets a frame received while the connection is in `state`.
    fn decode(state: SubProtocol, raw: RawPacket) -> Result<Self>;

    fn encode(&self) -> Result<RawPacket>;

    fn sub_protocol(&self) -> SubProtocol;

    fn name(&self) -> &'static str;
}

fn read_body<P: Packet>(body: Vec<u8>) -> Result<P> {
    let mut buffer = MinecraftPacketBuffer::from_bytes(body);
    let packet = P::read_from_buffer(&mut buffer)?;
    if !buffer.is_exhausted() {
        return Err(LodestoneError::decode(format!(
            "Packet 0x{:02x} has {} trailing bytes",
            P::packet_id(),
            buffer.remaining()
        )));
    }
    Ok(packet)
}

fn write_body<P: Packet>(packet: &P) -> Result<RawPacket> {
    let mut buffer = MinecraftPacketBuffer::new();
    packet.write_to_buffer(&mut buffer)?;
    Ok(RawPacket {
        id: P::packet_id(),
        body: buffer.into_inner(),
    })
}

fn illegal(state: SubProtocol, direction: Direction, id: i32) -> LodestoneError {
    LodestoneError::IllegalPacket {
        state,
        direction,
        id,
    }
}

/// Everything a client may send.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerboundPacket {
    Handshake(HandshakePacket),
    StatusQuery(StatusQueryPacket),
    StatusPing(StatusPingPacket),
    LoginStart(LoginStartPacket),
    EncryptionResponse(EncryptionResponsePacket),
    KeepAlive(ClientKeepAlivePacket),
    PlayerAbilities(ClientPlayerAbilitiesPacket),
    /// In-game packet this crate does not interpret.
    Game(RawPacket),
}

impl PacketFamily for ServerboundPacket {
    const DIRECTION: Direction = Direction::Serverbound;

    fn decode(state: SubProtocol, raw: RawPacket) -> Result<Self> {
        let packet = match (state, raw.id) {
            (SubProtocol::Handshake, 0x00) => Self::Handshake(read_body(raw.body)?),
            (SubProtocol::Status, 0x00) => Self::StatusQuery(read_body(raw.body)?),
            (SubProtocol::Status, 0x01) => Self::StatusPing(read_body(raw.body)?),
            (SubProtocol::Login, 0x00) => Self::LoginStart(read_body(raw.body)?),
            (SubProtocol::Login, 0x01) => Self::EncryptionResponse(read_body(raw.body)?),
            (SubProtocol::Game, 0x0B) => Self::KeepAlive(read_body(raw.body)?),
            (SubProtocol::Game, 0x13) => Self::PlayerAbilities(read_body(raw.body)?),
            (SubProtocol::Game, _) => Self::Game(raw),
            (state, id) => return Err(illegal(state, Self::DIRECTION, id)),
        };
        Ok(packet)
    }

    fn encode(&self) -> Result<RawPacket> {
        match self {
            Self::Handshake(p) => write_body(p),
            Self::StatusQuery(p) => write_body(p),
            Self::StatusPing(p) => write_body(p),
            Self::LoginStart(p) => write_body(p),
            Self::EncryptionResponse(p) => write_body(p),
            Self::KeepAlive(p) => write_body(p),
            Self::PlayerAbilities(p) => write_body(p),
            Self::Game(raw) => Ok(raw.clone()),
        }
    }

    fn sub_protocol(&self) -> SubProtocol {
        match self {
            Self::Handshake(_) => SubProtocol::Handshake,
            Self::StatusQuery(_) | Self::StatusPing(_) => SubProtocol::Status,
            Self::LoginStart(_) | Self::EncryptionResponse(_) => SubProtocol::Login,
            Self::KeepAlive(_) | Self::PlayerAbilities(_) | Self::Game(_) => SubProtocol::Game,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Handshake(_) => "Handshake",
            Self::StatusQuery(_) => "StatusQuery",
            Self::StatusPing(_) => "StatusPing",
            Self::LoginStart(_) => "LoginStart",
            Self::EncryptionResponse(_) => "EncryptionResponse",
            Self::KeepAlive(_) => "ClientKeepAlive",
            Self::PlayerAbilities(_) => "ClientPlayerAbilities",
            Self::Game(_) => "Game",
        }
    }
}

/// Everything a server may send.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientboundPacket {
    StatusResponse(StatusResponsePacket),
    StatusPong(StatusPongPacket),
    LoginDisconnect(LoginDisconnectPacket),
    EncryptionRequest(EncryptionRequestPacket),
    LoginSuccess(LoginSuccessPacket),
    LoginSetCompression(LoginSetCompressionPacket),
    Disconnect(ServerDisconnectPacket),
    KeepAlive(ServerKeepAlivePacket),
    SetCompression(ServerSetCompressionPacket),
    PlayerAbilities(ServerPlayerAbilitiesPacket),
    ChunkData(ServerChunkDataPacket),
    EntityMetadata(ServerEntityMetadataPacket),
    /// In-game packet this crate does not interpret.
    Game(RawPacket),
}

impl PacketFamily for ClientboundPacket {
    const DIRECTION: Direction = Direction::Clientbound;

    fn decode(state: SubProtocol, raw: RawPacket) -> Result<Self> {
        let packet = match (state, raw.id) {
            (SubProtocol::Status, 0x00) => Self::StatusResponse(read_body(raw.body)?),
            (SubProtocol::Status, 0x01) => Self::StatusPong(read_body(raw.body)?),
            (SubProtocol::Login, 0x00) => Self::LoginDisconnect(read_body(raw.body)?),
            (SubProtocol::Login, 0x01) => Self::EncryptionRequest(read_body(raw.body)?),
            (SubProtocol::Login, 0x02) => Self::LoginSuccess(read_body(raw.body)?),
            (SubProtocol::Login, 0x03) => Self::LoginSetCompression(read_body(raw.body)?),
            (SubProtocol::Game, 0x1A) => Self::Disconnect(read_body(raw.body)?),
            (SubProtocol::Game, 0x1F) => Self::KeepAlive(read_body(raw.body)?),
            (SubProtocol::Game, 0x20) => Self::ChunkData(read_body(raw.body)?),
            (SubProtocol::Game, 0x2C) => Self::PlayerAbilities(read_body(raw.body)?),
            (SubProtocol::Game, 0x3C) => Self::EntityMetadata(read_body(raw.body)?),
            (SubProtocol::Game, 0x46) => Self::SetCompression(read_body(raw.body)?),
            (SubProtocol::Game, _) => Self::Game(raw),
            (state, id) => return Err(illegal(state, Self::DIRECTION, id)),
        };
        Ok(packet)
    }

    fn encode(&self) -> Result<RawPacket> {
        match self {
            Self::StatusResponse(p) => write_body(p),
            Self::StatusPong(p) => write_body(p),
            Self::LoginDisconnect(p) => write_body(p),
            Self::EncryptionRequest(p) => write_body(p),
            Self::LoginSuccess(p) => write_body(p),
            Self::LoginSetCompression(p) => write_body(p),
            Self::Disconnect(p) => write_body(p),
            Self::KeepAlive(p) => write_body(p),
            Self::SetCompression(p) => write_body(p),
            Self::PlayerAbilities(p) => write_body(p),
            Self::ChunkData(p) => write_body(p),
            Self::EntityMetadata(p) => write_body(p),
            Self::Game(raw) => Ok(raw.clone()),
        }
    }

    fn sub_protocol(&self) -> SubProtocol {
        match self {
            Self::StatusResponse(_) | Self::StatusPong(_) => SubProtocol::Status,
            Self::LoginDisconnect(_)
            | Self::EncryptionRequest(_)
            | Self::LoginSuccess(_)
            | Self::LoginSetCompression(_) => SubProtocol::Login,
            Self::Disconnect(_)
            | Self::KeepAlive(_)
            | Self::SetCompression(_)
            | Self::PlayerAbilities(_)
            | Self::ChunkData(_)
            | Self::EntityMetadata(_)
            | Self::Game(_) => SubProtocol::Game,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::StatusResponse(_) => "StatusResponse",
            Self::StatusPong(_) => "StatusPong",
            Self::LoginDisconnect(_) => "LoginDisconnect",
            Self::EncryptionRequest(_) => "EncryptionRequest",
            Self::LoginSuccess(_) => "LoginSuccess",
            Self::LoginSetCompression(_) => "LoginSetCompression",
            Self::Disconnect(_) => "ServerDisconnect",
            Self::KeepAlive(_) => "ServerKeepAlive",
            Self::SetCompression(_) => "ServerSetCompression",
            Self::PlayerAbilities(_) => "ServerPlayerAbilities",
            Self::ChunkData(_) => "ServerChunkData",
            Self::EntityMetadata(_) => "ServerEntityMetadata",
            Self::Game(_) => "Game",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::state::HandshakeIntent;
    use assert_matches::assert_matches;

    #[test]
    fn test_handshake_through_family() {
        let packet = ServerboundPacket::Handshake(HandshakePacket {
            protocol_version: 340,
            server_address: "localhost".to_owned(),
            server_port: 25565,
            intent: HandshakeIntent::Login,
        });
        let raw = packet.encode().unwrap();
        assert_eq!(raw.id, 0x00);
        assert_eq!(
            ServerboundPacket::decode(SubProtocol::Handshake, raw).unwrap(),
            packet
        );
    }

    #[test]
    fn test_same_id_means_different_packets_per_state() {
        let ping = RawPacket {
            id: 0x01,
            body: 42i64.to_be_bytes().to_vec(),
        };
        assert_matches!(
            ServerboundPacket::decode(SubProtocol::Status, ping.clone()),
            Ok(ServerboundPacket::StatusPing(StatusPingPacket { time: 42 }))
        );
        // 0x01 in Login is an encryption response, which this body cannot be.
        assert!(ServerboundPacket::decode(SubProtocol::Login, ping).is_err());
    }

    #[test]
    fn test_illegal_packet_for_state() {
        let raw = RawPacket {
            id: 0x05,
            body: vec![],
        };
        assert_matches!(
            ServerboundPacket::decode(SubProtocol::Status, raw.clone()),
            Err(LodestoneError::IllegalPacket {
                state: SubProtocol::Status,
                direction: Direction::Serverbound,
                id: 0x05
            })
        );
        assert_matches!(
            ClientboundPacket::decode(SubProtocol::Handshake, raw),
            Err(LodestoneError::IllegalPacket { .. })
        );
    }

    #[test]
    fn test_unknown_game_packets_pass_through() {
        let raw = RawPacket {
            id: 0x33,
            body: vec![1, 2, 3],
        };
        assert_eq!(
            ClientboundPacket::decode(SubProtocol::Game, raw.clone()).unwrap(),
            ClientboundPacket::Game(raw.clone())
        );
        assert_eq!(ClientboundPacket::Game(raw.clone()).encode().unwrap(), raw);
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let raw = RawPacket {
            id: 0x0B,
            body: vec![0; 9],
        };
        assert!(ServerboundPacket::decode(SubProtocol::Game, raw).is_err());
    }

    #[test]
    fn test_sub_protocol_tags() {
        let keep_alive = ClientboundPacket::KeepAlive(ServerKeepAlivePacket { ping_id: 1 });
        assert_eq!(keep_alive.sub_protocol(), SubProtocol::Game);
        assert_eq!(keep_alive.name(), "ServerKeepAlive");
        let query = ServerboundPacket::StatusQuery(StatusQueryPacket);
        assert_eq!(query.sub_protocol(), SubProtocol::Status);
    }
}
