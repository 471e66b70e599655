use super::buffer::MinecraftPacketBuffer;
use super::chat;
use super::packet::Packet;
use crate::auth::GameProfile;
use crate::error::{LodestoneError, Result};
use crate::net::crypt::{self, SharedSecret};
use rsa::RsaPrivateKey;
use uuid::Uuid;

/// Login start packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginStartPacket {
    pub username: String,
}

impl Packet for LoginStartPacket {
    fn packet_id() -> i32 {
        0x00
    }

    fn read_from_buffer(buffer: &mut MinecraftPacketBuffer) -> Result<Self> {
        Ok(LoginStartPacket {
            username: buffer.read_string()?,
        })
    }

    fn write_to_buffer(&self, buffer: &mut MinecraftPacketBuffer) -> Result<()> {
        buffer.write_string(&self.username);
        Ok(())
    }
}

/// Shared secret and verify token, both RSA-encrypted with the server's public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionResponsePacket {
    pub shared_secret: Vec<u8>,
    pub verify_token: Vec<u8>,
}

impl EncryptionResponsePacket {
    pub fn new(secret: &SharedSecret, public_key_der: &[u8], verify_token: &[u8]) -> Result<Self> {
        Ok(EncryptionResponsePacket {
            shared_secret: crypt::rsa_encrypt(public_key_der, secret)?,
            verify_token: crypt::rsa_encrypt(public_key_der, verify_token)?,
        })
    }

    pub fn decrypt_secret(&self, private_key: &RsaPrivateKey) -> Result<SharedSecret> {
        let secret = crypt::rsa_decrypt(private_key, &self.shared_secret)?;
        SharedSecret::try_from(secret.as_slice()).map_err(|_| {
            LodestoneError::Crypto(format!("Shared secret has {} bytes", secret.len()))
        })
    }

    pub fn decrypt_verify_token(&self, private_key: &RsaPrivateKey) -> Result<Vec<u8>> {
        crypt::rsa_decrypt(private_key, &self.verify_token)
    }
}

impl Packet for EncryptionResponsePacket {
    fn packet_id() -> i32 {
        0x01
    }

    fn read_from_buffer(buffer: &mut MinecraftPacketBuffer) -> Result<Self> {
        Ok(EncryptionResponsePacket {
            shared_secret: buffer.read_byte_array()?,
            verify_token: buffer.read_byte_array()?,
        })
    }

    fn write_to_buffer(&self, buffer: &mut MinecraftPacketBuffer) -> Result<()> {
        buffer.write_byte_array(&self.shared_secret);
        buffer.write_byte_array(&self.verify_token);
        Ok(())
    }
}

/// Login disconnect packet. `reason` holds a JSON chat component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginDisconnectPacket {
    pub reason: String,
}

impl LoginDisconnectPacket {
    pub fn new(reason: &str) -> Self {
        LoginDisconnectPacket {
            reason: chat::escape(reason),
        }
    }
}

impl Packet for LoginDisconnectPacket {
    fn packet_id() -> i32 {
        0x00
    }

    fn read_from_buffer(buffer: &mut MinecraftPacketBuffer) -> Result<Self> {
        Ok(LoginDisconnectPacket {
            reason: buffer.read_string()?,
        })
    }

    fn write_to_buffer(&self, buffer: &mut MinecraftPacketBuffer) -> Result<()> {
        buffer.write_string(&self.reason);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionRequestPacket {
    pub server_id: String,
    /// DER-encoded SubjectPublicKeyInfo.
    pub public_key: Vec<u8>,
    pub verify_token: Vec<u8>,
}

impl Packet for EncryptionRequestPacket {
    fn packet_id() -> i32 {
        0x01
    }

    fn read_from_buffer(buffer: &mut MinecraftPacketBuffer) -> Result<Self> {
        Ok(EncryptionRequestPacket {
            server_id: buffer.read_string()?,
            public_key: buffer.read_byte_array()?,
            verify_token: buffer.read_byte_array()?,
        })
    }

    fn write_to_buffer(&self, buffer: &mut MinecraftPacketBuffer) -> Result<()> {
        buffer.write_string(&self.server_id);
        buffer.write_byte_array(&self.public_key);
        buffer.write_byte_array(&self.verify_token);
        Ok(())
    }
}

/// Login success packet. In 1.12.2 the UUID travels as a hyphenated string.
#[derive(Debug, Clone, PartialEq)]
pub struct LoginSuccessPacket {
    pub profile: GameProfile,
}

impl Packet for LoginSuccessPacket {
    fn packet_id() -> i32 {
        0x02
    }

    fn read_from_buffer(buffer: &mut MinecraftPacketBuffer) -> Result<Self> {
        let raw_id = buffer.read_string()?;
        let id = Uuid::parse_str(&raw_id)
            .map_err(|e| LodestoneError::decode(format!("Invalid UUID {:?}: {}", raw_id, e)))?;
        let name = buffer.read_string()?;
        Ok(LoginSuccessPacket {
            profile: GameProfile::new(id, name),
        })
    }

    fn write_to_buffer(&self, buffer: &mut MinecraftPacketBuffer) -> Result<()> {
        buffer.write_string(&self.profile.id.hyphenated().to_string());
        buffer.write_string(&self.profile.name);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginSetCompressionPacket {
    pub threshold: i32,
}

impl Packet for LoginSetCompressionPacket {
    fn packet_id() -> i32 {
        0x03
    }

    fn read_from_buffer(buffer: &mut MinecraftPacketBuffer) -> Result<Self> {
        Ok(LoginSetCompressionPacket {
            threshold: buffer.read_varint()?,
        })
    }

    fn write_to_buffer(&self, buffer: &mut MinecraftPacketBuffer) -> Result<()> {
        buffer.write_varint(self.threshold);
        Ok(())
    }
}
