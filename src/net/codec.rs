//! Frame layer: varint length prefix, optional zlib compression and optional
//! stream encryption underneath.
//!
//! ```text
//! uncompressed: [len][id][body]
//! compressed:   [len][data_len][zlib(id + body)]   data_len == 0 means "stored"
//! ```

use super::crypt::{SharedSecret, StreamDecryptor, StreamEncryptor};
use crate::error::{LodestoneError, Result};
use crate::protocol::buffer::MinecraftPacketBuffer;
use crate::protocol::packet::RawPacket;
use bytes::{Buf, BufMut, BytesMut};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};
use tokio_util::codec::{Decoder, Encoder};

/// Largest frame a three byte length prefix can describe.
pub const MAX_FRAME_LENGTH: usize = (1 << 21) - 1;
/// Largest payload accepted after decompression.
pub const MAX_DECOMPRESSED_LENGTH: usize = 1 << 23;

/// Reads a varint from the front of `src` without consuming it.
/// Returns the value and its encoded width, or `None` if more bytes are needed.
fn peek_varint(src: &[u8], max_bytes: usize) -> Result<Option<(i32, usize)>> {
    let mut value: i32 = 0;
    for (position, byte) in src.iter().take(max_bytes).enumerate() {
        value |= ((byte & 0x7F) as i32) << (7 * position);
        if byte & 0x80 == 0 {
            return Ok(Some((value, position + 1)));
        }
    }
    if src.len() >= max_bytes {
        return Err(LodestoneError::decode("Frame length prefix too long"));
    }
    Ok(None)
}

fn put_varint(dst: &mut BytesMut, value: i32) {
    let mut value = value as u32;
    loop {
        if value & !0x7F == 0 {
            dst.put_u8(value as u8);
            return;
        }
        dst.put_u8((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
}

fn split_packet(payload: Vec<u8>) -> Result<RawPacket> {
    let mut buffer = MinecraftPacketBuffer::from_bytes(payload);
    let id = buffer.read_varint()?;
    Ok(RawPacket {
        id,
        body: buffer.read_remaining(),
    })
}

/// Inbound half of the frame layer.
#[derive(Default)]
pub struct PacketDecoder {
    threshold: Option<usize>,
    decryptor: Option<StreamDecryptor>,
    /// Bytes at the front of the read buffer that are already plaintext.
    decrypted: usize,
}

impl PacketDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A negative threshold turns compression off.
    pub fn set_compression_threshold(&mut self, threshold: i32) {
        self.threshold = usize::try_from(threshold).ok();
    }

    /// Everything still buffered was read after the frame that triggered this
    /// call, so all of it is ciphertext.
    pub fn enable_encryption(&mut self, secret: &SharedSecret) {
        self.decryptor = Some(StreamDecryptor::new(secret));
        self.decrypted = 0;
    }

    pub fn is_encrypted(&self) -> bool {
        self.decryptor.is_some()
    }

    fn decompress(&self, frame: &[u8], threshold: usize) -> Result<Vec<u8>> {
        let Some((data_length, width)) = peek_varint(frame, 5)? else {
            return Err(LodestoneError::decode("Truncated data length"));
        };
        let compressed = &frame[width..];
        if data_length == 0 {
            return Ok(compressed.to_vec());
        }

        let data_length = usize::try_from(data_length)
            .map_err(|_| LodestoneError::decode("Negative data length"))?;
        if data_length < threshold {
            return Err(LodestoneError::decode(format!(
                "Badly compressed packet: size {} is below threshold {}",
                data_length, threshold
            )));
        }
        if data_length > MAX_DECOMPRESSED_LENGTH {
            return Err(LodestoneError::decode(format!(
                "Badly compressed packet: size {} is above maximum {}",
                data_length, MAX_DECOMPRESSED_LENGTH
            )));
        }

        let mut payload = Vec::with_capacity(data_length);
        ZlibDecoder::new(compressed)
            .take(data_length as u64 + 1)
            .read_to_end(&mut payload)
            .map_err(|e| LodestoneError::decode(format!("Invalid zlib data: {}", e)))?;
        if payload.len() != data_length {
            return Err(LodestoneError::decode(format!(
                "Decompressed {} bytes, header said {}",
                payload.len(),
                data_length
            )));
        }
        Ok(payload)
    }
}

impl Decoder for PacketDecoder {
    type Item = RawPacket;
    type Error = LodestoneError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<RawPacket>> {
        if let Some(decryptor) = self.decryptor.as_mut() {
            if self.decrypted < src.len() {
                decryptor.decrypt(&mut src[self.decrypted..]);
                self.decrypted = src.len();
            }
        }

        let Some((length, width)) = peek_varint(src, 3)? else {
            return Ok(None);
        };
        let length = usize::try_from(length)
            .map_err(|_| LodestoneError::decode("Negative frame length"))?;
        if length > MAX_FRAME_LENGTH {
            return Err(LodestoneError::decode(format!(
                "Frame of {} bytes exceeds {}",
                length, MAX_FRAME_LENGTH
            )));
        }
        if src.len() < width + length {
            src.reserve(width + length - src.len());
            return Ok(None);
        }

        src.advance(width);
        let frame = src.split_to(length);
        if self.decryptor.is_some() {
            self.decrypted -= width + length;
        }

        let payload = match self.threshold {
            Some(threshold) => self.decompress(&frame, threshold)?,
            None => frame.to_vec(),
        };
        split_packet(payload).map(Some)
    }
}

/// Outbound half of the frame layer.
#[derive(Default)]
pub struct PacketEncoder {
    threshold: Option<usize>,
    encryptor: Option<StreamEncryptor>,
}

impl PacketEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_compression_threshold(&mut self, threshold: i32) {
        self.threshold = usize::try_from(threshold).ok();
    }

    pub fn enable_encryption(&mut self, secret: &SharedSecret) {
        self.encryptor = Some(StreamEncryptor::new(secret));
    }
}

impl Encoder<RawPacket> for PacketEncoder {
    type Error = LodestoneError;

    fn encode(&mut self, packet: RawPacket, dst: &mut BytesMut) -> Result<()> {
        let mut payload = BytesMut::with_capacity(packet.body.len() + 5);
        put_varint(&mut payload, packet.id);
        payload.extend_from_slice(&packet.body);

        let frame = match self.threshold {
            Some(threshold) if payload.len() >= threshold => {
                let mut frame = BytesMut::new();
                put_varint(&mut frame, payload.len() as i32);
                let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(&payload)?;
                frame.extend_from_slice(&encoder.finish()?);
                frame
            }
            Some(_) => {
                let mut frame = BytesMut::with_capacity(payload.len() + 1);
                put_varint(&mut frame, 0);
                frame.extend_from_slice(&payload);
                frame
            }
            None => payload,
        };

        if frame.len() > MAX_FRAME_LENGTH {
            return Err(LodestoneError::encode(format!(
                "Packet 0x{:02x} needs a {} byte frame",
                packet.id,
                frame.len()
            )));
        }

        let start = dst.len();
        put_varint(dst, frame.len() as i32);
        dst.extend_from_slice(&frame);
        if let Some(encryptor) = self.encryptor.as_mut() {
            encryptor.encrypt(&mut dst[start..]);
        }
        Ok(())
    }
}
