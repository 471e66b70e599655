use byteorder::{BigEndian, ByteOrder};
use std::io::{self, Read, Write};
use uuid::Uuid;

/// Longest string the protocol allows, in characters.
pub const MAX_STRING_LENGTH: usize = 32767;

/// Minecraft packet buffer. Contains the buffer and the cursor.
/// The cursor is used to keep track of the current read position in the buffer.
/// Writes always append to the end of the buffer.
#[derive(Debug, Default, Clone)]
pub struct MinecraftPacketBuffer {
    pub buffer: Vec<u8>,
    cursor: usize,
}

fn eof(what: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("Not enough bytes to read {}", what),
    )
}

impl MinecraftPacketBuffer {
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            cursor: 0,
        }
    }

    /// Creates a new Minecraft packet buffer from a byte array.
    /// The cursor is initialized to 0.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            buffer: bytes,
            cursor: 0,
        }
    }

    pub fn get_cursor(&self) -> usize {
        self.cursor
    }

    /// Number of bytes not yet consumed by reads.
    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.cursor
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    pub fn peek_byte(&self) -> Option<u8> {
        self.buffer.get(self.cursor).copied()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }

    fn take(&mut self, len: usize, what: &str) -> io::Result<&[u8]> {
        if len > self.remaining() {
            return Err(eof(what));
        }
        let start = self.cursor;
        self.cursor += len;
        Ok(&self.buffer[start..start + len])
    }

    /// Writes a VarInt to the buffer.
    /// A VarInt is encoded using 7 bits per byte, with the most significant bit of each byte set
    /// to 1 unless it is the final byte in the encoded representation.
    pub fn write_varint(&mut self, value: i32) {
        let mut value = value as u32;
        while (value & !0x7F) != 0 {
            self.buffer.push(((value & 0x7F) as u8) | 0x80);
            value >>= 7;
        }
        self.buffer.push((value & 0x7F) as u8);
    }

    pub fn read_varint(&mut self) -> io::Result<i32> {
        let mut result: u32 = 0;
        let mut shift = 0;

        loop {
            let byte = self.take(1, "VarInt")?[0];
            result |= ((byte & 0x7F) as u32) << shift;
            shift += 7;

            if (byte & 0x80) == 0 {
                break;
            }

            if shift >= 35 {
                return Err(io::Error::new(io::ErrorKind::InvalidData, "VarInt too big"));
            }
        }

        Ok(result as i32)
    }

    pub fn write_varlong(&mut self, value: i64) {
        let mut value = value as u64;
        while (value & !0x7F) != 0 {
            self.buffer.push(((value & 0x7F) as u8) | 0x80);
            value >>= 7;
        }
        self.buffer.push((value & 0x7F) as u8);
    }

    pub fn read_varlong(&mut self) -> io::Result<i64> {
        let mut result: u64 = 0;
        let mut shift = 0;

        loop {
            let byte = self.take(1, "VarLong")?[0];
            result |= ((byte & 0x7F) as u64) << shift;
            shift += 7;

            if (byte & 0x80) == 0 {
                break;
            }

            if shift >= 70 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "VarLong too big",
                ));
            }
        }

        Ok(result as i64)
    }

    /// Writes a string prefixed with its byte length as a VarInt.
    pub fn write_string(&mut self, value: &str) {
        let bytes = value.as_bytes();
        self.write_varint(bytes.len() as i32);
        self.buffer.extend_from_slice(bytes);
    }

    pub fn read_string(&mut self) -> io::Result<String> {
        let length = self.read_varint()?;
        if length < 0 || length as usize > MAX_STRING_LENGTH * 4 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid string length {}", length),
            ));
        }
        let bytes = self.take(length as usize, "the full string")?.to_vec();
        let value = String::from_utf8(bytes).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                "Failed to convert bytes to UTF-8 string",
            )
        })?;
        if value.chars().count() > MAX_STRING_LENGTH {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "String exceeds maximum length",
            ));
        }
        Ok(value)
    }

    /// Writes a UUID as two big-endian longs.
    pub fn write_uuid(&mut self, value: Uuid) {
        self.buffer.extend_from_slice(value.as_bytes());
    }

    pub fn read_uuid(&mut self) -> io::Result<Uuid> {
        let bytes = self.take(16, "UUID")?;
        Uuid::from_slice(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    pub fn read_u8(&mut self) -> io::Result<u8> {
        Ok(self.take(1, "u8")?[0])
    }

    pub fn write_i8(&mut self, value: i8) {
        self.buffer.push(value as u8);
    }

    pub fn read_i8(&mut self) -> io::Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buffer.push(value as u8);
    }

    pub fn read_bool(&mut self) -> io::Result<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid boolean byte {}", other),
            )),
        }
    }

    // Write an u16 in network (big-endian) order.
    pub fn write_u16(&mut self, value: u16) {
        let mut bytes = [0u8; 2];
        BigEndian::write_u16(&mut bytes, value);
        self.buffer.extend_from_slice(&bytes);
    }

    pub fn read_u16(&mut self) -> io::Result<u16> {
        Ok(BigEndian::read_u16(self.take(2, "u16")?))
    }

    pub fn write_i16(&mut self, value: i16) {
        self.write_u16(value as u16);
    }

    pub fn read_i16(&mut self) -> io::Result<i16> {
        Ok(BigEndian::read_i16(self.take(2, "i16")?))
    }

    pub fn write_i32(&mut self, value: i32) {
        let mut bytes = [0u8; 4];
        BigEndian::write_i32(&mut bytes, value);
        self.buffer.extend_from_slice(&bytes);
    }

    pub fn read_i32(&mut self) -> io::Result<i32> {
        Ok(BigEndian::read_i32(self.take(4, "i32")?))
    }

    pub fn write_i64(&mut self, value: i64) {
        let mut bytes = [0u8; 8];
        BigEndian::write_i64(&mut bytes, value);
        self.buffer.extend_from_slice(&bytes);
    }

    pub fn read_i64(&mut self) -> io::Result<i64> {
        Ok(BigEndian::read_i64(self.take(8, "i64")?))
    }

    pub fn write_f32(&mut self, value: f32) {
        let mut bytes = [0u8; 4];
        BigEndian::write_f32(&mut bytes, value);
        self.buffer.extend_from_slice(&bytes);
    }

    pub fn read_f32(&mut self) -> io::Result<f32> {
        Ok(BigEndian::read_f32(self.take(4, "f32")?))
    }

    pub fn write_f64(&mut self, value: f64) {
        let mut bytes = [0u8; 8];
        BigEndian::write_f64(&mut bytes, value);
        self.buffer.extend_from_slice(&bytes);
    }

    pub fn read_f64(&mut self) -> io::Result<f64> {
        Ok(BigEndian::read_f64(self.take(8, "f64")?))
    }

    pub fn write_bytes_raw(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    pub fn read_bytes_raw(&mut self, len: usize) -> io::Result<Vec<u8>> {
        Ok(self.take(len, "byte array")?.to_vec())
    }

    /// Reads everything left in the buffer.
    pub fn read_remaining(&mut self) -> Vec<u8> {
        let rest = self.buffer[self.cursor..].to_vec();
        self.cursor = self.buffer.len();
        rest
    }

    /// Writes a byte array prefixed with its length as a VarInt.
    pub fn write_byte_array(&mut self, bytes: &[u8]) {
        self.write_varint(bytes.len() as i32);
        self.buffer.extend_from_slice(bytes);
    }

    pub fn read_byte_array(&mut self) -> io::Result<Vec<u8>> {
        let length = self.read_varint()?;
        if length < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Negative array length {}", length),
            ));
        }
        self.read_bytes_raw(length as usize)
    }

    pub fn write_longs(&mut self, values: &[u64]) {
        for value in values {
            self.write_i64(*value as i64);
        }
    }

    pub fn read_longs(&mut self, count: usize) -> io::Result<Vec<u64>> {
        if count.saturating_mul(8) > self.remaining() {
            return Err(eof("long array"));
        }
        let mut longs = Vec::with_capacity(count);
        for _ in 0..count {
            longs.push(self.read_i64()? as u64);
        }
        Ok(longs)
    }
}

impl Read for MinecraftPacketBuffer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let to_read = buf.len().min(self.remaining());
        buf[..to_read].copy_from_slice(&self.buffer[self.cursor..self.cursor + to_read]);
        self.cursor += to_read;
        Ok(to_read)
    }
}

impl Write for MinecraftPacketBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
