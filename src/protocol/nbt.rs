//! Named binary tag trees. The protocol core treats them as opaque values that
//! are either present (a named root compound) or absent (a single zero byte).

use super::buffer::MinecraftPacketBuffer;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::collections::HashMap;
use std::io::{self, Read, Write};

const TAG_COMPOUND: u8 = 10;

/// Nesting limit for lists and compounds read off the wire.
const MAX_DEPTH: usize = 512;

#[derive(Debug, Clone, PartialEq)]
pub enum Tag {
    End,
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    ByteArray(Vec<i8>),
    String(String),
    List(Vec<Tag>),
    Compound(HashMap<String, Tag>),
    IntArray(Vec<i32>),
    LongArray(Vec<i64>),
}

fn invalid(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

fn unwritable(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, msg)
}

fn read_length<R: Read>(reader: &mut R) -> io::Result<usize> {
    let length = reader.read_i32::<BigEndian>()?;
    if length < 0 {
        return Err(invalid(format!("Negative tag length: {}", length)));
    }
    Ok(length as usize)
}

fn read_utf<R: Read>(reader: &mut R) -> io::Result<String> {
    let length = reader.read_u16::<BigEndian>()?;
    let mut bytes = vec![0u8; length as usize];
    reader.read_exact(&mut bytes)?;
    String::from_utf8(bytes).map_err(|e| invalid(e.to_string()))
}

fn write_utf<W: Write>(writer: &mut W, value: &str) -> io::Result<()> {
    let length = u16::try_from(value.len()).map_err(|_| {
        unwritable(format!(
            "Tag string of {} bytes exceeds {} bytes",
            value.len(),
            u16::MAX
        ))
    })?;
    writer.write_u16::<BigEndian>(length)?;
    writer.write_all(value.as_bytes())
}

impl Tag {
    pub fn get_type_id(&self) -> u8 {
        match self {
            Tag::End => 0,
            Tag::Byte(_) => 1,
            Tag::Short(_) => 2,
            Tag::Int(_) => 3,
            Tag::Long(_) => 4,
            Tag::Float(_) => 5,
            Tag::Double(_) => 6,
            Tag::ByteArray(_) => 7,
            Tag::String(_) => 8,
            Tag::List(_) => 9,
            Tag::Compound(_) => 10,
            Tag::IntArray(_) => 11,
            Tag::LongArray(_) => 12,
        }
    }

    /// Reads a named tag. `Tag::End` is returned with an empty name.
    pub fn read<R: Read>(reader: &mut R) -> io::Result<(String, Tag)> {
        Self::read_named(reader, 0)
    }

    fn read_named<R: Read>(reader: &mut R, depth: usize) -> io::Result<(String, Tag)> {
        let type_id = reader.read_u8()?;
        if type_id == 0 {
            return Ok((String::new(), Tag::End));
        }
        let name = read_utf(reader)?;
        let tag = Tag::read_payload(reader, type_id, depth)?;
        Ok((name, tag))
    }

    fn read_payload<R: Read>(reader: &mut R, type_id: u8, depth: usize) -> io::Result<Tag> {
        if depth > MAX_DEPTH {
            return Err(invalid("Tag nesting too deep".to_owned()));
        }
        match type_id {
            0 => Ok(Tag::End),
            1 => Ok(Tag::Byte(reader.read_i8()?)),
            2 => Ok(Tag::Short(reader.read_i16::<BigEndian>()?)),
            3 => Ok(Tag::Int(reader.read_i32::<BigEndian>()?)),
            4 => Ok(Tag::Long(reader.read_i64::<BigEndian>()?)),
            5 => Ok(Tag::Float(reader.read_f32::<BigEndian>()?)),
            6 => Ok(Tag::Double(reader.read_f64::<BigEndian>()?)),
            7 => {
                let length = read_length(reader)?;
                let mut bytes = Vec::new();
                for _ in 0..length {
                    bytes.push(reader.read_i8()?);
                }
                Ok(Tag::ByteArray(bytes))
            }
            8 => Ok(Tag::String(read_utf(reader)?)),
            9 => {
                let list_type = reader.read_u8()?;
                let length = read_length(reader)?;
                let mut list = Vec::new();
                for _ in 0..length {
                    list.push(Tag::read_payload(reader, list_type, depth + 1)?);
                }
                Ok(Tag::List(list))
            }
            10 => {
                let mut compound = HashMap::new();
                loop {
                    let (name, tag) = Tag::read_named(reader, depth + 1)?;
                    if let Tag::End = tag {
                        break;
                    }
                    compound.insert(name, tag);
                }
                Ok(Tag::Compound(compound))
            }
            11 => {
                let length = read_length(reader)?;
                let mut ints = Vec::new();
                for _ in 0..length {
                    ints.push(reader.read_i32::<BigEndian>()?);
                }
                Ok(Tag::IntArray(ints))
            }
            12 => {
                let length = read_length(reader)?;
                let mut longs = Vec::new();
                for _ in 0..length {
                    longs.push(reader.read_i64::<BigEndian>()?);
                }
                Ok(Tag::LongArray(longs))
            }
            _ => Err(invalid(format!("Invalid tag type: {}", type_id))),
        }
    }

    pub fn write<W: Write>(&self, writer: &mut W, name: &str) -> io::Result<()> {
        writer.write_u8(self.get_type_id())?;

        if !matches!(self, Tag::End) {
            write_utf(writer, name)?;
        }

        self.write_payload(writer)
    }

    fn write_payload<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        match self {
            Tag::End => Ok(()),
            Tag::Byte(v) => writer.write_i8(*v),
            Tag::Short(v) => writer.write_i16::<BigEndian>(*v),
            Tag::Int(v) => writer.write_i32::<BigEndian>(*v),
            Tag::Long(v) => writer.write_i64::<BigEndian>(*v),
            Tag::Float(v) => writer.write_f32::<BigEndian>(*v),
            Tag::Double(v) => writer.write_f64::<BigEndian>(*v),
            Tag::ByteArray(v) => {
                writer.write_i32::<BigEndian>(v.len() as i32)?;
                for &b in v {
                    writer.write_i8(b)?;
                }
                Ok(())
            }
            Tag::String(v) => write_utf(writer, v),
            Tag::List(v) => {
                let type_id = v.first().map_or(0, Tag::get_type_id);
                if let Some(other) = v.iter().find(|tag| tag.get_type_id() != type_id) {
                    return Err(unwritable(format!(
                        "List of type {} contains a tag of type {}",
                        type_id,
                        other.get_type_id()
                    )));
                }
                writer.write_u8(type_id)?;
                writer.write_i32::<BigEndian>(v.len() as i32)?;
                for tag in v {
                    tag.write_payload(writer)?;
                }
                Ok(())
            }
            Tag::Compound(v) => {
                for (name, tag) in v {
                    tag.write(writer, name)?;
                }
                Tag::End.write(writer, "")
            }
            Tag::IntArray(v) => {
                writer.write_i32::<BigEndian>(v.len() as i32)?;
                for &i in v {
                    writer.write_i32::<BigEndian>(i)?;
                }
                Ok(())
            }
            Tag::LongArray(v) => {
                writer.write_i32::<BigEndian>(v.len() as i32)?;
                for &l in v {
                    writer.write_i64::<BigEndian>(l)?;
                }
                Ok(())
            }
        }
    }

    pub fn as_compound(&self) -> Option<&HashMap<String, Tag>> {
        match self {
            Tag::Compound(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&String> {
        match self {
            Tag::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Tag::Int(n) => Some(*n),
            _ => None,
        }
    }
}

impl MinecraftPacketBuffer {
    /// Reads a root compound, or `None` when the next byte is the zero marker.
    pub fn read_nbt(&mut self) -> io::Result<Option<Tag>> {
        match self.peek_byte() {
            Some(0) => {
                self.read_u8()?;
                Ok(None)
            }
            Some(TAG_COMPOUND) => {
                let (_, tag) = Tag::read(self)?;
                Ok(Some(tag))
            }
            Some(other) => Err(invalid(format!(
                "Expected a compound tag at the root, got type {}",
                other
            ))),
            None => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "Not enough bytes to read NBT",
            )),
        }
    }

    pub fn write_nbt(&mut self, tag: Option<&Tag>) -> io::Result<()> {
        match tag {
            None => {
                self.write_u8(0);
                Ok(())
            }
            Some(tag @ Tag::Compound(_)) => {
                let mut bytes = Vec::new();
                tag.write(&mut bytes, "")?;
                self.write_bytes_raw(&bytes);
                Ok(())
            }
            Some(other) => Err(unwritable(format!(
                "Root tag must be a compound, got type {}",
                other.get_type_id()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_compound() -> Tag {
        let mut inner = HashMap::new();
        inner.insert("name".to_owned(), Tag::String("chest".to_owned()));
        inner.insert("slots".to_owned(), Tag::IntArray(vec![1, 2, 3]));

        let mut root = HashMap::new();
        root.insert("x".to_owned(), Tag::Int(12));
        root.insert("y".to_owned(), Tag::Short(64));
        root.insert("id".to_owned(), Tag::String("minecraft:chest".to_owned()));
        root.insert("items".to_owned(), Tag::List(vec![Tag::Compound(inner)]));
        root.insert("heights".to_owned(), Tag::LongArray(vec![-1, 0, i64::MAX]));
        root.insert("raw".to_owned(), Tag::ByteArray(vec![-3, 4]));
        Tag::Compound(root)
    }

    #[test]
    fn test_compound_survives_buffer() {
        let tag = sample_compound();
        let mut buffer = MinecraftPacketBuffer::new();
        buffer.write_nbt(Some(&tag)).unwrap();

        let mut read = MinecraftPacketBuffer::from_bytes(buffer.buffer);
        assert_eq!(read.read_nbt().unwrap(), Some(tag));
        assert!(read.is_exhausted());
    }

    #[test]
    fn test_absent_tag_is_single_zero_byte() {
        let mut buffer = MinecraftPacketBuffer::new();
        buffer.write_nbt(None).unwrap();
        assert_eq!(buffer.buffer, vec![0]);

        let mut read = MinecraftPacketBuffer::from_bytes(buffer.buffer);
        assert_eq!(read.read_nbt().unwrap(), None);
    }

    #[test]
    fn test_non_compound_root_is_rejected() {
        let mut buffer = MinecraftPacketBuffer::new();
        assert!(buffer.write_nbt(Some(&Tag::Int(3))).is_err());

        let mut read = MinecraftPacketBuffer::from_bytes(vec![3, 0, 0, 0, 0, 0, 1]);
        assert!(read.read_nbt().is_err());
    }

    #[test]
    fn test_oversized_strings_are_rejected() {
        let mut root = HashMap::new();
        root.insert("x".to_owned(), Tag::String("a".repeat(70_000)));
        let mut buffer = MinecraftPacketBuffer::new();
        let err = buffer.write_nbt(Some(&Tag::Compound(root))).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(buffer.buffer.is_empty());

        let mut root = HashMap::new();
        root.insert("n".repeat(65_536), Tag::Byte(1));
        assert!(buffer.write_nbt(Some(&Tag::Compound(root))).is_err());

        let mut root = HashMap::new();
        root.insert("x".to_owned(), Tag::String("a".repeat(65_535)));
        let tag = Tag::Compound(root);
        buffer.write_nbt(Some(&tag)).unwrap();
        let mut read = MinecraftPacketBuffer::from_bytes(buffer.buffer);
        assert_eq!(read.read_nbt().unwrap(), Some(tag));
    }

    #[test]
    fn test_mixed_list_is_rejected() {
        let mut root = HashMap::new();
        root.insert(
            "mixed".to_owned(),
            Tag::List(vec![Tag::Int(1), Tag::String("two".to_owned())]),
        );
        let mut buffer = MinecraftPacketBuffer::new();
        let err = buffer.write_nbt(Some(&Tag::Compound(root))).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(buffer.buffer.is_empty());
    }

    #[test]
    fn test_truncated_compound() {
        let mut buffer = MinecraftPacketBuffer::new();
        buffer.write_nbt(Some(&sample_compound())).unwrap();
        let mut bytes = buffer.buffer;
        bytes.truncate(bytes.len() - 3);

        let mut read = MinecraftPacketBuffer::from_bytes(bytes);
        assert!(read.read_nbt().is_err());
    }
}
