use super::buffer::MinecraftPacketBuffer;
use super::nbt::Tag;
use std::io;

const POSITION_X_SHIFT: u32 = 38;
const POSITION_Y_SHIFT: u32 = 26;
const POSITION_XZ_MASK: i64 = 0x3FFFFFF;
const POSITION_Y_MASK: i64 = 0xFFF;

/// A block position packed into a single long on the wire:
/// 26 bits of x, 12 bits of y, 26 bits of z.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Position {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Position {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Position { x, y, z }
    }

    pub fn pack(&self) -> i64 {
        let x = self.x as i64 & POSITION_XZ_MASK;
        let y = self.y as i64 & POSITION_Y_MASK;
        let z = self.z as i64 & POSITION_XZ_MASK;
        (x << POSITION_X_SHIFT) | (y << POSITION_Y_SHIFT) | z
    }

    pub fn unpack(value: i64) -> Self {
        Position {
            // Arithmetic shifts sign-extend x and z.
            x: (value >> POSITION_X_SHIFT) as i32,
            y: ((value >> POSITION_Y_SHIFT) & POSITION_Y_MASK) as i32,
            z: ((value << POSITION_X_SHIFT) >> POSITION_X_SHIFT) as i32,
        }
    }
}

/// A legacy block state: block id plus 4 bits of data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BlockState {
    pub id: u32,
    pub data: u8,
}

impl BlockState {
    pub const AIR: BlockState = BlockState { id: 0, data: 0 };

    /// Largest block id that still fits next to the data nibble in a VarInt.
    pub const MAX_ID: u32 = (1 << 28) - 1;

    pub fn new(id: u32, data: u8) -> Self {
        BlockState {
            id,
            data: data & 0xF,
        }
    }

    pub fn raw_id(&self) -> io::Result<i32> {
        if self.id > Self::MAX_ID {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Block id {} does not fit in a block state", self.id),
            ));
        }
        Ok(((self.id << 4) | (self.data as u32 & 0xF)) as i32)
    }

    pub fn from_raw_id(raw: i32) -> Self {
        let raw = raw as u32;
        BlockState {
            id: raw >> 4,
            data: (raw & 0xF) as u8,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemStack {
    pub id: i16,
    pub amount: i8,
    pub data: i16,
    pub nbt: Option<Tag>,
}

impl ItemStack {
    pub fn new(id: i16, amount: i8, data: i16) -> Self {
        ItemStack {
            id,
            amount,
            data,
            nbt: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rotation {
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockFace {
    Down,
    Up,
    North,
    South,
    West,
    East,
}

impl BlockFace {
    pub fn id(&self) -> i32 {
        match self {
            BlockFace::Down => 0,
            BlockFace::Up => 1,
            BlockFace::North => 2,
            BlockFace::South => 3,
            BlockFace::West => 4,
            BlockFace::East => 5,
        }
    }

    pub fn from_id(id: i32) -> Option<Self> {
        match id {
            0 => Some(BlockFace::Down),
            1 => Some(BlockFace::Up),
            2 => Some(BlockFace::North),
            3 => Some(BlockFace::South),
            4 => Some(BlockFace::West),
            5 => Some(BlockFace::East),
            _ => None,
        }
    }
}

impl MinecraftPacketBuffer {
    pub fn write_position(&mut self, position: Position) {
        self.write_i64(position.pack());
    }

    pub fn read_position(&mut self) -> io::Result<Position> {
        Ok(Position::unpack(self.read_i64()?))
    }

    pub fn write_block_state(&mut self, state: BlockState) -> io::Result<()> {
        self.write_varint(state.raw_id()?);
        Ok(())
    }

    pub fn read_block_state(&mut self) -> io::Result<BlockState> {
        Ok(BlockState::from_raw_id(self.read_varint()?))
    }

    /// Absent stacks are a single `-1` short.
    pub fn write_item(&mut self, item: Option<&ItemStack>) -> io::Result<()> {
        match item {
            None => self.write_i16(-1),
            Some(item) => {
                self.write_i16(item.id);
                self.write_i8(item.amount);
                self.write_i16(item.data);
                self.write_nbt(item.nbt.as_ref())?;
            }
        }
        Ok(())
    }

    pub fn read_item(&mut self) -> io::Result<Option<ItemStack>> {
        let id = self.read_i16()?;
        if id < 0 {
            return Ok(None);
        }
        Ok(Some(ItemStack {
            id,
            amount: self.read_i8()?,
            data: self.read_i16()?,
            nbt: self.read_nbt()?,
        }))
    }

    pub fn write_rotation(&mut self, rotation: Rotation) {
        self.write_f32(rotation.pitch);
        self.write_f32(rotation.yaw);
        self.write_f32(rotation.roll);
    }

    pub fn read_rotation(&mut self) -> io::Result<Rotation> {
        Ok(Rotation {
            pitch: self.read_f32()?,
            yaw: self.read_f32()?,
            roll: self.read_f32()?,
        })
    }
}
