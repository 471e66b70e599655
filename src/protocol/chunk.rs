//! Chunk columns: up to sixteen 16x16x16 sections stacked bottom to top, each with
//! block storage and 4-bit light arrays, plus optional biome bytes.

use super::buffer::MinecraftPacketBuffer;
use super::nbt::Tag;
use super::types::BlockState;
use crate::error::{LodestoneError, Result};
use crate::logger::{log, LogSeverity::Debug};

pub const SECTION_COUNT: usize = 16;
pub const SECTION_VOLUME: usize = 4096;
pub const NIBBLE_ARRAY_LENGTH: usize = SECTION_VOLUME / 2;
pub const BIOME_LENGTH: usize = 256;

/// Bits per entry once a section switches to the global palette.
pub const GLOBAL_BITS_PER_ENTRY: u8 = 13;
const MAX_PALETTE_BITS: u8 = 8;
const MIN_PALETTE_BITS: u8 = 4;

fn section_index(x: usize, y: usize, z: usize) -> usize {
    ((y & 0xF) << 8) | ((z & 0xF) << 4) | (x & 0xF)
}

/// Global id of `state`, which must fit the entry width of `storage`.
fn global_raw(storage: &FlexibleStorage, state: BlockState) -> Result<u64> {
    let raw = state.raw_id()? as u32 as u64;
    if raw > storage.max_entry_value {
        return Err(LodestoneError::encode(format!(
            "Block state {:?} does not fit in {} bits per entry",
            state, storage.bits_per_entry
        )));
    }
    Ok(raw)
}

/// Packed array of fixed-width unsigned entries. Entries may span two longs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlexibleStorage {
    bits_per_entry: u8,
    size: usize,
    max_entry_value: u64,
    data: Vec<u64>,
}

impl FlexibleStorage {
    pub fn new(bits_per_entry: u8, size: usize) -> Self {
        let data = vec![0; Self::longs_needed(bits_per_entry, size)];
        Self::with_data(bits_per_entry, size, data)
    }

    fn with_data(bits_per_entry: u8, size: usize, data: Vec<u64>) -> Self {
        FlexibleStorage {
            bits_per_entry,
            size,
            max_entry_value: (1u64 << bits_per_entry) - 1,
            data,
        }
    }

    pub fn longs_needed(bits_per_entry: u8, size: usize) -> usize {
        (size * bits_per_entry as usize + 63) / 64
    }

    pub fn data(&self) -> &[u64] {
        &self.data
    }

    pub fn get(&self, index: usize) -> u64 {
        let bits = self.bits_per_entry as usize;
        let bit_index = index * bits;
        let start = bit_index / 64;
        let end = ((index + 1) * bits - 1) / 64;
        let start_offset = bit_index % 64;

        if start == end {
            (self.data[start] >> start_offset) & self.max_entry_value
        } else {
            let end_offset = 64 - start_offset;
            ((self.data[start] >> start_offset) | (self.data[end] << end_offset))
                & self.max_entry_value
        }
    }

    pub fn set(&mut self, index: usize, value: u64) {
        let bits = self.bits_per_entry as usize;
        let value = value & self.max_entry_value;
        let bit_index = index * bits;
        let start = bit_index / 64;
        let end = ((index + 1) * bits - 1) / 64;
        let start_offset = bit_index % 64;

        self.data[start] =
            (self.data[start] & !(self.max_entry_value << start_offset)) | (value << start_offset);
        if start != end {
            let end_offset = 64 - start_offset;
            self.data[end] = (self.data[end] >> (bits - end_offset) << (bits - end_offset))
                | (value >> end_offset);
        }
    }
}

/// Block states of one section. Up to 8 bits per entry the entries index a local
/// palette, above that they hold raw global block state ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockStorage {
    bits_per_entry: u8,
    states: Vec<BlockState>,
    storage: FlexibleStorage,
}

impl Default for BlockStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockStorage {
    pub fn new() -> Self {
        BlockStorage {
            bits_per_entry: MIN_PALETTE_BITS,
            states: vec![BlockState::AIR],
            storage: FlexibleStorage::new(MIN_PALETTE_BITS, SECTION_VOLUME),
        }
    }

    pub fn bits_per_entry(&self) -> u8 {
        self.bits_per_entry
    }

    pub fn palette(&self) -> &[BlockState] {
        &self.states
    }

    fn uses_palette(&self) -> bool {
        self.bits_per_entry <= MAX_PALETTE_BITS
    }

    fn state_for(&self, raw: u64) -> BlockState {
        if self.uses_palette() {
            self.states
                .get(raw as usize)
                .copied()
                .unwrap_or(BlockState::AIR)
        } else {
            BlockState::from_raw_id(raw as i32)
        }
    }

    pub fn get(&self, x: usize, y: usize, z: usize) -> BlockState {
        self.state_for(self.storage.get(section_index(x, y, z)))
    }

    pub fn set(&mut self, x: usize, y: usize, z: usize, state: BlockState) -> Result<()> {
        let raw = self.raw_for(state)?;
        self.storage.set(section_index(x, y, z), raw);
        Ok(())
    }

    fn raw_for(&mut self, state: BlockState) -> Result<u64> {
        if !self.uses_palette() {
            return global_raw(&self.storage, state);
        }
        if let Some(index) = self.states.iter().position(|s| *s == state) {
            return Ok(index as u64);
        }

        self.states.push(state);
        if self.states.len() > 1 << self.bits_per_entry {
            if let Err(err) = self.grow() {
                self.states.pop();
                return Err(err);
            }
        }

        if self.uses_palette() {
            Ok((self.states.len() - 1) as u64)
        } else {
            global_raw(&self.storage, state)
        }
    }

    /// Widens the storage by one bit, or moves it to global ids past 8 bits.
    /// Nothing changes when a present state does not fit the new width.
    fn grow(&mut self) -> Result<()> {
        let mut bits_per_entry = self.bits_per_entry + 1;
        let global = bits_per_entry > MAX_PALETTE_BITS;
        if global {
            bits_per_entry = GLOBAL_BITS_PER_ENTRY;
        }

        let mut storage = FlexibleStorage::new(bits_per_entry, SECTION_VOLUME);
        for index in 0..SECTION_VOLUME {
            let old = self.storage.get(index);
            let value = if global {
                let state = self
                    .states
                    .get(old as usize)
                    .copied()
                    .unwrap_or(BlockState::AIR);
                global_raw(&storage, state)?
            } else {
                old
            };
            storage.set(index, value);
        }

        self.bits_per_entry = bits_per_entry;
        self.storage = storage;
        if global {
            self.states.clear();
        }
        Ok(())
    }

    /// True when every cell holds air.
    pub fn is_empty(&self) -> bool {
        (0..SECTION_VOLUME).all(|index| self.state_for(self.storage.get(index)) == BlockState::AIR)
    }

    pub fn read(buffer: &mut MinecraftPacketBuffer) -> Result<Self> {
        let bits_per_entry = buffer.read_u8()?;
        if bits_per_entry == 0 || bits_per_entry > 32 {
            return Err(LodestoneError::decode(format!(
                "Invalid bits per entry: {}",
                bits_per_entry
            )));
        }

        let state_count = buffer.read_varint()?;
        if !(0..=SECTION_VOLUME as i32).contains(&state_count) {
            return Err(LodestoneError::decode(format!(
                "Invalid palette length: {}",
                state_count
            )));
        }
        let mut states = Vec::with_capacity(state_count as usize);
        for _ in 0..state_count {
            states.push(buffer.read_block_state()?);
        }

        let expected = FlexibleStorage::longs_needed(bits_per_entry, SECTION_VOLUME);
        let long_count = buffer.read_varint()?;
        if long_count < 0 || long_count as usize != expected {
            return Err(LodestoneError::decode(format!(
                "Expected {} longs of block data for {} bits per entry, got {}",
                expected, bits_per_entry, long_count
            )));
        }
        let data = buffer.read_longs(expected)?;

        Ok(BlockStorage {
            bits_per_entry,
            states,
            storage: FlexibleStorage::with_data(bits_per_entry, SECTION_VOLUME, data),
        })
    }

    pub fn write(&self, buffer: &mut MinecraftPacketBuffer) -> Result<()> {
        buffer.write_u8(self.bits_per_entry);
        buffer.write_varint(self.states.len() as i32);
        for state in &self.states {
            buffer.write_block_state(*state)?;
        }
        buffer.write_varint(self.storage.data().len() as i32);
        buffer.write_longs(self.storage.data());
        Ok(())
    }
}

/// 4096 four-bit values packed two per byte, low nibble first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NibbleArray {
    data: Vec<u8>,
}

impl Default for NibbleArray {
    fn default() -> Self {
        Self::new()
    }
}

impl NibbleArray {
    pub fn new() -> Self {
        NibbleArray {
            data: vec![0; NIBBLE_ARRAY_LENGTH],
        }
    }

    pub fn filled(value: u8) -> Self {
        let value = value & 0xF;
        NibbleArray {
            data: vec![(value << 4) | value; NIBBLE_ARRAY_LENGTH],
        }
    }

    pub fn get(&self, x: usize, y: usize, z: usize) -> u8 {
        let index = section_index(x, y, z);
        let byte = self.data[index >> 1];
        if index & 1 == 0 {
            byte & 0xF
        } else {
            (byte >> 4) & 0xF
        }
    }

    pub fn set(&mut self, x: usize, y: usize, z: usize, value: u8) {
        let index = section_index(x, y, z);
        let byte = &mut self.data[index >> 1];
        if index & 1 == 0 {
            *byte = (*byte & 0xF0) | (value & 0xF);
        } else {
            *byte = (*byte & 0x0F) | ((value & 0xF) << 4);
        }
    }

    pub fn read(buffer: &mut MinecraftPacketBuffer) -> Result<Self> {
        Ok(NibbleArray {
            data: buffer.read_bytes_raw(NIBBLE_ARRAY_LENGTH)?,
        })
    }

    pub fn write(&self, buffer: &mut MinecraftPacketBuffer) {
        buffer.write_bytes_raw(&self.data);
    }
}

/// One 16x16x16 section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub blocks: BlockStorage,
    pub block_light: NibbleArray,
    pub sky_light: Option<NibbleArray>,
}

impl Chunk {
    pub fn new(has_skylight: bool) -> Self {
        Chunk {
            blocks: BlockStorage::new(),
            block_light: NibbleArray::new(),
            sky_light: has_skylight.then(NibbleArray::new),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub x: i32,
    pub z: i32,
    pub chunks: [Option<Chunk>; SECTION_COUNT],
    pub biomes: Option<Vec<u8>>,
    pub block_entities: Vec<Tag>,
}

impl Column {
    pub fn new(x: i32, z: i32) -> Self {
        Column {
            x,
            z,
            chunks: Default::default(),
            biomes: None,
            block_entities: Vec::new(),
        }
    }

    pub fn has_skylight(&self) -> bool {
        self.chunks
            .iter()
            .flatten()
            .any(|chunk| chunk.sky_light.is_some())
    }
}

/// Result of one decode attempt under a fixed skylight assumption.
#[derive(Debug)]
pub enum ColumnDecode {
    Clean(Column),
    Leftover { column: Column, remaining: usize },
    Failed(LodestoneError),
}

pub fn decode_column_once(
    data: &[u8],
    x: i32,
    z: i32,
    full_chunk: bool,
    has_skylight: bool,
    mask: i32,
    block_entities: &[Tag],
) -> ColumnDecode {
    let mut buffer = MinecraftPacketBuffer::from_bytes(data.to_vec());
    let mut read = || -> Result<Column> {
        let mut column = Column::new(x, z);
        for (index, slot) in column.chunks.iter_mut().enumerate() {
            if mask & (1 << index) == 0 {
                continue;
            }
            let blocks = BlockStorage::read(&mut buffer)?;
            let block_light = NibbleArray::read(&mut buffer)?;
            let sky_light = if has_skylight {
                Some(NibbleArray::read(&mut buffer)?)
            } else {
                None
            };
            *slot = Some(Chunk {
                blocks,
                block_light,
                sky_light,
            });
        }
        if full_chunk {
            column.biomes = Some(buffer.read_bytes_raw(BIOME_LENGTH)?);
        }
        column.block_entities = block_entities.to_vec();
        Ok(column)
    };

    match read() {
        Ok(column) if buffer.is_exhausted() => ColumnDecode::Clean(column),
        Ok(column) => ColumnDecode::Leftover {
            remaining: buffer.remaining(),
            column,
        },
        Err(err) => ColumnDecode::Failed(err),
    }
}

/// Decodes a column. The wire format does not say whether sky light arrays are
/// present, so a dirty decode without sky light is retried once with sky light.
pub fn read_column(
    data: &[u8],
    x: i32,
    z: i32,
    full_chunk: bool,
    has_skylight_hint: bool,
    mask: i32,
    block_entities: &[Tag],
) -> Result<Column> {
    let attempts: &[bool] = if has_skylight_hint {
        &[true]
    } else {
        &[false, true]
    };

    let mut failure = String::new();
    for &has_skylight in attempts {
        match decode_column_once(data, x, z, full_chunk, has_skylight, mask, block_entities) {
            ColumnDecode::Clean(column) => return Ok(column),
            ColumnDecode::Leftover { remaining, .. } => {
                failure = format!("{} bytes left over", remaining);
            }
            ColumnDecode::Failed(err) => failure = err.to_string(),
        }
        log(
            format!(
                "Chunk ({}, {}) did not decode with skylight={}: {}",
                x, z, has_skylight, failure
            ),
            Debug,
        );
    }

    Err(LodestoneError::decode(format!(
        "Failed to read chunk data: {}",
        failure
    )))
}

/// Encodes a column and returns the section mask that was actually written.
pub fn write_column(
    buffer: &mut MinecraftPacketBuffer,
    column: &Column,
    full_chunk: bool,
    has_skylight: bool,
) -> Result<i32> {
    let mut mask = 0;
    for (index, chunk) in column.chunks.iter().enumerate() {
        let Some(chunk) = chunk else { continue };
        if full_chunk && chunk.is_empty() {
            continue;
        }

        mask |= 1 << index;
        chunk.blocks.write(buffer)?;
        chunk.block_light.write(buffer);
        if has_skylight {
            let sky_light = chunk.sky_light.as_ref().ok_or_else(|| {
                LodestoneError::encode(format!("Section {} has no sky light", index))
            })?;
            sky_light.write(buffer);
        }
    }

    if full_chunk {
        match &column.biomes {
            Some(biomes) if biomes.len() == BIOME_LENGTH => buffer.write_bytes_raw(biomes),
            _ => {
                return Err(LodestoneError::encode(
                    "Full chunks need exactly 256 biome bytes",
                ))
            }
        }
    }

    Ok(mask)
}
