//! The 512-byte UF2 block: magic validation and the raw/structured round-trip.
//!
//! Tag interpretation lives in [`crate::tag`]; this module only knows about
//! the fixed header fields and the flag bitfield.

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};

/// Total size of one UF2 block on the wire.
pub const BLOCK_SIZE: usize = 512;

/// Size of the payload area shared by raw data, tags, and the MD5 trailer.
pub const DATA_AREA_SIZE: usize = 476;

/// Size of the trailing MD5 record carried in the last 24 bytes of the data
/// area when [`BlockFlags::HAS_MD5`] is set.
pub const MD5_RECORD_SIZE: usize = 24;

const MAGIC_START: u32 = 0x0A32_4655;
const MAGIC_MID: u32 = 0x9E5D_5157;
const MAGIC_TRAILER: u32 = 0x0AB1_6F30;

bitflags! {
    /// Bits of the block's flag word. Reserved bits must be zero on write.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct BlockFlags: u32 {
        /// Payload does not target the device's main flash (typically a
        /// file-container companion block, or informational).
        const NOT_MAIN_FLASH = 1 << 0;
        /// This block is a file-container block; the engine ignores it.
        const FILE_CONTAINER = 1 << 12;
        /// `file_size_or_family_id` carries a family identifier.
        const HAS_FAMILY_ID = 1 << 13;
        /// The last 24 bytes of the data area carry an MD5 record.
        const HAS_MD5 = 1 << 14;
        /// The data area (after `len`) carries a tag region.
        const HAS_TAGS = 1 << 15;
    }
}

/// Magic words did not match; the buffer is not a UF2 block at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BadMagic;

/// Zero-copy byte-exact mirror of the 512-byte wire layout.
///
/// Every multi-byte field is stored as raw bytes rather than a native
/// integer so that casting this struct over a buffer never depends on host
/// endianness; callers go through [`Block::decode`]/[`Block::encode`] which
/// apply `from_le_bytes`/`to_le_bytes` explicitly.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct RawBlock {
    magic_start: [u8; 4],
    magic_mid: [u8; 4],
    flags: [u8; 4],
    addr: [u8; 4],
    len: [u8; 4],
    block_seq: [u8; 4],
    block_count: [u8; 4],
    file_size_or_family_id: [u8; 4],
    data: [u8; DATA_AREA_SIZE],
    magic_end: [u8; 4],
}

const _: () = assert!(core::mem::size_of::<RawBlock>() == BLOCK_SIZE);

/// A decoded UF2 block: header fields plus an owned copy of the 476-byte
/// payload area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub flags: BlockFlags,
    pub addr: u32,
    pub len: u32,
    pub block_seq: u32,
    pub block_count: u32,
    pub file_size_or_family_id: u32,
    pub data: [u8; DATA_AREA_SIZE],
}

impl Block {
    /// Decode a 512-byte wire buffer. Rejects unless all three magic words
    /// match; everything else about the block is accepted as-is — tag
    /// interpretation and field-value validation happen in later stages.
    pub fn decode(bytes: &[u8; BLOCK_SIZE]) -> Result<Self, BadMagic> {
        let raw: &RawBlock = bytemuck::from_bytes(bytes);

        if u32::from_le_bytes(raw.magic_start) != MAGIC_START
            || u32::from_le_bytes(raw.magic_mid) != MAGIC_MID
            || u32::from_le_bytes(raw.magic_end) != MAGIC_TRAILER
        {
            return Err(BadMagic);
        }

        Ok(Self {
            flags: BlockFlags::from_bits_retain(u32::from_le_bytes(raw.flags)),
            addr: u32::from_le_bytes(raw.addr),
            len: u32::from_le_bytes(raw.len),
            block_seq: u32::from_le_bytes(raw.block_seq),
            block_count: u32::from_le_bytes(raw.block_count),
            file_size_or_family_id: u32::from_le_bytes(raw.file_size_or_family_id),
            data: raw.data,
        })
    }

    /// Encode back to a 512-byte wire buffer. Reserved flag bits (anything
    /// outside [`BlockFlags::all`]) are zeroed.
    pub fn encode(&self) -> [u8; BLOCK_SIZE] {
        let raw = RawBlock {
            magic_start: MAGIC_START.to_le_bytes(),
            magic_mid: MAGIC_MID.to_le_bytes(),
            flags: (self.flags.bits() & BlockFlags::all().bits()).to_le_bytes(),
            addr: self.addr.to_le_bytes(),
            len: self.len.to_le_bytes(),
            block_seq: self.block_seq.to_le_bytes(),
            block_count: self.block_count.to_le_bytes(),
            file_size_or_family_id: self.file_size_or_family_id.to_le_bytes(),
            data: self.data,
            magic_end: MAGIC_TRAILER.to_le_bytes(),
        };
        bytemuck::cast(raw)
    }

    /// End offset (exclusive) of the tag region within [`Self::data`]: the
    /// MD5 trailer, when present, occupies the last 24 bytes.
    pub fn tag_region_end(&self) -> usize {
        if self.flags.contains(BlockFlags::HAS_MD5) {
            DATA_AREA_SIZE - MD5_RECORD_SIZE
        } else {
            DATA_AREA_SIZE
        }
    }

    /// Start offset of the tag region: right after the raw payload bytes.
    pub fn tag_region_start(&self) -> usize {
        self.len as usize
    }
}
