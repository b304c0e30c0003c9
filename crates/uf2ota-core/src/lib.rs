#![no_std]

//! Wire-format layer of the UF2/OTA engine.
//!
//! - `block` — the 512-byte block: magic validation, flag bitfield, encode/decode.
//! - `tag` — the 4-byte-aligned, length-prefixed metadata records carried in
//!   a block's payload area.
//! - `binpatch` — the `DIFF32` opcode stream applied to a block's data area.
//!
//! This crate knows nothing about partitions, flash devices, or OTA schemes;
//! that routing logic lives one layer up in `uf2ota-fal`.

pub mod binpatch;
pub mod block;
pub mod tag;

pub use binpatch::{BinPatchError, DIFF32_OPCODE};
pub use block::{BadMagic, Block, BlockFlags, BLOCK_SIZE, DATA_AREA_SIZE, MD5_RECORD_SIZE};
pub use tag::{DataTooLong, Tag, TagIter, TagType, TagWriter, MAX_TAG_PAYLOAD_LEN};
