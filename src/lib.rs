#![cfg_attr(not(any(test, feature = "std")), no_std)]

//! Engine crate for the UF2/OTA firmware-update format: decodes a stream of
//! 512-byte blocks, resolves each one against a device's partition table and
//! active OTA scheme, applies any queued binpatch, and commits the result
//! through an injected [`FlashRegistry`].
//!
//! - [`context`] — the per-stream state threaded through every call.
//! - [`info`] — the header metadata out-parameter populated by [`parse_header`].
//! - [`writer`] — the block-at-a-time state machine: [`check_block`],
//!   [`parse_header`], [`write`].
//! - [`pack`] — the host-side inverse: assembles a UF2/OTA stream from
//!   scratch instead of applying one.
//!
//! Wire-format primitives (blocks, tags, binpatch) live in `uf2ota-core`;
//! flash/partition/scheme collaborators live in `uf2ota-fal`. This crate only
//! wires the two together into the streaming algorithm.

pub mod context;
pub mod info;
pub mod pack;
pub mod writer;

pub use context::{Context, ErasedRegion, ResolvedTarget};
pub use info::Info;
pub use pack::{PackBuilder, PackError};
pub use writer::{
    check_block, parse_header, write, BlockKind, CheckError, CheckOutcome, HeaderError,
    WriteError, WriteOutcome,
};

pub use uf2ota_core::binpatch::{self, BinPatchError, DIFF32_OPCODE};
pub use uf2ota_core::block::{BadMagic, Block, BlockFlags, BLOCK_SIZE, DATA_AREA_SIZE, MD5_RECORD_SIZE};
pub use uf2ota_core::tag::{self, DataTooLong, Tag, TagIter, TagType, TagWriter, MAX_TAG_PAYLOAD_LEN};
pub use uf2ota_fal::{
    FlashDevice, FlashError, FlashRegistry, OtaScheme, PartInfoOutcome, Partition, PartitionTable,
    PartitionTableProvider, SchemeError,
};
