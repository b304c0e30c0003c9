//! The per-stream mutable state threaded through every engine call.

use uf2ota_core::tag::MAX_TAG_PAYLOAD_LEN;
use uf2ota_fal::{OtaScheme, Partition, PartitionTable};

/// A partition the scheme resolver has pointed this stream at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub partition: Partition,
}

/// The erase-coalescing window: flash already erased by the most recent
/// `erase` call, carried forward so adjacent blocks can skip a redundant
/// one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErasedRegion {
    pub offset: u32,
    pub length: u32,
}

impl ErasedRegion {
    fn contains(&self, offset: u32, length: u32) -> bool {
        offset >= self.offset
            && offset
                .saturating_add(length)
                .saturating_sub(self.offset)
                <= self.length
    }
}

/// Per-stream state: expected family ID, sequence counter, the device's OTA
/// scheme, the currently-resolved target (if any), a pending binpatch
/// payload, and the partition table (borrowed, or owned after a
/// `FAL_PTABLE` override).
///
/// There is no `context_free`: dropping a `Context` whose table was
/// overridden drops the owned `heapless::Vec` along with it, for free,
/// because [`PartitionTable`]'s `Owned` variant owns its storage. A borrowed
/// table is never freed, because `Context` never owned it.
pub struct Context<'t> {
    pub(crate) family_id: u32,
    pub(crate) scheme: OtaScheme,
    pub(crate) seq: u32,
    pub(crate) target: Option<ResolvedTarget>,
    pub(crate) is_part_set: bool,
    pub(crate) binpatch: Option<heapless::Vec<u8, MAX_TAG_PAYLOAD_LEN>>,
    pub(crate) erased: Option<ErasedRegion>,
    pub(crate) table: PartitionTable<'t>,
    pub written: u32,
}

impl<'t> Context<'t> {
    pub fn new(scheme: OtaScheme, family_id: u32, table: PartitionTable<'t>) -> Self {
        Self {
            family_id,
            scheme,
            seq: 0,
            target: None,
            is_part_set: false,
            binpatch: None,
            erased: None,
            table,
            written: 0,
        }
    }

    pub fn seq(&self) -> u32 {
        self.seq
    }

    pub fn scheme(&self) -> OtaScheme {
        self.scheme
    }

    pub fn target(&self) -> Option<&ResolvedTarget> {
        self.target.as_ref()
    }

    pub fn is_part_set(&self) -> bool {
        self.is_part_set
    }

    pub(crate) fn erase_is_redundant(&self, offset: u32, length: u32) -> bool {
        self.erased
            .is_some_and(|region| region.contains(offset, length))
    }
}
