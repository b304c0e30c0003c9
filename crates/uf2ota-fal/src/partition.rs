//! The partition table collaborator: a named, contiguous flash region per
//! entry, provided externally and optionally overridden per-stream via a
//! `FAL_PTABLE` tag.

use heapless::String;

/// Longest partition name this crate will hold inline.
pub const MAX_PARTITION_NAME_LEN: usize = 24;

/// Longest flash-device name this crate will hold inline.
pub const MAX_FLASH_DEVICE_NAME_LEN: usize = 16;

/// Upper bound on partitions held in an owned (`FAL_PTABLE`-replaced) table.
pub const MAX_OWNED_PARTITIONS: usize = 16;

/// A named, contiguous flash region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub name: String<MAX_PARTITION_NAME_LEN>,
    pub flash_device_name: String<MAX_FLASH_DEVICE_NAME_LEN>,
    pub offset: u32,
    pub length: u32,
}

/// External collaborator supplying the device's partition table.
///
/// Injected as a capability rather than read from a process-global registry,
/// so the engine can be exercised against an in-memory table in tests.
pub trait PartitionTableProvider {
    fn partitions(&self) -> &[Partition];
}

impl PartitionTableProvider for [Partition] {
    fn partitions(&self) -> &[Partition] {
        self
    }
}

/// The active partition table for one stream: either borrowed from the
/// external provider, or owned because a `FAL_PTABLE` tag replaced it.
///
/// This is the sum-type replacement for the C engine's `part_table_copied`
/// boolean flag (see the design notes): "owned" and "borrowed" are distinct,
/// first-class states instead of a flag alongside a possibly-dangling
/// pointer.
pub enum PartitionTable<'a> {
    Borrowed(&'a dyn PartitionTableProvider),
    Owned(heapless::Vec<Partition, MAX_OWNED_PARTITIONS>),
}

impl<'a> PartitionTable<'a> {
    pub fn entries(&self) -> &[Partition] {
        match self {
            Self::Borrowed(provider) => provider.partitions(),
            Self::Owned(table) => table.as_slice(),
        }
    }

    pub fn find(&self, name: &str) -> Option<&Partition> {
        self.entries().iter().find(|p| p.name == name)
    }

    pub fn is_owned(&self) -> bool {
        matches!(self, Self::Owned(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partition(name: &str, device: &str, offset: u32, length: u32) -> Partition {
        Partition {
            name: String::try_from(name).unwrap(),
            flash_device_name: String::try_from(device).unwrap(),
            offset,
            length,
        }
    }

    #[test]
    fn borrowed_table_reflects_provider() {
        let entries = [partition("app", "f0", 0x1000, 0x2000)];
        let table = PartitionTable::Borrowed(&entries[..] as &dyn PartitionTableProvider);
        assert!(!table.is_owned());
        assert_eq!(table.find("app").unwrap().offset, 0x1000);
        assert!(table.find("missing").is_none());
    }

    #[test]
    fn owned_table_replaces_entries() {
        let mut owned = heapless::Vec::new();
        owned.push(partition("ota", "f0", 0x6_0000, 0x4_0000)).unwrap();
        let table = PartitionTable::Owned(owned);
        assert!(table.is_owned());
        assert_eq!(table.find("ota").unwrap().length, 0x4_0000);
    }
}
