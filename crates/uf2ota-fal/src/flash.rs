//! The flash-device collaborator: an erase/write pair per named device,
//! looked up through a small registry rather than a process-global table.

use embedded_storage::nor_flash::NorFlashErrorKind;

/// A flash operation failed. Wraps the `embedded-storage` error kind so
/// callers get a portable, already-classified cause instead of a
/// device-specific error type leaking through the trait object boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashError(pub NorFlashErrorKind);

impl From<NorFlashErrorKind> for FlashError {
    fn from(kind: NorFlashErrorKind) -> Self {
        Self(kind)
    }
}

/// One erasable, writable flash region.
///
/// `erase` and `write` take absolute offsets into the device (not
/// partition-relative ones); the writer computes `partition.offset + addr`
/// before calling through. Both operations return the quantity actually
/// erased/written: a driver is free to over-erase to its sector size, and
/// the writer folds that back into its erase-coalescing window.
pub trait FlashDevice {
    fn erase(&mut self, offset: u32, length: u32) -> Result<u32, FlashError>;
    fn write(&mut self, offset: u32, data: &[u8]) -> Result<u32, FlashError>;
}

/// Resolves a partition's `flash_device_name` to a live [`FlashDevice`].
///
/// Injected as a capability, mirroring [`super::partition::PartitionTableProvider`]:
/// the engine never reaches into a global device table itself.
pub trait FlashRegistry {
    fn device(&mut self, name: &str) -> Option<&mut dyn FlashDevice>;
}

/// In-memory collaborators for exercising the writer without real hardware.
/// Built on `heapless` so it stays usable from `no_std` test binaries, and
/// left public (rather than test-only) so the `uf2ota` crate's own
/// integration tests can reuse it.
#[cfg(any(test, feature = "std"))]
pub mod test_support {
    use super::*;
    use heapless::FnvIndexMap;

    pub struct MemoryFlash {
        pub bytes: heapless::Vec<u8, 4096>,
        pub erase_sector_size: u32,
        pub erase_calls: heapless::Vec<(u32, u32), 16>,
        pub write_calls: heapless::Vec<(u32, usize), 16>,
    }

    impl MemoryFlash {
        pub fn new(size: usize) -> Self {
            let mut bytes = heapless::Vec::new();
            bytes.resize(size, 0xFFu8).ok();
            Self {
                bytes,
                erase_sector_size: 4096,
                erase_calls: heapless::Vec::new(),
                write_calls: heapless::Vec::new(),
            }
        }
    }

    impl FlashDevice for MemoryFlash {
        fn erase(&mut self, offset: u32, length: u32) -> Result<u32, FlashError> {
            self.erase_calls.push((offset, length)).ok();
            let erased_len = length.max(self.erase_sector_size);
            let end = (offset + erased_len).min(self.bytes.len() as u32);
            for b in &mut self.bytes[offset as usize..end as usize] {
                *b = 0xFF;
            }
            Ok(end - offset)
        }

        fn write(&mut self, offset: u32, data: &[u8]) -> Result<u32, FlashError> {
            self.write_calls.push((offset, data.len())).ok();
            self.bytes[offset as usize..offset as usize + data.len()].copy_from_slice(data);
            Ok(data.len() as u32)
        }
    }

    pub struct MapRegistry<'a> {
        pub devices: FnvIndexMap<&'a str, &'a mut MemoryFlash, 4>,
    }

    impl<'a> FlashRegistry for MapRegistry<'a> {
        fn device(&mut self, name: &str) -> Option<&mut dyn FlashDevice> {
            self.devices.get_mut(name).map(|d| *d as &mut dyn FlashDevice)
        }
    }
}
