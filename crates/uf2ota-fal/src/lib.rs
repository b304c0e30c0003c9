#![cfg_attr(not(any(test, feature = "std")), no_std)]

//! Flash-abstraction-layer collaborators for the UF2/OTA engine: the
//! partition table, the flash-device registry, and OTA scheme resolution.
//!
//! None of these traits reach into a process-global registry; the writer in
//! the `uf2ota` crate is handed implementations of them at construction time.

pub mod flash;
pub mod partition;
pub mod scheme;

pub use flash::{FlashDevice, FlashError, FlashRegistry};
pub use partition::{Partition, PartitionTable, PartitionTableProvider};
pub use scheme::{OtaScheme, PartInfoOutcome, SchemeError};
