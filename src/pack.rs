//! Host-side packaging: assembles a UF2/OTA byte stream out of the same
//! block/tag/binpatch primitives the engine parses with, so that packaging
//! and on-device application stay bit-exact inverses of one another (see
//! SPEC_FULL.md §4.6). No separate wire-format implementation lives here.

use heapless::{String, Vec};

use uf2ota_core::binpatch;
use uf2ota_core::block::{Block, BlockFlags, DATA_AREA_SIZE};
use uf2ota_core::tag::{DataTooLong, TagType, TagWriter};
use uf2ota_fal::partition::MAX_PARTITION_NAME_LEN;
use uf2ota_fal::OtaScheme;

/// Upper bound on distinct partition names one package's `OTA_PART_INFO`
/// table can name: the wire format's index nibble tops out at 6.
pub const MAX_PACK_PARTITIONS: usize = 6;

/// Upper bound on images queued into one [`PackBuilder`].
pub const MAX_QUEUED_IMAGES: usize = 8;

/// Payload chunk size used for a scheme whose blocks also carry a `BINPATCH`
/// tag: leaves enough of the 476-byte data area free for the largest
/// possible `DIFF32` record (see `uf2ota_core::binpatch::MAX_DIFF32_RECORDS`).
const PATCHED_CHUNK_SIZE: usize = DATA_AREA_SIZE - 255;

/// Largest `OTA_PART_INFO` payload this builder can assemble: the 3-byte
/// nibble header plus every declared partition name, NUL-terminated.
const MAX_PART_INFO_LEN: usize = 3 + MAX_PACK_PARTITIONS * (MAX_PARTITION_NAME_LEN + 1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackError {
    /// More than [`MAX_PACK_PARTITIONS`] distinct partition names were named
    /// across the scheme/partition pairs passed to [`PackBuilder::new`].
    TooManyPartitions,
    /// More images were queued than [`MAX_QUEUED_IMAGES`] allows.
    TooManyImages,
    /// `add_image`/`build_data_blocks` named a `(scheme, partition_name)`
    /// pair that [`PackBuilder::new`] did not declare, or no image was ever
    /// queued for it.
    UnknownSlot,
    /// A `DeviceDual2`/`FlasherDual2` image did not match the length of its
    /// queued `Dual1` counterpart, so no binpatch could be computed.
    LengthMismatch,
    /// Computing the automatic binpatch needed more `DIFF32` records than a
    /// single patched chunk can carry.
    PatchOverflow,
    /// A tag would not fit in the header block's remaining space.
    HeaderTooLarge,
}

impl From<binpatch::BinPatchError> for PackError {
    fn from(_: binpatch::BinPatchError) -> Self {
        Self::PatchOverflow
    }
}

impl From<DataTooLong> for PackError {
    fn from(_: DataTooLong) -> Self {
        Self::HeaderTooLarge
    }
}

/// Returns the `Dual1` scheme paired with a `Dual2` scheme, or `None` for
/// every other scheme. Packaging's only use of the pairing: a queued `Dual2`
/// image is shipped as its `Dual1` counterpart's bytes plus a binpatch,
/// never as its own separate physical payload.
fn paired_dual1(scheme: OtaScheme) -> Option<OtaScheme> {
    match scheme {
        OtaScheme::DeviceDual2 => Some(OtaScheme::DeviceDual1),
        OtaScheme::FlasherDual2 => Some(OtaScheme::FlasherDual1),
        _ => None,
    }
}

fn chunk_count(len: usize, chunk_size: usize) -> u32 {
    len.div_ceil(chunk_size) as u32
}

struct QueuedImage<'a> {
    scheme: OtaScheme,
    partition_index: usize,
    data: &'a [u8],
}

/// Accumulates the routing tags and queued images for one package, then
/// emits the header block and each scheme's data blocks.
///
/// Mirrors the on-device [`crate::context::Context`]'s scheme-indexed nibble
/// tables in reverse: where the engine reads a nibble to pick a partition,
/// this builder writes one, sharing a single `OTA_PART_LIST`/`OTA_PART_INFO`
/// nibble table across every scheme the package serves.
pub struct PackBuilder<'a> {
    family_id: u32,
    nibbles: [u8; 3],
    names: Vec<String<MAX_PARTITION_NAME_LEN>, MAX_PACK_PARTITIONS>,
    images: Vec<QueuedImage<'a>, MAX_QUEUED_IMAGES>,
}

impl<'a> PackBuilder<'a> {
    /// `scheme_partitions` pairs each scheme this package serves with the
    /// partition name a device resolving that scheme should target; schemes
    /// absent from the list keep a zero nibble (`OTA_PART_INFO`'s "no
    /// partition for this scheme" outcome).
    pub fn new(scheme_partitions: &[(OtaScheme, &str)], family_id: u32) -> Result<Self, PackError> {
        let mut names: Vec<String<MAX_PARTITION_NAME_LEN>, MAX_PACK_PARTITIONS> = Vec::new();
        let mut nibbles = [0u8; 3];

        for &(scheme, partition_name) in scheme_partitions {
            let index = match names.iter().position(|n| n.as_str() == partition_name) {
                Some(i) => i,
                None => {
                    let name =
                        String::try_from(partition_name).map_err(|_| PackError::TooManyPartitions)?;
                    names.push(name).map_err(|_| PackError::TooManyPartitions)?;
                    names.len() - 1
                }
            };
            let nibble = (index + 1) as u8;
            let (byte_index, shift, _) = scheme.decompose();
            nibbles[byte_index] |= nibble << shift;
        }

        Ok(Self { family_id, nibbles, names, images: Vec::new() })
    }

    fn partition_index(&self, partition_name: &str) -> Result<usize, PackError> {
        self.names
            .iter()
            .position(|n| n.as_str() == partition_name)
            .ok_or(PackError::UnknownSlot)
    }

    /// Queues one firmware image for one `(scheme, partition_name)` slot
    /// declared in [`Self::new`].
    ///
    /// When `scheme` is `DeviceDual2`/`FlasherDual2` and an equal-length
    /// image is already queued for the paired `Dual1` scheme under the same
    /// partition name, `data` is kept only as the binpatch target: the
    /// blocks [`Self::build_data_blocks`] emits for this slot carry the
    /// `Dual1` bytes plus a per-block `DIFF32` patch rather than `data`
    /// itself, which is what lets one physical image serve both slots (see
    /// SPEC_FULL.md §4.3's `binpatch::compute` supplement).
    pub fn add_image(&mut self, scheme: OtaScheme, partition_name: &str, data: &'a [u8]) -> Result<(), PackError> {
        let index = self.partition_index(partition_name)?;

        // Dual1/Dual2 pair by role, not by partition: the two slots
        // typically target different partitions, with Dual2 shipped as a
        // patch against Dual1's bytes rather than its own physical image.
        if let Some(base_scheme) = paired_dual1(scheme) {
            if let Some(base) = self.images.iter().find(|img| img.scheme == base_scheme) {
                if base.data.len() != data.len() {
                    return Err(PackError::LengthMismatch);
                }
            }
        }

        self.images
            .push(QueuedImage { scheme, partition_index: index, data })
            .map_err(|_| PackError::TooManyImages)
    }

    /// Total blocks the package will contain: the header plus every queued
    /// image's data blocks, each chunked at [`DATA_AREA_SIZE`] (or
    /// [`PATCHED_CHUNK_SIZE`] for a paired `Dual2` image).
    pub fn total_block_count(&self) -> u32 {
        1 + self
            .images
            .iter()
            .map(|img| {
                let chunk_size = if paired_dual1(img.scheme).is_some() {
                    PATCHED_CHUNK_SIZE
                } else {
                    DATA_AREA_SIZE
                };
                chunk_count(img.data.len(), chunk_size)
            })
            .sum::<u32>()
    }

    /// Emits the header block: `OTA_FORMAT_2`, the shared `OTA_PART_LIST`/
    /// `OTA_PART_INFO` nibble table, and the descriptive metadata tags.
    /// `build_date` is a Unix timestamp supplied by the caller — this
    /// library never reads the clock (see SPEC_FULL.md §5).
    pub fn build_header(
        &self,
        fw_name: &str,
        fw_version: &str,
        board: &str,
        lt_version: &str,
        build_date: u32,
    ) -> Result<[u8; 512], PackError> {
        let mut block = Block {
            flags: BlockFlags::HAS_FAMILY_ID | BlockFlags::HAS_TAGS,
            addr: 0,
            len: 0,
            block_seq: 0,
            block_count: self.total_block_count(),
            file_size_or_family_id: self.family_id,
            data: [0u8; DATA_AREA_SIZE],
        };

        {
            let mut writer = TagWriter::new(&mut block.data, 0, DATA_AREA_SIZE);
            writer.emit(TagType::OTA_FORMAT_2, &[])?;
            writer.emit(TagType::OTA_PART_LIST, &self.nibbles)?;

            let mut part_info: Vec<u8, MAX_PART_INFO_LEN> = Vec::new();
            part_info.extend_from_slice(&self.nibbles).map_err(|()| PackError::HeaderTooLarge)?;
            for name in &self.names {
                part_info
                    .extend_from_slice(name.as_bytes())
                    .map_err(|()| PackError::HeaderTooLarge)?;
                part_info.push(0).map_err(|_| PackError::HeaderTooLarge)?;
            }
            writer.emit(TagType::OTA_PART_INFO, &part_info)?;

            writer.emit(TagType::VERSION, fw_version.as_bytes())?;
            writer.emit(TagType::FIRMWARE, fw_name.as_bytes())?;
            writer.emit(TagType::BOARD, board.as_bytes())?;
            writer.emit(TagType::LT_VERSION, lt_version.as_bytes())?;
            writer.emit(TagType::BUILD_DATE, &build_date.to_le_bytes())?;
        }

        Ok(block.encode())
    }

    /// Chunks the image queued for `(scheme, partition_name)` into data
    /// blocks. Callers concatenate [`Self::build_header`]'s block with each
    /// queued image's blocks, in the order the images were added, to form
    /// one complete stream.
    pub fn build_data_blocks(&self, scheme: OtaScheme, partition_name: &str) -> Result<DataBlockIter<'_>, PackError> {
        let index = self.partition_index(partition_name)?;
        let pos_in_images = self
            .images
            .iter()
            .position(|img| img.scheme == scheme && img.partition_index == index)
            .ok_or(PackError::UnknownSlot)?;

        let target = &self.images[pos_in_images];
        let (base_data, patch_source, chunk_size) = if let Some(base_scheme) = paired_dual1(scheme) {
            match self.images.iter().find(|img| img.scheme == base_scheme) {
                Some(base) => (base.data, Some(target.data), PATCHED_CHUNK_SIZE),
                None => (target.data, None, DATA_AREA_SIZE),
            }
        } else {
            (target.data, None, DATA_AREA_SIZE)
        };

        let seq_offset: u32 = 1
            + self.images[..pos_in_images]
                .iter()
                .map(|img| {
                    let cs = if paired_dual1(img.scheme).is_some() { PATCHED_CHUNK_SIZE } else { DATA_AREA_SIZE };
                    chunk_count(img.data.len(), cs)
                })
                .sum::<u32>();

        Ok(DataBlockIter {
            family_id: self.family_id,
            total_blocks: self.total_block_count(),
            base_data,
            patch_source,
            chunk_size,
            pos: 0,
            seq: seq_offset,
        })
    }
}

/// Iterator over one queued image's data blocks, produced by
/// [`PackBuilder::build_data_blocks`].
pub struct DataBlockIter<'a> {
    family_id: u32,
    total_blocks: u32,
    base_data: &'a [u8],
    patch_source: Option<&'a [u8]>,
    chunk_size: usize,
    pos: usize,
    seq: u32,
}

impl<'a> Iterator for DataBlockIter<'a> {
    type Item = Result<[u8; 512], PackError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.base_data.len() {
            return None;
        }
        let chunk_len = (self.base_data.len() - self.pos).min(self.chunk_size);
        let mut block = Block {
            flags: BlockFlags::HAS_FAMILY_ID,
            addr: self.pos as u32,
            len: chunk_len as u32,
            block_seq: self.seq,
            block_count: self.total_blocks,
            file_size_or_family_id: self.family_id,
            data: [0u8; DATA_AREA_SIZE],
        };
        block.data[..chunk_len].copy_from_slice(&self.base_data[self.pos..self.pos + chunk_len]);

        if let Some(patched) = self.patch_source {
            let after_chunk = &patched[self.pos..self.pos + chunk_len];
            let patch = match binpatch::compute(&self.base_data[self.pos..self.pos + chunk_len], after_chunk) {
                Ok(patch) => patch,
                Err(err) => return Some(Err(err.into())),
            };
            // patch[1] is the DIFF32 record count; 0 means this chunk is
            // byte-identical between the two images and needs no tag.
            if patch.get(1).copied().unwrap_or(0) > 0 {
                block.flags.insert(BlockFlags::HAS_TAGS);
                let mut writer = TagWriter::new(&mut block.data, chunk_len, DATA_AREA_SIZE);
                if let Err(err) = writer.emit(TagType::BINPATCH, &patch) {
                    return Some(Err(err.into()));
                }
            }
        }

        self.pos += chunk_len;
        self.seq += 1;
        Some(Ok(block.encode()))
    }
}
