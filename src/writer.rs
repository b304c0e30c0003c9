//! The streaming state machine: one call per decoded block, driving
//! sequence tracking, header acceptance, scheme-based partition routing,
//! binpatch application, and erase-coalesced flash commits.

use uf2ota_core::binpatch;
use uf2ota_core::block::{BadMagic, Block, BlockFlags, BLOCK_SIZE};
use uf2ota_core::tag::{Tag, TagIter, TagType};
use uf2ota_fal::partition::Partition;
use uf2ota_fal::scheme::{self, PartInfoOutcome, SchemeError};
use uf2ota_fal::{FlashRegistry, PartitionTable};

use crate::context::{Context, ErasedRegion, ResolvedTarget};
use crate::info::{Info, MAX_NAME_LEN};

/// Which half of the streaming state machine a just-checked block belongs
/// to, decided purely from its sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Header,
    Data,
}

/// Result of [`check_block`]: either the block is irrelevant to this
/// engine (and decoding stops there), or it decoded cleanly and is ready to
/// be handed to [`parse_header`] or [`write`].
#[derive(Debug, PartialEq, Eq)]
pub enum CheckOutcome {
    Ignore,
    Proceed(Block, BlockKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckError {
    Magic,
    Family,
}

impl From<BadMagic> for CheckError {
    fn from(_: BadMagic) -> Self {
        Self::Magic
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderError {
    SeqMismatch,
    NotHeader,
    OtaVer,
    OtaWrong,
    PartInvalid,
    Part404,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteError {
    SeqMismatch,
    PartUnset,
    Part404,
    PartInvalid,
    OtaWrong,
    EraseFailed,
    WriteFailed,
    WriteLength,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Ignore,
    Written(u32),
}

/// Errors a tag can raise while being folded into the context; shared by
/// both the header and body parse paths since both walk the same tag
/// region with the same dispatch.
enum TagError {
    OtaWrong,
    PartInvalid,
    Part404,
}

impl From<SchemeError> for TagError {
    fn from(err: SchemeError) -> Self {
        match err {
            SchemeError::PartInvalid => Self::PartInvalid,
            SchemeError::Part404 => Self::Part404,
        }
    }
}

impl From<TagError> for HeaderError {
    fn from(err: TagError) -> Self {
        match err {
            TagError::OtaWrong => Self::OtaWrong,
            TagError::PartInvalid => Self::PartInvalid,
            TagError::Part404 => Self::Part404,
        }
    }
}

impl From<TagError> for WriteError {
    fn from(err: TagError) -> Self {
        match err {
            TagError::OtaWrong => Self::OtaWrong,
            TagError::PartInvalid => Self::PartInvalid,
            TagError::Part404 => Self::Part404,
        }
    }
}

/// Step 1 of the per-block algorithm: decode framing and classify the
/// block. File-container blocks are silently ignored; magic/family
/// mismatches abort the stream.
pub fn check_block(bytes: &[u8; BLOCK_SIZE], family_id: u32) -> Result<CheckOutcome, CheckError> {
    let block = Block::decode(bytes).inspect_err(|_| {
        #[cfg(feature = "log")]
        log::warn!("uf2ota: block failed magic check");
    })?;

    if block.flags.contains(BlockFlags::FILE_CONTAINER) {
        return Ok(CheckOutcome::Ignore);
    }
    if !block.flags.contains(BlockFlags::HAS_FAMILY_ID) || block.file_size_or_family_id != family_id {
        #[cfg(feature = "log")]
        log::warn!(
            "uf2ota: block seq {} carries family id {:#010x}, expected {:#010x}",
            block.block_seq,
            block.file_size_or_family_id,
            family_id
        );
        return Err(CheckError::Family);
    }

    let kind = if block.block_seq == 0 { BlockKind::Header } else { BlockKind::Data };
    Ok(CheckOutcome::Proceed(block, kind))
}

/// Steps 2–3: accept the header block, populate `info`, and require the
/// stream to declare `OTA_FORMAT_2`.
pub fn parse_header<'t>(ctx: &mut Context<'t>, block: &Block, info: &mut Info) -> Result<(), HeaderError> {
    if block.block_seq != ctx.seq {
        return Err(HeaderError::SeqMismatch);
    }
    ctx.seq += 1;
    ctx.binpatch = None;

    if !block.flags.contains(BlockFlags::HAS_TAGS)
        || block.flags.contains(BlockFlags::FILE_CONTAINER)
        || block.len != 0
    {
        return Err(HeaderError::NotHeader);
    }

    let saw_format2 = process_tags(ctx, block, Some(info))?;
    if !saw_format2 {
        #[cfg(feature = "log")]
        log::warn!("uf2ota: header block declared no OTA_FORMAT_2 tag");
        return Err(HeaderError::OtaVer);
    }

    #[cfg(feature = "log")]
    log::info!(
        "uf2ota: header accepted, firmware {:?} {:?}, {} block(s) expected",
        info.firmware_name.as_str(),
        info.firmware_version.as_str(),
        block.block_count
    );
    Ok(())
}

/// Steps 2, 4–12: accept a body block, route it to its partition, apply
/// any pending binpatch, and commit it to flash with erase coalescing.
pub fn write<'t>(
    ctx: &mut Context<'t>,
    block: &Block,
    registry: &mut dyn FlashRegistry,
) -> Result<WriteOutcome, WriteError> {
    if block.block_seq != ctx.seq {
        #[cfg(feature = "log")]
        log::error!("uf2ota: expected block seq {}, got {}", ctx.seq, block.block_seq);
        return Err(WriteError::SeqMismatch);
    }
    ctx.seq += 1;
    ctx.binpatch = None;

    process_tags(ctx, block, None)?;

    if block.len == 0 || block.flags.contains(BlockFlags::NOT_MAIN_FLASH) {
        return Ok(WriteOutcome::Ignore);
    }
    if !ctx.is_part_set {
        #[cfg(feature = "log")]
        log::error!("uf2ota: data block seq {} arrived before any OTA_PART_INFO tag", block.block_seq);
        return Err(WriteError::PartUnset);
    }
    let Some(target) = ctx.target.clone() else {
        return Ok(WriteOutcome::Ignore);
    };

    let mut patched = block.data;
    let (_, _, requires_binpatch) = ctx.scheme.decompose();
    if requires_binpatch {
        if let Some(patch) = ctx.binpatch.take() {
            binpatch::apply(&mut patched, &patch).map_err(|_e| {
                #[cfg(feature = "log")]
                log::error!("uf2ota: binpatch application failed: {:?}", _e);
                WriteError::WriteFailed
            })?;
        }
    }

    let len = block.len;
    let end = block.addr.checked_add(len).ok_or(WriteError::WriteFailed)?;
    if end > target.partition.length {
        return Err(WriteError::WriteFailed);
    }
    let offset = target.partition.offset + block.addr;

    let device = registry
        .device(&target.partition.flash_device_name)
        .ok_or(WriteError::WriteFailed)?;

    if !ctx.erase_is_redundant(offset, len) {
        let erased_len = device.erase(offset, len).map_err(|_e| {
            #[cfg(feature = "log")]
            log::error!("uf2ota: erase at offset {:#010x} failed: {:?}", offset, _e);
            WriteError::EraseFailed
        })?;
        ctx.erased = Some(ErasedRegion { offset, length: erased_len });
    }

    let written = device.write(offset, &patched[..len as usize]).map_err(|_e| {
        #[cfg(feature = "log")]
        log::error!("uf2ota: write at offset {:#010x} failed: {:?}", offset, _e);
        WriteError::WriteFailed
    })?;
    if written < len {
        #[cfg(feature = "log")]
        log::error!("uf2ota: short write at offset {:#010x}: wrote {} of {}", offset, written, len);
        return Err(WriteError::WriteLength);
    }

    ctx.written += len;
    Ok(WriteOutcome::Written(len))
}

/// Walks a block's tag region once, folding routing tags into `ctx` and,
/// when `info` is present, metadata tags into it. Returns whether
/// `OTA_FORMAT_2` was seen (only meaningful to the header path).
fn process_tags<'t>(ctx: &mut Context<'t>, block: &Block, mut info: Option<&mut Info>) -> Result<bool, TagError> {
    let mut saw_format2 = false;

    for tag in TagIter::new(&block.data, block.tag_region_start(), block.tag_region_end()) {
        match tag.tag_type {
            TagType::OTA_FORMAT_2 => saw_format2 = true,
            TagType::OTA_PART_LIST => {
                if !scheme::resolve_part_list(tag.payload, ctx.scheme)? {
                    #[cfg(feature = "log")]
                    log::warn!("uf2ota: stream has no OTA_PART_LIST data for this scheme");
                    return Err(TagError::OtaWrong);
                }
            }
            TagType::OTA_PART_INFO => {
                let outcome = scheme::resolve_part_info(tag.payload, ctx.scheme, ctx.table.entries())
                    .inspect_err(|_e| {
                        #[cfg(feature = "log")]
                        log::warn!("uf2ota: OTA_PART_INFO resolution failed: {:?}", _e);
                    })?;
                ctx.erased = None;
                ctx.target = match outcome {
                    PartInfoOutcome::Cleared => None,
                    PartInfoOutcome::Target(partition) => {
                        #[cfg(feature = "log")]
                        log::info!("uf2ota: routed to partition {:?}", partition.name.as_str());
                        Some(ResolvedTarget { partition })
                    }
                };
                ctx.is_part_set = true;
            }
            TagType::BINPATCH => {
                ctx.binpatch = heapless::Vec::from_slice(tag.payload).ok();
            }
            TagType::FAL_PTABLE => {
                ctx.table = decode_partition_table(tag.payload);
            }
            _ => {
                if let Some(info) = info.as_deref_mut() {
                    apply_info_tag(info, tag);
                }
            }
        }
    }

    Ok(saw_format2)
}

fn apply_info_tag(info: &mut Info, tag: Tag<'_>) {
    match tag.tag_type {
        TagType::FIRMWARE => info.firmware_name = parse_name(tag.payload),
        TagType::VERSION => info.firmware_version = parse_name(tag.payload),
        TagType::LT_VERSION => info.lt_version = parse_name(tag.payload),
        TagType::BOARD => info.board = parse_name(tag.payload),
        TagType::DEVICE => info.device = parse_name(tag.payload),
        TagType::PAGE_SIZE => info.page_size = read_u32(tag.payload),
        TagType::BUILD_DATE => info.build_date = read_u32(tag.payload),
        TagType::SHA2 => info.set_sha2(tag.payload),
        TagType::DEVICE_ID => info.set_device_id(tag.payload),
        _ => {}
    }
}

fn parse_name(payload: &[u8]) -> heapless::String<MAX_NAME_LEN> {
    core::str::from_utf8(payload)
        .ok()
        .and_then(|s| heapless::String::try_from(s).ok())
        .unwrap_or_default()
}

fn read_u32(payload: &[u8]) -> Option<u32> {
    let bytes: [u8; 4] = payload.get(0..4)?.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}

/// Decodes a `FAL_PTABLE` payload: a run of
/// `{name_len:1, name, device_len:1, device, offset:4 LE, length:4 LE}`
/// records, stopping at the first malformed or truncated record (the same
/// best-effort convention the tag region walk itself uses).
fn decode_partition_table<'t>(payload: &[u8]) -> PartitionTable<'t> {
    let mut table = heapless::Vec::new();
    let mut pos = 0usize;

    while pos < payload.len() {
        let Some(&name_len) = payload.get(pos) else { break };
        if name_len == 0 {
            break;
        }
        let name_start = pos + 1;
        let Some(name_bytes) = payload.get(name_start..name_start + name_len as usize) else { break };

        let dev_len_pos = name_start + name_len as usize;
        let Some(&dev_len) = payload.get(dev_len_pos) else { break };
        let dev_start = dev_len_pos + 1;
        let Some(dev_bytes) = payload.get(dev_start..dev_start + dev_len as usize) else { break };

        let num_start = dev_start + dev_len as usize;
        let Some(num_bytes) = payload.get(num_start..num_start + 8) else { break };
        let offset = u32::from_le_bytes(num_bytes[0..4].try_into().unwrap());
        let length = u32::from_le_bytes(num_bytes[4..8].try_into().unwrap());

        let (Ok(name_str), Ok(dev_str)) = (core::str::from_utf8(name_bytes), core::str::from_utf8(dev_bytes)) else {
            break;
        };
        let (Ok(name), Ok(flash_device_name)) = (
            heapless::String::try_from(name_str),
            heapless::String::try_from(dev_str),
        ) else {
            break;
        };

        if table
            .push(Partition { name, flash_device_name, offset, length })
            .is_err()
        {
            break;
        }
        pos = num_start + 8;
    }

    PartitionTable::Owned(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uf2ota_core::tag::TagWriter;
    use uf2ota_core::{BlockFlags as CoreBlockFlags, BLOCK_SIZE as CORE_BLOCK_SIZE};
    use uf2ota_fal::flash::test_support::{MapRegistry, MemoryFlash};
    use uf2ota_fal::OtaScheme;
    use heapless::{FnvIndexMap, String};

    const FAMILY: u32 = 0x4A4D_5637;

    fn blank_block(seq: u32, count: u32, flags: BlockFlags) -> Block {
        Block {
            flags,
            addr: 0,
            len: 0,
            block_seq: seq,
            block_count: count,
            file_size_or_family_id: FAMILY,
            data: [0u8; uf2ota_core::block::DATA_AREA_SIZE],
        }
    }

    fn header_block_with_tags(build: impl FnOnce(&mut TagWriter<'_>)) -> Block {
        let mut block = blank_block(
            0,
            2,
            CoreBlockFlags::HAS_FAMILY_ID | CoreBlockFlags::HAS_TAGS,
        );
        let mut writer = TagWriter::new(&mut block.data, 0, block.data.len());
        build(&mut writer);
        block
    }

    fn partition(name: &str, offset: u32, length: u32) -> Partition {
        Partition {
            name: String::try_from(name).unwrap(),
            flash_device_name: String::try_from("f0").unwrap(),
            offset,
            length,
        }
    }

    #[test]
    fn check_block_rejects_bad_magic() {
        let bytes = [0u8; CORE_BLOCK_SIZE];
        assert_eq!(check_block(&bytes, FAMILY), Err(CheckError::Magic));
    }

    #[test]
    fn check_block_ignores_file_container() {
        let block = blank_block(
            0,
            1,
            CoreBlockFlags::HAS_FAMILY_ID | CoreBlockFlags::FILE_CONTAINER,
        );
        let bytes = block.encode();
        assert!(matches!(check_block(&bytes, FAMILY), Ok(CheckOutcome::Ignore)));
    }

    #[test]
    fn check_block_rejects_wrong_family() {
        let block = blank_block(0, 1, CoreBlockFlags::HAS_FAMILY_ID);
        let bytes = block.encode();
        assert_eq!(check_block(&bytes, FAMILY + 1), Err(CheckError::Family));
    }

    #[test]
    fn happy_path_single_scheme_writes_and_populates_info() {
        let entries = [partition("app", 0x1_0000, 0x1000)];
        let table = PartitionTable::Borrowed(&entries[..]);
        let mut ctx = Context::new(OtaScheme::DeviceSingle, FAMILY, table);
        let mut info = Info::new();

        let header = header_block_with_tags(|w| {
            w.emit(TagType::OTA_FORMAT_2, &[]).unwrap();
            w.emit(TagType::OTA_PART_LIST, &[0x11, 0x00, 0x00]).unwrap();
            let mut part_info = heapless::Vec::<u8, 16>::new();
            part_info.extend_from_slice(&[0x11, 0x00, 0x00]).unwrap();
            part_info.extend_from_slice(b"app\0").unwrap();
            w.emit(TagType::OTA_PART_INFO, &part_info).unwrap();
            w.emit(TagType::FIRMWARE, b"demo").unwrap();
            w.emit(TagType::VERSION, b"1.0.0").unwrap();
        });
        parse_header(&mut ctx, &header, &mut info).unwrap();
        assert_eq!(info.firmware_name.as_str(), "demo");
        assert_eq!(info.firmware_version.as_str(), "1.0.0");
        assert_eq!(ctx.target().unwrap().partition.name.as_str(), "app");

        let mut flash = MemoryFlash::new(0x2_0000);
        let mut devices: FnvIndexMap<&str, &mut MemoryFlash, 4> = FnvIndexMap::new();
        devices.insert("f0", &mut flash).unwrap();
        let mut registry = MapRegistry { devices };

        let mut data_block = blank_block(1, 2, CoreBlockFlags::HAS_FAMILY_ID);
        data_block.len = 256;
        data_block.data[..256].fill(0xAA);

        let outcome = write(&mut ctx, &data_block, &mut registry).unwrap();
        assert_eq!(outcome, WriteOutcome::Written(256));
        assert_eq!(ctx.written, 256);
        assert_eq!(flash.write_calls.as_slice(), &[(0x1_0000, 256)]);
        assert_eq!(flash.erase_calls.len(), 1);
    }

    #[test]
    fn header_with_zero_nibble_for_scheme_returns_ota_wrong() {
        let entries: [Partition; 0] = [];
        let table = PartitionTable::Borrowed(&entries[..]);
        let mut ctx = Context::new(OtaScheme::DeviceDual2, FAMILY, table);
        let mut info = Info::new();

        let header = header_block_with_tags(|w| {
            w.emit(TagType::OTA_FORMAT_2, &[]).unwrap();
            w.emit(TagType::OTA_PART_LIST, &[0x10, 0x00, 0x00]).unwrap();
        });

        assert_eq!(parse_header(&mut ctx, &header, &mut info), Err(HeaderError::OtaWrong));
    }

    #[test]
    fn binpatch_is_applied_before_write() {
        let entries = [partition("app", 0x1_0000, 0x1000)];
        let table = PartitionTable::Borrowed(&entries[..]);
        let mut ctx = Context::new(OtaScheme::DeviceDual2, FAMILY, table);
        ctx.seq = 1;
        ctx.is_part_set = true;
        ctx.target = Some(ResolvedTarget { partition: partition("app", 0x1_0000, 0x1000) });

        let mut flash = MemoryFlash::new(0x2_0000);
        let mut devices: FnvIndexMap<&str, &mut MemoryFlash, 4> = FnvIndexMap::new();
        devices.insert("f0", &mut flash).unwrap();
        let mut registry = MapRegistry { devices };

        let mut data_block = blank_block(1, 2, CoreBlockFlags::HAS_FAMILY_ID | CoreBlockFlags::HAS_TAGS);
        data_block.len = 16;
        let mut writer = TagWriter::new(&mut data_block.data, 16, data_block.data.len());
        writer
            .emit(TagType::BINPATCH, &[0xFE, 0x01, 0x04, 0x00, 0xEF, 0xBE, 0xAD, 0xDE])
            .unwrap();

        write(&mut ctx, &data_block, &mut registry).unwrap();
        assert_eq!(&flash.bytes[0x1_0004..0x1_0008], &[0xEF, 0xBE, 0xAD, 0xDE]);
    }

    #[test]
    fn sequence_error_causes_no_flash_side_effects() {
        let entries = [partition("app", 0x1_0000, 0x1000)];
        let table = PartitionTable::Borrowed(&entries[..]);
        let mut ctx = Context::new(OtaScheme::DeviceSingle, FAMILY, table);
        ctx.seq = 1;
        ctx.is_part_set = true;
        ctx.target = Some(ResolvedTarget { partition: partition("app", 0x1_0000, 0x1000) });

        let mut flash = MemoryFlash::new(0x2_0000);
        let mut devices: FnvIndexMap<&str, &mut MemoryFlash, 4> = FnvIndexMap::new();
        devices.insert("f0", &mut flash).unwrap();
        let mut registry = MapRegistry { devices };

        let mut bad_seq_block = blank_block(2, 3, CoreBlockFlags::HAS_FAMILY_ID);
        bad_seq_block.len = 16;

        assert_eq!(write(&mut ctx, &bad_seq_block, &mut registry), Err(WriteError::SeqMismatch));
        assert!(flash.write_calls.is_empty());
        assert!(flash.erase_calls.is_empty());
    }

    #[test]
    fn erase_coalescing_skips_second_erase_within_window() {
        let entries = [partition("app", 0x1_0000, 0x1000)];
        let table = PartitionTable::Borrowed(&entries[..]);
        let mut ctx = Context::new(OtaScheme::DeviceSingle, FAMILY, table);
        ctx.seq = 1;
        ctx.is_part_set = true;
        ctx.target = Some(ResolvedTarget { partition: partition("app", 0x1_0000, 0x1000) });

        let mut flash = MemoryFlash::new(0x2_0000);
        flash.erase_sector_size = 4096;
        let mut devices: FnvIndexMap<&str, &mut MemoryFlash, 4> = FnvIndexMap::new();
        devices.insert("f0", &mut flash).unwrap();
        let mut registry = MapRegistry { devices };

        let mut first = blank_block(1, 3, CoreBlockFlags::HAS_FAMILY_ID);
        first.addr = 0;
        first.len = 256;
        write(&mut ctx, &first, &mut registry).unwrap();

        let mut second = blank_block(2, 3, CoreBlockFlags::HAS_FAMILY_ID);
        second.addr = 256;
        second.len = 256;
        write(&mut ctx, &second, &mut registry).unwrap();

        assert_eq!(flash.erase_calls.len(), 1);
        assert_eq!(flash.write_calls.len(), 2);
    }

    #[test]
    fn part_info_index_zero_clears_target_and_suppresses_flash_calls() {
        let entries = [partition("app", 0x1_0000, 0x1000)];
        let table = PartitionTable::Borrowed(&entries[..]);
        let mut ctx = Context::new(OtaScheme::DeviceSingle, FAMILY, table);
        ctx.seq = 1;
        ctx.is_part_set = true;
        ctx.target = Some(ResolvedTarget { partition: partition("app", 0x1_0000, 0x1000) });

        let mut flash = MemoryFlash::new(0x2_0000);
        let mut devices: FnvIndexMap<&str, &mut MemoryFlash, 4> = FnvIndexMap::new();
        devices.insert("f0", &mut flash).unwrap();
        let mut registry = MapRegistry { devices };

        // A data block carrying OTA_PART_INFO with a zero index nibble clears
        // the resolved target; this block and the next are ignored even
        // though both carry payload bytes.
        let mut cleared = blank_block(1, 3, CoreBlockFlags::HAS_FAMILY_ID | CoreBlockFlags::HAS_TAGS);
        cleared.len = 16;
        let mut writer = TagWriter::new(&mut cleared.data, 16, cleared.data.len());
        writer.emit(TagType::OTA_PART_INFO, &[0x00, 0x00, 0x00, b'a', b'p', b'p', 0]).unwrap();
        assert_eq!(write(&mut ctx, &cleared, &mut registry), Ok(WriteOutcome::Ignore));
        assert!(ctx.target().is_none());

        let mut next = blank_block(2, 3, CoreBlockFlags::HAS_FAMILY_ID);
        next.len = 16;
        assert_eq!(write(&mut ctx, &next, &mut registry), Ok(WriteOutcome::Ignore));

        assert!(flash.write_calls.is_empty());
        assert!(flash.erase_calls.is_empty());
    }

    #[test]
    fn binpatch_does_not_carry_over_to_the_next_block() {
        let entries = [partition("app", 0x1_0000, 0x1000)];
        let table = PartitionTable::Borrowed(&entries[..]);
        let mut ctx = Context::new(OtaScheme::DeviceDual2, FAMILY, table);
        ctx.seq = 1;
        ctx.is_part_set = true;
        ctx.target = Some(ResolvedTarget { partition: partition("app", 0x1_0000, 0x1000) });

        let mut flash = MemoryFlash::new(0x2_0000);
        let mut devices: FnvIndexMap<&str, &mut MemoryFlash, 4> = FnvIndexMap::new();
        devices.insert("f0", &mut flash).unwrap();
        let mut registry = MapRegistry { devices };

        let mut patched_block = blank_block(1, 3, CoreBlockFlags::HAS_FAMILY_ID | CoreBlockFlags::HAS_TAGS);
        patched_block.len = 16;
        let mut writer = TagWriter::new(&mut patched_block.data, 16, patched_block.data.len());
        writer
            .emit(TagType::BINPATCH, &[0xFE, 0x01, 0x04, 0x00, 0xEF, 0xBE, 0xAD, 0xDE])
            .unwrap();
        write(&mut ctx, &patched_block, &mut registry).unwrap();
        assert_eq!(&flash.bytes[0x1_0004..0x1_0008], &[0xEF, 0xBE, 0xAD, 0xDE]);

        // The next block has no BINPATCH tag of its own; its untouched bytes
        // must reach flash unmodified rather than picking up the prior patch.
        let mut plain_block = blank_block(2, 3, CoreBlockFlags::HAS_FAMILY_ID);
        plain_block.addr = 16;
        plain_block.len = 16;
        plain_block.data[4..8].copy_from_slice(&[1, 2, 3, 4]);
        write(&mut ctx, &plain_block, &mut registry).unwrap();
        assert_eq!(&flash.bytes[0x1_0014..0x1_0018], &[1, 2, 3, 4]);
    }

    #[test]
    fn fal_ptable_override_resolves_to_overridden_partition() {
        let entries: [Partition; 0] = [];
        let table = PartitionTable::Borrowed(&entries[..]);
        let mut ctx = Context::new(OtaScheme::DeviceSingle, FAMILY, table);
        let mut info = Info::new();

        let header = header_block_with_tags(|w| {
            w.emit(TagType::OTA_FORMAT_2, &[]).unwrap();

            let mut ptable = heapless::Vec::<u8, 64>::new();
            for (name, off, len) in [("app", 0x2_0000u32, 0x4_0000u32), ("ota", 0x6_0000, 0x4_0000)] {
                ptable.push(name.len() as u8).unwrap();
                ptable.extend_from_slice(name.as_bytes()).unwrap();
                ptable.push(2).unwrap();
                ptable.extend_from_slice(b"f0").unwrap();
                ptable.extend_from_slice(&off.to_le_bytes()).unwrap();
                ptable.extend_from_slice(&len.to_le_bytes()).unwrap();
            }
            w.emit(TagType::FAL_PTABLE, &ptable).unwrap();

            w.emit(TagType::OTA_PART_LIST, &[0x11, 0x00, 0x00]).unwrap();
            let mut part_info = heapless::Vec::<u8, 16>::new();
            part_info.extend_from_slice(&[0x11, 0x00, 0x00]).unwrap();
            part_info.extend_from_slice(b"ota\0").unwrap();
            w.emit(TagType::OTA_PART_INFO, &part_info).unwrap();
        });

        parse_header(&mut ctx, &header, &mut info).unwrap();
        assert!(ctx.table.is_owned());
        assert_eq!(ctx.target().unwrap().partition.offset, 0x6_0000);
    }
}
