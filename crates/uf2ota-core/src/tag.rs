//! The tag region: a run of 4-byte-aligned, length-prefixed metadata records
//! carried inside a block's payload area.

/// Size of a tag's fixed header: 1-byte total length + 3-byte type.
pub const TAG_HEADER_SIZE: usize = 4;

/// Largest total tag length representable (length is a single byte).
pub const MAX_TAG_TOTAL_LEN: usize = 255;

/// Largest payload a single tag can carry.
pub const MAX_TAG_PAYLOAD_LEN: usize = MAX_TAG_TOTAL_LEN - TAG_HEADER_SIZE;

/// A tag's 3-byte little-endian type identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagType(pub u32);

impl TagType {
    pub const VERSION: Self = Self(0x9F_C7BC);
    pub const PAGE_SIZE: Self = Self(0x0B_E9F7);
    pub const SHA2: Self = Self(0xB4_6DB0);
    pub const DEVICE: Self = Self(0x65_0D9D);
    pub const DEVICE_ID: Self = Self(0xC8_A729);
    pub const OTA_FORMAT_1: Self = Self(0x5D_57D0);
    pub const OTA_FORMAT_2: Self = Self(0x6C_8492);
    pub const OTA_PART_LIST: Self = Self(0x6E_C68A);
    pub const OTA_PART_INFO: Self = Self(0xC0_EE0C);
    pub const BOARD: Self = Self(0xCA_25C8);
    pub const FIRMWARE: Self = Self(0x00_DE43);
    pub const BUILD_DATE: Self = Self(0x82_2F30);
    pub const BINPATCH: Self = Self(0xB9_48DE);
    pub const FAL_PTABLE: Self = Self(0x82_88ED);
    pub const LT_VERSION: Self = Self(0x59_563D);

    const fn from_le_bytes(bytes: [u8; 3]) -> Self {
        Self(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]))
    }

    const fn to_le_bytes(self) -> [u8; 3] {
        let b = self.0.to_le_bytes();
        [b[0], b[1], b[2]]
    }
}

/// A single decoded tag: its type and a borrowed view of its payload.
#[derive(Debug, Clone, Copy)]
pub struct Tag<'a> {
    pub tag_type: TagType,
    pub payload: &'a [u8],
}

/// Walks the tag region of a block's data area.
///
/// Stops (silently — there is no malformed-tag error at this layer) as soon
/// as a zero length/type is seen, or fewer than [`TAG_HEADER_SIZE`] bytes
/// remain, or a record's declared length would run past the region end.
pub struct TagIter<'a> {
    data: &'a [u8],
    pos: usize,
    end: usize,
}

impl<'a> TagIter<'a> {
    /// `data` is the block's full payload area; `start`/`end` bound the tag
    /// region within it (see `Block::tag_region_start`/`tag_region_end`).
    pub fn new(data: &'a [u8], start: usize, end: usize) -> Self {
        Self {
            data,
            pos: start,
            end: end.min(data.len()),
        }
    }
}

impl<'a> Iterator for TagIter<'a> {
    type Item = Tag<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos + TAG_HEADER_SIZE > self.end {
            return None;
        }

        let total_len = self.data[self.pos] as usize;
        if total_len == 0 {
            return None;
        }
        let tag_type = TagType::from_le_bytes([
            self.data[self.pos + 1],
            self.data[self.pos + 2],
            self.data[self.pos + 3],
        ]);
        if tag_type.0 == 0 {
            return None;
        }

        let record_end = self.pos + total_len;
        if total_len < TAG_HEADER_SIZE || record_end > self.end {
            return None;
        }

        let payload = &self.data[self.pos + TAG_HEADER_SIZE..record_end];
        self.pos = align_up4(record_end);
        Some(Tag { tag_type, payload })
    }
}

const fn align_up4(value: usize) -> usize {
    (value + 3) & !3
}

/// The tag's payload would not fit in the space remaining in the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataTooLong;

/// Appends tags into a block's data area, padding each to a 4-byte boundary
/// and tracking the write cursor.
pub struct TagWriter<'a> {
    data: &'a mut [u8],
    pos: usize,
    end: usize,
}

impl<'a> TagWriter<'a> {
    /// `data` is the block's full payload area; tags are written starting at
    /// `start` and must not run past `end` (see
    /// `Block::tag_region_start`/`tag_region_end`).
    pub fn new(data: &'a mut [u8], start: usize, end: usize) -> Self {
        Self {
            data,
            pos: start,
            end,
        }
    }

    /// Bytes still available for further tags.
    pub fn remaining(&self) -> usize {
        self.end.saturating_sub(self.pos)
    }

    /// Append one tag, padded to the next 4-byte boundary.
    pub fn emit(&mut self, tag_type: TagType, payload: &[u8]) -> Result<(), DataTooLong> {
        let total_len = TAG_HEADER_SIZE + payload.len();
        if payload.len() > MAX_TAG_PAYLOAD_LEN {
            return Err(DataTooLong);
        }
        let padded_len = align_up4(total_len);
        if self.pos + padded_len > self.end {
            return Err(DataTooLong);
        }

        self.data[self.pos] = total_len as u8;
        self.data[self.pos + 1..self.pos + 4].copy_from_slice(&tag_type.to_le_bytes());
        self.data[self.pos + TAG_HEADER_SIZE..self.pos + total_len].copy_from_slice(payload);
        for byte in &mut self.data[self.pos + total_len..self.pos + padded_len] {
            *byte = 0;
        }

        self.pos += padded_len;
        Ok(())
    }

    /// Final write cursor position, i.e. how much of the region was used.
    pub fn cursor(&self) -> usize {
        self.pos
    }
}
