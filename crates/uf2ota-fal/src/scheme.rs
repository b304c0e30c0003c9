//! OTA scheme resolution: turning the one-byte scheme selector carried in the
//! UF2 header, plus the `OTA_PART_LIST`/`OTA_PART_INFO` tags, into a concrete
//! target partition.
//!
//! This module is deliberately ignorant of [`crate::flash::FlashDevice`] and
//! of any writer state: it only interprets bytes against a partition table
//! and hands back a decision. The writer applies that decision, including
//! looking the resolved partition's flash device up in a
//! [`crate::flash::FlashRegistry`].

use crate::partition::Partition;

/// The six defined OTA schemes, encoded as a single selector byte.
///
/// Each scheme picks one nibble out of the three-byte `OTA_PART_LIST`/
/// `OTA_PART_INFO` header: even values read the high nibble of a "device"
/// slot, odd values the low nibble of the same byte's paired "flasher"
/// slot. `DEVICE_DUAL_2`/`FLASHER_DUAL_2` additionally require a binpatch
/// tag, since the second of a dual-slot pair is reconstructed as a diff
/// against the first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OtaScheme {
    DeviceSingle = 0,
    FlasherSingle = 1,
    DeviceDual1 = 2,
    FlasherDual1 = 3,
    DeviceDual2 = 4,
    FlasherDual2 = 5,
}

impl OtaScheme {
    pub fn from_value(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::DeviceSingle,
            1 => Self::FlasherSingle,
            2 => Self::DeviceDual1,
            3 => Self::FlasherDual1,
            4 => Self::DeviceDual2,
            5 => Self::FlasherDual2,
            _ => return None,
        })
    }

    /// `(byte_index, nibble_shift, requires_binpatch)` for this scheme.
    pub fn decompose(self) -> (usize, u8, bool) {
        let value = self as u8;
        let byte_index = (value >> 1) as usize;
        let nibble_shift = if value % 2 == 0 { 4 } else { 0 };
        let requires_binpatch = matches!(self, Self::DeviceDual2 | Self::FlasherDual2);
        (byte_index, nibble_shift, requires_binpatch)
    }
}

/// Scheme resolution failed in a way that aborts the whole stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemeError {
    /// `OTA_PART_LIST`/`OTA_PART_INFO` payload was shorter than the 3-byte
    /// header this scheme's byte index falls within.
    PartInvalid,
    /// The resolved partition index has no corresponding name in
    /// `OTA_PART_INFO`, or names a partition absent from the table.
    Part404,
}

/// Result of resolving `OTA_PART_INFO` against a scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartInfoOutcome {
    /// Index nibble was 0: this scheme is not targeted by this stream.
    Cleared,
    /// Index nibble named a partition present in the table.
    Target(Partition),
}

fn nibble_at(payload: &[u8], byte_index: usize, nibble_shift: u8) -> Result<u8, SchemeError> {
    let byte = *payload.get(byte_index).ok_or(SchemeError::PartInvalid)?;
    Ok((byte >> nibble_shift) & 0x0F)
}

/// Checks whether `OTA_PART_LIST`'s nibble for `scheme` is nonzero, i.e.
/// whether this stream claims to target the scheme at all.
pub fn resolve_part_list(payload: &[u8], scheme: OtaScheme) -> Result<bool, SchemeError> {
    let (byte_index, shift, _) = scheme.decompose();
    Ok(nibble_at(payload, byte_index, shift)? != 0)
}

/// Walks the NUL-terminated name list following `OTA_PART_INFO`'s 3-byte
/// header and returns the `index`-th name (1-based).
fn nth_name(names_area: &[u8], index: u8) -> Result<&[u8], SchemeError> {
    let mut start = 0usize;
    let mut seen = 0u8;
    while start < names_area.len() {
        match names_area[start..].iter().position(|&b| b == 0) {
            Some(rel_nul) => {
                let name = &names_area[start..start + rel_nul];
                seen += 1;
                if seen == index {
                    return if name.is_empty() {
                        Err(SchemeError::PartInvalid)
                    } else {
                        Ok(name)
                    };
                }
                start += rel_nul + 1;
            }
            None => break,
        }
    }
    Err(SchemeError::PartInvalid)
}

/// Resolves `OTA_PART_INFO` against a scheme and a partition table.
///
/// `payload` is the tag's full payload: a 3-byte index header (same layout
/// as `OTA_PART_LIST`) followed by NUL-terminated partition names, 1-indexed
/// by the resolved nibble.
pub fn resolve_part_info<'a>(
    payload: &[u8],
    scheme: OtaScheme,
    table: &'a [Partition],
) -> Result<PartInfoOutcome, SchemeError> {
    let (byte_index, shift, _) = scheme.decompose();
    let index = nibble_at(payload, byte_index, shift)?;
    if index == 0 {
        return Ok(PartInfoOutcome::Cleared);
    }
    if index > 6 {
        return Err(SchemeError::PartInvalid);
    }

    let names_area = payload.get(3..).ok_or(SchemeError::PartInvalid)?;
    let name = nth_name(names_area, index)?;
    let name = core::str::from_utf8(name).map_err(|_| SchemeError::PartInvalid)?;

    table
        .iter()
        .find(|p| p.name == name)
        .cloned()
        .map(PartInfoOutcome::Target)
        .ok_or(SchemeError::Part404)
}
