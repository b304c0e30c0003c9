//! The header out-parameter: metadata read from the first block of a
//! stream, independent of the context's lifetime.

use heapless::String;

pub const MAX_NAME_LEN: usize = 32;
pub const SHA2_LEN: usize = 32;
pub const DEVICE_ID_LEN: usize = 16;

/// Populated by [`crate::writer::parse_header`] from the header block's
/// tags. Fields stay at their defaults for any tag the header omits.
#[derive(Debug, Clone, Default)]
pub struct Info {
    pub firmware_name: String<MAX_NAME_LEN>,
    pub firmware_version: String<MAX_NAME_LEN>,
    pub lt_version: String<MAX_NAME_LEN>,
    pub board: String<MAX_NAME_LEN>,
    pub device: String<MAX_NAME_LEN>,
    pub page_size: Option<u32>,
    pub build_date: Option<u32>,
    pub sha2: Option<[u8; SHA2_LEN]>,
    pub sha2_len: usize,
    pub device_id: Option<[u8; DEVICE_ID_LEN]>,
    pub device_id_len: usize,
}

impl Info {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_sha2(&mut self, payload: &[u8]) {
        let len = payload.len().min(SHA2_LEN);
        let mut buf = [0u8; SHA2_LEN];
        buf[..len].copy_from_slice(&payload[..len]);
        self.sha2 = Some(buf);
        self.sha2_len = len;
    }

    pub(crate) fn set_device_id(&mut self, payload: &[u8]) {
        let len = payload.len().min(DEVICE_ID_LEN);
        let mut buf = [0u8; DEVICE_ID_LEN];
        buf[..len].copy_from_slice(&payload[..len]);
        self.device_id = Some(buf);
        self.device_id_len = len;
    }
}
