//! Recording file layout

use bytemuck::{Pod, Zeroable};

/// File magic bytes: "PLAYBK\x00\x01"
pub const FILE_MAGIC: [u8; 8] = [0x50, 0x4C, 0x41, 0x59, 0x42, 0x4B, 0x00, 0x01];

/// Current container version
pub const FILE_VERSION: u32 = 1;

/// File header size
pub const HEADER_SIZE: usize = 32;

/// Largest payload accepted by the reader, stored or inflated
pub const PAYLOAD_LEN_MAX: u64 = 256 * 1024 * 1024;

/// Payload is zlib-deflated JSON
pub const FLAG_DEFLATE: u32 = 1;

/// File header, followed by `payload_len` stored payload bytes.
///
/// The payload is UTF-8 JSON, deflated when `flags` has [`FLAG_DEFLATE`].
/// Length and CRC cover the stored bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct FileHeader {
    /// Magic bytes for file format identification
    pub magic: [u8; 8],

    /// Container version
    pub version: u32,

    /// CRC32 of the payload
    pub payload_crc: u32,

    /// Payload length in bytes
    pub payload_len: u64,

    /// Payload encoding flags
    pub flags: u32,

    /// Reserved for future use
    pub reserved: [u8; 4],
}

static_assertions::const_assert_eq!(std::mem::size_of::<FileHeader>(), HEADER_SIZE);
static_assertions::const_assert_eq!(std::mem::align_of::<FileHeader>(), 8);

impl FileHeader {
    /// Header describing a stored `payload`
    #[must_use]
    pub fn for_payload(payload: &[u8], flags: u32) -> Self {
        Self {
            magic: FILE_MAGIC,
            version: FILE_VERSION,
            payload_crc: crc32fast::hash(payload),
            payload_len: payload.len() as u64,
            flags,
            reserved: [0; 4],
        }
    }

    /// Whether the payload must be inflated
    #[must_use]
    pub fn is_deflated(&self) -> bool {
        self.flags & FLAG_DEFLATE != 0
    }
}
