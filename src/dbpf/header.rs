// DBPF container header (fixed 96 bytes, little-endian).
//
// Major version 2 stores the index offset and size in two places each
// (primary at 64/68, alternate at 40/44); observed saves populate one or the
// other, so both are probed. Major version 1 has a single fixed layout.

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

pub const HEADER_SIZE: usize = 96;
pub const DBPF_MAGIC: [u8; 4] = *b"DBPF";

const MAJOR_VERSION_OFFSET: usize = 4;
const MINOR_VERSION_OFFSET: usize = 8;
const INDEX_TYPE_OFFSET: usize = 32;
const INDEX_COUNT_OFFSET: usize = 36;
const ALT_INDEX_OFFSET_OFFSET: usize = 40;
const ALT_INDEX_SIZE_OFFSET: usize = 44;
const INDEX_OFFSET_OFFSET: usize = 64;
const INDEX_SIZE_OFFSET: usize = 68;
const SENTINEL_OFFSET: usize = 80;

/// Byte pair the game's loader expects at offset 80.
pub const HEADER_SENTINEL: [u8; 2] = [0x03, 0x00];

/// Version written by `serialize`.
pub const CANONICAL_MAJOR_VERSION: u32 = 2;
pub const CANONICAL_MINOR_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Structural failure that makes a container unreadable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    #[error("header too short: {len} bytes, need 96")]
    TooShort { len: usize },
    #[error("invalid DBPF magic: {found:02X?}")]
    BadMagic { found: [u8; 4] },
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

/// Parsed DBPF header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub major_version: u32,
    pub minor_version: u32,
    pub index_type: u32,
    pub index_entry_count: u32,
    /// Absolute offset of the index within the stream.
    pub index_offset: u32,
    /// Index length in bytes.
    pub index_size: u32,
}

impl Default for Header {
    fn default() -> Self {
        Self {
            major_version: CANONICAL_MAJOR_VERSION,
            minor_version: CANONICAL_MINOR_VERSION,
            index_type: 0,
            index_entry_count: 0,
            index_offset: 0,
            index_size: 0,
        }
    }
}

#[inline]
pub(crate) fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

#[inline]
pub(crate) fn write_u32(buf: &mut [u8], at: usize, value: u32) {
    buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

/// Prefer `primary`, falling back to `alternate` when it is zero.
#[inline]
fn non_zero(primary: u32, alternate: u32) -> u32 {
    if primary != 0 { primary } else { alternate }
}

impl Header {
    /// Parse the first 96 bytes of `bytes`.
    pub fn parse(bytes: &[u8]) -> Result<Self, FormatError> {
        if bytes.len() < HEADER_SIZE {
            return Err(FormatError::TooShort { len: bytes.len() });
        }
        let magic = [bytes[0], bytes[1], bytes[2], bytes[3]];
        if magic != DBPF_MAGIC {
            return Err(FormatError::BadMagic { found: magic });
        }

        let major_version = read_u32(bytes, MAJOR_VERSION_OFFSET);
        let minor_version = read_u32(bytes, MINOR_VERSION_OFFSET);
        let index_type = read_u32(bytes, INDEX_TYPE_OFFSET);
        let index_entry_count = read_u32(bytes, INDEX_COUNT_OFFSET);
        let alt_offset = read_u32(bytes, ALT_INDEX_OFFSET_OFFSET);
        let alt_size = read_u32(bytes, ALT_INDEX_SIZE_OFFSET);

        let (index_offset, index_size) = if major_version == 2 {
            let primary_offset = read_u32(bytes, INDEX_OFFSET_OFFSET);
            let primary_size = read_u32(bytes, INDEX_SIZE_OFFSET);
            if primary_size != 0 && alt_size != 0 && primary_size != alt_size {
                log::debug!(
                    "header: index size fields disagree (primary {primary_size}, alternate {alt_size}); using primary"
                );
            }
            (non_zero(primary_offset, alt_offset), non_zero(primary_size, alt_size))
        } else {
            (alt_offset, alt_size)
        };

        Ok(Self {
            major_version,
            minor_version,
            index_type,
            index_entry_count,
            index_offset,
            index_size,
        })
    }

    /// Emit the canonical version-2 layout.
    ///
    /// Reserved fields are zero except the sentinel at offset 80. The index
    /// size is mirrored into the alternate field, which is where the game
    /// itself stores it.
    pub fn serialize(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[..4].copy_from_slice(&DBPF_MAGIC);
        write_u32(&mut buf, MAJOR_VERSION_OFFSET, CANONICAL_MAJOR_VERSION);
        write_u32(&mut buf, MINOR_VERSION_OFFSET, self.minor_version);
        write_u32(&mut buf, INDEX_TYPE_OFFSET, self.index_type);
        write_u32(&mut buf, INDEX_COUNT_OFFSET, self.index_entry_count);
        write_u32(&mut buf, ALT_INDEX_SIZE_OFFSET, self.index_size);
        write_u32(&mut buf, INDEX_OFFSET_OFFSET, self.index_offset);
        write_u32(&mut buf, INDEX_SIZE_OFFSET, self.index_size);
        buf[SENTINEL_OFFSET..SENTINEL_OFFSET + 2].copy_from_slice(&HEADER_SENTINEL);
        buf
    }

    /// Patch the index location fields of an already serialized header.
    pub fn patch_index(buf: &mut [u8], count: u32, offset: u32, size: u32) {
        write_u32(buf, INDEX_COUNT_OFFSET, count);
        write_u32(buf, ALT_INDEX_SIZE_OFFSET, size);
        write_u32(buf, INDEX_OFFSET_OFFSET, offset);
        write_u32(buf, INDEX_SIZE_OFFSET, size);
    }

    /// `"major.minor"` for display.
    pub fn version_string(&self) -> String {
        format!("{}.{}", self.major_version, self.minor_version)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn blank(major: u32) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[..4].copy_from_slice(b"DBPF");
        write_u32(&mut buf, 4, major);
        write_u32(&mut buf, 8, 1);
        buf
    }

    #[test]
    fn rejects_short_buffer() {
        assert_eq!(
            Header::parse(b"DBPF").unwrap_err(),
            FormatError::TooShort { len: 4 }
        );
    }

    #[test]
    fn rejects_bad_magic() {
        let mut buf = blank(2);
        buf[..4].copy_from_slice(b"DBPX");
        assert!(matches!(
            Header::parse(&buf),
            Err(FormatError::BadMagic { found }) if &found == b"DBPX"
        ));
    }

    #[test]
    fn version2_primary_fields() {
        let mut buf = blank(2);
        write_u32(&mut buf, 36, 12);
        write_u32(&mut buf, 64, 4096);
        write_u32(&mut buf, 68, 340);
        let h = Header::parse(&buf).unwrap();
        assert_eq!(h.index_entry_count, 12);
        assert_eq!(h.index_offset, 4096);
        assert_eq!(h.index_size, 340);
    }

    #[test]
    fn version2_alternate_size_when_primary_zero() {
        let mut buf = blank(2);
        write_u32(&mut buf, 64, 4096);
        write_u32(&mut buf, 68, 0);
        write_u32(&mut buf, 44, 777);
        let h = Header::parse(&buf).unwrap();
        assert_eq!(h.index_size, 777);
        assert_eq!(h.index_offset, 4096);
    }

    #[test]
    fn version2_alternate_offset_when_primary_zero() {
        let mut buf = blank(2);
        write_u32(&mut buf, 40, 2048);
        write_u32(&mut buf, 68, 56);
        let h = Header::parse(&buf).unwrap();
        assert_eq!(h.index_offset, 2048);
        assert_eq!(h.index_size, 56);
    }

    #[test]
    fn version1_layout() {
        let mut buf = blank(1);
        write_u32(&mut buf, 36, 3);
        write_u32(&mut buf, 40, 500);
        write_u32(&mut buf, 44, 84);
        // Version 1 never reads the primary fields.
        write_u32(&mut buf, 64, 9999);
        let h = Header::parse(&buf).unwrap();
        assert_eq!(h.major_version, 1);
        assert_eq!(h.index_offset, 500);
        assert_eq!(h.index_size, 84);
    }

    #[test]
    fn serialize_canonical_layout() {
        let h = Header {
            major_version: 1,
            minor_version: 1,
            index_type: 0,
            index_entry_count: 7,
            index_offset: 1234,
            index_size: 200,
        };
        let buf = h.serialize();
        assert_eq!(&buf[..4], b"DBPF");
        assert_eq!(read_u32(&buf, 4), 2);
        assert_eq!(read_u32(&buf, 36), 7);
        assert_eq!(read_u32(&buf, 64), 1234);
        assert_eq!(read_u32(&buf, 68), 200);
        assert_eq!(read_u32(&buf, 44), 200);
        assert_eq!(read_u32(&buf, 40), 0);
        assert_eq!(&buf[80..82], &HEADER_SENTINEL);
        assert!(buf[12..32].iter().all(|&b| b == 0));
        assert!(buf[84..].iter().all(|&b| b == 0));

        let back = Header::parse(&buf).unwrap();
        assert_eq!(back.index_offset, 1234);
        assert_eq!(back.index_size, 200);
        assert_eq!(back.major_version, 2);
    }

    #[test]
    fn patch_index_rewrites_fields() {
        let mut buf = Header::default().serialize();
        Header::patch_index(&mut buf, 5, 96, 144);
        let h = Header::parse(&buf).unwrap();
        assert_eq!(h.index_entry_count, 5);
        assert_eq!(h.index_offset, 96);
        assert_eq!(h.index_size, 144);
    }
}
