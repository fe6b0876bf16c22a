// DBPF resource index encoding/decoding.
//
// Primary (variable-width) layout:
//   flags: u32                         which fields are shared by all records
//   [type: u32]  [group: u32]  [instance_high: u32]   present if flagged
//   per record:
//     [type] [group] [instance_high]   only the fields not flagged constant
//     instance_low, offset, size|COMPRESSED_BIT, mem_size
//     [compressed_size]                only when the compressed bit is set
//
// Fixed layout (fallback, no flags word): 8 x u32 per record
//   type, group, instance_high, instance_low, offset, size|bit, mem_size,
//   compressed_size
//
// Decoding never fails: truncated input yields the records read so far.

use bitflags::bitflags;

use super::ResourceKey;

/// Top bit of the size field marks a compressed payload.
pub const COMPRESSED_BIT: u32 = 0x8000_0000;
const SIZE_MASK: u32 = !COMPRESSED_BIT;

/// Bytes per record emitted by `build_index`.
pub const RECORD_SIZE: usize = 28;
/// Bytes per record in the fixed fallback layout.
pub const FIXED_RECORD_SIZE: usize = 32;

bitflags! {
    /// Fields stored once in the index preamble instead of per record.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IndexFlags: u32 {
        const CONST_TYPE = 0x1;
        const CONST_GROUP = 0x2;
        const CONST_INSTANCE_HIGH = 0x4;
    }
}

/// Which layout an index was decoded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexLayout {
    #[default]
    Flagged,
    Fixed,
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One index entry. Offsets and sizes are only meaningful for the byte
/// stream the record was read from or written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceRecord {
    pub key: ResourceKey,
    pub offset: u32,
    /// Size in the container, compressed bit already masked off.
    pub file_size: u32,
    /// Decompressed size.
    pub mem_size: u32,
    pub compressed: bool,
}

/// Decoded index plus how it was laid out.
#[derive(Debug, Clone, Default)]
pub struct ParsedIndex {
    pub layout: IndexLayout,
    pub records: Vec<ResourceRecord>,
    /// Fewer records than declared could be read.
    pub truncated: bool,
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    #[inline]
    fn u32(&mut self) -> Option<u32> {
        let bytes = self.data.get(self.pos..self.pos + 4)?;
        self.pos += 4;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode an index declaring `count` records.
///
/// Tries the flagged layout when the first word looks like a flags value,
/// then the fixed layout if that produced nothing.
///
/// The probe only looks at the first word. A fixed-layout index whose first
/// type id is itself `<= 7` (`types::BUILDING_DATA` is 6) is read as flagged,
/// and the fixed layout is only tried if that yields no records.
pub fn parse_index(data: &[u8], count: u32) -> ParsedIndex {
    if count == 0 {
        return ParsedIndex::default();
    }

    let attempts: [fn(&[u8], u32) -> Option<ParsedIndex>; 2] = [parse_flagged, parse_fixed];
    let parsed = attempts
        .iter()
        .find_map(|attempt| attempt(data, count).filter(|p| !p.records.is_empty()));

    match parsed {
        Some(index) => {
            if index.truncated {
                log::warn!(
                    "index truncated: read {} of {count} records ({} bytes available)",
                    index.records.len(),
                    data.len()
                );
            }
            log::debug!("index: {:?} layout, {} records", index.layout, index.records.len());
            index
        }
        None => {
            log::warn!("index unreadable: no records decoded from {} bytes", data.len());
            ParsedIndex {
                truncated: true,
                ..ParsedIndex::default()
            }
        }
    }
}

/// Does the first word look like an `IndexFlags` value?
fn looks_like_flags(data: &[u8]) -> Option<IndexFlags> {
    let word = Reader { data, pos: 0 }.u32()?;
    IndexFlags::from_bits(word)
}

/// Variable-width layout with a flags preamble.
pub fn parse_flagged(data: &[u8], count: u32) -> Option<ParsedIndex> {
    let flags = looks_like_flags(data)?;
    let mut r = Reader { data, pos: 4 };

    let mut shared = |flag: IndexFlags| -> Option<Option<u32>> {
        if flags.contains(flag) { r.u32().map(Some) } else { Some(None) }
    };
    let const_type = shared(IndexFlags::CONST_TYPE)?;
    let const_group = shared(IndexFlags::CONST_GROUP)?;
    let const_high = shared(IndexFlags::CONST_INSTANCE_HIGH)?;

    let mut records = Vec::with_capacity((count as usize).min(data.len() / 16));
    for _ in 0..count {
        let Some(record) = read_flagged_record(&mut r, const_type, const_group, const_high) else {
            break;
        };
        records.push(record);
    }

    Some(ParsedIndex {
        layout: IndexLayout::Flagged,
        truncated: records.len() < count as usize,
        records,
    })
}

fn read_flagged_record(
    r: &mut Reader<'_>,
    const_type: Option<u32>,
    const_group: Option<u32>,
    const_high: Option<u32>,
) -> Option<ResourceRecord> {
    let type_id = match const_type {
        Some(v) => v,
        None => r.u32()?,
    };
    let group_id = match const_group {
        Some(v) => v,
        None => r.u32()?,
    };
    let high = match const_high {
        Some(v) => v,
        None => r.u32()?,
    };
    let low = r.u32()?;
    let offset = r.u32()?;
    let raw_size = r.u32()?;
    let mem_size = r.u32()?;
    let compressed = raw_size & COMPRESSED_BIT != 0;
    if compressed {
        // Redundant compressed size; not used.
        r.u32()?;
    }

    Some(ResourceRecord {
        key: ResourceKey::from_parts(type_id, group_id, high, low),
        offset,
        file_size: raw_size & SIZE_MASK,
        mem_size,
        compressed,
    })
}

/// Fixed 32-byte records, no preamble.
pub fn parse_fixed(data: &[u8], count: u32) -> Option<ParsedIndex> {
    let records: Vec<ResourceRecord> = data
        .chunks_exact(FIXED_RECORD_SIZE)
        .take(count as usize)
        .filter_map(|chunk| {
            let mut r = Reader { data: chunk, pos: 0 };
            let type_id = r.u32()?;
            let group_id = r.u32()?;
            let high = r.u32()?;
            let low = r.u32()?;
            let offset = r.u32()?;
            let raw_size = r.u32()?;
            let mem_size = r.u32()?;
            Some(ResourceRecord {
                key: ResourceKey::from_parts(type_id, group_id, high, low),
                offset,
                file_size: raw_size & SIZE_MASK,
                mem_size,
                compressed: raw_size & COMPRESSED_BIT != 0,
            })
        })
        .collect();

    Some(ParsedIndex {
        layout: IndexLayout::Fixed,
        truncated: records.len() < count as usize,
        records,
    })
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encode records in the simplest flagged form.
///
/// No constant fields, 7 x u32 per record, no compressed bit: saved payloads
/// are always stored uncompressed.
pub fn build_index(records: &[ResourceRecord]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + records.len() * RECORD_SIZE);
    out.extend_from_slice(&IndexFlags::empty().bits().to_le_bytes());
    for rec in records {
        for word in [
            rec.key.type_id,
            rec.key.group_id,
            rec.key.instance_high(),
            rec.key.instance_low(),
            rec.offset,
            rec.file_size & SIZE_MASK,
            rec.mem_size,
        ] {
            out.extend_from_slice(&word.to_le_bytes());
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn words(ws: &[u32]) -> Vec<u8> {
        ws.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    fn record(t: u32, g: u32, i: u64, offset: u32, size: u32) -> ResourceRecord {
        ResourceRecord {
            key: ResourceKey::new(t, g, i),
            offset,
            file_size: size,
            mem_size: size,
            compressed: false,
        }
    }

    #[test]
    fn build_then_parse() {
        let recs = vec![
            record(0x6, 0, 0x0000_0001_0000_0002, 96, 10),
            record(0xC0DB5AE7, 7, 0xFFFF_FFFF_0000_0000, 106, 20),
        ];
        let bytes = build_index(&recs);
        assert_eq!(bytes.len(), 4 + 2 * RECORD_SIZE);
        let parsed = parse_index(&bytes, 2);
        assert_eq!(parsed.layout, IndexLayout::Flagged);
        assert!(!parsed.truncated);
        assert_eq!(parsed.records, recs);
    }

    #[test]
    fn build_masks_compressed_bit() {
        let mut rec = record(1, 2, 3, 96, 10);
        rec.compressed = true;
        let bytes = build_index(&[rec]);
        let parsed = parse_index(&bytes, 1);
        assert!(!parsed.records[0].compressed);
        assert_eq!(parsed.records[0].file_size, 10);
    }

    #[test]
    fn constant_fields_are_shared() {
        let flags = (IndexFlags::CONST_TYPE | IndexFlags::CONST_INSTANCE_HIGH).bits();
        let mut data = words(&[flags, 0x0000_0006, 0x0000_00AA]);
        // record 1: group, low, offset, size, mem
        data.extend(words(&[1, 0x10, 96, 8, 8]));
        // record 2: compressed, carries a trailing compressed size
        data.extend(words(&[2, 0x20, 104, 5 | COMPRESSED_BIT, 40, 5]));
        let parsed = parse_index(&data, 2);
        assert_eq!(parsed.records.len(), 2);
        let [a, b] = [parsed.records[0], parsed.records[1]];
        assert_eq!(a.key, ResourceKey::new(6, 1, 0x0000_00AA_0000_0010));
        assert!(!a.compressed);
        assert_eq!(b.key, ResourceKey::new(6, 2, 0x0000_00AA_0000_0020));
        assert!(b.compressed);
        assert_eq!(b.file_size, 5);
        assert_eq!(b.mem_size, 40);
    }

    #[test]
    fn truncated_index_returns_partial() {
        let recs: Vec<_> = (0..4).map(|i| record(1, 0, i, 96 + i as u32, 1)).collect();
        let bytes = build_index(&recs);
        let cut = &bytes[..4 + RECORD_SIZE * 2 + 10];
        let parsed = parse_index(cut, 4);
        assert_eq!(parsed.records, recs[..2]);
        assert!(parsed.truncated);
    }

    #[test]
    fn declared_count_larger_than_data() {
        let bytes = build_index(&[record(1, 2, 3, 96, 4)]);
        let parsed = parse_index(&bytes, 1000);
        assert_eq!(parsed.records.len(), 1);
        assert!(parsed.truncated);
    }

    #[test]
    fn fixed_layout_fallback() {
        // First word is a type id, far from a small flags value.
        let data = words(&[
            0xE882D22F, 0, 0, 5, 96, 12 | COMPRESSED_BIT, 30, 12, //
            0xDC95CF1A, 1, 2, 3, 108, 4, 4, 0,
        ]);
        let parsed = parse_index(&data, 2);
        assert_eq!(parsed.layout, IndexLayout::Fixed);
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.records[0].key, ResourceKey::new(0xE882D22F, 0, 5));
        assert!(parsed.records[0].compressed);
        assert_eq!(parsed.records[0].file_size, 12);
        assert_eq!(parsed.records[1].key, ResourceKey::new(0xDC95CF1A, 1, 0x2_0000_0003));
    }

    #[test]
    fn flagged_parse_declines_non_flag_preamble() {
        let data = words(&[0xE882D22F, 0, 0, 5, 96, 4, 4, 0]);
        assert!(parse_flagged(&data, 1).is_none());
        assert_eq!(parse_fixed(&data, 1).unwrap().records.len(), 1);
    }

    #[test]
    fn fixed_layout_used_when_flagged_yields_nothing() {
        // Flags word 0, then a record whose size field carries the compressed
        // bit; the trailing compressed-size word is missing.
        let data = words(&[0, 6, 0, 0, 1, 96, 4 | COMPRESSED_BIT, 4]);
        assert!(parse_flagged(&data, 1).unwrap().records.is_empty());
        let parsed = parse_index(&data, 1);
        assert_eq!(parsed.layout, IndexLayout::Fixed);
        assert_eq!(parsed.records[0].key, ResourceKey::new(0, 6, 0));
    }

    #[test]
    fn fixed_index_starting_with_small_type_reads_as_flagged() {
        // Fixed record of type 6: the first word passes as CONST_GROUP |
        // CONST_INSTANCE_HIGH and the flagged decode succeeds with wrong keys.
        let data = words(&[6, 0, 0, 1, 96, 4, 4, 0]);
        let parsed = parse_index(&data, 1);
        assert_eq!(parsed.layout, IndexLayout::Flagged);
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.records[0].key, ResourceKey::new(1, 0, 96));
        assert_ne!(parsed.records[0].key.type_id, 6);

        let fixed = parse_fixed(&data, 1).unwrap();
        assert_eq!(fixed.records[0].key, ResourceKey::new(6, 0, 1));
    }

    #[test]
    fn empty_or_garbage_index() {
        assert!(parse_index(&[], 3).records.is_empty());
        assert!(parse_index(&[1, 2], 3).records.is_empty());
        assert!(parse_index(&[], 0).records.is_empty());
        assert!(!parse_index(&[], 0).truncated);
    }
}
