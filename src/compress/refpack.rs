// RefPack (QFS) sliding-window LZ77 codec.
//
// Stream layout:
//   `10 FB`                 short header, no size hint
//   `90 FB` + u24 (BE)      long header carrying the uncompressed size
// followed by control bytes. Each control byte selects one of five packings
// that yield (literal count, copy length, copy offset):
//
//   00-7F  2 bytes  lit 0-3   len 3-10     offset < 1024
//   80-BF  3 bytes  lit 0-3   len 4-67     offset < 16384
//   C0-DF  4 bytes  lit 0-3   len 5-1028   offset < 131072
//   E0-FB  1 byte   lit 4-112 (multiple of 4), no copy
//   FC-FF  1 byte   lit 0-3, no copy, end of stream
//
// Literals are appended first, then `len` bytes are copied one at a time from
// `offset + 1` bytes behind the output cursor, so overlapping copies expand
// runs.
//
// The decoder never fails. Save containers reaching this code may be
// partially corrupt, so malformed or truncated input yields whatever was
// decoded up to that point.

use std::collections::HashMap;

/// Short-form signature (2-byte header).
pub const SIGNATURE_SHORT: [u8; 2] = [0x10, 0xFB];
/// Long-form signature (5-byte header with a size hint).
pub const SIGNATURE_LONG: [u8; 2] = [0x90, 0xFB];

const SHORT_HEADER_LEN: usize = 2;
const LONG_HEADER_LEN: usize = 5;

/// Largest size the 24-bit header hint can carry.
const MAX_SIZE_HINT: usize = 0x00FF_FFFF;

/// Cap on up-front allocation driven by untrusted size fields.
const MAX_PREALLOC: usize = 16 << 20;

// Encoder limits per packing.
const MAX_DISTANCE_SHORT: usize = 1 << 10;
const MAX_DISTANCE_MEDIUM: usize = 1 << 14;
const MAX_DISTANCE_LONG: usize = 1 << 17;
const MAX_LEN_SHORT: usize = 10;
const MAX_LEN_MEDIUM: usize = 67;
const MAX_LEN_LONG: usize = 1028;
const MIN_MATCH: usize = 3;
const MAX_LITERAL_RUN: usize = 112;

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

/// Does `data` start with a RefPack signature?
#[inline]
pub fn has_signature(data: &[u8]) -> bool {
    data.len() >= 2 && (data[..2] == SIGNATURE_SHORT || data[..2] == SIGNATURE_LONG)
}

/// Header length implied by the signature, or `None` if there is none.
pub fn header_len(data: &[u8]) -> Option<usize> {
    if data.len() < 2 {
        return None;
    }
    match [data[0], data[1]] {
        SIGNATURE_SHORT => Some(SHORT_HEADER_LEN),
        SIGNATURE_LONG => Some(LONG_HEADER_LEN),
        _ => None,
    }
}

/// Uncompressed size embedded in a long-form header.
pub fn size_hint(data: &[u8]) -> Option<usize> {
    if header_len(data)? != LONG_HEADER_LEN || data.len() < LONG_HEADER_LEN {
        return None;
    }
    Some(((data[2] as usize) << 16) | ((data[3] as usize) << 8) | data[4] as usize)
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// One decoded control: literals to append, then a back-reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Control {
    literals: usize,
    copy_len: usize,
    copy_offset: usize,
    last: bool,
}

struct Input<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Input<'a> {
    #[inline]
    fn byte(&mut self) -> Option<u8> {
        let b = *self.data.get(self.pos)?;
        self.pos += 1;
        Some(b)
    }

    /// Take up to `n` bytes; fewer if the input runs out.
    #[inline]
    fn take(&mut self, n: usize) -> &'a [u8] {
        let end = self.pos.saturating_add(n).min(self.data.len());
        let slice = &self.data[self.pos..end];
        self.pos = end;
        slice
    }

    /// Read the remainder of a control; `None` if it is cut short.
    fn control(&mut self, b0: u8) -> Option<Control> {
        let ctl = match b0 {
            0x00..=0x7F => {
                let b1 = self.byte()? as usize;
                Control {
                    literals: (b0 & 0x03) as usize,
                    copy_len: ((b0 >> 2) & 0x07) as usize + 3,
                    copy_offset: (((b0 & 0x60) as usize) << 3) | b1,
                    last: false,
                }
            }
            0x80..=0xBF => {
                let b1 = self.byte()?;
                let b2 = self.byte()? as usize;
                Control {
                    literals: (b1 >> 6) as usize,
                    copy_len: (b0 & 0x3F) as usize + 4,
                    copy_offset: (((b1 & 0x3F) as usize) << 8) | b2,
                    last: false,
                }
            }
            0xC0..=0xDF => {
                let b1 = self.byte()? as usize;
                let b2 = self.byte()? as usize;
                let b3 = self.byte()? as usize;
                Control {
                    literals: (b0 & 0x03) as usize,
                    copy_len: ((((b0 >> 2) & 0x03) as usize) << 8) + b3 + 5,
                    copy_offset: (((b0 & 0x10) as usize) << 12) | (b1 << 8) | b2,
                    last: false,
                }
            }
            0xE0..=0xFB => Control {
                literals: (((b0 & 0x1F) as usize) + 1) * 4,
                copy_len: 0,
                copy_offset: 0,
                last: false,
            },
            0xFC..=0xFF => Control {
                literals: (b0 & 0x03) as usize,
                copy_len: 0,
                copy_offset: 0,
                last: true,
            },
        };
        Some(ctl)
    }
}

/// Decompress a RefPack stream.
///
/// Decoding stops when the input is exhausted, `target_size` bytes have been
/// produced, or an end-of-stream control is read. A back-reference reaching
/// before the start of the output copies only its in-range bytes and decoding
/// carries on with the next control. A `target_size` of zero
/// falls back to the header's size hint, and to "unbounded" without one.
/// Input without a signature is decoded as a bare control stream.
pub fn decompress(data: &[u8], target_size: usize) -> Vec<u8> {
    let target = match target_size {
        0 => size_hint(data).unwrap_or(usize::MAX),
        n => n,
    };
    let mut src = Input {
        data,
        pos: header_len(data).unwrap_or(0),
    };
    let mut out = Vec::with_capacity(target.min(MAX_PREALLOC));

    while out.len() < target {
        let Some(b0) = src.byte() else {
            break;
        };
        let Some(ctl) = src.control(b0) else {
            log::debug!("refpack: control {b0:#04X} truncated at input offset {}", src.pos);
            break;
        };

        let room = target - out.len();
        let literals = src.take(ctl.literals);
        out.extend_from_slice(&literals[..literals.len().min(room)]);
        if literals.len() < ctl.literals {
            break;
        }

        let distance = ctl.copy_offset + 1;
        let base = out.len();
        if ctl.copy_len > 0 && distance > base {
            log::debug!("refpack: back-reference {distance} exceeds {base} decoded bytes");
        }
        // Positions before the start of the output are skipped, the rest copied.
        for i in 0..ctl.copy_len {
            if out.len() >= target {
                break;
            }
            let Some(&b) = (base + i).checked_sub(distance).and_then(|j| out.get(j)) else {
                continue;
            };
            out.push(b);
        }

        if ctl.last {
            break;
        }
    }

    out
}

// ---------------------------------------------------------------------------
// Encoder
// ---------------------------------------------------------------------------

/// Compress `data` into a RefPack stream.
///
/// Greedy single-candidate matcher: each 3-byte prefix remembers its most
/// recent position. The long header is emitted when the size fits in 24
/// bits, the short header otherwise.
///
/// Containers are always saved with uncompressed payloads, so this encoder is
/// not on the save path; it exists to produce RefPack input for tests,
/// benchmarks and fuzzing.
pub fn compress(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() / 2 + 16);
    if data.len() <= MAX_SIZE_HINT {
        out.extend_from_slice(&SIGNATURE_LONG);
        let n = data.len();
        out.extend_from_slice(&[(n >> 16) as u8, (n >> 8) as u8, n as u8]);
    } else {
        out.extend_from_slice(&SIGNATURE_SHORT);
    }

    let mut recent: HashMap<[u8; 3], usize> = HashMap::new();
    let mut literal_start = 0usize;
    let mut pos = 0usize;

    while pos + MIN_MATCH <= data.len() {
        let prefix = [data[pos], data[pos + 1], data[pos + 2]];
        let candidate = recent.insert(prefix, pos);

        let found = candidate.and_then(|prev| {
            let distance = pos - prev;
            let max_len = MAX_LEN_LONG.min(data.len() - pos);
            let len = data[prev..]
                .iter()
                .zip(&data[pos..pos + max_len])
                .take_while(|(a, b)| a == b)
                .count();
            encodable(len, distance).map(|len| (len, distance))
        });

        let Some((len, distance)) = found else {
            pos += 1;
            continue;
        };

        let tail = emit_literal_runs(&mut out, &data[literal_start..pos]);
        emit_copy(&mut out, tail, len, distance);

        for p in pos + 1..(pos + len).min(data.len().saturating_sub(MIN_MATCH - 1)) {
            recent.insert([data[p], data[p + 1], data[p + 2]], p);
        }
        pos += len;
        literal_start = pos;
    }

    let tail = emit_literal_runs(&mut out, &data[literal_start..]);
    out.push(0xFC | tail.len() as u8);
    out.extend_from_slice(tail);
    out
}

/// Clamp a match to the longest length its distance can encode.
fn encodable(len: usize, distance: usize) -> Option<usize> {
    let limit = if distance <= MAX_DISTANCE_SHORT {
        MAX_LEN_LONG
    } else if distance <= MAX_DISTANCE_MEDIUM {
        if len < 4 {
            return None;
        }
        MAX_LEN_LONG
    } else if distance <= MAX_DISTANCE_LONG {
        if len < 5 {
            return None;
        }
        MAX_LEN_LONG
    } else {
        return None;
    };
    (len >= MIN_MATCH).then_some(len.min(limit))
}

/// Emit 4-aligned literal runs; returns the 0-3 byte remainder.
fn emit_literal_runs<'a>(out: &mut Vec<u8>, mut literals: &'a [u8]) -> &'a [u8] {
    while literals.len() >= 4 {
        let run = (literals.len() & !3).min(MAX_LITERAL_RUN);
        out.push(0xE0 | ((run / 4 - 1) as u8));
        out.extend_from_slice(&literals[..run]);
        literals = &literals[run..];
    }
    literals
}

fn emit_copy(out: &mut Vec<u8>, literals: &[u8], len: usize, distance: usize) {
    let lit = literals.len();
    let off = distance - 1;
    if len <= MAX_LEN_SHORT && distance <= MAX_DISTANCE_SHORT {
        out.push((((off >> 3) & 0x60) | ((len - 3) << 2) | lit) as u8);
        out.push(off as u8);
    } else if (4..=MAX_LEN_MEDIUM).contains(&len) && distance <= MAX_DISTANCE_MEDIUM {
        out.push(0x80 | (len - 4) as u8);
        out.push(((lit << 6) | (off >> 8)) as u8);
        out.push(off as u8);
    } else {
        let l = len - 5;
        out.push((0xC0 | ((off >> 12) & 0x10) | ((l >> 8) << 2) | lit) as u8);
        out.push((off >> 8) as u8);
        out.push(off as u8);
        out.push(l as u8);
    }
    out.extend_from_slice(literals);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
