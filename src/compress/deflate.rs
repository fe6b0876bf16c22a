// Zlib/Deflate payload codec (via flate2).
//
// Payloads use the zlib wrapper, so the first two bytes are a CMF/FLG pair.
// Only the pairs produced by common encoders are treated as signatures.

use std::io::{self, Read, Write};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

use super::DecompressionError;

/// Known zlib headers: no/low, fast, default and best compression.
pub const ZLIB_SIGNATURES: [[u8; 2]; 4] = [[0x78, 0x01], [0x78, 0x5E], [0x78, 0x9C], [0x78, 0xDA]];

/// Level used when compressing on save.
pub const DEFAULT_LEVEL: u32 = 6;

/// Does `data` start with a known zlib header?
#[inline]
pub fn has_signature(data: &[u8]) -> bool {
    data.len() >= 2 && ZLIB_SIGNATURES.iter().any(|sig| data[..2] == sig[..])
}

/// Inflate a complete zlib stream.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>, DecompressionError> {
    let mut decoder = ZlibDecoder::new(data);
    let mut output = Vec::new();
    decoder
        .read_to_end(&mut output)
        .map_err(DecompressionError::Deflate)?;
    Ok(output)
}

/// Deflate `data` as a single zlib block at `level` (0-9).
pub fn compress(data: &[u8], level: u32) -> io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2), Compression::new(level));
    encoder.write_all(data)?;
    encoder.finish()
}
