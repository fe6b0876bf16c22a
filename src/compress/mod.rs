// Resource payload compression.
//
// Payloads describe their own encoding through leading magic bytes:
//
// - `deflate` — zlib-wrapped deflate (several known 2-byte signatures)
// - `refpack` — RefPack/QFS sliding-window LZ77 variant (`10 FB` / `90 FB`)
//
// Anything without a known signature is stored raw.

pub mod deflate;
pub mod refpack;

use std::borrow::Cow;
use std::io;

/// Payloads at or below this size are never compressed.
pub const MIN_COMPRESS_SIZE: usize = 64;

/// Compression is kept only when it saves at least 10%.
const MAX_COMPRESSED_RATIO: f64 = 0.9;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure to inflate a deflate payload.
///
/// RefPack decoding never fails; it returns a best-effort partial buffer.
#[derive(Debug, thiserror::Error)]
pub enum DecompressionError {
    #[error("malformed deflate stream: {0}")]
    Deflate(#[source] io::Error),
}

// ---------------------------------------------------------------------------
// Codec detection
// ---------------------------------------------------------------------------

/// Payload encoding, identified by the leading magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadCodec {
    Deflate,
    RefPack,
    Raw,
}

impl PayloadCodec {
    /// Identify the codec of `data` from its signature.
    pub fn detect(data: &[u8]) -> Self {
        if deflate::has_signature(data) {
            Self::Deflate
        } else if refpack::has_signature(data) {
            Self::RefPack
        } else {
            Self::Raw
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Deflate => "deflate",
            Self::RefPack => "refpack",
            Self::Raw => "raw",
        }
    }
}

// ---------------------------------------------------------------------------
// Decode / encode
// ---------------------------------------------------------------------------

/// Decompress a payload according to its signature.
///
/// `mem_size` is the declared uncompressed size; RefPack decoding stops once
/// it is reached. Unknown signatures are returned unchanged.
pub fn decompress(data: &[u8], mem_size: usize) -> Result<Vec<u8>, DecompressionError> {
    match PayloadCodec::detect(data) {
        PayloadCodec::Deflate => deflate::decompress(data),
        PayloadCodec::RefPack => Ok(refpack::decompress(data, mem_size)),
        PayloadCodec::Raw => Ok(data.to_vec()),
    }
}

/// Deflate `data` if it is large enough and the result is worth keeping.
///
/// Returns the compressed bytes, or `data` itself when the payload is too
/// small or compression saves less than 10%.
pub fn compress(data: &[u8]) -> io::Result<Cow<'_, [u8]>> {
    if data.len() <= MIN_COMPRESS_SIZE {
        return Ok(Cow::Borrowed(data));
    }

    let compressed = deflate::compress(data, deflate::DEFAULT_LEVEL)?;

    if (compressed.len() as f64) < data.len() as f64 * MAX_COMPRESSED_RATIO {
        Ok(Cow::Owned(compressed))
    } else {
        Ok(Cow::Borrowed(data))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn repetitive(total: usize) -> Vec<u8> {
        b"lot:object:placement;".iter().copied().cycle().take(total).collect()
    }

    #[test]
    fn detect_signatures() {
        assert_eq!(PayloadCodec::detect(&[0x78, 0x9C, 0x00]), PayloadCodec::Deflate);
        assert_eq!(PayloadCodec::detect(&[0x78, 0xDA]), PayloadCodec::Deflate);
        assert_eq!(PayloadCodec::detect(&[0x10, 0xFB, 0xFC]), PayloadCodec::RefPack);
        assert_eq!(PayloadCodec::detect(&[0x90, 0xFB, 0, 0, 1]), PayloadCodec::RefPack);
        assert_eq!(PayloadCodec::detect(b"DBPF"), PayloadCodec::Raw);
        assert_eq!(PayloadCodec::detect(&[]), PayloadCodec::Raw);
    }

    #[test]
    fn small_payload_is_stored() {
        let data = repetitive(MIN_COMPRESS_SIZE);
        let out = compress(&data).unwrap();
        assert!(matches!(out, Cow::Borrowed(_)));
    }

    #[test]
    fn compressible_payload_is_deflated() {
        let data = repetitive(4096);
        let out = compress(&data).unwrap();
        assert!(matches!(out, Cow::Owned(_)));
        assert_eq!(PayloadCodec::detect(&out), PayloadCodec::Deflate);
        assert_eq!(decompress(&out, data.len()).unwrap(), data);
    }

    #[test]
    fn incompressible_payload_is_stored() {
        let mut state = 0x9E37_79B9_7F4A_7C15u64;
        let data: Vec<u8> = (0..2048)
            .map(|_| {
                state = state
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                (state >> 33) as u8
            })
            .collect();
        let out = compress(&data).unwrap();
        assert_eq!(&*out, &data[..]);
    }

    #[test]
    fn raw_payload_passes_through() {
        let data = b"plain bytes".to_vec();
        assert_eq!(decompress(&data, 100).unwrap(), data);
    }

    #[test]
    fn malformed_deflate_is_an_error() {
        let data = [0x78, 0x9C, 0xFF, 0xFF, 0xFF, 0xFF];
        assert!(matches!(
            decompress(&data, 10),
            Err(DecompressionError::Deflate(_))
        ));
    }
}
