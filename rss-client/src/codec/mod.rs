//! Framed-block codec used for every chunk on the wire.
//!
//! Wire format, 21-byte header followed by the payload:
//!
//! ```text
//! [ 8 bytes magic ][ 1 byte method|level ][ 4 bytes compressedLen LE ]
//! [ 4 bytes originalLen LE ][ 4 bytes xxhash32 checksum LE ][ payload ]
//! ```
//!
//! The checksum is always computed over the *original* (uncompressed)
//! bytes, with a fixed seed, so it authenticates the block regardless of
//! which method produced the payload.

use crate::errors::CodecError;
use xxhash_rust::xxh32::xxh32;

/// Fixed 8-byte prefix every framed block starts with.
pub const MAGIC: [u8; 8] = *b"RSSBLK1\0";

/// Header size: magic(8) + method/level(1) + compressedLen(4) + originalLen(4) + checksum(4).
pub const HEADER_LENGTH: usize = 21;

/// Seed xxhash32 is pinned to. Any other seed would make every block
/// written by one process unreadable by another without coordinating it
/// out of band, so it isn't configurable.
pub const DEFAULT_SEED: u32 = 0;

const METHOD_RAW: u8 = 0;
const METHOD_CSS: u8 = 1;

/// Base subtracted from the block-size-derived exponent before it's
/// stored as the header's compression level. Purely informational: it
/// is written into the header but never fed back into the compressor,
/// since `lz4_flex`'s block API doesn't expose tunable levels.
const COMPRESSION_LEVEL_BASE: u32 = 10;

/// Upper bound on compressed size for a block of `len` original bytes,
/// matching LZ4's own worst-case expansion bound.
pub fn max_compressed_length(len: usize) -> usize {
    len + len / 255 + 16
}

/// Compression level recorded for a block of `block_size` bytes: derived
/// from the position of the highest set bit, clamped to the 7 bits the
/// header allots it.
fn compression_level_for_block_size(block_size: usize) -> u8 {
    if block_size <= 1 {
        return 0;
    }
    let exponent = 32 - (block_size as u32 - 1).leading_zeros();
    exponent.saturating_sub(COMPRESSION_LEVEL_BASE).min(0x7f) as u8
}

/// Encodes byte slices into framed blocks, reusing its internal buffer
/// across calls. Not `Sync`; give each writer task its own encoder.
#[derive(Debug, Default)]
pub struct BlockEncoder {
    buf: Vec<u8>,
}

impl BlockEncoder {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Encodes `data` as a framed block and returns it. The returned slice
    /// borrows the encoder's internal buffer and is overwritten by the
    /// next call to `compress`.
    pub fn compress(&mut self, data: &[u8]) -> &[u8] {
        let original_len = data.len();
        let checksum = xxh32(data, DEFAULT_SEED);
        let level = compression_level_for_block_size(original_len);

        let required = HEADER_LENGTH + max_compressed_length(original_len);
        if self.buf.len() < required {
            self.buf.resize(required, 0);
        }

        let (method, compressed_len) = {
            let dst = &mut self.buf[HEADER_LENGTH..];
            match lz4_flex::block::compress_into(data, dst) {
                Ok(n) if n < original_len => (METHOD_CSS, n),
                _ => {
                    self.buf[HEADER_LENGTH..HEADER_LENGTH + original_len].copy_from_slice(data);
                    (METHOD_RAW, original_len)
                }
            }
        };

        let header = &mut self.buf[0..HEADER_LENGTH];
        header[0..8].copy_from_slice(&MAGIC);
        header[8] = (method << 7) | (level & 0x7f);
        header[9..13].copy_from_slice(&(compressed_len as u32).to_le_bytes());
        header[13..17].copy_from_slice(&(original_len as u32).to_le_bytes());
        header[17..21].copy_from_slice(&checksum.to_le_bytes());

        &self.buf[0..HEADER_LENGTH + compressed_len]
    }
}

/// Decodes a framed block, validating header bounds before trusting any
/// length it carries and the checksum after decompressing.
///
/// `max_compressed_len`/`max_original_len` bound how large a single block
/// the caller is willing to allocate for; they guard against a corrupt or
/// hostile header claiming an enormous payload.
pub fn decode(
    framed: &[u8],
    max_compressed_len: u32,
    max_original_len: u32,
) -> Result<Vec<u8>, CodecError> {
    if framed.len() < HEADER_LENGTH || framed[0..8] != MAGIC {
        return Err(CodecError::BadMagic);
    }

    let method_and_level = framed[8];
    let method = method_and_level >> 7;
    let compressed_len = u32::from_le_bytes(framed[9..13].try_into().unwrap());
    let original_len = u32::from_le_bytes(framed[13..17].try_into().unwrap());
    let checksum = u32::from_le_bytes(framed[17..21].try_into().unwrap());

    if compressed_len > max_compressed_len {
        return Err(CodecError::BadCompressedLength(
            compressed_len,
            max_compressed_len,
        ));
    }
    if original_len > max_original_len {
        return Err(CodecError::BadOriginalLength(
            original_len,
            max_original_len,
        ));
    }
    if framed.len() < HEADER_LENGTH + compressed_len as usize {
        return Err(CodecError::BadCompressedLength(
            compressed_len,
            (framed.len() - HEADER_LENGTH) as u32,
        ));
    }

    let payload = &framed[HEADER_LENGTH..HEADER_LENGTH + compressed_len as usize];

    let output = match method {
        METHOD_RAW => payload.to_vec(),
        METHOD_CSS => lz4_flex::block::decompress(payload, original_len as usize)
            .map_err(|e| CodecError::Lz4Decompress(e.to_string()))?,
        other => return Err(CodecError::UnknownMethod(other)),
    };

    let actual = xxh32(&output, DEFAULT_SEED);
    if actual != checksum {
        return Err(CodecError::ChecksumMismatch {
            expected: checksum,
            actual,
        });
    }

    Ok(output)
}
