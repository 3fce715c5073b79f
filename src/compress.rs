//! Record compression. Every record and the index are stored as
//! independent zstd frames.

use std::io::{Read, Write};

use crate::{Error, Result};

pub const DEFAULT_LEVEL: i32 = 3;

// Declared lengths come from disk; don't trust them for up-front allocation.
const MAX_PREALLOC: usize = 1 << 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compressed {
    pub bytes: Vec<u8>,
    pub compressed_len: u64,
    pub uncompressed_len: u64,
}

/// Compress `data` into one zstd frame carrying a content checksum, so a
/// damaged frame fails to decode instead of yielding wrong bytes.
pub fn compress(data: &[u8], level: i32) -> Result<Compressed> {
    let mut encoder = zstd::stream::Encoder::new(Vec::with_capacity(data.len() / 2 + 32), level)?;
    encoder.include_checksum(true)?;
    encoder.write_all(data)?;
    let bytes = encoder.finish()?;
    Ok(Compressed {
        compressed_len: bytes.len() as u64,
        uncompressed_len: data.len() as u64,
        bytes,
    })
}

/// Decompress one frame, rejecting output whose length differs from
/// `expected_len`. At most `expected_len + 1` bytes are ever inflated, so a
/// frame that expands past its declared length fails without materializing
/// the rest.
pub fn decompress(data: &[u8], expected_len: u64) -> Result<Vec<u8>> {
    let decoder = zstd::stream::Decoder::new(data)
        .map_err(|err| Error::Decode(format!("decompress frame: {err}")))?;
    let capacity = usize::try_from(expected_len).unwrap_or(usize::MAX).min(MAX_PREALLOC);
    let mut out = Vec::with_capacity(capacity);
    decoder
        .take(expected_len.saturating_add(1))
        .read_to_end(&mut out)
        .map_err(|err| Error::Decode(format!("decompress frame: {err}")))?;
    if out.len() as u64 != expected_len {
        return Err(Error::RecordCorrupt {
            expected: expected_len,
            actual: out.len() as u64,
        });
    }
    Ok(out)
}
