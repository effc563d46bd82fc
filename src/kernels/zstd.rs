//! Zstandard compression of the `lfb` container payload.
//!
//! Quantised light fields are large and highly redundant (neighbouring angular
//! samples look alike), so the sample block is stored as a single zstd frame.
//! The frame carries no length of its own that the reader trusts: the block
//! size always comes from the container header, and decoding stops one byte
//! past it, so a corrupt frame can neither over-allocate nor hide trailing data.

use std::io::Read;

use crate::error::LfBatchError;

/// Compresses a sample block into one zstd frame.
pub fn encode(input_bytes: &[u8], level: i32) -> Result<Vec<u8>, LfBatchError> {
    if input_bytes.is_empty() {
        return Ok(Vec::new());
    }

    let mut output_buf = Vec::with_capacity(input_bytes.len() / 2);
    let mut encoder = zstd::stream::Encoder::new(&mut output_buf, level)
        .map_err(|e| LfBatchError::ZstdError(e.to_string()))?;
    std::io::Write::write_all(&mut encoder, input_bytes)
        .map_err(|e| LfBatchError::ZstdError(e.to_string()))?;
    // `finish` is essential to finalize the Zstd frame.
    encoder
        .finish()
        .map_err(|e| LfBatchError::ZstdError(e.to_string()))?;

    Ok(output_buf)
}

/// Reverses [`encode`] for a block that must decompress to exactly
/// `expected_len` bytes.
pub fn decode(compressed: &[u8], expected_len: usize) -> Result<Vec<u8>, LfBatchError> {
    if compressed.is_empty() {
        return if expected_len == 0 {
            Ok(Vec::new())
        } else {
            Err(LfBatchError::ZstdError(format!(
                "Payload is empty but {} bytes were expected.",
                expected_len
            )))
        };
    }

    let decoder = zstd::stream::read::Decoder::new(compressed)
        .map_err(|e| LfBatchError::ZstdError(e.to_string()))?;
    let limit = (expected_len as u64).saturating_add(1);
    let mut decompressed = Vec::new();
    decoder
        .take(limit)
        .read_to_end(&mut decompressed)
        .map_err(|e| LfBatchError::ZstdError(e.to_string()))?;

    if decompressed.len() != expected_len {
        return Err(LfBatchError::ZstdError(format!(
            "Decompressed size does not match header. Expected {}, got {}{}.",
            expected_len,
            decompressed.len(),
            if decompressed.len() > expected_len { " or more" } else { "" }
        )));
    }

    Ok(decompressed)
}
