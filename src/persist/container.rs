//! The self-describing `lfb` container: one file holding the header (both stage
//! configurations, provenance, metadata) and the quantised samples.
//!
//! Layout: `magic(4) | version(u16 LE) | header_len(u32 LE) | header JSON | payload`.
//! The payload is a zstd frame over the little-endian samples. The header can be
//! peeked without reading or decompressing the payload, which is what the
//! completion tracker does for every existing artifact.

use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;

use crate::error::LfBatchError;
use crate::kernels::{zstd, QuantizedSamples};
use crate::persist::format::{
    ArtifactHeader, Provenance, ProvenanceOnly, CONTAINER_FORMAT_VERSION, CONTAINER_MAGIC,
    CONTAINER_PREAMBLE_LEN, MAX_HEADER_LEN,
};
use crate::persist::write_replacing;

//==================================================================================
// Serialization
//==================================================================================

/// Serializes a container into its final byte form.
pub fn to_bytes(
    header: &ArtifactHeader,
    samples: &QuantizedSamples,
    zstd_level: i32,
) -> Result<Vec<u8>, LfBatchError> {
    if header.shape != samples.shape() || header.sample_type != samples.precision() {
        return Err(LfBatchError::InternalError(format!(
            "header describes {:?} {:?} but samples are {:?} {:?}",
            header.shape,
            header.sample_type,
            samples.shape(),
            samples.precision()
        )));
    }

    let header_json = serde_json::to_vec(header)?;
    if header_json.len() > MAX_HEADER_LEN {
        return Err(LfBatchError::ArtifactFormat(format!(
            "header length ({}) exceeds maximum allowed size ({})",
            header_json.len(),
            MAX_HEADER_LEN
        )));
    }
    let payload = zstd::encode(&samples.to_le_bytes(), zstd_level)?;

    let mut buf = Vec::with_capacity(CONTAINER_PREAMBLE_LEN + header_json.len() + payload.len());
    buf.write_all(CONTAINER_MAGIC)?;
    buf.write_all(&CONTAINER_FORMAT_VERSION.to_le_bytes())?;
    buf.write_all(&(header_json.len() as u32).to_le_bytes())?;
    buf.write_all(&header_json)?;
    buf.write_all(&payload)?;
    Ok(buf)
}

/// Parses a full container held in memory.
pub fn from_bytes(bytes: &[u8]) -> Result<(ArtifactHeader, QuantizedSamples), LfBatchError> {
    let mut cursor = bytes;
    let header_json = read_header_json(&mut cursor)?;
    let header: ArtifactHeader = serde_json::from_slice(&header_json)
        .map_err(|e| LfBatchError::ArtifactFormat(format!("unreadable header: {}", e)))?;

    // Whatever follows the header is the payload; its size comes from the header.
    let expected = QuantizedSamples::block_len(header.shape, header.sample_type)?;
    let raw = zstd::decode(cursor, expected)?;
    let samples = QuantizedSamples::from_le_bytes(&raw, header.shape, header.sample_type)?;
    Ok((header, samples))
}

//==================================================================================
// File-Level API
//==================================================================================

pub fn write(
    path: &Path,
    header: &ArtifactHeader,
    samples: &QuantizedSamples,
    zstd_level: i32,
) -> Result<(), LfBatchError> {
    let bytes = to_bytes(header, samples, zstd_level)?;
    write_replacing(path, |file| file.write_all(&bytes).map_err(LfBatchError::from))
}

pub fn read(path: &Path) -> Result<(ArtifactHeader, QuantizedSamples), LfBatchError> {
    let bytes = std::fs::read(path)?;
    from_bytes(&bytes)
}

/// Reads the header without touching the payload.
pub fn peek_header(path: &Path) -> Result<ArtifactHeader, LfBatchError> {
    let mut reader = BufReader::new(File::open(path)?);
    let header_json = read_header_json(&mut reader)?;
    serde_json::from_slice(&header_json)
        .map_err(|e| LfBatchError::ArtifactFormat(format!("unreadable header: {}", e)))
}

/// Reads only the completed-stage provenance.
pub fn peek_provenance(path: &Path) -> Result<Provenance, LfBatchError> {
    let mut reader = BufReader::new(File::open(path)?);
    let header_json = read_header_json(&mut reader)?;
    let peek: ProvenanceOnly = serde_json::from_slice(&header_json)
        .map_err(|e| LfBatchError::ArtifactFormat(format!("unreadable provenance: {}", e)))?;
    Ok(peek.provenance)
}

//==================================================================================
// Private Helpers
//==================================================================================

/// Validates the preamble and returns the header JSON, leaving `reader`
/// positioned at the start of the payload.
fn read_header_json<R: Read>(reader: &mut R) -> Result<Vec<u8>, LfBatchError> {
    let truncated = |e: std::io::Error| {
        LfBatchError::ArtifactFormat(format!("container is truncated: {}", e))
    };

    let mut preamble = [0u8; CONTAINER_PREAMBLE_LEN];
    reader.read_exact(&mut preamble).map_err(truncated)?;

    if &preamble[0..4] != CONTAINER_MAGIC {
        return Err(LfBatchError::ArtifactFormat(
            "Invalid container magic number".into(),
        ));
    }
    let version = u16::from_le_bytes([preamble[4], preamble[5]]);
    if version != CONTAINER_FORMAT_VERSION {
        return Err(LfBatchError::ArtifactFormat(format!(
            "Unsupported container version: expected {}, got {}",
            CONTAINER_FORMAT_VERSION, version
        )));
    }
    let header_len =
        u32::from_le_bytes([preamble[6], preamble[7], preamble[8], preamble[9]]) as usize;

    // SECURITY: Validate length against a sane maximum before allocating.
    if header_len > MAX_HEADER_LEN {
        return Err(LfBatchError::ArtifactFormat(format!(
            "header length ({}) exceeds maximum allowed size ({})",
            header_len, MAX_HEADER_LEN
        )));
    }

    let mut header_json = vec![0u8; header_len];
    reader.read_exact(&mut header_json).map_err(truncated)?;
    Ok(header_json)
}

//==================================================================================
// Unit Tests
//==================================================================================
