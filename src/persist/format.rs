// In: src/persist/format.rs

//! Defines all on-disk structures and constants for lfbatch artifacts.
//! This is the single source of truth for the `lfb` container layout and for
//! the header that both the container and the sequential-image sidecar carry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{DecodeConfiguration, OutputPrecision, RectConfiguration};
use crate::types::{ChannelLayout, LfMetadata, StageSet};

//==================================================================================
// I. Container Constants
//==================================================================================

/// The magic number to identify the start of an `lfb` container.
pub const CONTAINER_MAGIC: &[u8; 4] = b"LFBA";
/// The current version of the container format.
pub const CONTAINER_FORMAT_VERSION: u16 = 1;
/// magic(4) + version(2) + header_len(4)
pub const CONTAINER_PREAMBLE_LEN: usize = 10;
/// A reasonable limit to prevent OOM from a malformed header length. (16MB)
pub const MAX_HEADER_LEN: usize = 16 * 1024 * 1024;

/// Extension of the sidecar that accompanies a sequential-image artifact.
pub const SIDECAR_EXTENSION: &str = "json";
/// Suffix for in-progress writes; renamed over the final path once complete.
pub const PARTIAL_SUFFIX: &str = "partial";

//==================================================================================
// II. Header Contract
//==================================================================================

/// Which stages are baked into the stored samples. This is the only part of an
/// artifact the completion tracker reads back.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Provenance {
    pub completed_tasks: StageSet,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GeneratorInfo {
    pub name: String,
    pub version: String,
    pub created_at: DateTime<Utc>,
}

impl GeneratorInfo {
    pub fn current() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: crate::VERSION.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Everything an artifact says about itself besides the samples.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ArtifactHeader {
    /// Base name of the record the artifact was produced from.
    pub record: String,
    pub generator: GeneratorInfo,
    /// Shape of the stored array, `[t, s, v, u, c]`.
    pub shape: [usize; 5],
    pub sample_type: OutputPrecision,
    /// Layout of the stored channel axis. May have fewer weight channels than
    /// the record had in memory.
    pub channels: ChannelLayout,
    /// Stored samples are `value / normalisation_divisor`, quantised.
    pub normalisation_divisor: f64,
    pub provenance: Provenance,
    pub decode: DecodeConfiguration,
    pub rectify: RectConfiguration,
    pub metadata: LfMetadata,
}

/// A view of the header that deserializes nothing but the provenance.
#[derive(Deserialize, Debug)]
pub(crate) struct ProvenanceOnly {
    pub provenance: Provenance,
}
