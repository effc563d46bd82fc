//! Per-record reconciliation and stage execution.
//!
//! - `tracker`: decides what an existing artifact already covers and reloads it
//!   only when more work remains.
//! - `executor`: runs Decode (when needed), then ColourCorrect and Rectify in
//!   their fixed order, recording what actually completed.

pub mod executor;
pub mod tracker;


use crate::config::{DecodeConfiguration, RectConfiguration};
use crate::types::{LfMetadata, LightFieldRecord, StageSet};

pub use executor::{run_stages, Execution, StartingPoint};
pub use tracker::{assess, Assessment};

/// A record between stages: samples plus the configuration snapshots that
/// describe them.
#[derive(Debug, Clone)]
pub struct ProcessedRecord {
    pub base_name: String,
    pub record: LightFieldRecord,
    pub metadata: LfMetadata,
    pub decode: DecodeConfiguration,
    pub rectify: RectConfiguration,
}

impl ProcessedRecord {
    /// Stages baked into the samples.
    pub fn completed(&self) -> StageSet {
        self.decode.completed_tasks
    }
}
