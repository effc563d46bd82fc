//! This file is the root of the `lfbatch` Rust crate.
//!
//! Its responsibilities are strictly limited to:
//! 1.  Declaring all the top-level modules of our library (`pipeline`, `persist`,
//!     `kernels`, etc.) so the Rust compiler knows they exist.
//! 2.  Re-exporting the small public surface a caller needs to run a batch:
//!     the configuration, the collaborator traits, `run_batch` and its report.

//==================================================================================
// 0. Constants
//==================================================================================
/// The crate version, automatically set from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
//==================================================================================
// 1. Module Declarations
//==================================================================================
pub mod batch;
pub mod calibration;
pub mod config;
pub mod error;
pub mod kernels;
pub mod observability;
pub mod persist;
pub mod pipeline;
pub mod traits;
pub mod types;

#[cfg(test)]
mod test_support;

//==================================================================================
// 2. Public Surface
//==================================================================================
pub use batch::{run_batch, run_batch_with_overrides, BatchReport, ListedDiscovery, RecordOutcome, RecordStatus};
pub use calibration::{CalibrationRecord, JsonCalibrationDatabase};
pub use config::{DecodeOptions, FileOptions, OutputFormat, OutputPrecision, PipelineConfig, RectOptions};
pub use error::LfBatchError;
pub use observability::{enable_verbose_logging, Diagnostic, DiagnosticKind};
pub use traits::{
    CalibrationDatabase, Collaborators, ColourTransform, Decoder, Discovery, InputRecord, Rectifier,
};
pub use types::{ChannelLayout, GridModel, LightFieldRecord, Precision, Stage, StageSet};
