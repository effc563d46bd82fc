//! This module defines the core, strongly-typed data representations used
//! throughout the lfbatch pipeline.
//!
//! It includes the in-memory light field, the enumerated processing stages and
//! stage sets, the lenslet grid model and the camera metadata that travel with a
//! record from Decode to persistence.

pub mod grid_model;
pub mod metadata;
pub mod record;
pub mod stage;

// Re-export the main type(s) for easier access.
pub use grid_model::{GridFieldDeviation, GridModel, GridOrientation};
pub use metadata::LfMetadata;
pub use record::{ChannelLayout, LightFieldRecord, Precision};
pub use stage::{Stage, StageSet};
