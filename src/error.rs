// In: src/error.rs

//! This module defines the single, unified error type for the entire lfbatch library.
//! It uses the `thiserror` crate to provide ergonomic, context-aware error handling.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LfBatchError {
    // =========================================================================
    // === High-Level, Semantic Errors (Specific to our library's logic)
    // =========================================================================
    /// An option could not be parsed or failed validation. Raised once, before
    /// the batch loop starts.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A persisted artifact (container or sidecar) could not be understood.
    #[error("Artifact format error: {0}")]
    ArtifactFormat(String),

    /// The channel layout or array shape cannot be expressed by the requested encoding.
    #[error("Unsupported light-field layout: {0}")]
    UnsupportedLayout(String),

    /// An external collaborator (decoder, colour transform, rectifier, database) failed.
    #[error("Collaborator '{name}' failed: {detail}")]
    Collaborator { name: &'static str, detail: String },

    #[error("Internal logic error (this is a bug): {0}")]
    InternalError(String),

    // =========================================================================
    // === External Error Wrappers (Using #[from] for automatic conversion)
    // =========================================================================
    /// An error originating from the underlying I/O subsystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An error from the Serde JSON library, typically during header/sidecar serialization.
    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    /// An error from the `image` crate while encoding or decoding a PNG.
    #[error("Image codec error: {0}")]
    Image(#[from] image::ImageError),

    /// An ndarray shape mismatch while assembling or reshaping a light field.
    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("Zstd operation failed: {0}")]
    ZstdError(String),

    /// An error that surfaced while running a named pipeline stage.
    #[error("Stage '{stage}' failed: {source}")]
    StageError {
        stage: String,
        #[source]
        source: Box<LfBatchError>,
    },
}

impl LfBatchError {
    /// Wraps an error with the name of the pipeline stage it surfaced in.
    pub fn in_stage(self, stage: &str) -> Self {
        LfBatchError::StageError {
            stage: stage.to_string(),
            source: Box::new(self),
        }
    }
}
