//! This module contains the pure, stateless kernels the persistence engine is
//! built from. None of them touch the filesystem.
//!
//! - `quantize`: float <-> unsigned integer sample conversion.
//! - `lenslet`: expanded-lenslet tiling for sequential-image artifacts.
//! - `histogram`: histogram-equalisation tone mapping for previews.
//! - `zstd`: payload compression for the `lfb` container.

pub mod histogram;
pub mod lenslet;
pub mod quantize;
pub mod zstd;

pub use quantize::{normalisation_divisor, QuantizedSamples};
