//! This module defines the seams to the external collaborators.
//!
//! The pipeline owns reconciliation, stage ordering and persistence. The numeric
//! work (demosaic and resampling, the colour transform, the rectification warp),
//! calibration lookup and input discovery are supplied by the caller through
//! these traits. Every method is synchronous and blocking.

use ndarray::{Array1, Array2, Array5, ArrayView5};
use std::path::{Path, PathBuf};

use crate::calibration::CalibrationRecord;
use crate::config::{ClipMode, DecodeConfiguration, RectConfiguration};
use crate::error::LfBatchError;
use crate::types::{LfMetadata, LightFieldRecord};

//==================================================================================
// I. Discovery
//==================================================================================

/// One raw input found by discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputRecord {
    /// Path of the raw capture.
    pub input_path: PathBuf,
    /// Identity used in output names, normally the file stem.
    pub base_name: String,
    /// Directory of the input relative to the discovery root. Mirrored under the
    /// output root when one is configured.
    pub relative_dir: PathBuf,
}

impl InputRecord {
    /// Builds a record whose identity is the file stem and whose relative
    /// directory is empty.
    pub fn from_path(input_path: impl Into<PathBuf>) -> Self {
        let input_path = input_path.into();
        let base_name = input_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            input_path,
            base_name,
            relative_dir: PathBuf::new(),
        }
    }

    pub fn with_relative_dir(mut self, relative_dir: impl Into<PathBuf>) -> Self {
        self.relative_dir = relative_dir.into();
        self
    }
}

pub trait Discovery {
    fn discover(&self) -> Result<Vec<InputRecord>, LfBatchError>;
}

//==================================================================================
// II. Decode
//==================================================================================

/// Everything a successful decode produces.
#[derive(Debug, Clone)]
pub struct DecodeOutput {
    pub record: LightFieldRecord,
    pub metadata: LfMetadata,
    /// The input configuration with `resolved` filled in.
    pub config: DecodeConfiguration,
}

pub trait Decoder {
    /// Decodes one raw capture. `Ok(None)` means the input could not be decoded
    /// and should be skipped.
    fn decode(
        &self,
        input: &Path,
        config: &DecodeConfiguration,
    ) -> Result<Option<DecodeOutput>, LfBatchError>;
}

//==================================================================================
// III. Colour Transform
//==================================================================================

/// Parameters for one colour-correction call, already adjusted for the
/// record's decode options.
#[derive(Debug, Clone, PartialEq)]
pub struct ColourParams {
    pub matrix: Array2<f64>,
    pub balance: Array1<f64>,
    pub gamma: f64,
    pub saturation_ceiling: f64,
    pub clip_mode: ClipMode,
}

pub trait ColourTransform {
    /// Transforms the colour channels only; weight channels are never passed in.
    fn apply(
        &self,
        colour: ArrayView5<'_, f64>,
        params: &ColourParams,
    ) -> Result<Array5<f64>, LfBatchError>;
}

//==================================================================================
// IV. Calibration Lookup & Rectification
//==================================================================================

/// A calibration and the location it was loaded from.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationMatch {
    pub calibration: CalibrationRecord,
    pub source: PathBuf,
}

pub trait CalibrationDatabase {
    /// Finds the calibration that best fits `metadata`. `Ok(None)` means no entry
    /// matches this camera.
    fn lookup(
        &self,
        metadata: &LfMetadata,
        config: &RectConfiguration,
    ) -> Result<Option<CalibrationMatch>, LfBatchError>;
}

#[derive(Debug, Clone)]
pub struct RectifyOutput {
    pub record: LightFieldRecord,
    pub config: RectConfiguration,
    /// The stage only counts as completed when this is true.
    pub success: bool,
}

pub trait Rectifier {
    fn rectify(
        &self,
        record: &LightFieldRecord,
        calibration: &CalibrationRecord,
        config: &RectConfiguration,
    ) -> Result<RectifyOutput, LfBatchError>;
}

/// The full set of collaborators one batch run needs.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub decoder: &'a dyn Decoder,
    pub colour: &'a dyn ColourTransform,
    pub calibration: &'a dyn CalibrationDatabase,
    pub rectifier: &'a dyn Rectifier,
}
