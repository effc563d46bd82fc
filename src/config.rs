// In: src/config.rs

//! The single source of truth for all lfbatch configuration.
//!
//! Options come in three fixed-schema groups (file, decode, rectify). Each group
//! is a plain struct whose fields carry serde defaults, so building a group from
//! a partial user document fills in defaults for exactly the fields that are
//! absent and leaves every supplied field alone. That is the whole merge.
//!
//! The resolved `PipelineConfig` is validated once at the application boundary,
//! before any record is touched, and then only read. The per-record stage
//! configurations (`DecodeConfiguration`, `RectConfiguration`) are rebuilt from
//! it at the start of every record so that values discovered for one record can
//! never leak into the next.

use ndarray::{Array1, Array2};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::LfBatchError;
use crate::types::{ChannelLayout, GridModel, Precision, StageSet};

//==================================================================================
// I. File Options
//==================================================================================

/// Integer precision of the persisted samples.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputPrecision {
    Uint8,
    #[default]
    Uint16,
}

impl OutputPrecision {
    /// The largest representable value, used as the (de)quantisation scale.
    pub fn max_value(self) -> f64 {
        match self {
            OutputPrecision::Uint8 => u8::MAX as f64,
            OutputPrecision::Uint16 => u16::MAX as f64,
        }
    }

    pub fn bytes_per_sample(self) -> usize {
        match self {
            OutputPrecision::Uint8 => 1,
            OutputPrecision::Uint16 => 2,
        }
    }
}

/// The on-disk encoding of the primary artifact.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// **Default:** one self-describing container holding the array, both stage
    /// configurations and the provenance.
    #[default]
    Lfb,
    /// Expanded-lenslet PNG with the weight channel as alpha, plus a JSON sidecar.
    PngAlpha,
    /// Expanded-lenslet PNG without alpha, plus a JSON sidecar.
    Png,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Lfb => "lfb",
            OutputFormat::PngAlpha | OutputFormat::Png => "png",
        }
    }

    /// Sequential-image formats keep their provenance in a sidecar file.
    pub fn is_sequential(self) -> bool {
        !matches!(self, OutputFormat::Lfb)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PngCompression {
    Fast,
    #[default]
    Default,
    Best,
}

/// Options handed through to the encoders untouched.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct EncoderOptions {
    /// Zstandard level for the `lfb` container payload.
    #[serde(default = "default_zstd_level")]
    pub zstd_level: i32,
    #[serde(default)]
    pub png_compression: PngCompression,
}

impl Default for EncoderOptions {
    fn default() -> Self {
        Self {
            zstd_level: default_zstd_level(),
            png_compression: PngCompression::default(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct PreviewOptions {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Longest side of the preview image, in pixels.
    #[serde(default = "default_preview_max_dimension")]
    pub max_dimension: u32,
    /// TrueType/OpenType font used to caption the preview. No caption without one.
    #[serde(default)]
    pub font_path: Option<PathBuf>,
    #[serde(default = "default_font_scale")]
    pub font_scale: f32,
}

impl Default for PreviewOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            max_dimension: default_preview_max_dimension(),
            font_path: None,
            font_scale: default_font_scale(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct FileOptions {
    /// Root for outputs. `None` writes each artifact next to its input.
    #[serde(default)]
    pub output_path: Option<PathBuf>,
    #[serde(default)]
    pub precision: OutputPrecision,
    #[serde(default)]
    pub format: OutputFormat,
    #[serde(default)]
    pub encoder: EncoderOptions,
    /// If false, weight channels are dropped before writing and cannot be recovered.
    #[serde(default = "default_true")]
    pub save_weight: bool,
    /// If false, the run is a dry run: everything executes, nothing is written.
    #[serde(default = "default_true")]
    pub save_result: bool,
    /// Ignore any existing artifact and redo every requested stage.
    #[serde(default)]
    pub force_redo: bool,
    /// printf-style, `%s` is replaced by the record's base name.
    #[serde(default = "default_output_name_template")]
    pub output_name_template: String,
    #[serde(default = "default_thumb_name_template")]
    pub thumb_name_template: String,
    #[serde(default)]
    pub preview: PreviewOptions,
}

impl Default for FileOptions {
    fn default() -> Self {
        Self {
            output_path: None,
            precision: OutputPrecision::default(),
            format: OutputFormat::default(),
            encoder: EncoderOptions::default(),
            save_weight: true,
            save_result: true,
            force_redo: false,
            output_name_template: default_output_name_template(),
            thumb_name_template: default_thumb_name_template(),
            preview: PreviewOptions::default(),
        }
    }
}

//==================================================================================
// II. Decode Options
//==================================================================================

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResampleMethod {
    #[default]
    Fast,
    Triangulation,
    Barycentric,
    /// No resampling: at most one raw colour sample is valid per output pixel.
    None,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClipMode {
    #[default]
    Hard,
    Soft,
    /// Keep above-saturation highlights; persistence rescales by the record maximum.
    None,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct DecodeOptions {
    /// Optional stages to run after Decode.
    #[serde(default)]
    pub stages: StageSet,
    /// Fraction of the histogram treated as saturated tails when equalising previews.
    #[serde(default = "default_hist_eq_threshold")]
    pub hist_eq_threshold: f64,
    #[serde(default = "default_camera_database_path")]
    pub white_image_database_path: PathBuf,
    #[serde(default = "default_white_image_database_file")]
    pub white_image_database_file: String,
    /// Reproduce the behaviour of older toolchains. Forces both white-image
    /// normalisation flags off and derives the saturation ceiling from the colour
    /// balance and matrix.
    #[serde(default)]
    pub legacy_compat: bool,
    #[serde(default = "default_true")]
    pub normalise_white_colours: bool,
    #[serde(default = "default_true")]
    pub normalise_white_exposure: bool,
    #[serde(default)]
    pub resample_method: ResampleMethod,
    /// Raw black/white levels. `None` takes them from the camera metadata.
    #[serde(default)]
    pub level_limits: Option<[f64; 2]>,
    #[serde(default)]
    pub precision: Precision,
    #[serde(default)]
    pub weighted_demosaic: bool,
    #[serde(default = "default_true")]
    pub weighted_interp: bool,
    /// White balance was applied to the raw mosaic before demosaicing.
    #[serde(default)]
    pub early_white_balance: bool,
    #[serde(default = "default_true")]
    pub correct_saturated: bool,
    #[serde(default)]
    pub clip_mode: ClipMode,
    #[serde(default = "default_gamma")]
    pub gamma: f64,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            stages: StageSet::empty(),
            hist_eq_threshold: default_hist_eq_threshold(),
            white_image_database_path: default_camera_database_path(),
            white_image_database_file: default_white_image_database_file(),
            legacy_compat: false,
            normalise_white_colours: true,
            normalise_white_exposure: true,
            resample_method: ResampleMethod::default(),
            level_limits: None,
            precision: Precision::default(),
            weighted_demosaic: false,
            weighted_interp: true,
            early_white_balance: false,
            correct_saturated: true,
            clip_mode: ClipMode::default(),
            gamma: default_gamma(),
        }
    }
}

impl DecodeOptions {
    pub fn white_image_database(&self) -> PathBuf {
        self.white_image_database_path
            .join(&self.white_image_database_file)
    }
}

//==================================================================================
// III. Rectify Options
//==================================================================================

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct RectOptions {
    #[serde(default = "default_camera_database_path")]
    pub calibration_database_path: PathBuf,
    #[serde(default = "default_calibration_database_file")]
    pub calibration_database_file: String,
    /// Largest accepted relative difference per grid-model field.
    #[serde(default = "default_max_grid_model_diff")]
    pub max_grid_model_diff: f64,
}

impl Default for RectOptions {
    fn default() -> Self {
        Self {
            calibration_database_path: default_camera_database_path(),
            calibration_database_file: default_calibration_database_file(),
            max_grid_model_diff: default_max_grid_model_diff(),
        }
    }
}

impl RectOptions {
    pub fn calibration_database(&self) -> PathBuf {
        self.calibration_database_path
            .join(&self.calibration_database_file)
    }
}

//==================================================================================
// IV. The Unified PipelineConfig
//==================================================================================

/// The full, validated option set for one batch invocation.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct PipelineConfig {
    #[serde(default)]
    pub file: FileOptions,
    #[serde(default)]
    pub decode: DecodeOptions,
    #[serde(default)]
    pub rectify: RectOptions,
}

/// Builds a fixed-schema option value from a partial override document.
///
/// Fields present in `overrides` are taken verbatim, absent fields get their
/// defaults. Unknown field names and unrecognised enum identifiers (for example
/// an output format nobody implements) are configuration errors.
pub fn merge_overrides<T: DeserializeOwned>(
    overrides: &serde_json::Value,
) -> Result<T, LfBatchError> {
    let overrides = match overrides {
        serde_json::Value::Null => serde_json::Value::Object(Default::default()),
        other => other.clone(),
    };
    serde_json::from_value(overrides).map_err(|e| LfBatchError::Config(e.to_string()))
}

impl PipelineConfig {
    pub fn from_overrides(overrides: &serde_json::Value) -> Result<Self, LfBatchError> {
        merge_overrides::<PipelineConfig>(overrides)?.validate_and_resolve()
    }

    pub fn from_json_str(json: &str) -> Result<Self, LfBatchError> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| LfBatchError::Config(e.to_string()))?;
        Self::from_overrides(&value)
    }

    pub fn from_path(path: &Path) -> Result<Self, LfBatchError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Applies the option interactions and range checks. Called once, before the
    /// batch loop, so that a bad option aborts the run instead of every record.
    pub fn validate_and_resolve(mut self) -> Result<Self, LfBatchError> {
        if self.decode.legacy_compat {
            self.decode.normalise_white_colours = false;
            self.decode.normalise_white_exposure = false;
        }

        if self.file.format != OutputFormat::Lfb {
            if self.decode.resample_method == ResampleMethod::None {
                log::warn!(
                    "resample_method 'none' cannot be stored as an image; forcing the lfb format"
                );
                self.file.format = OutputFormat::Lfb;
            } else if self.decode.clip_mode == ClipMode::None {
                log::warn!(
                    "clip_mode 'none' needs a normalisation divisor the image format cannot carry; forcing the lfb format"
                );
                self.file.format = OutputFormat::Lfb;
            }
        }

        let tol = self.rectify.max_grid_model_diff;
        if !tol.is_finite() || tol < 0.0 {
            return Err(LfBatchError::Config(format!(
                "max_grid_model_diff must be a non-negative number, got {}",
                tol
            )));
        }

        let thresh = self.decode.hist_eq_threshold;
        if !(0.0..0.5).contains(&thresh) {
            return Err(LfBatchError::Config(format!(
                "hist_eq_threshold must lie in [0, 0.5), got {}",
                thresh
            )));
        }

        if let Some([lo, hi]) = self.decode.level_limits {
            if !(lo < hi) {
                return Err(LfBatchError::Config(format!(
                    "level_limits must be increasing, got [{}, {}]",
                    lo, hi
                )));
            }
        }

        if !(self.decode.gamma > 0.0) {
            return Err(LfBatchError::Config(format!(
                "gamma must be positive, got {}",
                self.decode.gamma
            )));
        }

        let level = self.file.encoder.zstd_level;
        if !(1..=22).contains(&level) {
            return Err(LfBatchError::Config(format!(
                "zstd_level must lie in 1..=22, got {}",
                level
            )));
        }

        for (name, template) in [
            ("output_name_template", &self.file.output_name_template),
            ("thumb_name_template", &self.file.thumb_name_template),
        ] {
            if !template.contains("%s") {
                return Err(LfBatchError::Config(format!(
                    "{} must contain '%s', got '{}'",
                    name, template
                )));
            }
        }
        if self.file.output_name_template == self.file.thumb_name_template {
            return Err(LfBatchError::Config(
                "output and thumbnail name templates must differ".into(),
            ));
        }

        Ok(self)
    }
}

//==================================================================================
// V. Per-Record Stage Configuration Snapshots
//==================================================================================

/// Values the decoder discovers for one record.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct DecodeResolved {
    /// `[t, s, v, u, c]`
    pub lf_size: [usize; 5],
    pub channels: ChannelLayout,
    /// `n_colour x n_colour`, applied as `row_vector * matrix`.
    pub colour_matrix: Array2<f64>,
    pub colour_balance: Array1<f64>,
    pub grid_model: GridModel,
}

/// Decode options plus what Decode found, plus the stages baked into the samples.
///
/// Values of this type are snapshots: marking a stage complete produces a new
/// value rather than mutating the one a previous step handed out.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct DecodeConfiguration {
    pub options: DecodeOptions,
    #[serde(default)]
    pub resolved: Option<DecodeResolved>,
    #[serde(default)]
    pub completed_tasks: StageSet,
}

impl DecodeConfiguration {
    /// The defaults-plus-overrides baseline every record starts from.
    pub fn baseline(options: &DecodeOptions) -> Self {
        Self {
            options: options.clone(),
            resolved: None,
            completed_tasks: StageSet::empty(),
        }
    }

    pub fn resolved(&self) -> Result<&DecodeResolved, LfBatchError> {
        self.resolved.as_ref().ok_or_else(|| {
            LfBatchError::InternalError("decode configuration has no resolved values".into())
        })
    }

    pub fn with_completed(&self, completed: StageSet) -> Self {
        Self {
            completed_tasks: self.completed_tasks.union(&completed),
            ..self.clone()
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct RectConfiguration {
    pub options: RectOptions,
    /// Where the calibration used for rectification was found.
    #[serde(default)]
    pub calibration_source: Option<PathBuf>,
}

impl RectConfiguration {
    pub fn baseline(options: &RectOptions) -> Self {
        Self {
            options: options.clone(),
            calibration_source: None,
        }
    }

    pub fn with_source(&self, source: PathBuf) -> Self {
        Self {
            calibration_source: Some(source),
            ..self.clone()
        }
    }
}

//==================================================================================
// VI. Serde Default Helpers
//==================================================================================

/// Helper for `serde` to default a boolean field to true.
fn default_true() -> bool {
    true
}

fn default_zstd_level() -> i32 {
    3
}

fn default_preview_max_dimension() -> u32 {
    300
}

fn default_font_scale() -> f32 {
    16.0
}

fn default_output_name_template() -> String {
    "%s__Decoded".to_string()
}

fn default_thumb_name_template() -> String {
    "%s__Decoded_Thumb".to_string()
}

fn default_hist_eq_threshold() -> f64 {
    0.01
}

fn default_camera_database_path() -> PathBuf {
    PathBuf::from("Cameras")
}

fn default_white_image_database_file() -> String {
    "WhiteImageDatabase.json".to_string()
}

fn default_calibration_database_file() -> String {
    "CalibrationDatabase.json".to_string()
}

fn default_max_grid_model_diff() -> f64 {
    1e-5
}

fn default_gamma() -> f64 {
    1.0
}

//==================================================================================
// Unit Tests
//==================================================================================
