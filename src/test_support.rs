//! Mock collaborators shared by the scenario tests. Each mock counts its calls
//! so tests can assert that no work happened.

use ndarray::{Array1, Array2, Array5, ArrayView5, Axis};
use std::cell::{Cell, RefCell};
use std::path::{Path, PathBuf};

use crate::calibration::CalibrationRecord;
use crate::config::{DecodeConfiguration, DecodeResolved, RectConfiguration};
use crate::error::LfBatchError;
use crate::traits::{
    CalibrationDatabase, CalibrationMatch, ColourParams, ColourTransform, Collaborators,
    DecodeOutput, Decoder, RectifyOutput, Rectifier,
};
use crate::types::{ChannelLayout, GridModel, GridOrientation, LfMetadata, LightFieldRecord};

pub const SERIAL: &str = "B5143300780";

pub fn grid_model() -> GridModel {
    GridModel {
        h_spacing: 14.2,
        v_spacing: 12.3,
        h_offset: 8.0,
        v_offset: 6.5,
        rotation: 1.0e-3,
        orientation: GridOrientation::Horizontal,
        first_pos_shift_row: 2.0,
    }
}

/// Produces a smooth ramp light field of the configured size.
pub struct SyntheticDecoder {
    pub angular: (usize, usize),
    pub spatial: (usize, usize),
    pub layout: ChannelLayout,
    pub grid: GridModel,
    /// Colour samples are multiplied by this; above 1 they exceed saturation.
    pub gain: f64,
    /// Inputs whose base name is listed here decode to nothing.
    pub undecodable: Vec<String>,
    pub calls: Cell<usize>,
}

impl Default for SyntheticDecoder {
    fn default() -> Self {
        Self {
            angular: (3, 3),
            spatial: (6, 5),
            layout: ChannelLayout::new(3, 1),
            grid: grid_model(),
            gain: 1.0,
            undecodable: Vec::new(),
            calls: Cell::new(0),
        }
    }
}

impl Decoder for SyntheticDecoder {
    fn decode(
        &self,
        input: &Path,
        config: &DecodeConfiguration,
    ) -> Result<Option<DecodeOutput>, LfBatchError> {
        self.calls.set(self.calls.get() + 1);
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        if self.undecodable.contains(&stem) {
            return Ok(None);
        }

        let (t_len, s_len) = self.angular;
        let (v_len, u_len) = self.spatial;
        let colour = self.layout.colour;
        let shape = (t_len, s_len, v_len, u_len, self.layout.total());
        let samples = Array5::from_shape_fn(shape, |(t, s, v, u, c)| {
            if c >= colour {
                1.0
            } else {
                let ramp = (t + s + v + u + c) as f64 / (t_len + s_len + v_len + u_len + colour) as f64;
                self.gain * (0.1 + 0.8 * ramp)
            }
        });
        let record = LightFieldRecord::new(samples, self.layout, config.options.precision)?;

        let mut resolved_config = config.clone();
        resolved_config.resolved = Some(DecodeResolved {
            lf_size: [t_len, s_len, v_len, u_len, self.layout.total()],
            channels: self.layout,
            colour_matrix: Array2::eye(colour),
            colour_balance: Array1::from_elem(colour, 0.9),
            grid_model: self.grid,
        });

        Ok(Some(DecodeOutput {
            record,
            metadata: LfMetadata {
                camera_serial: SERIAL.to_string(),
                camera_model: Some("F01".to_string()),
                zoom_step: 100,
                focus_step: 200,
                ..Default::default()
            },
            config: resolved_config,
        }))
    }
}

/// Scales each colour channel by its balance entry and clamps at the saturation
/// ceiling (never below 1).
#[derive(Default)]
pub struct BalanceOnlyColour {
    pub calls: Cell<usize>,
    pub last_params: RefCell<Option<ColourParams>>,
    pub fail: bool,
}

impl ColourTransform for BalanceOnlyColour {
    fn apply(
        &self,
        colour: ArrayView5<'_, f64>,
        params: &ColourParams,
    ) -> Result<Array5<f64>, LfBatchError> {
        self.calls.set(self.calls.get() + 1);
        *self.last_params.borrow_mut() = Some(params.clone());
        if self.fail {
            return Err(LfBatchError::Collaborator {
                name: "colour transform",
                detail: "mock failure".into(),
            });
        }
        let mut out = colour.to_owned();
        for (c, mut lane) in out.axis_iter_mut(Axis(4)).enumerate() {
            let gain = params.balance[c];
            lane.mapv_inplace(|x| (x * gain).clamp(0.0, params.saturation_ceiling.max(1.0)));
        }
        Ok(out)
    }
}

/// Always answers with the same calibration, or never when `calibration` is `None`.
pub struct FixedCalibration {
    pub calibration: Option<CalibrationRecord>,
    pub calls: Cell<usize>,
}

impl FixedCalibration {
    pub fn matching(grid: GridModel) -> Self {
        Self {
            calibration: Some(CalibrationRecord {
                camera_serial: SERIAL.to_string(),
                zoom_step: 100,
                focus_step: 200,
                grid_model: grid,
                intrinsics: Array2::eye(5),
                distortion: vec![0.0; 5],
            }),
            calls: Cell::new(0),
        }
    }

    pub fn empty() -> Self {
        Self {
            calibration: None,
            calls: Cell::new(0),
        }
    }
}

impl CalibrationDatabase for FixedCalibration {
    fn lookup(
        &self,
        _metadata: &LfMetadata,
        _config: &RectConfiguration,
    ) -> Result<Option<CalibrationMatch>, LfBatchError> {
        self.calls.set(self.calls.get() + 1);
        Ok(self.calibration.clone().map(|calibration| CalibrationMatch {
            calibration,
            source: PathBuf::from("Cameras/B5143300780/CalInfo.json"),
        }))
    }
}

/// Mirrors the record along `u`, so rectified output is recognisable.
#[derive(Default)]
pub struct MirrorRectifier {
    pub calls: Cell<usize>,
    pub report_failure: bool,
}

impl Rectifier for MirrorRectifier {
    fn rectify(
        &self,
        record: &LightFieldRecord,
        _calibration: &CalibrationRecord,
        config: &RectConfiguration,
    ) -> Result<RectifyOutput, LfBatchError> {
        self.calls.set(self.calls.get() + 1);
        let mut samples = record.samples().clone();
        samples.invert_axis(Axis(3));
        Ok(RectifyOutput {
            record: LightFieldRecord::new(samples, record.layout(), record.precision())?,
            config: config.clone(),
            success: !self.report_failure,
        })
    }
}

/// The default mock set: decodable input, matching calibration.
pub struct MockWorld {
    pub decoder: SyntheticDecoder,
    pub colour: BalanceOnlyColour,
    pub calibration: FixedCalibration,
    pub rectifier: MirrorRectifier,
}

impl Default for MockWorld {
    fn default() -> Self {
        Self {
            decoder: SyntheticDecoder::default(),
            colour: BalanceOnlyColour::default(),
            calibration: FixedCalibration::matching(grid_model()),
            rectifier: MirrorRectifier::default(),
        }
    }
}

impl MockWorld {
    pub fn collaborators(&self) -> Collaborators<'_> {
        Collaborators {
            decoder: &self.decoder,
            colour: &self.colour,
            calibration: &self.calibration,
            rectifier: &self.rectifier,
        }
    }

    /// Total collaborator calls so far.
    pub fn work_done(&self) -> usize {
        self.decoder.calls.get()
            + self.colour.calls.get()
            + self.calibration.calls.get()
            + self.rectifier.calls.get()
    }
}
