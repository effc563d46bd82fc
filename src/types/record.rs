//! The in-memory light field: a 5-axis array `[t, s, v, u, c]` of floating
//! samples normalised to [0, 1], plus the channel layout that says which
//! entries on the last axis are colour and which are weight.

use ndarray::{concatenate, s, Array3, Array5, ArrayView5, Axis};
use serde::{Deserialize, Serialize};

use crate::error::LfBatchError;

/// Index of the channel axis in `[t, s, v, u, c]`.
pub const AXIS_C: usize = 4;

/// The floating precision the pipeline works in.
///
/// Samples are always held as `f64`; `Single` rounds every value through `f32`
/// so that results match what a single-precision pipeline would produce.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Precision {
    #[default]
    Single,
    Double,
}

impl Precision {
    #[inline]
    pub fn coerce(self, value: f64) -> f64 {
        match self {
            Precision::Single => value as f32 as f64,
            Precision::Double => value,
        }
    }
}

/// How the channel axis is split: colour channels first, then weight channels.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ChannelLayout {
    pub colour: usize,
    pub weight: usize,
}

impl ChannelLayout {
    pub fn new(colour: usize, weight: usize) -> Self {
        Self { colour, weight }
    }

    /// Saturates, so a corrupt stored layout compares unequal instead of overflowing.
    pub fn total(&self) -> usize {
        self.colour.saturating_add(self.weight)
    }

    pub fn has_weight(&self) -> bool {
        self.weight > 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LightFieldRecord {
    samples: Array5<f64>,
    layout: ChannelLayout,
    precision: Precision,
}

impl LightFieldRecord {
    /// Builds a record, coercing every sample to `precision`.
    pub fn new(
        mut samples: Array5<f64>,
        layout: ChannelLayout,
        precision: Precision,
    ) -> Result<Self, LfBatchError> {
        let channels = samples.len_of(Axis(AXIS_C));
        if channels != layout.total() || layout.colour == 0 {
            return Err(LfBatchError::UnsupportedLayout(format!(
                "channel axis has {} entries but layout declares {} colour + {} weight",
                channels, layout.colour, layout.weight
            )));
        }
        if precision == Precision::Single {
            samples.mapv_inplace(|v| precision.coerce(v));
        }
        Ok(Self {
            samples,
            layout,
            precision,
        })
    }

    pub fn samples(&self) -> &Array5<f64> {
        &self.samples
    }

    pub fn layout(&self) -> ChannelLayout {
        self.layout
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    /// `[t, s, v, u, c]`
    pub fn shape(&self) -> [usize; 5] {
        let d = self.samples.dim();
        [d.0, d.1, d.2, d.3, d.4]
    }

    pub fn colour_view(&self) -> ArrayView5<'_, f64> {
        self.samples.slice(s![.., .., .., .., 0..self.layout.colour])
    }

    pub fn weight_view(&self) -> ArrayView5<'_, f64> {
        self.samples
            .slice(s![.., .., .., .., self.layout.colour..self.layout.total()])
    }

    /// Reassembles a record from separately processed colour and weight blocks.
    /// The weight block may have zero channels.
    pub fn from_parts<'a>(
        colour: ArrayView5<'a, f64>,
        weight: ArrayView5<'a, f64>,
        precision: Precision,
    ) -> Result<Self, LfBatchError> {
        let layout = ChannelLayout::new(colour.len_of(Axis(AXIS_C)), weight.len_of(Axis(AXIS_C)));
        let samples = concatenate(Axis(AXIS_C), &[colour, weight])?;
        Self::new(samples, layout, precision)
    }

    /// A copy of this record with every weight channel removed.
    pub fn without_weight(&self) -> Self {
        Self {
            samples: self.colour_view().to_owned(),
            layout: ChannelLayout::new(self.layout.colour, 0),
            precision: self.precision,
        }
    }

    /// Largest sample over the whole record, weight channels included.
    pub fn max_sample(&self) -> f64 {
        self.samples.iter().copied().fold(0.0, f64::max)
    }

    /// The colour channels of the central angular sample, as `[v, u, c]`.
    pub fn central_view(&self) -> Array3<f64> {
        let [t, s_dim, ..] = self.shape();
        self.samples
            .slice(s![t / 2, s_dim / 2, .., .., 0..self.layout.colour])
            .to_owned()
    }
}
