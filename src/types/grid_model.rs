//! The lenslet grid model: a geometric description of the microlens array
//! found at decode time, and the tolerance comparison used to check it against
//! the grid model stored with a calibration.

use serde::{Deserialize, Serialize};

/// Orientation of the hexagonal lenslet rows.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GridOrientation {
    #[default]
    Horizontal,
    Vertical,
}

impl GridOrientation {
    /// The orientation flag as a number, so it can take part in the
    /// field-by-field comparison alongside the continuous fields.
    fn as_flag(self) -> f64 {
        match self {
            GridOrientation::Horizontal => 1.0,
            GridOrientation::Vertical => 0.0,
        }
    }
}

/// Pitch, rotation, offset and orientation of the lenslet grid, in sensor pixels
/// and radians.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct GridModel {
    pub h_spacing: f64,
    pub v_spacing: f64,
    pub h_offset: f64,
    pub v_offset: f64,
    pub rotation: f64,
    pub orientation: GridOrientation,
    #[serde(default)]
    pub first_pos_shift_row: f64,
}

/// A single numeric field that exceeded the tolerance.
#[derive(Debug, Clone, PartialEq)]
pub struct GridFieldDeviation {
    pub field: &'static str,
    pub relative_difference: f64,
}

impl GridModel {
    /// The fixed field list used for comparison, as `(name, value)` pairs.
    fn numeric_fields(&self) -> [(&'static str, f64); 7] {
        [
            ("h_spacing", self.h_spacing),
            ("v_spacing", self.v_spacing),
            ("h_offset", self.h_offset),
            ("v_offset", self.v_offset),
            ("rotation", self.rotation),
            ("orientation", self.orientation.as_flag()),
            ("first_pos_shift_row", self.first_pos_shift_row),
        ]
    }

    /// Compares this (decode-time) grid model against `other`, field by field.
    ///
    /// Each field's relative difference is taken against this model's value,
    /// `|a - b| / |a|`. When `a` is zero the difference is scaled by `|b|`
    /// instead, so it is 1 if `b` is not zero and 0 if both are. Fields whose
    /// difference is strictly greater than `tolerance` are returned; an empty
    /// result means the models agree.
    pub fn compare(&self, other: &GridModel, tolerance: f64) -> Vec<GridFieldDeviation> {
        self.numeric_fields()
            .iter()
            .zip(other.numeric_fields().iter())
            .filter_map(|(&(field, a), &(_, b))| {
                let relative_difference = relative_difference(a, b);
                (relative_difference > tolerance).then_some(GridFieldDeviation {
                    field,
                    relative_difference,
                })
            })
            .collect()
    }
}

fn relative_difference(a: f64, b: f64) -> f64 {
    let scale = if a != 0.0 { a.abs() } else { b.abs() };
    if scale == 0.0 {
        0.0
    } else {
        (a - b).abs() / scale
    }
}
