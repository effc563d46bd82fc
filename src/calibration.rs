// In: src/calibration.rs

//! Calibration records and a file-backed calibration database.
//!
//! Building calibrations is somebody else's job. This module only knows how a
//! finished calibration is described and how to pick the right one for a
//! capture: same camera serial, nearest zoom and focus motor positions.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::RectConfiguration;
use crate::error::LfBatchError;
use crate::traits::{CalibrationDatabase, CalibrationMatch};
use crate::types::{GridModel, LfMetadata};

/// A stored rectification transform and the grid model it was captured with.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct CalibrationRecord {
    pub camera_serial: String,
    pub zoom_step: i64,
    pub focus_step: i64,
    pub grid_model: GridModel,
    /// 5x5 homogeneous ray-to-sample intrinsics.
    pub intrinsics: Array2<f64>,
    #[serde(default)]
    pub distortion: Vec<f64>,
}

/// One line of the database index.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct CalibrationIndexEntry {
    pub camera_serial: String,
    pub zoom_step: i64,
    pub focus_step: i64,
    /// Relative paths are resolved against the index file's directory.
    pub calibration_file: PathBuf,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct CalibrationIndex {
    pub entries: Vec<CalibrationIndexEntry>,
}

impl CalibrationIndex {
    /// The entry for the same camera with the smallest zoom + focus distance.
    /// Ties go to the entry listed first.
    pub fn best_match(&self, metadata: &LfMetadata) -> Option<&CalibrationIndexEntry> {
        self.entries
            .iter()
            .filter(|e| e.camera_serial == metadata.camera_serial)
            .min_by_key(|e| {
                (e.zoom_step - metadata.zoom_step).unsigned_abs()
                    + (e.focus_step - metadata.focus_step).unsigned_abs()
            })
    }
}

/// Reads the JSON index named by the rectify options on every lookup, so a
/// database updated between runs is always seen.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCalibrationDatabase;

impl JsonCalibrationDatabase {
    fn read_index(path: &Path) -> Result<CalibrationIndex, LfBatchError> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| {
            LfBatchError::ArtifactFormat(format!(
                "calibration index {} is malformed: {}",
                path.display(),
                e
            ))
        })
    }

    fn read_calibration(path: &Path) -> Result<CalibrationRecord, LfBatchError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

impl CalibrationDatabase for JsonCalibrationDatabase {
    fn lookup(
        &self,
        metadata: &LfMetadata,
        config: &RectConfiguration,
    ) -> Result<Option<CalibrationMatch>, LfBatchError> {
        let index_path = config.options.calibration_database();
        if !index_path.exists() {
            log::warn!(
                "calibration database {} does not exist",
                index_path.display()
            );
            return Ok(None);
        }

        let index = Self::read_index(&index_path)?;
        let Some(entry) = index.best_match(metadata) else {
            return Ok(None);
        };

        let source = match index_path.parent() {
            Some(dir) if entry.calibration_file.is_relative() => dir.join(&entry.calibration_file),
            _ => entry.calibration_file.clone(),
        };
        log::debug!(
            "calibration for {} (zoom {}, focus {}) resolved to {}",
            metadata.camera_serial,
            metadata.zoom_step,
            metadata.focus_step,
            source.display()
        );
        let calibration = Self::read_calibration(&source)?;
        Ok(Some(CalibrationMatch {
            calibration,
            source,
        }))
    }
}
