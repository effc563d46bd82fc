//! Camera metadata carried alongside a decoded light field. The calibration
//! lookup keys on the serial number and the zoom/focus motor positions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct LfMetadata {
    pub camera_serial: String,
    #[serde(default)]
    pub camera_model: Option<String>,
    pub zoom_step: i64,
    pub focus_step: i64,
    /// Anything else the decoder chose to keep (exposure, ISO, timestamps...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}
