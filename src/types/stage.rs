//! This module defines the canonical, type-safe representation of the optional
//! processing stages and of sets of them.
//!
//! Stage names used to travel as loose strings; here they are an enum, and a set
//! of stages is a small bitmask with a fixed iteration order. Set difference is
//! what the completion tracker uses to decide what is left to do.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::LfBatchError;

/// An optional processing stage that runs after Decode.
///
/// The declaration order is the execution order: `ColourCorrect` always runs
/// before `Rectify` when both are requested.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    ColourCorrect,
    Rectify,
}

impl Stage {
    /// Every stage, in execution order.
    pub const ALL: [Stage; 2] = [Stage::ColourCorrect, Stage::Rectify];

    fn bit(self) -> u8 {
        match self {
            Stage::ColourCorrect => 0b01,
            Stage::Rectify => 0b10,
        }
    }

    /// Whether the stage needs the weight channel to be present in the record.
    ///
    /// Rectification resamples every channel and uses the weight channel to mask
    /// samples that fall outside the lenslet footprint.
    pub fn requires_weight(self) -> bool {
        matches!(self, Stage::Rectify)
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::ColourCorrect => "ColourCorrect",
            Stage::Rectify => "Rectify",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Stage {
    type Err = LfBatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ColourCorrect" => Ok(Stage::ColourCorrect),
            "Rectify" => Ok(Stage::Rectify),
            other => Err(LfBatchError::Config(format!("Unknown stage '{}'", other))),
        }
    }
}

/// An ordered set of [`Stage`]s.
///
/// Serialized as a JSON list of stage names in execution order, which is the
/// on-disk form of the completed-stage provenance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct StageSet(u8);

impl StageSet {
    pub const fn empty() -> Self {
        StageSet(0)
    }

    pub fn all() -> Self {
        Stage::ALL.into_iter().collect()
    }

    pub fn contains(&self, stage: Stage) -> bool {
        self.0 & stage.bit() != 0
    }

    pub fn insert(&mut self, stage: Stage) {
        self.0 |= stage.bit();
    }

    /// Returns a copy of this set with `stage` added.
    pub fn with(mut self, stage: Stage) -> Self {
        self.insert(stage);
        self
    }

    pub fn union(&self, other: &StageSet) -> StageSet {
        StageSet(self.0 | other.0)
    }

    /// Stages in `self` that are not in `other`, still in execution order.
    pub fn difference(&self, other: &StageSet) -> StageSet {
        StageSet(self.0 & !other.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Iterates the members in execution order.
    pub fn iter(&self) -> impl Iterator<Item = Stage> + '_ {
        let set = *self;
        Stage::ALL.into_iter().filter(move |s| set.contains(*s))
    }

    pub fn to_vec(&self) -> Vec<Stage> {
        self.iter().collect()
    }
}

impl FromIterator<Stage> for StageSet {
    fn from_iter<I: IntoIterator<Item = Stage>>(iter: I) -> Self {
        let mut set = StageSet::empty();
        for stage in iter {
            set.insert(stage);
        }
        set
    }
}

impl fmt::Display for StageSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("(none)");
        }
        let names: Vec<&str> = self.iter().map(Stage::name).collect();
        f.write_str(&names.join(", "))
    }
}

impl Serialize for StageSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for StageSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let names: Vec<String> = Vec::deserialize(deserializer)?;
        names
            .iter()
            .map(|n| n.parse::<Stage>().map_err(D::Error::custom))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_difference_preserves_execution_order() {
        let requested = StageSet::all();
        let completed = StageSet::empty().with(Stage::ColourCorrect);
        let remaining = requested.difference(&completed);
        assert_eq!(remaining.to_vec(), vec![Stage::Rectify]);

        let nothing_done = requested.difference(&StageSet::empty());
        assert_eq!(
            nothing_done.to_vec(),
            vec![Stage::ColourCorrect, Stage::Rectify]
        );
    }

    #[test]
    fn test_insertion_order_does_not_matter() {
        let a: StageSet = [Stage::Rectify, Stage::ColourCorrect].into_iter().collect();
        let b: StageSet = [Stage::ColourCorrect, Stage::Rectify].into_iter().collect();
        assert_eq!(a, b);
        assert_eq!(a.to_vec(), vec![Stage::ColourCorrect, Stage::Rectify]);
    }

    #[test]
    fn test_serializes_as_ordered_name_list() {
        let set = StageSet::empty().with(Stage::Rectify).with(Stage::ColourCorrect);
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"["ColourCorrect","Rectify"]"#);

        let back: StageSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);
    }

    #[test]
    fn test_unknown_stage_name_is_rejected() {
        let res: Result<StageSet, _> = serde_json::from_str(r#"["ColourCorrect","Dehex"]"#);
        assert!(res.is_err());
    }

    #[test]
    fn test_display_lists_members() {
        assert_eq!(StageSet::empty().to_string(), "(none)");
        assert_eq!(StageSet::all().to_string(), "ColourCorrect, Rectify");
    }
}
