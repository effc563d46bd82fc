//! The completion tracker.
//!
//! The completed-stage list in an artifact's header is the only fact consulted:
//! whatever the header says is baked into the samples is treated as done. The
//! sample payload is read only when stages remain.

use crate::config::{PipelineConfig, RectConfiguration};
use crate::error::LfBatchError;
use crate::persist::{self, OutputPaths};
use crate::pipeline::ProcessedRecord;
use crate::traits::InputRecord;
use crate::types::{LightFieldRecord, StageSet};

/// What the tracker found for one record.
#[derive(Debug, Clone)]
pub enum Assessment {
    /// No usable prior artifact (or force-redo). Decode and every requested stage run.
    Fresh { remaining: StageSet },
    /// Every requested stage is already baked in. Nothing was loaded.
    UpToDate { completed: StageSet },
    /// Some stages remain; the prior artifact was loaded to continue from.
    Resume {
        loaded: ProcessedRecord,
        remaining: StageSet,
    },
}

impl Assessment {
    pub fn remaining(&self) -> StageSet {
        match self {
            Assessment::Fresh { remaining } | Assessment::Resume { remaining, .. } => *remaining,
            Assessment::UpToDate { .. } => StageSet::empty(),
        }
    }
}

/// Reconciles the requested stages against whatever artifact already exists at
/// `paths`.
///
/// An artifact that exists but cannot be read is an error for this record; it
/// is never repaired or silently overwritten.
pub fn assess(
    input: &InputRecord,
    paths: &OutputPaths,
    config: &PipelineConfig,
) -> Result<Assessment, LfBatchError> {
    let requested = config.decode.stages;

    if config.file.force_redo {
        log::debug!("[{}] force_redo set; ignoring any prior artifact", input.base_name);
        return Ok(Assessment::Fresh { remaining: requested });
    }
    if !persist::artifact_exists(paths) {
        return Ok(Assessment::Fresh { remaining: requested });
    }

    let provenance = persist::peek_provenance(paths, config.file.format)?;
    let completed = provenance.completed_tasks;
    let remaining = requested.difference(&completed);
    log::debug!(
        "[{}] {} already has [{}], remaining [{}]",
        input.base_name,
        paths.artifact.display(),
        completed,
        remaining
    );

    if remaining.is_empty() {
        return Ok(Assessment::UpToDate { completed });
    }

    let loaded = reload(input, paths, config)?;
    Ok(Assessment::Resume { loaded, remaining })
}

/// Loads an artifact and converts it back to the floating working form.
fn reload(
    input: &InputRecord,
    paths: &OutputPaths,
    config: &PipelineConfig,
) -> Result<ProcessedRecord, LfBatchError> {
    let (header, samples) = persist::load(paths, config.file.format)?;

    let precision = header.decode.options.precision;
    let values = samples.dequantize(header.normalisation_divisor, precision);
    // The stored layout, not the decode-time one: weight may have been dropped.
    let record = LightFieldRecord::new(values, header.channels, precision)?;

    let mut decode = header
        .decode
        .with_completed(header.provenance.completed_tasks);
    decode.options.stages = config.decode.stages;

    let rectify = RectConfiguration {
        options: config.rectify.clone(),
        calibration_source: header.rectify.calibration_source,
    };

    Ok(ProcessedRecord {
        base_name: input.base_name.clone(),
        record,
        metadata: header.metadata,
        decode,
        rectify,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DecodeConfiguration, FileOptions, OutputFormat, PreviewOptions};
    use crate::types::{ChannelLayout, LfMetadata, Precision, Stage};
    use ndarray::Array5;

    fn config(stages: StageSet, format: OutputFormat) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.decode.stages = stages;
        config.file = FileOptions {
            format,
            preview: PreviewOptions {
                enabled: false,
                ..Default::default()
            },
            ..Default::default()
        };
        config
    }

    fn write_prior(dir: &std::path::Path, config: &PipelineConfig, done: StageSet) -> (InputRecord, OutputPaths) {
        let input = InputRecord::from_path(dir.join("IMG_2.LFR"));
        let paths = OutputPaths::resolve(&input, &config.file);
        let samples = Array5::from_shape_fn((2, 2, 3, 3, 4), |(t, s, v, u, c)| {
            ((t + s + v + u + c) % 7) as f64 / 7.0
        });
        let processed = ProcessedRecord {
            base_name: input.base_name.clone(),
            record: LightFieldRecord::new(samples, ChannelLayout::new(3, 1), Precision::Double)
                .unwrap(),
            metadata: LfMetadata {
                camera_serial: "SN1".into(),
                ..Default::default()
            },
            decode: DecodeConfiguration::baseline(&config.decode).with_completed(done),
            rectify: RectConfiguration::baseline(&config.rectify),
        };
        persist::save(&processed, &paths, &config.file).unwrap();
        (input, paths)
    }

    #[test]
    fn test_missing_artifact_is_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(StageSet::all(), OutputFormat::Lfb);
        let input = InputRecord::from_path(dir.path().join("IMG_2.LFR"));
        let paths = OutputPaths::resolve(&input, &config.file);

        let assessment = assess(&input, &paths, &config).unwrap();
        assert!(matches!(assessment, Assessment::Fresh { remaining } if remaining == StageSet::all()));
    }

    #[test]
    fn test_complete_artifact_is_up_to_date() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(StageSet::empty().with(Stage::ColourCorrect), OutputFormat::Lfb);
        let (input, paths) = write_prior(dir.path(), &config, StageSet::all());

        let assessment = assess(&input, &paths, &config).unwrap();
        assert!(matches!(assessment, Assessment::UpToDate { completed } if completed == StageSet::all()));
    }

    #[test]
    fn test_partial_artifact_resumes_with_history() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(StageSet::all(), OutputFormat::PngAlpha);
        let (input, paths) =
            write_prior(dir.path(), &config, StageSet::empty().with(Stage::ColourCorrect));

        let Assessment::Resume { loaded, remaining } = assess(&input, &paths, &config).unwrap()
        else {
            panic!("expected a resume");
        };
        assert_eq!(remaining.to_vec(), vec![Stage::Rectify]);
        assert_eq!(loaded.completed().to_vec(), vec![Stage::ColourCorrect]);
        assert_eq!(loaded.decode.options.stages, StageSet::all());
        assert_eq!(loaded.record.layout(), ChannelLayout::new(3, 1));
        assert_eq!(loaded.metadata.camera_serial, "SN1");
    }

    #[test]
    fn test_force_redo_ignores_prior_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(StageSet::all(), OutputFormat::Lfb);
        let (input, paths) = write_prior(dir.path(), &config, StageSet::all());
        config.file.force_redo = true;

        let assessment = assess(&input, &paths, &config).unwrap();
        assert_eq!(assessment.remaining(), StageSet::all());
        assert!(matches!(assessment, Assessment::Fresh { .. }));
    }

    #[test]
    fn test_corrupt_artifact_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(StageSet::all(), OutputFormat::Lfb);
        let input = InputRecord::from_path(dir.path().join("IMG_2.LFR"));
        let paths = OutputPaths::resolve(&input, &config.file);
        std::fs::write(&paths.artifact, b"garbage that is not a container").unwrap();

        assert!(matches!(
            assess(&input, &paths, &config),
            Err(LfBatchError::ArtifactFormat(_))
        ));
    }
}
