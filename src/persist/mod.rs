//! The persistence engine: turns a processed record into an on-disk artifact and
//! reads artifacts back for the completion tracker.
//!
//! Every artifact carries an `ArtifactHeader` whose completed-stage list matches
//! exactly what is baked into its samples. Files are written to a `.partial`
//! sibling and renamed into place, so an interrupted write never leaves a file
//! that looks current.

pub mod container;
pub mod format;
pub mod paths;
pub mod preview;
pub mod sequential;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::config::{FileOptions, OutputFormat};
use crate::error::LfBatchError;
use crate::kernels::{normalisation_divisor, QuantizedSamples};
use crate::pipeline::ProcessedRecord;
use crate::types::ChannelLayout;

pub use format::{ArtifactHeader, GeneratorInfo, Provenance};
pub use paths::{render_template, OutputPaths};

/// What a successful save wrote.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedArtifact {
    pub paths: OutputPaths,
    /// The channel layout actually stored, after weight channels were dropped.
    pub stored_layout: ChannelLayout,
    pub normalisation_divisor: f64,
    pub preview_written: bool,
}

//==================================================================================
// I. Save
//==================================================================================

/// Quantises and writes one processed record, plus its preview.
pub fn save(
    processed: &ProcessedRecord,
    paths: &OutputPaths,
    file: &FileOptions,
) -> Result<SavedArtifact, LfBatchError> {
    let record = &processed.record;
    let divisor = normalisation_divisor(record, processed.decode.options.clip_mode);

    let stored_layout = stored_layout(record.layout(), file);
    if stored_layout.weight < record.layout().weight {
        log::info!(
            "[{}] storing {} of {} weight channel(s)",
            processed.base_name,
            stored_layout.weight,
            record.layout().weight
        );
    }
    if file.format.is_sequential() {
        sequential::check_layout(stored_layout)?;
    }

    let samples = QuantizedSamples::from_record(record, file.precision, divisor)
        .truncate_channels(stored_layout.total());

    std::fs::create_dir_all(&paths.dir)?;

    let completed = processed.decode.completed_tasks;
    let preview_written = file.preview.enabled && {
        let text = preview::caption(&processed.base_name, completed);
        match preview::write(
            &paths.preview,
            record,
            &text,
            &file.preview,
            processed.decode.options.hist_eq_threshold,
        ) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("[{}] preview not written: {}", processed.base_name, e);
                false
            }
        }
    };

    let header = ArtifactHeader {
        record: processed.base_name.clone(),
        generator: GeneratorInfo::current(),
        shape: samples.shape(),
        sample_type: file.precision,
        channels: stored_layout,
        normalisation_divisor: divisor,
        provenance: Provenance {
            completed_tasks: completed,
        },
        decode: processed.decode.clone(),
        rectify: processed.rectify.clone(),
        metadata: processed.metadata.clone(),
    };

    match file.format {
        OutputFormat::Lfb => {
            container::write(&paths.artifact, &header, &samples, file.encoder.zstd_level)?
        }
        OutputFormat::PngAlpha | OutputFormat::Png => sequential::write(
            &paths.artifact,
            sidecar_of(paths)?,
            &header,
            &samples,
            file.encoder.png_compression,
        )?,
    }

    log::info!(
        "[{}] saved {} (stages: {})",
        processed.base_name,
        paths.artifact.display(),
        completed
    );
    Ok(SavedArtifact {
        paths: paths.clone(),
        stored_layout,
        normalisation_divisor: divisor,
        preview_written,
    })
}

/// The channel layout the chosen format and weight option leave on disk.
fn stored_layout(layout: ChannelLayout, file: &FileOptions) -> ChannelLayout {
    let weight = if !file.save_weight {
        0
    } else {
        match file.format {
            OutputFormat::Lfb => layout.weight,
            OutputFormat::PngAlpha => layout.weight.min(1),
            OutputFormat::Png => 0,
        }
    };
    ChannelLayout::new(layout.colour, weight)
}

//==================================================================================
// II. Load
//==================================================================================

/// Whether a complete artifact exists. A sequential artifact without its
/// sidecar is an interrupted write and does not count.
pub fn artifact_exists(paths: &OutputPaths) -> bool {
    paths.artifact.is_file() && paths.sidecar.as_ref().map_or(true, |p| p.is_file())
}

/// Reads only the completed-stage provenance of an existing artifact.
pub fn peek_provenance(paths: &OutputPaths, format: OutputFormat) -> Result<Provenance, LfBatchError> {
    match format {
        OutputFormat::Lfb => container::peek_provenance(&paths.artifact),
        OutputFormat::PngAlpha | OutputFormat::Png => sequential::peek_provenance(sidecar_of(paths)?),
    }
}

/// Reads a whole artifact.
pub fn load(
    paths: &OutputPaths,
    format: OutputFormat,
) -> Result<(ArtifactHeader, QuantizedSamples), LfBatchError> {
    match format {
        OutputFormat::Lfb => container::read(&paths.artifact),
        OutputFormat::PngAlpha | OutputFormat::Png => {
            sequential::read(&paths.artifact, sidecar_of(paths)?)
        }
    }
}

fn sidecar_of(paths: &OutputPaths) -> Result<&Path, LfBatchError> {
    paths.sidecar.as_deref().ok_or_else(|| {
        LfBatchError::InternalError(format!(
            "sequential artifact {} has no sidecar path",
            paths.artifact.display()
        ))
    })
}

//==================================================================================
// III. Replace-on-complete Writes
//==================================================================================

fn partial_path(path: &Path) -> Result<PathBuf, LfBatchError> {
    let mut name = path
        .file_name()
        .ok_or_else(|| {
            LfBatchError::InternalError(format!("output path {} has no file name", path.display()))
        })?
        .to_os_string();
    name.push(".");
    name.push(format::PARTIAL_SUFFIX);
    Ok(path.with_file_name(name))
}

/// Runs `write` against a `.partial` sibling of `path`, then renames it over
/// `path`. On failure the partial file is removed and `path` is untouched.
pub(crate) fn write_replacing<F>(path: &Path, write: F) -> Result<(), LfBatchError>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<(), LfBatchError>,
{
    let partial = partial_path(path)?;
    let result = File::create(&partial)
        .map_err(LfBatchError::from)
        .and_then(|file| {
            let mut out = BufWriter::new(file);
            write(&mut out)?;
            out.flush()?;
            Ok(())
        })
        .and_then(|()| std::fs::rename(&partial, path).map_err(LfBatchError::from));

    if result.is_err() {
        let _ = std::fs::remove_file(&partial);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DecodeConfiguration, DecodeOptions, RectConfiguration, RectOptions};
    use crate::config::{ClipMode, OutputPrecision};
    use crate::traits::InputRecord;
    use crate::types::{LfMetadata, LightFieldRecord, Precision, Stage, StageSet};
    use ndarray::Array5;

    fn processed(clip_mode: ClipMode, scale: f64) -> ProcessedRecord {
        let samples = Array5::from_shape_fn((3, 3, 4, 4, 4), |(t, s, v, u, c)| {
            scale * ((t + s + v + u + c) as f64 / 13.0)
        });
        let record =
            LightFieldRecord::new(samples, ChannelLayout::new(3, 1), Precision::Double).unwrap();
        let options = DecodeOptions {
            clip_mode,
            ..Default::default()
        };
        ProcessedRecord {
            base_name: "IMG_5".to_string(),
            record,
            metadata: LfMetadata::default(),
            decode: DecodeConfiguration::baseline(&options)
                .with_completed(StageSet::empty().with(Stage::ColourCorrect)),
            rectify: RectConfiguration::baseline(&RectOptions::default()),
        }
    }

    fn paths_in(dir: &Path, file: &FileOptions) -> OutputPaths {
        let input = InputRecord::from_path(dir.join("IMG_5.LFR"));
        OutputPaths::resolve(&input, file)
    }

    #[test]
    fn test_save_writes_artifact_and_preview() {
        let dir = tempfile::tempdir().unwrap();
        let file = FileOptions::default();
        let paths = paths_in(dir.path(), &file);

        let saved = save(&processed(ClipMode::Hard, 1.0), &paths, &file).unwrap();
        assert!(saved.preview_written);
        assert!(paths.preview.is_file());
        assert!(artifact_exists(&paths));

        let provenance = peek_provenance(&paths, file.format).unwrap();
        assert_eq!(provenance.completed_tasks.to_vec(), vec![Stage::ColourCorrect]);
    }

    #[test]
    fn test_clip_none_records_true_maximum() {
        let dir = tempfile::tempdir().unwrap();
        let file = FileOptions::default();
        let paths = paths_in(dir.path(), &file);
        let rec = processed(ClipMode::None, 2.5);

        let saved = save(&rec, &paths, &file).unwrap();
        assert_eq!(saved.normalisation_divisor, rec.record.max_sample());
        assert_eq!(saved.normalisation_divisor, 2.5);

        let (header, samples) = load(&paths, file.format).unwrap();
        assert_eq!(header.normalisation_divisor, 2.5);
        let restored = samples.dequantize(header.normalisation_divisor, Precision::Double);
        let step = 2.5 / OutputPrecision::Uint16.max_value();
        for (a, b) in restored.iter().zip(rec.record.samples().iter()) {
            assert!((a - b).abs() <= step);
        }
    }

    #[test]
    fn test_dropping_weight_is_recorded_in_layout() {
        let dir = tempfile::tempdir().unwrap();
        let file = FileOptions {
            save_weight: false,
            preview: crate::config::PreviewOptions {
                enabled: false,
                ..Default::default()
            },
            ..Default::default()
        };
        let paths = paths_in(dir.path(), &file);

        let saved = save(&processed(ClipMode::Hard, 1.0), &paths, &file).unwrap();
        assert_eq!(saved.stored_layout, ChannelLayout::new(3, 0));
        assert!(!paths.preview.exists());

        let (header, samples) = load(&paths, file.format).unwrap();
        assert_eq!(header.channels, ChannelLayout::new(3, 0));
        assert_eq!(samples.shape(), [3, 3, 4, 4, 3]);
    }

    #[test]
    fn test_png_keeps_at_most_one_alpha_channel() {
        let layout = ChannelLayout::new(3, 2);
        let alpha = FileOptions {
            format: OutputFormat::PngAlpha,
            ..Default::default()
        };
        let plain = FileOptions {
            format: OutputFormat::Png,
            ..Default::default()
        };
        assert_eq!(stored_layout(layout, &alpha), ChannelLayout::new(3, 1));
        assert_eq!(stored_layout(layout, &plain), ChannelLayout::new(3, 0));
        assert_eq!(stored_layout(layout, &FileOptions::default()), layout);
    }

    #[test]
    fn test_sequential_artifact_without_sidecar_does_not_exist() {
        let dir = tempfile::tempdir().unwrap();
        let file = FileOptions {
            format: OutputFormat::Png,
            ..Default::default()
        };
        let paths = paths_in(dir.path(), &file);
        std::fs::write(&paths.artifact, b"half written").unwrap();
        assert!(!artifact_exists(&paths));
    }

    #[test]
    fn test_failed_write_leaves_existing_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("keep.lfb");
        std::fs::write(&target, b"previous").unwrap();

        let res = write_replacing(&target, |_| Err(LfBatchError::InternalError("boom".into())));
        assert!(res.is_err());
        assert_eq!(std::fs::read(&target).unwrap(), b"previous");
        assert!(!dir.path().join("keep.lfb.partial").exists());
    }
}
