//! The pipeline executor: the three stage handlers and the fixed order they run in.
//!
//! Nothing here is fatal to the batch. Collaborator failures become diagnostics
//! and leave the stage uncompleted; only a failed Decode abandons the record.

use ndarray::{Array1, Array2};

use crate::config::{DecodeConfiguration, PipelineConfig, ResampleMethod};
use crate::error::LfBatchError;
use crate::observability::{DiagnosticKind, Diagnostics};
use crate::pipeline::ProcessedRecord;
use crate::traits::{Collaborators, ColourParams, InputRecord};
use crate::types::{LightFieldRecord, Stage, StageSet};

/// Where execution starts for one record.
#[derive(Debug)]
pub enum StartingPoint<'a> {
    /// No prior artifact: decode the raw input first.
    Raw(&'a InputRecord),
    /// Continue from a reloaded artifact.
    Loaded(ProcessedRecord),
}

/// The outcome of running a record's stages.
#[derive(Debug, Clone)]
pub struct Execution {
    pub processed: ProcessedRecord,
    /// Whether Decode ran this iteration.
    pub decoded: bool,
    /// Stages that completed this iteration.
    pub newly_completed: StageSet,
}

impl Execution {
    /// The samples differ from what is on disk and must be persisted.
    pub fn changed(&self) -> bool {
        self.decoded || !self.newly_completed.is_empty()
    }
}

/// Runs Decode if needed, then every stage in `remaining` in execution order.
///
/// Returns `None` when Decode failed and the record should be skipped. After
/// all stages ran, any requested stage still missing from the completed set is
/// reported once as `IncompleteStages`.
pub fn run_stages(
    start: StartingPoint<'_>,
    remaining: StageSet,
    config: &PipelineConfig,
    collaborators: Collaborators<'_>,
    diagnostics: &mut Diagnostics,
) -> Option<Execution> {
    let (mut processed, decoded) = match start {
        StartingPoint::Raw(input) => (decode(input, config, collaborators, diagnostics)?, true),
        StartingPoint::Loaded(processed) => (processed, false),
    };

    let mut newly_completed = StageSet::empty();
    for stage in remaining.iter() {
        log::info!("[{}] running {}", processed.base_name, stage);
        let completed = match stage {
            Stage::ColourCorrect => colour_correct(&mut processed, collaborators, diagnostics),
            Stage::Rectify => rectify(&mut processed, collaborators, diagnostics),
        };
        if completed {
            processed.decode = processed.decode.with_completed(StageSet::empty().with(stage));
            newly_completed.insert(stage);
        }
    }

    let missing = config.decode.stages.difference(&processed.completed());
    if !missing.is_empty() {
        diagnostics.warn(
            DiagnosticKind::IncompleteStages,
            &processed.base_name,
            format!("requested stages not completed: {}", missing),
        );
    }

    Some(Execution {
        processed,
        decoded,
        newly_completed,
    })
}

//==================================================================================
// I. Decode
//==================================================================================

fn decode(
    input: &InputRecord,
    config: &PipelineConfig,
    collaborators: Collaborators<'_>,
    diagnostics: &mut Diagnostics,
) -> Option<ProcessedRecord> {
    let name = &input.base_name;
    log::info!("[{}] decoding {}", name, input.input_path.display());

    let baseline = DecodeConfiguration::baseline(&config.decode);
    let output = match collaborators.decoder.decode(&input.input_path, &baseline) {
        Ok(Some(output)) => output,
        Ok(None) => {
            diagnostics.warn(DiagnosticKind::DecodeFailed, name, "decoder returned no light field");
            return None;
        }
        Err(e) => {
            diagnostics.warn(DiagnosticKind::DecodeFailed, name, e.to_string());
            return None;
        }
    };

    let resolved = match output.config.resolved() {
        Ok(resolved) => resolved,
        Err(e) => {
            diagnostics.warn(DiagnosticKind::DecodeFailed, name, e.to_string());
            return None;
        }
    };
    if resolved.channels != output.record.layout() {
        diagnostics.warn(
            DiagnosticKind::DecodeFailed,
            name,
            format!(
                "decoder resolved {:?} channels but produced {:?}",
                resolved.channels,
                output.record.layout()
            ),
        );
        return None;
    }

    // A fresh decode has nothing baked in yet, whatever the decoder echoed back.
    let decode = DecodeConfiguration {
        completed_tasks: StageSet::empty(),
        ..output.config
    };
    Some(ProcessedRecord {
        base_name: name.clone(),
        record: output.record,
        metadata: output.metadata,
        decode,
        rectify: crate::config::RectConfiguration::baseline(&config.rectify),
    })
}

//==================================================================================
// II. ColourCorrect
//==================================================================================

/// Derives the colour transform parameters from the record's decode configuration.
pub fn colour_params(decode: &DecodeConfiguration) -> Result<ColourParams, LfBatchError> {
    let resolved = decode.resolved()?;
    let options = &decode.options;
    let n = resolved.channels.colour;

    if resolved.colour_balance.len() != n || resolved.colour_matrix.dim() != (n, n) {
        return Err(LfBatchError::UnsupportedLayout(format!(
            "colour balance ({}) and matrix ({:?}) do not fit {} colour channels",
            resolved.colour_balance.len(),
            resolved.colour_matrix.dim(),
            n
        )));
    }

    let balance = if options.early_white_balance {
        Array1::ones(n)
    } else {
        resolved.colour_balance.clone()
    };
    // Without resampling at most one raw colour is valid per pixel; mixing
    // channels would smear it into the others.
    let matrix = if options.resample_method == ResampleMethod::None {
        Array2::eye(n)
    } else {
        resolved.colour_matrix.clone()
    };
    let saturation_ceiling = if options.legacy_compat {
        balance.dot(&matrix).iter().copied().fold(f64::INFINITY, f64::min)
    } else {
        1.0
    };

    Ok(ColourParams {
        matrix,
        balance,
        gamma: options.gamma,
        saturation_ceiling,
        clip_mode: options.clip_mode,
    })
}

fn colour_correct(
    processed: &mut ProcessedRecord,
    collaborators: Collaborators<'_>,
    diagnostics: &mut Diagnostics,
) -> bool {
    match try_colour_correct(&processed.decode, &processed.record, collaborators) {
        Ok(record) => {
            processed.record = record;
            true
        }
        Err(e) => {
            diagnostics.warn(
                DiagnosticKind::StageFailed,
                &processed.base_name,
                e.in_stage(Stage::ColourCorrect.name()).to_string(),
            );
            false
        }
    }
}

fn try_colour_correct(
    decode: &DecodeConfiguration,
    record: &LightFieldRecord,
    collaborators: Collaborators<'_>,
) -> Result<LightFieldRecord, LfBatchError> {
    let params = colour_params(decode)?;
    let colour = collaborators.colour.apply(record.colour_view(), &params)?;
    if colour.dim() != record.colour_view().dim() {
        return Err(LfBatchError::Collaborator {
            name: "colour transform",
            detail: format!(
                "returned shape {:?}, expected {:?}",
                colour.dim(),
                record.colour_view().dim()
            ),
        });
    }
    // Weight channels go back on untouched.
    LightFieldRecord::from_parts(colour.view(), record.weight_view(), record.precision())
}

//==================================================================================
// III. Rectify
//==================================================================================

fn rectify(
    processed: &mut ProcessedRecord,
    collaborators: Collaborators<'_>,
    diagnostics: &mut Diagnostics,
) -> bool {
    let name = processed.base_name.clone();

    if Stage::Rectify.requires_weight() && !processed.record.layout().has_weight() {
        diagnostics.warn(
            DiagnosticKind::ChannelUnavailable,
            &name,
            "Rectify needs a weight channel, but this record has none (was it saved without weight?)",
        );
        return false;
    }

    let found = match collaborators
        .calibration
        .lookup(&processed.metadata, &processed.rectify)
    {
        Ok(Some(found)) => found,
        Ok(None) => {
            diagnostics.warn(
                DiagnosticKind::NoCalibrationMatch,
                &name,
                format!(
                    "no calibration for camera {} (zoom {}, focus {})",
                    processed.metadata.camera_serial,
                    processed.metadata.zoom_step,
                    processed.metadata.focus_step
                ),
            );
            return false;
        }
        Err(e) => {
            diagnostics.warn(
                DiagnosticKind::StageFailed,
                &name,
                e.in_stage(Stage::Rectify.name()).to_string(),
            );
            return false;
        }
    };

    match processed.decode.resolved() {
        Ok(resolved) => {
            let tolerance = processed.rectify.options.max_grid_model_diff;
            let deviations = resolved.grid_model.compare(&found.calibration.grid_model, tolerance);
            if !deviations.is_empty() {
                let fields: Vec<String> = deviations
                    .iter()
                    .map(|d| format!("{} ({:.3e})", d.field, d.relative_difference))
                    .collect();
                diagnostics.warn(
                    DiagnosticKind::GridModelMismatch,
                    &name,
                    format!(
                        "grid model differs from {} beyond {:e}: {}",
                        found.source.display(),
                        tolerance,
                        fields.join(", ")
                    ),
                );
            }
        }
        Err(e) => {
            diagnostics.warn(DiagnosticKind::StageFailed, &name, e.in_stage(Stage::Rectify.name()).to_string());
            return false;
        }
    }

    let config = processed.rectify.with_source(found.source);
    let output = match collaborators
        .rectifier
        .rectify(&processed.record, &found.calibration, &config)
    {
        Ok(output) => output,
        Err(e) => {
            diagnostics.warn(DiagnosticKind::StageFailed, &name, e.in_stage(Stage::Rectify.name()).to_string());
            return false;
        }
    };

    if !output.success {
        diagnostics.warn(DiagnosticKind::StageFailed, &name, "rectifier reported failure");
        return false;
    }
    if output.record.layout() != processed.record.layout()
        || output.record.precision() != processed.record.precision()
    {
        diagnostics.warn(
            DiagnosticKind::StageFailed,
            &name,
            format!(
                "rectifier changed the channel layout or precision ({:?} -> {:?})",
                processed.record.layout(),
                output.record.layout()
            ),
        );
        return false;
    }

    processed.record = output.record;
    processed.rectify = output.config;
    true
}
