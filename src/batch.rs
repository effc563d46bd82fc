// In: src/batch.rs

//! The top-level loop: validate the configuration once, then for every
//! discovered record run tracker, executor and persistence in turn.
//!
//! Records are independent. Each starts from the same validated baseline, and
//! nothing one record discovers is visible to the next. A failure inside one
//! record becomes a `RecordStatus::Failed` and the loop moves on; only an
//! invalid configuration or a failed discovery aborts the call.

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::config::PipelineConfig;
use crate::error::LfBatchError;
use crate::observability::{Diagnostic, DiagnosticKind, Diagnostics};
use crate::persist::{self, OutputPaths};
use crate::pipeline::{self, Assessment, StartingPoint};
use crate::traits::{Collaborators, Discovery, InputRecord};
use crate::types::StageSet;

//==================================================================================
// I. Report Types
//==================================================================================

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecordStatus {
    /// An artifact was written this run.
    Processed {
        artifact: PathBuf,
        completed: StageSet,
    },
    /// Every requested stage was already on disk; nothing was loaded.
    UpToDate { completed: StageSet },
    /// Stages ran but none completed, so the artifact on disk is still current.
    Unchanged { completed: StageSet },
    /// `save_result` was off: stages ran, nothing was written.
    DryRun { completed: StageSet },
    /// The decoder could not produce a light field.
    DecodeFailed,
    /// An existing artifact was unreadable, or saving failed.
    Failed { error: String },
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RecordOutcome {
    pub record: String,
    pub input_path: PathBuf,
    #[serde(flatten)]
    pub status: RecordStatus,
}

#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub outcomes: Vec<RecordOutcome>,
    pub diagnostics: Vec<Diagnostic>,
}

impl BatchReport {
    /// Records for which an artifact was written.
    pub fn processed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, RecordStatus::Processed { .. }))
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, RecordStatus::Failed { .. }))
            .count()
    }

    pub fn warnings_of(&self, kind: DiagnosticKind) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(move |d| d.kind == kind)
    }

    pub fn outcome(&self, record: &str) -> Option<&RecordOutcome> {
        self.outcomes.iter().find(|o| o.record == record)
    }
}

//==================================================================================
// II. Discovery
//==================================================================================

/// Discovery over an explicit list of input files.
///
/// When `root` is set, each input's directory relative to it is mirrored under
/// the output root.
#[derive(Debug, Clone, Default)]
pub struct ListedDiscovery {
    pub root: Option<PathBuf>,
    pub inputs: Vec<PathBuf>,
}

impl ListedDiscovery {
    pub fn new(inputs: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self {
            root: None,
            inputs: inputs.into_iter().map(Into::into).collect(),
        }
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    fn relative_dir(&self, input: &Path) -> PathBuf {
        match (&self.root, input.parent()) {
            (Some(root), Some(parent)) => parent
                .strip_prefix(root)
                .map(Path::to_path_buf)
                .unwrap_or_default(),
            _ => PathBuf::new(),
        }
    }
}

impl Discovery for ListedDiscovery {
    fn discover(&self) -> Result<Vec<InputRecord>, LfBatchError> {
        Ok(self
            .inputs
            .iter()
            .map(|p| InputRecord::from_path(p.clone()).with_relative_dir(self.relative_dir(p)))
            .collect())
    }
}

//==================================================================================
// III. Entry Points
//==================================================================================

/// Builds the configuration from a partial override document, then runs the batch.
pub fn run_batch_with_overrides(
    discovery: &dyn Discovery,
    overrides: &serde_json::Value,
    collaborators: Collaborators<'_>,
) -> Result<BatchReport, LfBatchError> {
    let config = PipelineConfig::from_overrides(overrides)?;
    run_batch(discovery, &config, collaborators)
}

pub fn run_batch(
    discovery: &dyn Discovery,
    config: &PipelineConfig,
    collaborators: Collaborators<'_>,
) -> Result<BatchReport, LfBatchError> {
    let config = config.clone().validate_and_resolve()?;
    let inputs = discovery.discover()?;
    log::info!(
        "processing {} record(s), stages [{}], format {:?}",
        inputs.len(),
        config.decode.stages,
        config.file.format
    );

    let mut report = BatchReport::default();
    for input in &inputs {
        let mut diagnostics = Diagnostics::new();
        let status = process_record(input, &config, collaborators, &mut diagnostics);
        log::debug!("[{}] {:?}", input.base_name, status);
        report.outcomes.push(RecordOutcome {
            record: input.base_name.clone(),
            input_path: input.input_path.clone(),
            status,
        });
        report.diagnostics.extend(diagnostics.into_events());
    }

    log::info!(
        "batch finished: {} written, {} failed, {} warning(s)",
        report.processed_count(),
        report.failed_count(),
        report.diagnostics.len()
    );
    Ok(report)
}

/// Tracker, executor and persistence for a single record.
fn process_record(
    input: &InputRecord,
    config: &PipelineConfig,
    collaborators: Collaborators<'_>,
    diagnostics: &mut Diagnostics,
) -> RecordStatus {
    let name = &input.base_name;
    let paths = OutputPaths::resolve(input, &config.file);

    let assessment = match pipeline::assess(input, &paths, config) {
        Ok(assessment) => assessment,
        Err(e) => {
            diagnostics.warn(
                DiagnosticKind::CorruptArtifact,
                name,
                format!("{}: {}", paths.artifact.display(), e),
            );
            return RecordStatus::Failed {
                error: e.to_string(),
            };
        }
    };

    let (start, remaining) = match assessment {
        Assessment::UpToDate { completed } => {
            log::info!("[{}] up to date [{}]", name, completed);
            return RecordStatus::UpToDate { completed };
        }
        Assessment::Fresh { remaining } => (StartingPoint::Raw(input), remaining),
        Assessment::Resume { loaded, remaining } => (StartingPoint::Loaded(loaded), remaining),
    };

    let Some(execution) =
        pipeline::run_stages(start, remaining, config, collaborators, diagnostics)
    else {
        return RecordStatus::DecodeFailed;
    };
    let completed = execution.processed.completed();

    if !execution.changed() {
        return RecordStatus::Unchanged { completed };
    }
    if !config.file.save_result {
        log::info!("[{}] dry run, not saving", name);
        return RecordStatus::DryRun { completed };
    }

    match persist::save(&execution.processed, &paths, &config.file) {
        Ok(saved) => RecordStatus::Processed {
            artifact: saved.paths.artifact,
            completed,
        },
        Err(e) => {
            log::error!("[{}] could not save {}: {}", name, paths.artifact.display(), e);
            RecordStatus::Failed {
                error: e.to_string(),
            }
        }
    }
}
