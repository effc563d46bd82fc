//! Structured diagnostics and logging setup.
//!
//! Non-fatal conditions (a missing calibration, a grid model that drifted, a
//! stage that did not complete) are recorded as `Diagnostic` events and handed
//! back to the caller in the batch report. Each event is also mirrored to the
//! `log` facade at warn level, so a configured logger sees them as they happen.

use serde::Serialize;
use std::fmt;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Once;

use log::LevelFilter;

/// What kind of non-fatal condition a diagnostic reports.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// The decoder returned nothing; the record was skipped.
    DecodeFailed,
    /// No calibration matched the record's camera; Rectify was skipped.
    NoCalibrationMatch,
    /// The decode-time grid model differs from the calibration's beyond tolerance.
    GridModelMismatch,
    /// A stage needs a channel the record no longer has.
    ChannelUnavailable,
    /// A collaborator reported failure for a stage.
    StageFailed,
    /// Requested stages that did not complete this run, aggregated.
    IncompleteStages,
    /// An existing artifact could not be read; the record was abandoned.
    CorruptArtifact,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiagnosticKind::DecodeFailed => "decode failed",
            DiagnosticKind::NoCalibrationMatch => "no calibration match",
            DiagnosticKind::GridModelMismatch => "grid model mismatch",
            DiagnosticKind::ChannelUnavailable => "channel unavailable",
            DiagnosticKind::StageFailed => "stage failed",
            DiagnosticKind::IncompleteStages => "incomplete stages",
            DiagnosticKind::CorruptArtifact => "corrupt artifact",
        };
        f.write_str(name)
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// Base name of the record the event belongs to.
    pub record: String,
    pub detail: String,
}

/// An append-only collector for one record's diagnostics.
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    events: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, kind: DiagnosticKind, record: &str, detail: impl Into<String>) {
        let detail = detail.into();
        log::warn!("[{}] {}: {}", record, kind, detail);
        self.events.push(Diagnostic {
            kind,
            record: record.to_string(),
            detail,
        });
    }

    pub fn events(&self) -> &[Diagnostic] {
        &self.events
    }

    pub fn of_kind(&self, kind: DiagnosticKind) -> impl Iterator<Item = &Diagnostic> {
        self.events.iter().filter(move |d| d.kind == kind)
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn into_events(self) -> Vec<Diagnostic> {
        self.events
    }
}

static INIT_LOGGER: Once = Once::new();

/// Installs an `env_logger` at info level with a terse `[LEVEL] message`
/// format. When `log_file` is given, output is appended to it instead of
/// stderr. Only the first call has any effect.
pub fn enable_verbose_logging(log_file: Option<PathBuf>) {
    INIT_LOGGER.call_once(|| {
        let mut builder = env_logger::Builder::new();

        builder.is_test(false);
        builder.filter_level(LevelFilter::Info);
        builder.parse_default_env();

        // Custom formatter: just print the level and message
        builder.format(|buf, record| {
            use std::io::Write;
            writeln!(buf, "[{}] {}", record.level(), record.args())
        });

        if let Some(path) = log_file {
            match OpenOptions::new().append(true).create(true).open(&path) {
                Ok(file) => {
                    builder.target(env_logger::Target::Pipe(Box::new(file)));
                }
                Err(e) => eprintln!(
                    "could not open log file {}: {}; logging to stderr",
                    path.display(),
                    e
                ),
            }
        }

        let _ = builder.try_init();
    });
}
