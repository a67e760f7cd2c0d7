use std::path::PathBuf;

use thiserror::Error;

use crate::emitter::EventName;

/// Failures raised by the underlying event source.
///
/// This is the only error kind that originates below the numbering stage; the
/// race, sequence and splitter layers forward it unmodified.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to open `{path}`: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("I/O error while reading source: {0}")]
    Read(#[source] std::io::Error),
    #[error("invalid UTF-8 in source at byte offset {offset}")]
    InvalidUtf8 { offset: u64 },
    #[error("`{event}` event carried an unexpected payload")]
    UnexpectedPayload { event: EventName },
}

// Emitters hand one payload to every listener, so errors riding on the `error`
// event have to be cloneable even though `io::Error` is not.
impl Clone for SourceError {
    fn clone(&self) -> Self {
        match self {
            SourceError::Open { path, source } => SourceError::Open {
                path: path.clone(),
                source: clone_io_error(source),
            },
            SourceError::Read(source) => SourceError::Read(clone_io_error(source)),
            SourceError::InvalidUtf8 { offset } => SourceError::InvalidUtf8 { offset: *offset },
            SourceError::UnexpectedPayload { event } => {
                SourceError::UnexpectedPayload { event: *event }
            }
        }
    }
}

fn clone_io_error(err: &std::io::Error) -> std::io::Error {
    std::io::Error::new(err.kind(), err.to_string())
}

/// Errors surfaced to whoever drains a pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Only reachable when the numbering stage is configured to propagate.
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("failed to write record output: {0}")]
    Output(#[source] std::io::Error),
}

/// One upstream failure as seen by the numbering stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReport {
    pub stage: &'static str,
    /// Records successfully numbered before the failure.
    pub records_emitted: usize,
    pub details: String,
}

/// Receives upstream failures that a stage chose not to propagate.
pub trait DiagnosticSink: Send + 'static {
    fn on_failure(&mut self, report: FailureReport);
}

/// Default sink: reports through `tracing` at error level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl DiagnosticSink for TracingDiagnostics {
    fn on_failure(&mut self, report: FailureReport) {
        tracing::error!(
            stage = report.stage,
            records_emitted = report.records_emitted,
            "{}",
            report.details
        );
    }
}
