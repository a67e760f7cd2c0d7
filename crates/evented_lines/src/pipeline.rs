use std::sync::Arc;

use tokio::io::AsyncWrite;

use crate::config::PipelineConfig;
use crate::consumer::consume;
use crate::emitter::{Emitter, SourcePayload};
use crate::error::{DiagnosticSink, PipelineError};
use crate::numberer::Numberer;
use crate::sequence::EventedSequence;
use crate::splitter::LineSplitter;

pub type NumberedLines<E> = Numberer<LineSplitter<EventedSequence<E>>>;

/// Chains chunks → lines → numbered lines over `emitter`.
pub fn numbered_lines<E>(
    emitter: Arc<E>,
    config: &PipelineConfig,
    diagnostics: Box<dyn DiagnosticSink>,
) -> NumberedLines<E>
where
    E: Emitter<Payload = SourcePayload>,
{
    let chunks = EventedSequence::new(emitter);
    let lines = LineSplitter::new(chunks);
    Numberer::new(lines, config.on_upstream_error, diagnostics)
}

/// Drains the numbered lines of `emitter` into `out` and returns how many
/// lines were written.
pub async fn run<E, W>(
    emitter: Arc<E>,
    config: &PipelineConfig,
    out: &mut W,
    diagnostics: Box<dyn DiagnosticSink>,
) -> Result<usize, PipelineError>
where
    E: Emitter<Payload = SourcePayload>,
    W: AsyncWrite + Unpin,
{
    consume(numbered_lines(emitter, config, diagnostics), out).await
}
