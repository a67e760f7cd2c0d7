use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use futures_core::stream::{FusedStream, Stream};

use crate::emitter::{Emitter, SourcePayload, DATA, END, ERROR, SOURCE_EVENTS};
use crate::error::SourceError;
use crate::race::{Race, RaceResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceState {
    Running,
    Terminated,
    Failed,
}

/// Pulls text chunks out of a push-based source, one race per pull.
///
/// A race is only started when the stream is polled and nothing is pending,
/// so the source sees a fresh `data` registration exactly when downstream asks
/// for more. `Terminated` and `Failed` are absorbing: once reached, every
/// later poll returns `None` without touching the emitter.
pub struct EventedSequence<E: Emitter<Payload = SourcePayload>> {
    emitter: Arc<E>,
    state: SequenceState,
    pending: Option<Race<E>>,
}

impl<E: Emitter<Payload = SourcePayload>> EventedSequence<E> {
    pub fn new(emitter: Arc<E>) -> Self {
        Self {
            emitter,
            state: SequenceState::Running,
            pending: None,
        }
    }

    pub fn state(&self) -> SequenceState {
        self.state
    }

    fn settle(&mut self, result: RaceResult<SourcePayload>) -> Option<Result<String, SourceError>> {
        match (result.event, result.payload) {
            (DATA, SourcePayload::Text(text)) => Some(Ok(text)),
            (END, _) => {
                tracing::debug!("source ended");
                self.state = SequenceState::Terminated;
                None
            }
            (ERROR, SourcePayload::Failure(err)) => {
                tracing::debug!(error = %err, "source failed");
                self.state = SequenceState::Failed;
                Some(Err(err))
            }
            (event, _) => {
                self.state = SequenceState::Failed;
                Some(Err(SourceError::UnexpectedPayload { event }))
            }
        }
    }
}

impl<E: Emitter<Payload = SourcePayload>> Stream for EventedSequence<E> {
    type Item = Result<String, SourceError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.state != SequenceState::Running {
            return Poll::Ready(None);
        }

        let emitter = &this.emitter;
        let race = this
            .pending
            .get_or_insert_with(|| Race::new(Arc::clone(emitter), &SOURCE_EVENTS));
        let result = ready!(Pin::new(race).poll(cx));
        this.pending = None;

        Poll::Ready(this.settle(result))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self.state {
            SequenceState::Running => (0, None),
            SequenceState::Terminated | SequenceState::Failed => (0, Some(0)),
        }
    }
}

impl<E: Emitter<Payload = SourcePayload>> FusedStream for EventedSequence<E> {
    fn is_terminated(&self) -> bool {
        self.state != SequenceState::Running
    }
}

/// Wraps `emitter` as a lazy sequence of text chunks.
pub fn produce<E: Emitter<Payload = SourcePayload>>(emitter: Arc<E>) -> EventedSequence<E> {
    EventedSequence::new(emitter)
}
