use std::fmt;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use futures_core::stream::{FusedStream, Stream};

use crate::config::UpstreamErrorPolicy;
use crate::error::{DiagnosticSink, FailureReport};

/// A record paired with its 1-based position in the sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberedRecord<T> {
    pub ordinal: usize,
    pub record: T,
}

impl<T: fmt::Display> fmt::Display for NumberedRecord<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.ordinal, self.record)
    }
}

/// Attaches consecutive ordinals, starting at 1, to upstream records.
///
/// Under [`UpstreamErrorPolicy::SuppressAndLog`] an upstream failure is handed
/// to the [`DiagnosticSink`] and the sequence simply ends, so nothing
/// downstream ever observes an `Err`. Under [`UpstreamErrorPolicy::Propagate`]
/// the failure is yielded once before the end.
pub struct Numberer<S> {
    upstream: S,
    next_ordinal: usize,
    policy: UpstreamErrorPolicy,
    diagnostics: Box<dyn DiagnosticSink>,
    finished: bool,
}

impl<S> Numberer<S> {
    pub const STAGE: &'static str = "numberer";

    pub fn new(
        upstream: S,
        policy: UpstreamErrorPolicy,
        diagnostics: Box<dyn DiagnosticSink>,
    ) -> Self {
        Self {
            upstream,
            next_ordinal: 1,
            policy,
            diagnostics,
            finished: false,
        }
    }

    /// Records yielded so far.
    pub fn emitted(&self) -> usize {
        self.next_ordinal - 1
    }
}

impl<S, T, E> Stream for Numberer<S>
where
    S: Stream<Item = Result<T, E>> + Unpin,
    E: fmt::Display,
{
    type Item = Result<NumberedRecord<T>, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        match ready!(Pin::new(&mut this.upstream).poll_next(cx)) {
            Some(Ok(record)) => {
                let ordinal = this.next_ordinal;
                this.next_ordinal += 1;
                Poll::Ready(Some(Ok(NumberedRecord { ordinal, record })))
            }
            Some(Err(err)) => {
                this.finished = true;
                match this.policy {
                    UpstreamErrorPolicy::Propagate => Poll::Ready(Some(Err(err))),
                    UpstreamErrorPolicy::SuppressAndLog => {
                        this.diagnostics.on_failure(FailureReport {
                            stage: Self::STAGE,
                            records_emitted: this.emitted(),
                            details: err.to_string(),
                        });
                        Poll::Ready(None)
                    }
                }
            }
            None => {
                this.finished = true;
                Poll::Ready(None)
            }
        }
    }
}

impl<S, T, E> FusedStream for Numberer<S>
where
    S: Stream<Item = Result<T, E>> + Unpin,
    E: fmt::Display,
{
    fn is_terminated(&self) -> bool {
        self.finished
    }
}

/// Numbers `records` with the compatible suppress-and-log failure policy.
pub fn number<S>(records: S, diagnostics: Box<dyn DiagnosticSink>) -> Numberer<S> {
    Numberer::new(records, UpstreamErrorPolicy::SuppressAndLog, diagnostics)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use futures_util::{stream, StreamExt};

    use super::*;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<FailureReport>>>);

    impl Captured {
        fn reports(&self) -> Vec<FailureReport> {
            self.0.lock().unwrap().clone()
        }
    }

    impl DiagnosticSink for Captured {
        fn on_failure(&mut self, report: FailureReport) {
            self.0.lock().unwrap().push(report);
        }
    }

    fn ok_items(n: usize) -> Vec<Result<String, String>> {
        (0..n).map(|i| Ok(format!("r{i}"))).collect()
    }

    #[tokio::test]
    async fn ordinals_run_from_one_to_n() {
        for n in [0, 1, 2, 7] {
            let sink = Captured::default();
            let numbered: Vec<_> = number(stream::iter(ok_items(n)), Box::new(sink.clone()))
                .collect()
                .await;

            assert_eq!(numbered.len(), n);
            for (index, item) in numbered.into_iter().enumerate() {
                let item = item.expect("no failures upstream");
                assert_eq!(item.ordinal, index + 1);
                assert_eq!(item.record, format!("r{index}"));
            }
            assert!(sink.reports().is_empty());
        }
    }

    // Reproduces the compatible behavior: the failure is reported, not raised.
    #[tokio::test]
    async fn suppressed_failure_truncates_and_reports_once() {
        let mut items = ok_items(2);
        items.push(Err("permission denied".to_string()));
        items.push(Ok("never seen".to_string()));

        let sink = Captured::default();
        let mut numbered = number(stream::iter(items), Box::new(sink.clone()));

        let mut seen = Vec::new();
        while let Some(item) = numbered.next().await {
            seen.push(item.expect("suppressed policy never yields Err"));
        }
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].ordinal, 2);
        assert!(numbered.is_terminated());
        assert!(numbered.next().await.is_none());

        assert_eq!(
            sink.reports(),
            vec![FailureReport {
                stage: "numberer",
                records_emitted: 2,
                details: "permission denied".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn propagate_policy_yields_the_failure_once() {
        let mut items = ok_items(1);
        items.push(Err("io fault".to_string()));

        let sink = Captured::default();
        let numbered: Vec<_> = Numberer::new(
            stream::iter(items),
            UpstreamErrorPolicy::Propagate,
            Box::new(sink.clone()),
        )
        .collect()
        .await;

        assert_eq!(numbered.len(), 2);
        assert_eq!(
            numbered[0],
            Ok(NumberedRecord {
                ordinal: 1,
                record: "r0".to_string()
            })
        );
        assert_eq!(numbered[1], Err("io fault".to_string()));
        assert!(sink.reports().is_empty());
    }

    #[test]
    fn display_is_ordinal_space_record() {
        let record = NumberedRecord {
            ordinal: 12,
            record: "",
        };
        assert_eq!(record.to_string(), "12 ");
    }
}
