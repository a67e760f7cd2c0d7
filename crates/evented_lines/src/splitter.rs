use std::mem;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use futures_core::stream::{FusedStream, Stream};

/// Reassembles newline-delimited records from arbitrarily cut text chunks.
///
/// Records never include the `\n`; `\r` is left alone. A non-empty residue is
/// flushed as a final record only when the upstream ends cleanly. If the
/// upstream fails, the failure is forwarded, the residue is dropped and the
/// splitter ends.
pub struct LineSplitter<S> {
    upstream: S,
    previous: String,
    // Prefix of `previous` already known to hold no newline.
    scanned: usize,
    finished: bool,
}

impl<S> LineSplitter<S> {
    pub fn new(upstream: S) -> Self {
        Self {
            upstream,
            previous: String::new(),
            scanned: 0,
            finished: false,
        }
    }

    /// Unterminated text held back so far.
    pub fn residue(&self) -> &str {
        &self.previous
    }

    fn take_record(&mut self) -> Option<String> {
        let offset = self.previous[self.scanned..].find('\n')?;
        let newline = self.scanned + offset;
        let rest = self.previous.split_off(newline + 1);
        let mut record = mem::replace(&mut self.previous, rest);
        record.truncate(newline);
        self.scanned = 0;
        Some(record)
    }
}

impl<S, T, E> Stream for LineSplitter<S>
where
    S: Stream<Item = Result<T, E>> + Unpin,
    T: AsRef<str>,
{
    type Item = Result<String, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if let Some(record) = this.take_record() {
                return Poll::Ready(Some(Ok(record)));
            }
            this.scanned = this.previous.len();

            if this.finished {
                return Poll::Ready(None);
            }

            match ready!(Pin::new(&mut this.upstream).poll_next(cx)) {
                Some(Ok(chunk)) => this.previous.push_str(chunk.as_ref()),
                Some(Err(err)) => {
                    this.finished = true;
                    if !this.previous.is_empty() {
                        tracing::debug!(
                            discarded_bytes = this.previous.len(),
                            "dropping unterminated residue after upstream failure"
                        );
                    }
                    this.previous.clear();
                    this.scanned = 0;
                    return Poll::Ready(Some(Err(err)));
                }
                None => {
                    this.finished = true;
                    this.scanned = 0;
                    if this.previous.is_empty() {
                        return Poll::Ready(None);
                    }
                    return Poll::Ready(Some(Ok(mem::take(&mut this.previous))));
                }
            }
        }
    }
}

impl<S, T, E> FusedStream for LineSplitter<S>
where
    S: Stream<Item = Result<T, E>> + Unpin,
    T: AsRef<str>,
{
    // Once upstream is done, only complete records can still be queued.
    fn is_terminated(&self) -> bool {
        self.finished && self.previous.is_empty()
    }
}

/// Splits a lazy sequence of text chunks into lazy newline-delimited records.
pub fn split<S>(chunks: S) -> LineSplitter<S> {
    LineSplitter::new(chunks)
}
