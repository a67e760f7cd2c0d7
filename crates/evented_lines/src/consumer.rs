use std::fmt::Display;

use futures_core::Stream;
use futures_util::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::PipelineError;
use crate::numberer::NumberedRecord;

/// Drains `records`, writing `"<ordinal> <record>\n"` for each one.
///
/// Each line is written and flushed before the next record is pulled. Returns
/// how many records were written.
pub async fn consume<S, T, E, W>(mut records: S, out: &mut W) -> Result<usize, PipelineError>
where
    S: Stream<Item = Result<NumberedRecord<T>, E>> + Unpin,
    T: Display,
    E: Into<PipelineError>,
    W: AsyncWrite + Unpin,
{
    let mut written = 0;
    while let Some(item) = records.next().await {
        let numbered = item.map_err(Into::<PipelineError>::into)?;
        let line = format!("{numbered}\n");
        out.write_all(line.as_bytes())
            .await
            .map_err(PipelineError::Output)?;
        out.flush().await.map_err(PipelineError::Output)?;
        written += 1;
    }
    tracing::debug!(written, "record stream drained");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use futures_util::stream;

    use super::*;
    use crate::error::SourceError;

    fn numbered(ordinal: usize, record: &str) -> Result<NumberedRecord<String>, SourceError> {
        Ok(NumberedRecord {
            ordinal,
            record: record.to_string(),
        })
    }

    #[tokio::test]
    async fn writes_one_line_per_record_in_order() {
        let records = stream::iter(vec![numbered(1, "a"), numbered(2, ""), numbered(3, "ccc")]);
        let mut out = Vec::new();

        let written = consume(records, &mut out).await.unwrap();

        assert_eq!(written, 3);
        assert_eq!(String::from_utf8(out).unwrap(), "1 a\n2 \n3 ccc\n");
    }

    #[tokio::test]
    async fn upstream_failure_is_returned_after_prior_lines() {
        let records = stream::iter(vec![
            numbered(1, "kept"),
            Err(SourceError::InvalidUtf8 { offset: 9 }),
        ]);
        let mut out = Vec::new();

        let err = consume(records, &mut out).await.unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Source(SourceError::InvalidUtf8 { offset: 9 })
        ));
        assert_eq!(out, b"1 kept\n");
    }

    struct ClosedPipe;

    impl AsyncWrite for ClosedPipe {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            Poll::Ready(Err(std::io::ErrorKind::BrokenPipe.into()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn write_failure_surfaces_as_output_error() {
        let records = stream::iter(vec![numbered(1, "x")]);
        let err = consume(records, &mut ClosedPipe).await.unwrap_err();
        match err {
            PipelineError::Output(source) => {
                assert_eq!(source.kind(), std::io::ErrorKind::BrokenPipe)
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
