use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::emitter::{
    Emitter, EventHub, EventName, Listener, ListenerId, SourcePayload, DATA, END, ERROR,
};
use crate::error::SourceError;

/// An emitter whose producer only runs when someone listens for `data`.
///
/// Every `data` registration grants the producer one permit; the producer
/// waits for a permit before each emission. A consumer that races once per
/// pull therefore never has more than one chunk produced ahead of it.
///
/// The producer runs as a tokio task, so constructors must be called from
/// within a runtime. Dropping the source aborts the task.
pub struct DemandSource {
    hub: Arc<EventHub<SourcePayload>>,
    demand: Arc<Notify>,
    producer: JoinHandle<()>,
}

/// Producer-side handle of a [`DemandSource`].
pub struct Pump {
    hub: Arc<EventHub<SourcePayload>>,
    demand: Arc<Notify>,
}

impl Pump {
    /// Waits until a `data` listener has been registered since the last wait.
    pub async fn demanded(&self) {
        self.demand.notified().await;
    }

    pub fn emit(&self, event: EventName, payload: SourcePayload) -> usize {
        self.hub.emit(event, payload)
    }
}

impl DemandSource {
    pub fn spawn<F, Fut>(producer: F) -> Self
    where
        F: FnOnce(Pump) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let hub = Arc::new(EventHub::new());
        let demand = Arc::new(Notify::new());
        let pump = Pump {
            hub: Arc::clone(&hub),
            demand: Arc::clone(&demand),
        };
        let producer = tokio::spawn(producer(pump));
        Self {
            hub,
            demand,
            producer,
        }
    }

    /// Reads `path` in chunks of at most `chunk_size` bytes.
    ///
    /// The file is opened lazily on first demand; open, read and UTF-8 decode
    /// failures are delivered as `error` events rather than returned here.
    pub fn file(path: impl Into<PathBuf>, chunk_size: usize) -> Self {
        let path = path.into();
        let chunk_size = chunk_size.max(1);
        Self::spawn(move |pump| read_file(pump, path, chunk_size))
    }

    /// Replays `steps` in order, one per demand.
    ///
    /// Steps after an `end` or `error` are still delivered if demanded; use
    /// this to exercise consumers against misbehaving sources.
    pub fn scripted(steps: impl IntoIterator<Item = (EventName, SourcePayload)>) -> Self {
        let steps: Vec<_> = steps.into_iter().collect();
        Self::spawn(move |pump| async move {
            for (event, payload) in steps {
                pump.demanded().await;
                pump.emit(event, payload);
            }
        })
    }

    /// One `data` event per chunk followed by `end`.
    pub fn from_chunks<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let steps = chunks
            .into_iter()
            .map(|chunk| (DATA, SourcePayload::Text(chunk.into())))
            .chain(std::iter::once((END, SourcePayload::Empty)));
        Self::scripted(steps)
    }

    pub fn listener_count(&self, event: EventName) -> usize {
        self.hub.listener_count(event)
    }
}

impl Emitter for DemandSource {
    type Payload = SourcePayload;

    fn on(&self, event: EventName, listener: Listener<SourcePayload>) -> ListenerId {
        let id = self.hub.on(event, listener);
        if event == DATA {
            self.demand.notify_one();
        }
        id
    }

    fn off(&self, event: EventName, id: ListenerId) -> bool {
        self.hub.off(event, id)
    }
}

impl Drop for DemandSource {
    fn drop(&mut self) {
        self.producer.abort();
    }
}

async fn read_file(pump: Pump, path: PathBuf, chunk_size: usize) {
    pump.demanded().await;

    let mut file = match File::open(&path).await {
        Ok(file) => file,
        Err(source) => {
            tracing::debug!(path = %path.display(), error = %source, "open failed");
            pump.emit(
                ERROR,
                SourcePayload::Failure(SourceError::Open { path, source }),
            );
            return;
        }
    };

    let mut buf = vec![0u8; chunk_size];
    let mut decoder = Utf8Decoder::default();
    loop {
        let (event, payload) = match next_chunk(&mut file, &mut buf, &mut decoder).await {
            Ok(Some(text)) => (DATA, SourcePayload::Text(text)),
            Ok(None) => (END, SourcePayload::Empty),
            Err(err) => (ERROR, SourcePayload::Failure(err)),
        };
        let terminal = event != DATA;
        pump.emit(event, payload);
        if terminal {
            return;
        }
        pump.demanded().await;
    }
}

/// Reads until at least one whole character is available, or the file ends.
///
/// Text decoded ahead of an invalid byte is returned first; the failure is
/// reported on the following call.
async fn next_chunk(
    file: &mut File,
    buf: &mut [u8],
    decoder: &mut Utf8Decoder,
) -> Result<Option<String>, SourceError> {
    loop {
        if let Some(err) = decoder.take_failure() {
            return Err(err);
        }
        let read = file.read(buf).await.map_err(SourceError::Read)?;
        if read == 0 {
            decoder.finish()?;
            return Ok(None);
        }
        let text = decoder.decode(&buf[..read])?;
        if !text.is_empty() {
            return Ok(Some(text));
        }
    }
}

/// Incremental UTF-8 decoding that tolerates characters split across reads.
#[derive(Debug, Default)]
struct Utf8Decoder {
    pending: Vec<u8>,
    // Bytes consumed before `pending`, for error offsets.
    consumed: u64,
    // Invalid sequence found behind text that was already handed out.
    failure: Option<SourceError>,
}

impl Utf8Decoder {
    /// Returns the longest valid prefix decoded so far.
    ///
    /// An invalid sequence with nothing valid before it is returned as `Err`
    /// straight away. Otherwise the prefix is returned and the failure waits in
    /// [`Utf8Decoder::take_failure`].
    fn decode(&mut self, bytes: &[u8]) -> Result<String, SourceError> {
        self.pending.extend_from_slice(bytes);
        let valid = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            Err(err) => {
                // `error_len() == None` means the tail is an incomplete sequence.
                if err.error_len().is_some() {
                    self.failure = Some(SourceError::InvalidUtf8 {
                        offset: self.consumed + err.valid_up_to() as u64,
                    });
                }
                err.valid_up_to()
            }
        };
        if valid == 0 {
            if let Some(err) = self.failure.take() {
                return Err(err);
            }
        }

        // The prefix was validated above, so nothing is replaced here.
        let text = String::from_utf8_lossy(&self.pending[..valid]).into_owned();
        self.pending.drain(..valid);
        self.consumed += valid as u64;
        Ok(text)
    }

    fn take_failure(&mut self) -> Option<SourceError> {
        self.failure.take()
    }

    fn finish(&mut self) -> Result<(), SourceError> {
        if let Some(err) = self.take_failure() {
            return Err(err);
        }
        if self.pending.is_empty() {
            Ok(())
        } else {
            Err(SourceError::InvalidUtf8 {
                offset: self.consumed,
            })
        }
    }
}
