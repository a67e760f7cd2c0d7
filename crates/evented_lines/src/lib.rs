#![forbid(unsafe_code)]
//! Pull-based line sequences over push-based event sources.
//!
//! An [`Emitter`] calls back into the program whenever it likes. This crate
//! turns that into a chain of lazy [`futures_core::Stream`]s where exactly one
//! unit of work is in flight at a time:
//! - [`Race`] awaits the first of several named events and removes every
//!   listener it registered before resolving.
//! - [`EventedSequence`] runs one race over `data` / `error` / `end` per pull.
//! - [`LineSplitter`] reassembles newline-delimited records across chunks.
//! - [`Numberer`] attaches 1-based ordinals, with an explicit
//!   [`UpstreamErrorPolicy`].
//! - [`consume`] writes `"<ordinal> <record>"` lines to an async writer.
//!
//! [`DemandSource`] is a file or scripted emitter that only produces a chunk
//! when a `data` listener asks for one.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use evented_lines::{run, DemandSource, PipelineConfig, TracingDiagnostics};
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PipelineConfig::default();
//! let source = Arc::new(DemandSource::file("notes.txt", config.chunk_size));
//! let mut stdout = tokio::io::stdout();
//! let lines = run(source, &config, &mut stdout, Box::new(TracingDiagnostics)).await?;
//! eprintln!("{lines} lines");
//! # Ok(()) }
//! ```

mod config;
mod consumer;
mod emitter;
mod error;
mod numberer;
mod pipeline;
mod race;
mod sequence;
mod source;
mod splitter;

pub use config::{PipelineConfig, UpstreamErrorPolicy};
pub use consumer::consume;
pub use emitter::{
    Emitter, EventHub, EventName, Listener, ListenerId, SourcePayload, DATA, END, ERROR,
    SOURCE_EVENTS,
};
pub use error::{DiagnosticSink, FailureReport, PipelineError, SourceError, TracingDiagnostics};
pub use numberer::{number, NumberedRecord, Numberer};
pub use pipeline::{numbered_lines, run, NumberedLines};
pub use race::{race, Race, RaceResult};
pub use sequence::{produce, EventedSequence, SequenceState};
pub use source::{DemandSource, Pump};
pub use splitter::{split, LineSplitter};
