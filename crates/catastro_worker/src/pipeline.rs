//! Streaming conversion of CAT input into one Parquet artifact.
//!
//! The controller reads each input line by line, keeps the lines of the
//! requested table, decodes them, accumulates rows into bounded chunks and
//! hands every completed chunk to the sink before reading further. Memory is
//! bounded by the chunk limits, never by input size.
//!
//! In pipelined mode a dedicated writer thread encodes and writes chunk N
//! while chunk N+1 is being built. Chunks travel through a single-slot
//! channel, so they are written in the order they were produced and at most
//! three are alive at once (building, queued, writing).

use crate::accumulate::{Accepted, ChunkAccumulator, SchemaError};
use crate::cancel::CancellationToken;
use crate::config::{ConfigError, ConvertConfig, ErrorPolicy};
use crate::decode::{DecodeError, Decoder};
use crate::source::{resolve_inputs, RecordStream, StreamStats};
use catastro_layout::{layout_for, LayoutError, TableId, LAYOUT_VERSION};
use catastro_sinks::{ArtifactInfo, Chunk, ParquetSink, SinkError, SinkOptions};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{sync_channel, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Read buffer per input file.
const READ_BUFFER_BYTES: usize = 1 << 20;

/// Artifact metadata keys.
pub const TABLE_METADATA_KEY: &str = "catastro.table";
pub const LAYOUT_VERSION_METADATA_KEY: &str = "catastro.layout_version";
pub const ENCODING_METADATA_KEY: &str = "catastro.source_encoding";

/// What to convert and where to put it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRequest {
    /// A CAT file, or a folder whose `*.cat` files are read in name order.
    pub input: PathBuf,
    pub table: TableId,
    pub output: PathBuf,
}

impl ConversionRequest {
    pub fn new(input: impl Into<PathBuf>, table: TableId, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            table,
            output: output.into(),
        }
    }

    /// `CAT<code>.parquet` next to the input (inside it for a folder).
    pub fn default_output(input: &Path, table: TableId) -> PathBuf {
        let file_name = format!("CAT{}.parquet", table.code());
        if input.is_dir() {
            input.join(file_name)
        } else {
            input
                .parent()
                .map(|dir| dir.join(&file_name))
                .unwrap_or_else(|| PathBuf::from(file_name))
        }
    }
}

/// Reasons a run ends without an artifact.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// Bad settings, unknown table, unreadable input or unwritable output.
    /// Raised before any record is processed.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to read {path} at byte {offset}: {source}")]
    Read {
        path: PathBuf,
        offset: u64,
        #[source]
        source: io::Error,
    },

    /// A line failed to decode under [`ErrorPolicy::Abort`].
    #[error("{path}:{line}: {source}")]
    Decode {
        path: PathBuf,
        line: u64,
        #[source]
        source: DecodeError,
    },

    #[error("schema consistency violated: {0}")]
    Schema(#[from] SchemaError),

    #[error("failed to write output: {0}")]
    Sink(#[from] SinkError),

    #[error("writer thread failed: {0}")]
    Writer(String),

    #[error("conversion cancelled")]
    Cancelled,
}

impl From<ConfigError> for ConvertError {
    fn from(err: ConfigError) -> Self {
        ConvertError::Config(err.to_string())
    }
}

impl From<LayoutError> for ConvertError {
    fn from(err: LayoutError) -> Self {
        ConvertError::Config(err.to_string())
    }
}

/// A line that was skipped under [`ErrorPolicy::Skip`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    pub file: PathBuf,
    pub line: u64,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Clean,
    WithRejections,
}

/// What a successful run did.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionSummary {
    pub table: TableId,
    pub output: PathBuf,
    pub files: Vec<PathBuf>,
    pub lines_read: u64,
    pub lines_matched: u64,
    pub rows_written: u64,
    pub rows_rejected: u64,
    pub bytes_read: u64,
    pub chunks_written: u64,
    pub output_bytes: u64,
    /// First rejections, up to the configured logging limit.
    pub rejections: Vec<Rejection>,
    pub elapsed_ms: u64,
}

impl ConversionSummary {
    pub fn outcome(&self) -> Outcome {
        if self.rows_rejected == 0 {
            Outcome::Clean
        } else {
            Outcome::WithRejections
        }
    }
}

#[derive(Default)]
struct Tally {
    stats: StreamStats,
    rows: u64,
    rejected: u64,
    rejections: Vec<Rejection>,
}

impl Tally {
    fn reject(&mut self, path: &Path, line: u64, err: &DecodeError, max_logged: usize) {
        self.rejected += 1;
        if self.rejections.len() < max_logged {
            warn!("Rejected {}:{}: {}", path.display(), line, err);
            self.rejections.push(Rejection {
                file: path.to_path_buf(),
                line,
                reason: err.to_string(),
            });
            if self.rejections.len() == max_logged {
                warn!(
                    "Rejection log limit ({}) reached; further rejections are only counted",
                    max_logged
                );
            }
        } else {
            debug!("Rejected {}:{}: {}", path.display(), line, err);
        }
    }
}

type WriterHandle = JoinHandle<Result<ParquetSink, SinkError>>;

/// Where completed chunks go: straight into the sink, or through a
/// single-slot channel to a writer thread.
enum ChunkWriter {
    Inline(ParquetSink),
    Threaded {
        sender: Option<SyncSender<Chunk>>,
        handle: Option<WriterHandle>,
    },
}

impl ChunkWriter {
    fn start(sink: ParquetSink, pipelined: bool) -> Result<Self, ConvertError> {
        if !pipelined {
            return Ok(ChunkWriter::Inline(sink));
        }

        let (sender, receiver) = sync_channel::<Chunk>(1);
        let handle = thread::Builder::new()
            .name("catastro-writer".to_string())
            .spawn(move || -> Result<ParquetSink, SinkError> {
                let mut sink = sink;
                for chunk in receiver {
                    sink.write_chunk(&chunk)?;
                }
                Ok(sink)
            })
            .map_err(|e| ConvertError::Writer(format!("failed to spawn writer thread: {}", e)))?;

        Ok(ChunkWriter::Threaded {
            sender: Some(sender),
            handle: Some(handle),
        })
    }

    fn write(&mut self, chunk: Chunk) -> Result<(), ConvertError> {
        match self {
            ChunkWriter::Inline(sink) => {
                sink.write_chunk(&chunk)?;
                Ok(())
            }
            ChunkWriter::Threaded { sender, handle } => {
                let delivered = sender
                    .as_ref()
                    .map(|tx| tx.send(chunk).is_ok())
                    .unwrap_or(false);
                if delivered {
                    return Ok(());
                }
                // The receiver is gone, so the thread stopped on an error.
                sender.take();
                match join_writer(handle) {
                    Ok(sink) => {
                        rollback(sink);
                        Err(ConvertError::Writer(
                            "writer thread stopped early".to_string(),
                        ))
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }

    /// Wait for pending writes and hand back the sink.
    fn into_sink(self) -> Result<ParquetSink, ConvertError> {
        match self {
            ChunkWriter::Inline(sink) => Ok(sink),
            ChunkWriter::Threaded { sender, mut handle } => {
                drop(sender);
                join_writer(&mut handle)
            }
        }
    }

    fn finalize(self) -> Result<ArtifactInfo, ConvertError> {
        Ok(self.into_sink()?.finalize()?)
    }

    fn abort(self) {
        match self.into_sink() {
            Ok(sink) => rollback(sink),
            Err(e) => debug!("Writer failed while aborting: {}", e),
        }
    }
}

fn rollback(sink: ParquetSink) {
    let temp = sink.temp_path().to_path_buf();
    if let Err(e) = sink.rollback() {
        warn!("Failed to discard {}: {}", temp.display(), e);
    }
}

fn join_writer(handle: &mut Option<WriterHandle>) -> Result<ParquetSink, ConvertError> {
    let handle = handle
        .take()
        .ok_or_else(|| ConvertError::Writer("writer thread already joined".to_string()))?;
    match handle.join() {
        Ok(result) => Ok(result?),
        Err(_) => Err(ConvertError::Writer("writer thread panicked".to_string())),
    }
}

/// Convert the records of one table into a Parquet artifact.
///
/// On success the artifact exists at `request.output` and the summary
/// describes the run. On any error, including cancellation, no artifact is
/// left behind.
pub fn convert(
    request: &ConversionRequest,
    config: &ConvertConfig,
    cancel: &CancellationToken,
) -> Result<ConversionSummary, ConvertError> {
    let started = Instant::now();

    config.validate()?;
    let encoding = config.source_encoding()?;
    let layout = Arc::new(layout_for(request.table)?);
    let inputs = resolve_inputs(&request.input).map_err(ConvertError::Config)?;
    for path in &inputs {
        File::open(path).map_err(|e| {
            ConvertError::Config(format!("cannot open input '{}': {}", path.display(), e))
        })?;
    }

    let decoder = Decoder::with_encoding(Arc::clone(&layout), encoding);
    let mut accumulator = ChunkAccumulator::new(layout.schema(), config.chunk)?;

    let options = SinkOptions {
        codec: config.compression,
        max_row_group_rows: config.chunk.max_rows,
        ..SinkOptions::default()
    }
    .with_metadata(TABLE_METADATA_KEY, request.table.code())
    .with_metadata(LAYOUT_VERSION_METADATA_KEY, LAYOUT_VERSION.to_string())
    .with_metadata(ENCODING_METADATA_KEY, encoding.name());
    let sink = ParquetSink::open(request.output.clone(), layout.schema(), options).map_err(|e| {
        ConvertError::Config(format!(
            "cannot create output '{}': {}",
            request.output.display(),
            e
        ))
    })?;

    info!(
        "Converting table {} ({}) from {} file(s) into {}",
        request.table,
        request.table.description(),
        inputs.len(),
        request.output.display()
    );

    let mut writer = ChunkWriter::start(sink, config.pipelined)?;
    let mut tally = Tally::default();

    let run = RunContext {
        table: request.table,
        config,
        cancel,
    };
    let streamed = stream_inputs(
        &run,
        &inputs,
        &decoder,
        &mut accumulator,
        &mut writer,
        &mut tally,
    );
    if let Err(e) = streamed {
        warn!("Conversion of table {} failed: {}", request.table, e);
        writer.abort();
        return Err(e);
    }
    if cancel.is_cancelled() {
        writer.abort();
        return Err(ConvertError::Cancelled);
    }

    let artifact = writer.finalize()?;
    let summary = ConversionSummary {
        table: request.table,
        output: artifact.path,
        files: inputs,
        lines_read: tally.stats.lines_read,
        lines_matched: tally.stats.lines_matched,
        rows_written: tally.rows,
        rows_rejected: tally.rejected,
        bytes_read: tally.stats.bytes_read,
        chunks_written: artifact.segments,
        output_bytes: artifact.bytes,
        rejections: tally.rejections,
        elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
    };

    info!(
        "Wrote {} rows in {} chunk(s) to {} ({} rejected, {} ms)",
        summary.rows_written,
        summary.chunks_written,
        summary.output.display(),
        summary.rows_rejected,
        summary.elapsed_ms
    );
    Ok(summary)
}

struct RunContext<'a> {
    table: TableId,
    config: &'a ConvertConfig,
    cancel: &'a CancellationToken,
}

fn stream_inputs(
    run: &RunContext<'_>,
    inputs: &[PathBuf],
    decoder: &Decoder,
    accumulator: &mut ChunkAccumulator,
    writer: &mut ChunkWriter,
    tally: &mut Tally,
) -> Result<(), ConvertError> {
    for (index, path) in inputs.iter().enumerate() {
        info!("Processing file {}/{}: {}", index + 1, inputs.len(), path.display());
        let file = File::open(path).map_err(|source| ConvertError::Read {
            path: path.clone(),
            offset: 0,
            source,
        })?;
        let reader = BufReader::with_capacity(READ_BUFFER_BYTES, file);
        let mut records = RecordStream::new(reader, run.table).decoded(decoder);

        while let Some(item) = records.next() {
            if run.cancel.is_cancelled() {
                return Err(ConvertError::Cancelled);
            }
            let record = item.map_err(|source| ConvertError::Read {
                path: path.clone(),
                offset: records.offset(),
                source,
            })?;

            match record.outcome {
                Ok(row) => {
                    tally.rows += 1;
                    if let Accepted::Ready(chunk) = accumulator.accept(row)? {
                        debug!(
                            "Chunk {} ready: {} rows, ~{} bytes",
                            accumulator.chunks_emitted(),
                            chunk.num_rows(),
                            chunk.estimated_bytes()
                        );
                        writer.write(chunk)?;
                    }
                }
                Err(source) => match run.config.on_error {
                    ErrorPolicy::Abort => {
                        return Err(ConvertError::Decode {
                            path: path.clone(),
                            line: record.number,
                            source,
                        })
                    }
                    ErrorPolicy::Skip => tally.reject(
                        path,
                        record.number,
                        &source,
                        run.config.max_logged_rejections,
                    ),
                },
            }
        }

        let stats = records.stats();
        debug!(
            "Finished {}: {} lines, {} matched",
            path.display(),
            stats.lines_read,
            stats.lines_matched
        );
        tally.stats.absorb(stats);
    }

    let pending_bytes = accumulator.buffered_bytes();
    if let Some(chunk) = accumulator.finish()? {
        debug!(
            "Final chunk: {} rows, ~{} bytes",
            chunk.num_rows(),
            pending_bytes
        );
        writer.write(chunk)?;
    }
    Ok(())
}
