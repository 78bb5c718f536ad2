//! Columnar writer for decoded CAT chunks.
//!
//! A [`ParquetSink`] receives [`Chunk`]s (Arrow RecordBatches) and appends
//! each one as a row group of a single Parquet artifact. The sink handles:
//! - Staging in a hidden temp file next to the destination
//! - Schema enforcement (every chunk must carry the schema fixed at open)
//! - Compression and artifact-level metadata
//! - Atomic promotion on finalize, cleanup on rollback or drop

use anyhow::bail;
use arrow::array::RecordBatch;
use arrow::datatypes::{Schema, SchemaRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

mod parquet_sink;

pub use parquet_sink::{temp_path_for, ArtifactInfo, ParquetSink, SinkOptions};

/// Errors returned by the columnar writer.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("{message}")]
    Message { message: String },
    #[error("schema mismatch: {message}")]
    Schema { message: String },
    #[error("{message}")]
    Source {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

pub type SinkResult<T> = std::result::Result<T, SinkError>;

impl SinkError {
    pub(crate) fn message(message: impl Into<String>) -> Self {
        SinkError::Message {
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for SinkError {
    fn from(err: anyhow::Error) -> Self {
        SinkError::Source {
            message: format!("{:#}", err),
            source: err,
        }
    }
}

/// A bounded batch of decoded rows, column-wise.
#[derive(Debug, Clone)]
pub struct Chunk {
    batch: Arc<RecordBatch>,
    estimated_bytes: usize,
}

impl Chunk {
    pub fn from_record_batch(batch: RecordBatch) -> Self {
        let estimated_bytes = batch.get_array_memory_size();
        Self {
            batch: Arc::new(batch),
            estimated_bytes,
        }
    }

    /// Attach the accumulator's own byte estimate instead of the Arrow
    /// allocation size.
    pub fn with_estimated_bytes(mut self, bytes: usize) -> Self {
        self.estimated_bytes = bytes;
        self
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.num_rows() == 0
    }

    pub fn estimated_bytes(&self) -> usize {
        self.estimated_bytes
    }

    pub fn schema(&self) -> SchemaRef {
        self.batch.schema()
    }

    pub fn record_batch(&self) -> &RecordBatch {
        &self.batch
    }
}

/// Block compression codec for written segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    #[default]
    Snappy,
    Zstd,
    Gzip,
    Uncompressed,
}

impl Codec {
    pub fn as_str(&self) -> &'static str {
        match self {
            Codec::Snappy => "snappy",
            Codec::Zstd => "zstd",
            Codec::Gzip => "gzip",
            Codec::Uncompressed => "uncompressed",
        }
    }

    pub(crate) fn to_parquet(self) -> parquet::basic::Compression {
        use parquet::basic::{Compression, GzipLevel, ZstdLevel};
        match self {
            Codec::Snappy => Compression::SNAPPY,
            Codec::Zstd => Compression::ZSTD(ZstdLevel::default()),
            Codec::Gzip => Compression::GZIP(GzipLevel::default()),
            Codec::Uncompressed => Compression::UNCOMPRESSED,
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Codec {
    type Err = SinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "snappy" => Ok(Codec::Snappy),
            "zstd" => Ok(Codec::Zstd),
            "gzip" => Ok(Codec::Gzip),
            "none" | "uncompressed" => Ok(Codec::Uncompressed),
            other => Err(SinkError::message(format!(
                "Unsupported compression codec: '{}'",
                other
            ))),
        }
    }
}

/// Validate that a chunk carries exactly the declared schema.
///
/// Names, types and nullability must match field by field; no coercion is
/// applied. Schema-level metadata is not compared.
pub fn validate_chunk_schema(
    chunk_schema: &Schema,
    declared_schema: &Schema,
    sink_name: &str,
) -> anyhow::Result<()> {
    if chunk_schema.fields().len() != declared_schema.fields().len() {
        bail!(
            "sink '{}': expected {} columns, got {}",
            sink_name,
            declared_schema.fields().len(),
            chunk_schema.fields().len()
        );
    }

    for (i, (chunk_field, declared_field)) in chunk_schema
        .fields()
        .iter()
        .zip(declared_schema.fields().iter())
        .enumerate()
    {
        if chunk_field.name() != declared_field.name() {
            bail!(
                "sink '{}' column {}: expected name '{}', got '{}'",
                sink_name,
                i,
                declared_field.name(),
                chunk_field.name()
            );
        }

        if chunk_field.data_type() != declared_field.data_type() {
            bail!(
                "sink '{}' column '{}': expected type {:?}, got {:?}",
                sink_name,
                declared_field.name(),
                declared_field.data_type(),
                chunk_field.data_type()
            );
        }

        if chunk_field.is_nullable() != declared_field.is_nullable() {
            bail!(
                "sink '{}' column '{}': expected nullable={}, got nullable={}",
                sink_name,
                declared_field.name(),
                declared_field.is_nullable(),
                chunk_field.is_nullable()
            );
        }
    }

    Ok(())
}
