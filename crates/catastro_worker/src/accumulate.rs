//! Row-to-column accumulation.
//!
//! [`ChunkAccumulator`] appends decoded rows into per-column Arrow builders
//! and cuts a [`Chunk`] whenever the row or byte threshold is reached. Every
//! row is checked against the run's schema before anything is appended, so a
//! rejected row never leaves a column half-written.

use crate::value::{DecodedRow, Value};
use arrow::array::{
    ArrayRef, Date32Builder, Decimal128Builder, Int64Builder, RecordBatch, StringBuilder,
};
use arrow::datatypes::{DataType, Date32Type, SchemaRef};
use arrow::error::ArrowError;
use catastro_sinks::Chunk;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

pub const DEFAULT_CHUNK_ROWS: usize = 1_000_000;
pub const DEFAULT_CHUNK_BYTES: usize = 256 * 1024 * 1024;

/// Flush thresholds. A chunk is cut as soon as either one is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChunkLimits {
    pub max_rows: usize,
    pub max_bytes: usize,
}

impl Default for ChunkLimits {
    fn default() -> Self {
        Self {
            max_rows: DEFAULT_CHUNK_ROWS,
            max_bytes: DEFAULT_CHUNK_BYTES,
        }
    }
}

impl ChunkLimits {
    pub fn rows(max_rows: usize) -> Self {
        Self {
            max_rows,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_rows == 0 {
            return Err("chunk row limit must be greater than zero".to_string());
        }
        if self.max_bytes == 0 {
            return Err("chunk byte limit must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// A row (or the schema itself) does not fit the run's fixed schema.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("row {row}: {actual} values for {expected} columns")]
    Arity {
        row: u64,
        expected: usize,
        actual: usize,
    },

    #[error("row {row}, column '{column}': expected {expected}, got {actual}")]
    Type {
        row: u64,
        column: String,
        expected: String,
        actual: &'static str,
    },

    #[error("row {row}, column '{column}': null in a non-nullable column")]
    Null { row: u64, column: String },

    #[error("column '{column}': unsupported type {data_type}")]
    Unsupported { column: String, data_type: String },

    #[error("failed to assemble chunk: {0}")]
    Assemble(#[from] ArrowError),
}

/// Result of [`ChunkAccumulator::accept`].
#[derive(Debug)]
pub enum Accepted {
    /// The row was buffered; no threshold reached yet.
    Open,
    /// The row filled the chunk, which is handed back for writing.
    Ready(Chunk),
}

enum ColumnBuilder {
    Utf8(StringBuilder),
    Int64(Int64Builder),
    Decimal {
        builder: Decimal128Builder,
        precision: u8,
        scale: i8,
    },
    Date32(Date32Builder),
}

impl ColumnBuilder {
    fn for_type(column: &str, data_type: &DataType) -> Result<Self, SchemaError> {
        Ok(match data_type {
            DataType::Utf8 => ColumnBuilder::Utf8(StringBuilder::new()),
            DataType::Int64 => ColumnBuilder::Int64(Int64Builder::new()),
            DataType::Decimal128(precision, scale) => ColumnBuilder::Decimal {
                builder: Self::decimal_builder(*precision, *scale)?,
                precision: *precision,
                scale: *scale,
            },
            DataType::Date32 => ColumnBuilder::Date32(Date32Builder::new()),
            other => {
                return Err(SchemaError::Unsupported {
                    column: column.to_string(),
                    data_type: other.to_string(),
                })
            }
        })
    }

    fn decimal_builder(precision: u8, scale: i8) -> Result<Decimal128Builder, SchemaError> {
        Ok(Decimal128Builder::new().with_precision_and_scale(precision, scale)?)
    }

    fn expected(&self) -> String {
        match self {
            ColumnBuilder::Utf8(_) => "text".to_string(),
            ColumnBuilder::Int64(_) => "integer".to_string(),
            ColumnBuilder::Decimal {
                precision, scale, ..
            } => format!("decimal({}, {})", precision, scale),
            ColumnBuilder::Date32(_) => "date".to_string(),
        }
    }

    /// Whether a non-null value can be appended to this column.
    fn fits(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (ColumnBuilder::Utf8(_), Value::Text(_)) => true,
            (ColumnBuilder::Int64(_), Value::Int(_)) => true,
            (
                ColumnBuilder::Decimal {
                    precision, scale, ..
                },
                Value::Decimal {
                    mantissa,
                    scale: value_scale,
                },
            ) => {
                i16::from(*value_scale) == i16::from(*scale)
                    && mantissa.unsigned_abs() < 10u128.pow(u32::from(*precision))
            }
            (ColumnBuilder::Date32(_), Value::Date(_)) => true,
            _ => false,
        }
    }

    /// Append a value already checked with [`fits`](Self::fits).
    fn append(&mut self, value: &Value) {
        match (self, value) {
            (ColumnBuilder::Utf8(b), Value::Text(s)) => b.append_value(s),
            (ColumnBuilder::Utf8(b), _) => b.append_null(),
            (ColumnBuilder::Int64(b), Value::Int(n)) => b.append_value(*n),
            (ColumnBuilder::Int64(b), _) => b.append_null(),
            (ColumnBuilder::Decimal { builder, .. }, Value::Decimal { mantissa, .. }) => {
                builder.append_value(*mantissa)
            }
            (ColumnBuilder::Decimal { builder, .. }, _) => builder.append_null(),
            (ColumnBuilder::Date32(b), Value::Date(d)) => {
                b.append_value(Date32Type::from_naive_date(*d))
            }
            (ColumnBuilder::Date32(b), _) => b.append_null(),
        }
    }

    fn finish(&mut self) -> ArrayRef {
        match self {
            ColumnBuilder::Utf8(b) => Arc::new(b.finish()),
            ColumnBuilder::Int64(b) => Arc::new(b.finish()),
            ColumnBuilder::Decimal { builder, .. } => Arc::new(builder.finish()),
            ColumnBuilder::Date32(b) => Arc::new(b.finish()),
        }
    }
}

/// Buffers rows column-wise and emits bounded chunks.
pub struct ChunkAccumulator {
    schema: SchemaRef,
    limits: ChunkLimits,
    builders: Vec<ColumnBuilder>,
    buffered_rows: usize,
    buffered_bytes: usize,
    rows_seen: u64,
    chunks_emitted: u64,
}

impl ChunkAccumulator {
    pub fn new(schema: SchemaRef, limits: ChunkLimits) -> Result<Self, SchemaError> {
        let builders = schema
            .fields()
            .iter()
            .map(|f| ColumnBuilder::for_type(f.name(), f.data_type()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            schema,
            limits,
            builders,
            buffered_rows: 0,
            buffered_bytes: 0,
            rows_seen: 0,
            chunks_emitted: 0,
        })
    }

    pub fn buffered_rows(&self) -> usize {
        self.buffered_rows
    }

    pub fn buffered_bytes(&self) -> usize {
        self.buffered_bytes
    }

    pub fn chunks_emitted(&self) -> u64 {
        self.chunks_emitted
    }

    /// Buffer one row; returns the completed chunk when a threshold is hit.
    ///
    /// A row whose arity, types or nullability disagree with the schema is
    /// refused with [`SchemaError`] and nothing is buffered.
    pub fn accept(&mut self, row: DecodedRow) -> Result<Accepted, SchemaError> {
        self.rows_seen += 1;
        self.check(&row)?;

        for (builder, value) in self.builders.iter_mut().zip(row.values()) {
            builder.append(value);
        }
        self.buffered_rows += 1;
        self.buffered_bytes += row.estimated_bytes();

        if self.buffered_rows >= self.limits.max_rows || self.buffered_bytes >= self.limits.max_bytes
        {
            Ok(Accepted::Ready(self.flush()?))
        } else {
            Ok(Accepted::Open)
        }
    }

    /// Emit whatever is buffered. `None` when nothing is pending.
    pub fn finish(&mut self) -> Result<Option<Chunk>, SchemaError> {
        if self.buffered_rows == 0 {
            return Ok(None);
        }
        self.flush().map(Some)
    }

    fn check(&self, row: &DecodedRow) -> Result<(), SchemaError> {
        let row_number = self.rows_seen;
        if row.len() != self.builders.len() {
            return Err(SchemaError::Arity {
                row: row_number,
                expected: self.builders.len(),
                actual: row.len(),
            });
        }

        for ((field, builder), value) in self
            .schema
            .fields()
            .iter()
            .zip(&self.builders)
            .zip(row.values())
        {
            if value.is_null() && !field.is_nullable() {
                return Err(SchemaError::Null {
                    row: row_number,
                    column: field.name().clone(),
                });
            }
            if !builder.fits(value) {
                return Err(SchemaError::Type {
                    row: row_number,
                    column: field.name().clone(),
                    expected: builder.expected(),
                    actual: value.kind_name(),
                });
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<Chunk, SchemaError> {
        let columns: Vec<ArrayRef> = self.builders.iter_mut().map(ColumnBuilder::finish).collect();
        let bytes = self.buffered_bytes;
        self.buffered_rows = 0;
        self.buffered_bytes = 0;

        let batch = RecordBatch::try_new(Arc::clone(&self.schema), columns)?;
        self.chunks_emitted += 1;
        Ok(Chunk::from_record_batch(batch).with_estimated_bytes(bytes))
    }
}
