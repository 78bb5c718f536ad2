#![allow(clippy::result_large_err)]

//! Streaming CAT to Parquet conversion.
//!
//! - [`decode`]: fixed-width line to typed row
//! - [`accumulate`]: typed rows to bounded Arrow chunks
//! - [`source`]: input discovery and line streaming
//! - [`pipeline`]: the run controller tying them to a [`catastro_sinks::ParquetSink`]

pub mod accumulate;
pub mod cancel;
pub mod config;
pub mod decode;
pub mod pipeline;
pub mod source;
pub mod value;

pub use accumulate::{Accepted, ChunkAccumulator, ChunkLimits, SchemaError};
pub use cancel::CancellationToken;
pub use config::{ConfigError, ConvertConfig, ErrorPolicy};
pub use decode::{decode, decode_with, encode_field, encode_row, DecodeError, Decoder};
pub use pipeline::{
    convert, ConversionRequest, ConversionSummary, ConvertError, Outcome, Rejection,
};
pub use source::{resolve_inputs, RecordStream, StreamStats};
pub use value::{DecodedRow, Value};
