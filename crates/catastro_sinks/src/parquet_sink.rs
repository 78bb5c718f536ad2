//! Parquet artifact writer.

use anyhow::Context;
use arrow::datatypes::SchemaRef;
use parquet::arrow::arrow_writer::ArrowWriter;
use parquet::file::metadata::KeyValue;
use parquet::file::properties::WriterProperties;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::{validate_chunk_schema, Chunk, Codec, SinkError, SinkResult};

/// Default cap on rows per row group. A chunk is flushed as its own row
/// group, so this only matters for chunks larger than the cap.
const DEFAULT_MAX_ROW_GROUP_ROWS: usize = 1_000_000;

/// Writer settings fixed at open time.
#[derive(Debug, Clone)]
pub struct SinkOptions {
    pub codec: Codec,
    pub max_row_group_rows: usize,
    /// Key/value pairs stored in the Parquet footer.
    pub metadata: Vec<(String, String)>,
}

impl Default for SinkOptions {
    fn default() -> Self {
        Self {
            codec: Codec::default(),
            max_row_group_rows: DEFAULT_MAX_ROW_GROUP_ROWS,
            metadata: Vec::new(),
        }
    }
}

impl SinkOptions {
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.push((key.into(), value.into()));
        self
    }
}

/// Summary of a finalized artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactInfo {
    pub path: PathBuf,
    pub rows: u64,
    pub segments: u64,
    pub bytes: u64,
}

/// Hidden staging path used while an artifact is being written:
/// `dir/.{file_name}.tmp`.
pub fn temp_path_for(final_path: &Path) -> PathBuf {
    let file_name = final_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output.parquet".to_string());
    let temp_name = format!(".{}.tmp", file_name);
    match final_path.parent() {
        Some(parent) => parent.join(temp_name),
        None => PathBuf::from(temp_name),
    }
}

/// Parquet sink for one (input, table) conversion.
///
/// Chunks are appended to a hidden temp file, one row group per chunk. The
/// destination path only appears once [`finalize`](Self::finalize) has
/// written the footer and renamed the temp file into place. Dropping the sink
/// before that removes the temp file, so an interrupted run never leaves a
/// file that looks complete.
pub struct ParquetSink {
    final_path: PathBuf,
    temp_path: PathBuf,
    schema: SchemaRef,
    writer: Option<ArrowWriter<File>>,
    rows_written: u64,
    segments_written: u64,
    committed: bool,
}

impl ParquetSink {
    /// Create the staging file and fix the artifact schema.
    pub fn open(
        path: impl Into<PathBuf>,
        schema: SchemaRef,
        options: SinkOptions,
    ) -> SinkResult<Self> {
        let final_path = path.into();
        if final_path.file_name().is_none() {
            return Err(SinkError::message(format!(
                "Output path has no file name: {}",
                final_path.display()
            )));
        }
        if final_path.is_dir() {
            return Err(SinkError::message(format!(
                "Output path is a directory: {}",
                final_path.display()
            )));
        }
        if let Some(parent) = final_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create output directory: {}", parent.display())
            })?;
        }

        let temp_path = temp_path_for(&final_path);

        info!(
            "Initializing Parquet sink: {} (temp: {})",
            final_path.display(),
            temp_path.display()
        );

        let file = File::create(&temp_path).with_context(|| {
            format!(
                "Failed to create temp parquet file: {}",
                temp_path.display()
            )
        })?;

        let key_values: Vec<KeyValue> = options
            .metadata
            .iter()
            .map(|(k, v)| KeyValue::new(k.clone(), v.clone()))
            .collect();

        let props = WriterProperties::builder()
            .set_compression(options.codec.to_parquet())
            .set_max_row_group_size(options.max_row_group_rows.max(1))
            .set_key_value_metadata(if key_values.is_empty() {
                None
            } else {
                Some(key_values)
            })
            .build();

        let writer = match ArrowWriter::try_new(file, schema.clone(), Some(props)) {
            Ok(writer) => writer,
            Err(err) => {
                let _ = std::fs::remove_file(&temp_path);
                return Err(anyhow::Error::new(err)
                    .context("Failed to create Parquet writer")
                    .into());
            }
        };

        Ok(Self {
            final_path,
            temp_path,
            schema,
            writer: Some(writer),
            rows_written: 0,
            segments_written: 0,
            committed: false,
        })
    }

    /// Append one chunk as a new row group.
    pub fn write_chunk(&mut self, chunk: &Chunk) -> SinkResult<u64> {
        if chunk.is_empty() {
            return Ok(0);
        }

        let sink_name = self.final_path.display().to_string();
        validate_chunk_schema(chunk.schema().as_ref(), self.schema.as_ref(), &sink_name)
            .map_err(|err| SinkError::Schema {
                message: err.to_string(),
            })?;

        let segment = self.segments_written;
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| SinkError::message("Parquet sink already finalized"))?;

        writer
            .write(chunk.record_batch())
            .and_then(|_| writer.flush())
            .with_context(|| {
                format!(
                    "Failed to write segment {} ({} rows after row {}) to {}",
                    segment,
                    chunk.num_rows(),
                    self.rows_written,
                    self.temp_path.display()
                )
            })?;

        let rows = chunk.num_rows() as u64;
        self.rows_written += rows;
        self.segments_written += 1;
        debug!(
            "Wrote segment {} with {} rows (total: {})",
            segment, rows, self.rows_written
        );

        Ok(rows)
    }

    /// Write the footer and promote the temp file to the destination path.
    pub fn finalize(mut self) -> SinkResult<ArtifactInfo> {
        let writer = self
            .writer
            .take()
            .ok_or_else(|| SinkError::message("Parquet sink already finalized"))?;

        writer
            .close()
            .with_context(|| format!("Failed to close Parquet writer: {}", self.temp_path.display()))?;

        std::fs::rename(&self.temp_path, &self.final_path).with_context(|| {
            format!(
                "Failed to rename {} -> {}",
                self.temp_path.display(),
                self.final_path.display()
            )
        })?;
        self.committed = true;

        let bytes = std::fs::metadata(&self.final_path)
            .map(|m| m.len())
            .unwrap_or(0);

        info!(
            "Committed Parquet sink: {} ({} rows, {} segments)",
            self.final_path.display(),
            self.rows_written,
            self.segments_written
        );

        Ok(ArtifactInfo {
            path: self.final_path.clone(),
            rows: self.rows_written,
            segments: self.segments_written,
            bytes,
        })
    }

    /// Abandon the artifact and delete the staging file.
    pub fn rollback(mut self) -> SinkResult<()> {
        drop(self.writer.take());
        self.remove_temp();
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.final_path
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    fn remove_temp(&self) {
        if self.temp_path.exists() {
            let _ = std::fs::remove_file(&self.temp_path);
            warn!("Rolled back Parquet temp file: {}", self.temp_path.display());
        }
    }
}

impl Drop for ParquetSink {
    fn drop(&mut self) {
        if !self.committed {
            drop(self.writer.take());
            self.remove_temp();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Decimal128Builder, Int64Array, RecordBatch, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("tipo_reg", DataType::Utf8, false),
            Field::new("sup", DataType::Int64, true),
        ]))
    }

    fn chunk(values: &[Option<i64>]) -> Chunk {
        let tipo: Vec<&str> = values.iter().map(|_| "11").collect();
        let batch = RecordBatch::try_new(
            schema(),
            vec![
                Arc::new(StringArray::from(tipo)),
                Arc::new(Int64Array::from(values.to_vec())),
            ],
        )
        .unwrap();
        Chunk::from_record_batch(batch)
    }

    #[test]
    fn test_parquet_sink_commit() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("CAT11.parquet");
        let mut sink = ParquetSink::open(&path, schema(), SinkOptions::default()).unwrap();
        let temp = sink.temp_path().to_path_buf();
        assert!(temp.exists());
        assert!(!path.exists());

        assert_eq!(sink.write_chunk(&chunk(&[Some(1), None, Some(3)])).unwrap(), 3);
        assert_eq!(sink.write_chunk(&chunk(&[Some(4)])).unwrap(), 1);

        let info = sink.finalize().unwrap();
        assert_eq!(info.rows, 4);
        assert_eq!(info.segments, 2);
        assert!(info.bytes > 0);
        assert!(path.exists());
        assert!(!temp.exists());

        let file = File::open(&path).unwrap();
        let builder = ParquetRecordBatchReaderBuilder::try_new(file).unwrap();
        assert_eq!(builder.metadata().num_row_groups(), 2);
        assert_eq!(builder.metadata().file_metadata().num_rows(), 4);
    }

    #[test]
    fn test_drop_without_finalize_leaves_no_output() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.parquet");
        let temp;
        {
            let mut sink = ParquetSink::open(&path, schema(), SinkOptions::default()).unwrap();
            sink.write_chunk(&chunk(&[Some(1)])).unwrap();
            temp = sink.temp_path().to_path_buf();
        }
        assert!(!temp.exists());
        assert!(!path.exists());
    }

    #[test]
    fn test_directory_destination_refused() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("outdir");
        std::fs::create_dir(&path).unwrap();
        let err = ParquetSink::open(&path, schema(), SinkOptions::default())
            .err()
            .unwrap();
        assert!(err.to_string().contains("is a directory"));
        assert!(!temp_path_for(&path).exists());
    }

    #[test]
    fn test_rollback_removes_temp() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.parquet");
        let sink = ParquetSink::open(&path, schema(), SinkOptions::default()).unwrap();
        let temp = sink.temp_path().to_path_buf();
        sink.rollback().unwrap();
        assert!(!temp.exists());
        assert!(!path.exists());
    }

    #[test]
    fn test_rejects_foreign_schema() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.parquet");
        let mut sink = ParquetSink::open(&path, schema(), SinkOptions::default()).unwrap();

        let mut dec = Decimal128Builder::new().with_data_type(DataType::Decimal128(9, 2));
        dec.append_value(12_345);
        let other = Arc::new(Schema::new(vec![Field::new(
            "xcen",
            DataType::Decimal128(9, 2),
            true,
        )]));
        let batch = RecordBatch::try_new(other, vec![Arc::new(dec.finish())]).unwrap();

        let err = sink
            .write_chunk(&Chunk::from_record_batch(batch))
            .unwrap_err();
        assert!(matches!(err, SinkError::Schema { .. }));
        assert_eq!(sink.finalize().unwrap().rows, 0);
    }

    #[test]
    fn test_metadata_and_codec_recorded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("meta.parquet");
        let options = SinkOptions {
            codec: Codec::Zstd,
            ..SinkOptions::default()
        }
        .with_metadata("catastro.table", "11");
        let mut sink = ParquetSink::open(&path, schema(), options).unwrap();
        sink.write_chunk(&chunk(&[Some(7)])).unwrap();
        sink.finalize().unwrap();

        let file = File::open(&path).unwrap();
        let builder = ParquetRecordBatchReaderBuilder::try_new(file).unwrap();
        let kv = builder
            .metadata()
            .file_metadata()
            .key_value_metadata()
            .unwrap();
        assert!(kv
            .iter()
            .any(|e| e.key == "catastro.table" && e.value.as_deref() == Some("11")));
        let column = builder.metadata().row_group(0).column(0);
        assert_eq!(
            column.compression(),
            parquet::basic::Compression::ZSTD(parquet::basic::ZstdLevel::default())
        );
    }

    #[test]
    fn test_empty_chunk_is_not_a_segment() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.parquet");
        let mut sink = ParquetSink::open(&path, schema(), SinkOptions::default()).unwrap();
        assert_eq!(sink.write_chunk(&chunk(&[])).unwrap(), 0);
        let info = sink.finalize().unwrap();
        assert_eq!(info.segments, 0);
        assert_eq!(info.rows, 0);
        assert!(path.exists());
    }

    #[test]
    fn test_temp_path_naming() {
        assert_eq!(
            temp_path_for(Path::new("/data/CAT11.parquet")),
            PathBuf::from("/data/.CAT11.parquet.tmp")
        );
        assert_eq!(
            temp_path_for(Path::new("CAT11.parquet")),
            PathBuf::from(".CAT11.parquet.tmp")
        );
    }
}
