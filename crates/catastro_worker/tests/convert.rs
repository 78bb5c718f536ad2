//! End-to-end conversion runs against real files.

use arrow::array::{Array, Decimal128Array, Int64Array, RecordBatch, StringArray};
use arrow::compute::concat_batches;
use arrow::datatypes::{DataType, Schema};
use catastro_layout::{layout_for, Layout, TableId};
use catastro_worker::{
    convert, CancellationToken, ChunkLimits, ConversionRequest, ConversionSummary, ConvertConfig,
    ConvertError, DecodedRow, Decoder, ErrorPolicy, Outcome, Value,
};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

fn parcel_layout() -> Layout {
    layout_for(TableId::Parcel).unwrap()
}

fn parcel_line(pc: &str, sup: i64) -> Vec<u8> {
    let layout = parcel_layout();
    let values = layout
        .fields()
        .iter()
        .map(|f| match f.name.as_str() {
            "tipo_reg" => Value::Text("11".into()),
            "pc" => Value::Text(pc.into()),
            "nm" => Value::Text("CÓRDOBA".into()),
            "sup" => Value::Int(sup),
            "xcen" => Value::Decimal {
                mantissa: 4_401_234,
                scale: 2,
            },
            _ => Value::Null,
        })
        .collect();
    Decoder::new(Arc::new(layout))
        .encode(&DecodedRow::new(values))
        .unwrap()
}

fn common_elements_line(pc: &str, share: i128) -> Vec<u8> {
    let layout = layout_for(TableId::CommonElements).unwrap();
    let values = layout
        .fields()
        .iter()
        .map(|f| match f.name.as_str() {
            "tipo_reg" => Value::Text("16".into()),
            "pc" => Value::Text(pc.into()),
            "nc1" => Value::Text("0001".into()),
            "pr1" => Value::Decimal {
                mantissa: share,
                scale: 3,
            },
            _ => Value::Null,
        })
        .collect();
    Decoder::new(Arc::new(layout))
        .encode(&DecodedRow::new(values))
        .unwrap()
}

/// Field names, types and nullability must follow the layout in order.
fn assert_schema_follows_layout(schema: &Schema, layout: &Layout) {
    let shape = |s: &Schema| -> Vec<(String, DataType, bool)> {
        s.fields()
            .iter()
            .map(|f| (f.name().clone(), f.data_type().clone(), f.is_nullable()))
            .collect()
    };
    assert_eq!(shape(schema), shape(layout.schema().as_ref()));
}

fn unit_line() -> Vec<u8> {
    let mut line = b"13".to_vec();
    line.resize(409, b' ');
    line
}

fn write_cat(path: &Path, lines: &[Vec<u8>]) {
    let mut file = File::create(path).unwrap();
    for line in lines {
        file.write_all(line).unwrap();
        file.write_all(b"\r\n").unwrap();
    }
}

fn read_back(path: &Path) -> (usize, RecordBatch) {
    let file = File::open(path).unwrap();
    let builder = ParquetRecordBatchReaderBuilder::try_new(file).unwrap();
    let row_groups = builder.metadata().num_row_groups();
    let schema = builder.schema().clone();
    let batches: Vec<RecordBatch> = builder.build().unwrap().map(|b| b.unwrap()).collect();
    (row_groups, concat_batches(&schema, &batches).unwrap())
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> &'a T {
    batch
        .column_by_name(name)
        .unwrap()
        .as_any()
        .downcast_ref::<T>()
        .unwrap()
}

fn run(
    input: &Path,
    output: &Path,
    config: &ConvertConfig,
) -> Result<ConversionSummary, ConvertError> {
    let request = ConversionRequest::new(input, TableId::Parcel, output);
    convert(&request, config, &CancellationToken::new())
}

#[test]
fn test_only_requested_table_is_converted() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("28900.CAT");
    write_cat(
        &input,
        &[
            parcel_line("0001001VK4700A", 120),
            unit_line(),
            parcel_line("0001002VK4700A", 95),
            unit_line(),
            parcel_line("0001003VK4700A", 310),
        ],
    );
    let output = dir.path().join("CAT11.parquet");

    let summary = run(&input, &output, &ConvertConfig::default()).unwrap();
    assert_eq!(summary.lines_read, 5);
    assert_eq!(summary.lines_matched, 3);
    assert_eq!(summary.rows_written, 3);
    assert_eq!(summary.rows_rejected, 0);
    assert_eq!(summary.outcome(), Outcome::Clean);
    assert_eq!(summary.bytes_read, 3 * 668 + 2 * 411);

    let (_, batch) = read_back(&output);
    assert_eq!(batch.num_rows(), 3);
    assert_schema_follows_layout(&batch.schema(), &parcel_layout());
    let pc = column::<StringArray>(&batch, "pc");
    assert_eq!(pc.value(1), "0001002VK4700A");
    let sup = column::<Int64Array>(&batch, "sup");
    assert_eq!(sup.values().to_vec(), vec![120, 95, 310]);
    let nm = column::<StringArray>(&batch, "nm");
    assert_eq!(nm.value(0), "CÓRDOBA");
    let xcen = column::<Decimal128Array>(&batch, "xcen");
    assert_eq!(xcen.value_as_string(0), "44012.34");
    assert!(column::<StringArray>(&batch, "np").is_null(0));
}

#[test]
fn test_truncated_line_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("big.cat");
    let mut lines: Vec<Vec<u8>> = (0..1000)
        .map(|i| parcel_line(&format!("{:014}", i), i))
        .collect();
    lines[500].truncate(300);
    write_cat(&input, &lines);
    let output = dir.path().join("out.parquet");

    let summary = run(&input, &output, &ConvertConfig::default()).unwrap();
    assert_eq!(summary.rows_written, 999);
    assert_eq!(summary.rows_rejected, 1);
    assert_eq!(summary.outcome(), Outcome::WithRejections);
    assert_eq!(summary.rejections.len(), 1);
    assert_eq!(summary.rejections[0].line, 501);
    assert!(summary.rejections[0].reason.contains("truncated"));

    let (_, batch) = read_back(&output);
    assert_eq!(batch.num_rows(), 999);
    let sup = column::<Int64Array>(&batch, "sup");
    assert_eq!(sup.value(499), 499);
    assert_eq!(sup.value(500), 501);
}

#[test]
fn test_abort_policy_leaves_no_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("bad.cat");
    let mut short = parcel_line("00000000000002", 2);
    short.truncate(40);
    write_cat(&input, &[parcel_line("00000000000001", 1), short]);
    let output = dir.path().join("out.parquet");

    let config = ConvertConfig {
        on_error: ErrorPolicy::Abort,
        ..ConvertConfig::default()
    };
    let err = run(&input, &output, &config).unwrap_err();
    match err {
        ConvertError::Decode { line, .. } => assert_eq!(line, 2),
        other => panic!("unexpected error: {other}"),
    }
    assert!(!output.exists());
    assert!(!catastro_sinks::temp_path_for(&output).exists());
}

#[test]
fn test_chunk_threshold_does_not_change_content() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.cat");
    let lines: Vec<Vec<u8>> = (0..50)
        .map(|i| parcel_line(&format!("PC{:012}", i), i * 3))
        .collect();
    write_cat(&input, &lines);

    let mut contents = Vec::new();
    for (max_rows, pipelined) in [(1, false), (7, false), (7, true), (50, false), (1_000, true)] {
        let output = dir.path().join(format!("out_{}_{}.parquet", max_rows, pipelined));
        let config = ConvertConfig {
            chunk: ChunkLimits::rows(max_rows),
            pipelined,
            ..ConvertConfig::default()
        };
        let summary = run(&input, &output, &config).unwrap();
        assert_eq!(summary.chunks_written as usize, 50usize.div_ceil(max_rows));

        let (row_groups, batch) = read_back(&output);
        assert_eq!(row_groups as u64, summary.chunks_written);
        contents.push(batch);
    }
    for batch in &contents[1..] {
        assert_eq!(batch, &contents[0]);
    }
}

#[test]
fn test_byte_threshold_cuts_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.cat");
    let lines: Vec<Vec<u8>> = (0..10).map(|i| parcel_line("00000000000001", i)).collect();
    write_cat(&input, &lines);
    let output = dir.path().join("out.parquet");
    let config = ConvertConfig {
        chunk: ChunkLimits {
            max_rows: 1_000,
            max_bytes: 1,
        },
        ..ConvertConfig::default()
    };
    let summary = run(&input, &output, &config).unwrap();
    assert_eq!(summary.chunks_written, 10);
}

#[test]
fn test_folder_input_reads_files_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let folder = dir.path().join("cat");
    fs::create_dir(&folder).unwrap();
    write_cat(&folder.join("b.CAT"), &[parcel_line("BBBBBBBBBBBBBB", 2)]);
    write_cat(&folder.join("a.cat"), &[parcel_line("AAAAAAAAAAAAAA", 1)]);
    fs::write(folder.join("readme.txt"), b"11 not a cat file").unwrap();
    let output = dir.path().join("out.parquet");

    let summary = run(&folder, &output, &ConvertConfig::default()).unwrap();
    assert_eq!(summary.files.len(), 2);
    let (_, batch) = read_back(&output);
    let pc = column::<StringArray>(&batch, "pc");
    assert_eq!(pc.value(0), "AAAAAAAAAAAAAA");
    assert_eq!(pc.value(1), "BBBBBBBBBBBBBB");
}

#[test]
fn test_empty_folder_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.parquet");
    let err = run(dir.path(), &output, &ConvertConfig::default()).unwrap_err();
    assert!(matches!(err, ConvertError::Config(ref m) if m.contains("no .CAT files")));
    assert!(!output.exists());
}

#[test]
fn test_unknown_encoding_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.cat");
    write_cat(&input, &[parcel_line("00000000000001", 1)]);
    let config = ConvertConfig {
        encoding: "ebcdic-martian".into(),
        ..ConvertConfig::default()
    };
    let err = run(&input, &dir.path().join("out.parquet"), &config).unwrap_err();
    assert!(matches!(err, ConvertError::Config(_)));
}

#[test]
fn test_cancelled_run_discards_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.cat");
    write_cat(&input, &[parcel_line("00000000000001", 1)]);
    let output = dir.path().join("out.parquet");

    let cancel = CancellationToken::new();
    cancel.cancel();
    let request = ConversionRequest::new(&input, TableId::Parcel, &output);
    let err = convert(&request, &ConvertConfig::default(), &cancel).unwrap_err();
    assert!(matches!(err, ConvertError::Cancelled));
    assert!(!output.exists());
    assert!(!catastro_sinks::temp_path_for(&output).exists());
}

#[test]
fn test_no_matching_lines_still_writes_schema() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("units.cat");
    write_cat(&input, &[unit_line(), unit_line()]);
    let output = dir.path().join("out.parquet");

    let summary = run(&input, &output, &ConvertConfig::default()).unwrap();
    assert_eq!(summary.rows_written, 0);
    assert_eq!(summary.chunks_written, 0);
    let (row_groups, batch) = read_back(&output);
    assert_eq!(row_groups, 0);
    assert_eq!(batch.num_rows(), 0);
    assert_schema_follows_layout(&batch.schema(), &parcel_layout());
}

#[test]
fn test_artifact_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.cat");
    write_cat(&input, &[parcel_line("00000000000001", 1)]);
    let output = dir.path().join("out.parquet");
    run(&input, &output, &ConvertConfig::default()).unwrap();

    let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(&output).unwrap()).unwrap();
    let kv = builder
        .metadata()
        .file_metadata()
        .key_value_metadata()
        .cloned()
        .unwrap_or_default();
    let lookup = |key: &str| {
        kv.iter()
            .find(|entry| entry.key == key)
            .and_then(|entry| entry.value.clone())
    };
    assert_eq!(lookup("catastro.table").as_deref(), Some("11"));
    assert_eq!(lookup("catastro.layout_version").as_deref(), Some("1"));
    assert_eq!(lookup("catastro.source_encoding").as_deref(), Some("windows-1252"));
}

#[test]
fn test_multi_chunk_artifact_keeps_registry_schema() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.cat");
    let lines: Vec<Vec<u8>> = (0..5)
        .map(|i| parcel_line(&format!("PC{:012}", i), i))
        .collect();
    write_cat(&input, &lines);
    let output = dir.path().join("out.parquet");
    let config = ConvertConfig {
        chunk: ChunkLimits::rows(2),
        ..ConvertConfig::default()
    };

    let summary = run(&input, &output, &config).unwrap();
    assert_eq!(summary.chunks_written, 3);
    let (row_groups, batch) = read_back(&output);
    assert_eq!(row_groups, 3);
    assert_schema_follows_layout(&batch.schema(), &parcel_layout());
}

#[test]
fn test_common_elements_schema_and_shares() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("shares.cat");
    write_cat(
        &input,
        &[
            common_elements_line("0001001VK4700A", 125),
            parcel_line("0001001VK4700A", 1),
            common_elements_line("0001002VK4700A", 100_000),
            common_elements_line("0001003VK4700A", -5),
        ],
    );
    let output = dir.path().join("CAT16.parquet");
    let config = ConvertConfig {
        chunk: ChunkLimits::rows(1),
        pipelined: true,
        ..ConvertConfig::default()
    };
    let request = ConversionRequest::new(&input, TableId::CommonElements, &output);
    let summary = convert(&request, &config, &CancellationToken::new()).unwrap();
    assert_eq!(summary.rows_written, 3);
    assert_eq!(summary.chunks_written, 3);

    let layout = layout_for(TableId::CommonElements).unwrap();
    let (row_groups, batch) = read_back(&output);
    assert_eq!(row_groups, 3);
    assert_schema_follows_layout(&batch.schema(), &layout);

    let pr1 = batch.schema().field_with_name("pr1").unwrap().clone();
    assert_eq!(pr1.data_type(), &DataType::Decimal128(6, 3));
    let shares = column::<Decimal128Array>(&batch, "pr1");
    assert_eq!(shares.value_as_string(0), "0.125");
    assert_eq!(shares.value_as_string(1), "100.000");
    assert_eq!(shares.value_as_string(2), "-0.005");
    assert!(column::<Decimal128Array>(&batch, "pr2").is_null(0));
}

#[test]
fn test_directory_output_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.cat");
    write_cat(&input, &[parcel_line("00000000000001", 1)]);
    let output = dir.path().join("outdir");
    fs::create_dir(&output).unwrap();

    let err = run(&input, &output, &ConvertConfig::default()).unwrap_err();
    assert!(matches!(err, ConvertError::Config(ref m) if m.contains("directory")));
    assert!(output.is_dir());
    assert!(!catastro_sinks::temp_path_for(&output).exists());
}

#[test]
fn test_utf16_source_encoding_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("wide.cat");
    let text = String::from_utf8_lossy(&parcel_line("00000000000001", 1)).into_owned();
    let wide: Vec<u8> = text
        .encode_utf16()
        .chain("\n".encode_utf16())
        .flat_map(|unit| unit.to_le_bytes())
        .collect();
    fs::write(&input, wide).unwrap();
    let output = dir.path().join("out.parquet");
    let config = ConvertConfig {
        encoding: "utf-16le".into(),
        ..ConvertConfig::default()
    };

    let err = run(&input, &output, &config).unwrap_err();
    assert!(matches!(err, ConvertError::Config(ref m) if m.contains("ASCII-compatible")));
    assert!(!output.exists());
}
