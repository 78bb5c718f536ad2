//! `convert`: stream one record type from CAT input into a Parquet file.

use super::error::HelpfulError;
use super::output::{format_size, parse_size};
use super::{signals, EXIT_CANCELLED, EXIT_REJECTIONS};
use anyhow::Result;
use catastro_layout::TableId;
use catastro_sinks::Codec;
use catastro_worker::{
    convert, CancellationToken, ConversionRequest, ConversionSummary, ConvertConfig, ConvertError,
    ErrorPolicy, Outcome,
};
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};

/// Rejections listed in the human-readable summary.
const REJECTIONS_SHOWN: usize = 10;

#[derive(Args, Debug)]
pub struct ConvertArgs {
    /// CAT file, or folder whose .CAT files are read in name order
    #[arg(short, long, env = "CATASTRO_INPUT")]
    pub input: PathBuf,

    /// Record type to extract (11, 13, 14, 15, 16, 17)
    #[arg(short, long, env = "CATASTRO_TABLE")]
    pub table: String,

    /// Output Parquet file [default: CAT<table>.parquet next to the input]
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// TOML file with conversion defaults; flags override it
    #[arg(long, env = "CATASTRO_CONFIG")]
    pub config: Option<PathBuf>,

    /// Rows per chunk (one Parquet row group each)
    #[arg(long, env = "CATASTRO_CHUNK_ROWS")]
    pub chunk_rows: Option<usize>,

    /// Estimated bytes per chunk (e.g. 64MB)
    #[arg(long, env = "CATASTRO_CHUNK_BYTES", value_parser = parse_size)]
    pub chunk_bytes: Option<usize>,

    /// What to do with lines that fail to decode: skip or abort
    #[arg(long, env = "CATASTRO_ON_ERROR")]
    pub on_error: Option<ErrorPolicy>,

    /// Source encoding label (e.g. windows-1252, iso-8859-15, utf-8)
    #[arg(long, env = "CATASTRO_ENCODING")]
    pub encoding: Option<String>,

    /// Compression codec: snappy, zstd, gzip or none
    #[arg(long, env = "CATASTRO_COMPRESSION")]
    pub compression: Option<Codec>,

    /// Write chunks on a background thread while the next one is decoded
    #[arg(long)]
    pub pipelined: bool,

    /// Rejected lines logged individually before only counting
    #[arg(long, env = "CATASTRO_MAX_LOGGED_REJECTIONS")]
    pub max_logged_rejections: Option<usize>,

    /// Print the run summary as JSON
    #[arg(long)]
    pub json: bool,
}

impl ConvertArgs {
    /// File settings first, then explicit flags on top.
    fn build_config(&self) -> Result<ConvertConfig> {
        let mut config = match &self.config {
            Some(path) => ConvertConfig::load(path)
                .map_err(|e| HelpfulError::config_file(path, &e.to_string()))?,
            None => ConvertConfig::default(),
        };

        if let Some(rows) = self.chunk_rows {
            config.chunk.max_rows = rows;
        }
        if let Some(bytes) = self.chunk_bytes {
            config.chunk.max_bytes = bytes;
        }
        if let Some(policy) = self.on_error {
            config.on_error = policy;
        }
        if let Some(encoding) = &self.encoding {
            config.encoding = encoding.clone();
        }
        if let Some(codec) = self.compression {
            config.compression = codec;
        }
        if self.pipelined {
            config.pipelined = true;
        }
        if let Some(max) = self.max_logged_rejections {
            config.max_logged_rejections = max;
        }
        Ok(config)
    }

    fn request(&self) -> Result<ConversionRequest> {
        let table: TableId = self
            .table
            .parse()
            .map_err(|_| HelpfulError::unknown_table(&self.table))?;
        let output = self
            .output
            .clone()
            .unwrap_or_else(|| ConversionRequest::default_output(&self.input, table));
        Ok(ConversionRequest::new(self.input.clone(), table, output))
    }
}

#[derive(Serialize)]
struct ConvertReport<'a> {
    status: &'static str,
    outcome: Outcome,
    #[serde(flatten)]
    summary: &'a ConversionSummary,
}

pub fn run(args: ConvertArgs) -> Result<ExitCode> {
    let request = args.request()?;
    let config = args.build_config()?;

    let cancel = CancellationToken::new();
    if let Err(e) = signals::install(&cancel) {
        warn!("Interrupts will not stop the run cleanly: {:#}", e);
    }

    info!(
        "Chunks of up to {} rows / {}, {} compression, encoding {}",
        config.chunk.max_rows,
        format_size(config.chunk.max_bytes as u64),
        config.compression,
        config.encoding
    );

    let summary = match convert(&request, &config, &cancel) {
        Ok(summary) => summary,
        Err(ConvertError::Cancelled) => {
            if args.json {
                println!("{}", serde_json::json!({ "status": "cancelled" }));
            } else {
                eprintln!("Cancelled; no output was written.");
            }
            return Ok(ExitCode::from(EXIT_CANCELLED));
        }
        Err(e) => return Err(HelpfulError::from_convert(&e).into()),
    };

    if args.json {
        let report = ConvertReport {
            status: "ok",
            outcome: summary.outcome(),
            summary: &summary,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&summary);
    }

    Ok(match summary.outcome() {
        Outcome::Clean => ExitCode::SUCCESS,
        Outcome::WithRejections => ExitCode::from(EXIT_REJECTIONS),
    })
}

fn print_summary(summary: &ConversionSummary) {
    println!(
        "Converted table {} ({}) -> {}",
        summary.table,
        summary.table.description(),
        summary.output.display()
    );
    println!("  Files:          {}", summary.files.len());
    println!("  Lines read:     {}", summary.lines_read);
    println!("  Lines matched:  {}", summary.lines_matched);
    println!("  Rows written:   {}", summary.rows_written);
    println!("  Rows rejected:  {}", summary.rows_rejected);
    println!("  Chunks:         {}", summary.chunks_written);
    println!("  Input size:     {}", format_size(summary.bytes_read));
    println!("  Output size:    {}", format_size(summary.output_bytes));
    println!("  Elapsed:        {} ms", summary.elapsed_ms);

    if !summary.rejections.is_empty() {
        println!();
        println!("Rejected lines:");
        for rejection in summary.rejections.iter().take(REJECTIONS_SHOWN) {
            println!(
                "  {}:{}: {}",
                rejection.file.display(),
                rejection.line,
                rejection.reason
            );
        }
        let hidden = summary.rows_rejected.saturating_sub(REJECTIONS_SHOWN as u64);
        if hidden > 0 {
            println!("  ... and {} more", hidden);
        }
    }
}
