//! Input discovery and line streaming.

use crate::decode::{DecodeError, Decoder};
use crate::value::DecodedRow;
use catastro_layout::TableId;
use std::fs;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};

/// Extension of CAT files, compared case-insensitively.
pub const CAT_EXTENSION: &str = "cat";

/// Resolve an input path to the ordered list of files to read.
///
/// A file is used as-is. A directory contributes every `*.cat` file directly
/// inside it, sorted by path. A directory without any is an error.
pub fn resolve_inputs(input: &Path) -> Result<Vec<PathBuf>, String> {
    let metadata = fs::metadata(input)
        .map_err(|e| format!("input '{}' is not accessible: {}", input.display(), e))?;

    if metadata.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }

    let entries = fs::read_dir(input)
        .map_err(|e| format!("cannot list input folder '{}': {}", input.display(), e))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry
            .map_err(|e| format!("cannot list input folder '{}': {}", input.display(), e))?;
        let path = entry.path();
        let is_cat = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(CAT_EXTENSION));
        if is_cat && path.is_file() {
            files.push(path);
        }
    }

    if files.is_empty() {
        return Err(format!(
            "no .CAT files found in input folder '{}'",
            input.display()
        ));
    }
    files.sort();
    Ok(files)
}

/// Counters kept while streaming one input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub lines_read: u64,
    pub lines_matched: u64,
    pub bytes_read: u64,
}

impl StreamStats {
    pub fn absorb(&mut self, other: StreamStats) {
        self.lines_read += other.lines_read;
        self.lines_matched += other.lines_matched;
        self.bytes_read += other.bytes_read;
    }
}

/// One line whose discriminator matched the requested table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatLine {
    /// 1-based line number in its file.
    pub number: u64,
    /// Byte offset of the line start.
    pub offset: u64,
    /// Line content without the terminator.
    pub bytes: Vec<u8>,
}

/// Lazily yields the lines of one table from a CAT stream. Other record
/// types are counted and skipped.
pub struct RecordStream<R> {
    reader: R,
    table: TableId,
    buf: Vec<u8>,
    stats: StreamStats,
}

impl<R: BufRead> RecordStream<R> {
    pub fn new(reader: R, table: TableId) -> Self {
        Self {
            reader,
            table,
            buf: Vec::with_capacity(1024),
            stats: StreamStats::default(),
        }
    }

    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    /// Byte offset of the next unread line.
    pub fn offset(&self) -> u64 {
        self.stats.bytes_read
    }

    /// Decode each matched line as it is read.
    pub fn decoded(self, decoder: &Decoder) -> DecodedStream<'_, R> {
        DecodedStream {
            lines: self,
            decoder,
        }
    }
}

impl<R: BufRead> Iterator for RecordStream<R> {
    type Item = io::Result<CatLine>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            let offset = self.stats.bytes_read;
            let n = match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(n) => n,
                Err(e) => return Some(Err(e)),
            };
            self.stats.bytes_read += n as u64;
            self.stats.lines_read += 1;

            let mut line = self.buf.as_slice();
            if let Some(rest) = line.strip_suffix(b"\n") {
                line = rest;
            }
            if let Some(rest) = line.strip_suffix(b"\r") {
                line = rest;
            }

            if self.table.matches(line) {
                self.stats.lines_matched += 1;
                return Some(Ok(CatLine {
                    number: self.stats.lines_read,
                    offset,
                    bytes: line.to_vec(),
                }));
            }
        }
    }
}

/// A matched line together with its decode outcome.
#[derive(Debug)]
pub struct DecodedRecord {
    pub number: u64,
    pub offset: u64,
    pub outcome: Result<DecodedRow, DecodeError>,
}

/// [`RecordStream`] with decoding applied.
pub struct DecodedStream<'d, R> {
    lines: RecordStream<R>,
    decoder: &'d Decoder,
}

impl<R: BufRead> DecodedStream<'_, R> {
    pub fn stats(&self) -> StreamStats {
        self.lines.stats()
    }

    pub fn offset(&self) -> u64 {
        self.lines.offset()
    }
}

impl<R: BufRead> Iterator for DecodedStream<'_, R> {
    type Item = io::Result<DecodedRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let line = match self.lines.next()? {
            Ok(line) => line,
            Err(e) => return Some(Err(e)),
        };
        Some(Ok(DecodedRecord {
            number: line.number,
            offset: line.offset,
            outcome: self.decoder.decode(&line.bytes),
        }))
    }
}
