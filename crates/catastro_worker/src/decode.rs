//! Fixed-width record decoding.
//!
//! A line is sliced at the positions its [`Layout`] declares, each slice is
//! transcoded from the source encoding, trimmed, and converted to the
//! field's semantic type. Decoding is pure: the same bytes and layout always
//! produce the same row or the same error.

use crate::value::{DecodedRow, Value};
use catastro_layout::{DatePattern, Extent, FieldDef, FieldKind, Layout};
use chrono::NaiveDate;
use encoding_rs::{Encoding, WINDOWS_1252};
use std::borrow::Cow;
use std::sync::Arc;
use thiserror::Error;

/// Encoding used when none is configured.
pub const DEFAULT_ENCODING: &Encoding = WINDOWS_1252;

/// Why a single line could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("truncated record: {actual} positions, layout needs at least {required}")]
    Truncated { required: usize, actual: usize },

    #[error("field '{field}' is blank but not nullable")]
    MissingValue { field: String },

    #[error("field '{field}': invalid number '{value}'")]
    InvalidNumber { field: String, value: String },

    #[error("field '{field}': number '{value}' out of range")]
    NumberOutOfRange { field: String, value: String },

    #[error("field '{field}': invalid date '{value}'")]
    InvalidDate { field: String, value: String },
}

impl DecodeError {
    /// Field the error is attached to, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            DecodeError::Truncated { .. } => None,
            DecodeError::MissingValue { field }
            | DecodeError::InvalidNumber { field, .. }
            | DecodeError::NumberOutOfRange { field, .. }
            | DecodeError::InvalidDate { field, .. } => Some(field),
        }
    }
}

/// Decode one line with the default source encoding.
pub fn decode(line: &[u8], layout: &Layout) -> Result<DecodedRow, DecodeError> {
    decode_with(line, layout, DEFAULT_ENCODING)
}

/// Decode one line, transcoding slices from `encoding`.
///
/// Single-byte encodings are sliced by byte offset. Any other encoding is
/// transcoded first and sliced by character position, so offsets keep their
/// meaning when a character takes more than one byte.
pub fn decode_with(
    line: &[u8],
    layout: &Layout,
    encoding: &'static Encoding,
) -> Result<DecodedRow, DecodeError> {
    if encoding.is_single_byte() {
        decode_fields(layout, line.len(), move |start, end| {
            let bytes = match end {
                Some(end) => &line[start..end],
                None => &line[start..],
            };
            encoding.decode_without_bom_handling(bytes).0
        })
    } else {
        let (decoded, _) = encoding.decode_without_bom_handling(line);
        let text: &str = &decoded;
        let bounds: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let bounds = bounds.as_slice();
        let chars = bounds.len() - 1;
        decode_fields(layout, chars, move |start, end| {
            Cow::Borrowed(&text[bounds[start]..bounds[end.unwrap_or(chars)]])
        })
    }
}

fn decode_fields<'t, F>(layout: &Layout, width: usize, mut slice: F) -> Result<DecodedRow, DecodeError>
where
    F: FnMut(usize, Option<usize>) -> Cow<'t, str>,
{
    if width < layout.min_width() {
        return Err(DecodeError::Truncated {
            required: layout.min_width(),
            actual: width,
        });
    }

    let mut values = Vec::with_capacity(layout.len());
    for def in layout.fields() {
        let raw = match def.extent {
            Extent::Fixed(w) => slice(def.offset, Some(def.offset + w)),
            // min_width covers the tail offset
            Extent::ToEnd => slice(def.offset, None),
        };
        values.push(convert(def, &raw)?);
    }
    Ok(DecodedRow::new(values))
}

/// Convert one transcoded slice to the field's type.
pub fn convert(def: &FieldDef, raw: &str) -> Result<Value, DecodeError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return if def.nullable {
            Ok(Value::Null)
        } else {
            Err(DecodeError::MissingValue {
                field: def.name.clone(),
            })
        };
    }

    match def.kind {
        FieldKind::Text | FieldKind::Code => Ok(Value::Text(trimmed.to_string())),
        FieldKind::Integer => {
            let n = parse_signed(def, trimmed)?;
            i64::try_from(n)
                .map(Value::Int)
                .map_err(|_| out_of_range(def, trimmed))
        }
        FieldKind::Decimal { scale } => Ok(Value::Decimal {
            mantissa: parse_signed(def, trimmed)?,
            scale,
        }),
        FieldKind::Date { pattern } => parse_date(def, pattern, trimmed).map(Value::Date),
    }
}

fn parse_signed(def: &FieldDef, s: &str) -> Result<i128, DecodeError> {
    let (negative, digits) = match s.as_bytes()[0] {
        b'-' => (true, s[1..].trim_start()),
        b'+' => (false, s[1..].trim_start()),
        _ => (false, s),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DecodeError::InvalidNumber {
            field: def.name.clone(),
            value: s.to_string(),
        });
    }

    let mut n: i128 = 0;
    for b in digits.bytes() {
        n = n
            .checked_mul(10)
            .and_then(|n| n.checked_add(i128::from(b - b'0')))
            .ok_or_else(|| out_of_range(def, s))?;
    }
    Ok(if negative { -n } else { n })
}

fn parse_date(def: &FieldDef, pattern: DatePattern, s: &str) -> Result<NaiveDate, DecodeError> {
    let invalid = || DecodeError::InvalidDate {
        field: def.name.clone(),
        value: s.to_string(),
    };
    if !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let (y, m, d) = pattern.split(s).ok_or_else(invalid)?;
    let year: i32 = y.parse().map_err(|_| invalid())?;
    let month: u32 = m.parse().map_err(|_| invalid())?;
    let day: u32 = d.parse().map_err(|_| invalid())?;
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(invalid)
}

fn out_of_range(def: &FieldDef, s: &str) -> DecodeError {
    DecodeError::NumberOutOfRange {
        field: def.name.clone(),
        value: s.to_string(),
    }
}

/// Render a value back into its fixed-width slot.
///
/// Text is left aligned and space padded, numbers are zero padded, nulls are
/// blank. Returns `None` when the value does not fit the slot or does not
/// match the field kind. A trailing field is rendered unpadded.
pub fn encode_field(value: &Value, def: &FieldDef) -> Option<String> {
    let width = def.width();
    let rendered = match (value, def.kind) {
        (Value::Null, _) => return Some(" ".repeat(width.unwrap_or(0))),
        (Value::Text(s), FieldKind::Text | FieldKind::Code) => {
            let len = s.chars().count();
            match width {
                Some(w) if len > w => return None,
                Some(w) => format!("{}{}", s, " ".repeat(w - len)),
                None => s.clone(),
            }
        }
        (Value::Int(n), FieldKind::Integer) => pad_number(i128::from(*n), width)?,
        (Value::Decimal { mantissa, scale }, FieldKind::Decimal { scale: declared })
            if *scale == declared =>
        {
            pad_number(*mantissa, width)?
        }
        (Value::Date(date), FieldKind::Date { pattern }) => {
            let s = match pattern {
                DatePattern::Ymd => date.format("%Y%m%d").to_string(),
                DatePattern::Dmy => date.format("%d%m%Y").to_string(),
            };
            if s.len() != DatePattern::WIDTH {
                return None;
            }
            s
        }
        _ => return None,
    };
    Some(rendered)
}

fn pad_number(n: i128, width: Option<usize>) -> Option<String> {
    let digits = n.unsigned_abs().to_string();
    let Some(width) = width else {
        return Some(n.to_string());
    };
    let sign = usize::from(n < 0);
    if digits.len() + sign > width {
        return None;
    }
    let zeros = "0".repeat(width - digits.len() - sign);
    Some(if n < 0 {
        format!("-{}{}", zeros, digits)
    } else {
        format!("{}{}", zeros, digits)
    })
}

/// Render a whole row as a line (without terminator). Filler ranges are
/// written as spaces.
pub fn encode_row(row: &DecodedRow, layout: &Layout) -> Option<String> {
    if row.len() != layout.len() {
        return None;
    }
    let mut line = String::new();
    let mut position = 0;
    for (def, value) in layout.fields().iter().zip(row.values()) {
        if def.offset > position {
            line.push_str(&" ".repeat(def.offset - position));
        }
        let slot = encode_field(value, def)?;
        position = def.offset + slot.chars().count();
        line.push_str(&slot);
    }
    if position < layout.min_width() {
        line.push_str(&" ".repeat(layout.min_width() - position));
    }
    Some(line)
}

/// A layout bound to a source encoding.
#[derive(Debug, Clone)]
pub struct Decoder {
    layout: Arc<Layout>,
    encoding: &'static Encoding,
}

impl Decoder {
    pub fn new(layout: Arc<Layout>) -> Self {
        Self::with_encoding(layout, DEFAULT_ENCODING)
    }

    pub fn with_encoding(layout: Arc<Layout>, encoding: &'static Encoding) -> Self {
        Self { layout, encoding }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    pub fn decode(&self, line: &[u8]) -> Result<DecodedRow, DecodeError> {
        decode_with(line, &self.layout, self.encoding)
    }

    /// Render `row` as source bytes. `None` when a value does not fit or a
    /// character has no representation in the encoding.
    pub fn encode(&self, row: &DecodedRow) -> Option<Vec<u8>> {
        let line = encode_row(row, &self.layout)?;
        let (bytes, _, unmappable) = self.encoding.encode(&line);
        if unmappable {
            return None;
        }
        Some(bytes.into_owned())
    }
}
