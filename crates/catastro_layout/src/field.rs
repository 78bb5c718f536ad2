//! Positional field definitions.

use arrow::datatypes::{DataType, Field};
use serde::Serialize;
use std::collections::HashMap;

/// Field metadata key holding the semantic kind.
pub const KIND_METADATA_KEY: &str = "catastro.kind";
/// Field metadata key holding the zero-based byte offset.
pub const OFFSET_METADATA_KEY: &str = "catastro.offset";
/// Field metadata key holding the width (`*` for a trailing field).
pub const WIDTH_METADATA_KEY: &str = "catastro.width";

/// Digit order of an 8-digit positional date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DatePattern {
    /// YYYYMMDD
    Ymd,
    /// DDMMYYYY
    Dmy,
}

impl DatePattern {
    pub const WIDTH: usize = 8;

    /// Split 8 digits into (year, month, day) slices.
    pub fn split(self, digits: &str) -> Option<(&str, &str, &str)> {
        if digits.len() != Self::WIDTH || !digits.is_ascii() {
            return None;
        }
        Some(match self {
            DatePattern::Ymd => (&digits[0..4], &digits[4..6], &digits[6..8]),
            DatePattern::Dmy => (&digits[4..8], &digits[2..4], &digits[0..2]),
        })
    }
}

/// Semantic type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    /// Free text, trimmed on both sides.
    Text,
    /// Coded value (province, street type, use class...). Passed through as
    /// text; membership in the official code list is not checked.
    Code,
    /// Signed integer, zero padded.
    Integer,
    /// Signed fixed-point number whose last `scale` digits are fractional.
    Decimal { scale: u8 },
    /// Calendar date written as 8 digits.
    Date { pattern: DatePattern },
}

impl FieldKind {
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Code => "code",
            FieldKind::Integer => "integer",
            FieldKind::Decimal { .. } => "decimal",
            FieldKind::Date { .. } => "date",
        }
    }

    pub fn is_textual(&self) -> bool {
        matches!(self, FieldKind::Text | FieldKind::Code)
    }
}

/// How many bytes a field spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Extent {
    Fixed(usize),
    /// Everything from the offset to the end of the line.
    ToEnd,
}

/// One named field of a record layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDef {
    pub name: String,
    /// Zero-based start offset (inclusive).
    pub offset: usize,
    pub extent: Extent,
    pub kind: FieldKind,
    /// Whether an all-blank slice decodes to null.
    pub nullable: bool,
}

impl FieldDef {
    pub fn width(&self) -> Option<usize> {
        match self.extent {
            Extent::Fixed(width) => Some(width),
            Extent::ToEnd => None,
        }
    }

    /// Exclusive end offset, or `None` for a trailing field.
    pub fn end(&self) -> Option<usize> {
        self.width().map(|width| self.offset + width)
    }

    /// Arrow type this field is written as.
    pub fn data_type(&self) -> DataType {
        match self.kind {
            FieldKind::Text | FieldKind::Code => DataType::Utf8,
            FieldKind::Integer => DataType::Int64,
            FieldKind::Decimal { scale } => {
                let precision = self.width().unwrap_or(38).clamp(1, 38) as u8;
                DataType::Decimal128(precision, scale as i8)
            }
            FieldKind::Date { .. } => DataType::Date32,
        }
    }

    pub fn arrow_field(&self) -> Field {
        let width = self
            .width()
            .map(|w| w.to_string())
            .unwrap_or_else(|| "*".to_string());
        let metadata = HashMap::from([
            (KIND_METADATA_KEY.to_string(), self.kind.name().to_string()),
            (OFFSET_METADATA_KEY.to_string(), self.offset.to_string()),
            (WIDTH_METADATA_KEY.to_string(), width),
        ]);
        Field::new(&self.name, self.data_type(), self.nullable).with_metadata(metadata)
    }
}
