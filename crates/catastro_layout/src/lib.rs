//! CAT record layouts
//!
//! A CAT file interleaves several record types, one per line. The first two
//! bytes of every line name the record type ("11", "13", ...) and the rest of
//! the line is a fixed-width sequence of fields whose offsets are defined by
//! the official cadastral exchange format.
//!
//! This crate holds those definitions as immutable [`Layout`] values:
//!
//! - [`TableId`]: the closed set of supported record types
//! - [`FieldDef`] / [`FieldKind`]: one positional field and its semantic type
//! - [`Layout`] / [`LayoutBuilder`]: an ordered field list plus the derived
//!   Arrow schema, fixed once per run
//! - [`registry`]: the hand-curated official layouts
//!
//! Layouts carry no mutable state. Build one at the start of a run and share
//! it by reference (or `Arc`) with every decoder.

pub mod field;
pub mod layout;
pub mod registry;
pub mod table;

pub use field::{DatePattern, Extent, FieldDef, FieldKind};
pub use layout::{Layout, LayoutBuilder, Slot};
pub use registry::{layout_for, lookup, LAYOUT_VERSION};
pub use table::TableId;

use thiserror::Error;

/// Errors raised while resolving or building a layout.
///
/// All of these are configuration errors: they surface before any input is
/// read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("unknown table '{0}' (supported: 11, 13, 14, 15, 16, 17)")]
    UnknownTable(String),

    #[error("layout '{layout}' has no fields")]
    Empty { layout: String },

    #[error("layout '{layout}': duplicate field name '{field}'")]
    DuplicateField { layout: String, field: String },

    #[error("layout '{layout}': field '{field}' is invalid: {reason}")]
    InvalidField {
        layout: String,
        field: String,
        reason: String,
    },

    #[error("layout '{layout}': a trailing field must be the last slot")]
    TailNotLast { layout: String },
}
