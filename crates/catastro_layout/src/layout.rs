//! Layouts: ordered field lists and the schema derived from them.

use arrow::datatypes::{Field, Schema, SchemaRef};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::field::{DatePattern, Extent, FieldDef, FieldKind};
use crate::table::TableId;
use crate::LayoutError;

/// Schema metadata key holding the layout name.
pub const LAYOUT_METADATA_KEY: &str = "catastro.layout";

/// Largest precision an Arrow `Decimal128` can hold.
const MAX_DECIMAL_PRECISION: usize = 38;

/// A static slot of a layout declaration.
///
/// Slots are laid out back to back starting at byte 0, so a declaration only
/// states widths and the offsets follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Field {
        name: &'static str,
        width: usize,
        kind: FieldKind,
        nullable: bool,
    },
    /// Reserved range. Skipped by the decoder, absent from the schema.
    Filler(usize),
    /// Field running to the end of the line.
    Tail {
        name: &'static str,
        kind: FieldKind,
    },
}

impl Slot {
    pub const fn text(name: &'static str, width: usize) -> Self {
        Slot::Field {
            name,
            width,
            kind: FieldKind::Text,
            nullable: true,
        }
    }

    pub const fn code(name: &'static str, width: usize) -> Self {
        Slot::Field {
            name,
            width,
            kind: FieldKind::Code,
            nullable: true,
        }
    }

    pub const fn integer(name: &'static str, width: usize) -> Self {
        Slot::Field {
            name,
            width,
            kind: FieldKind::Integer,
            nullable: true,
        }
    }

    pub const fn decimal(name: &'static str, width: usize, scale: u8) -> Self {
        Slot::Field {
            name,
            width,
            kind: FieldKind::Decimal { scale },
            nullable: true,
        }
    }

    pub const fn date(name: &'static str, pattern: DatePattern) -> Self {
        Slot::Field {
            name,
            width: DatePattern::WIDTH,
            kind: FieldKind::Date { pattern },
            nullable: true,
        }
    }

    pub const fn filler(width: usize) -> Self {
        Slot::Filler(width)
    }

    pub const fn tail(name: &'static str, kind: FieldKind) -> Self {
        Slot::Tail { name, kind }
    }

    /// Same slot, but a blank value is a decode error instead of null.
    pub const fn required(self) -> Self {
        match self {
            Slot::Field {
                name, width, kind, ..
            } => Slot::Field {
                name,
                width,
                kind,
                nullable: false,
            },
            other => other,
        }
    }
}

#[derive(Debug, Clone)]
enum Entry {
    Field {
        name: String,
        width: usize,
        kind: FieldKind,
        nullable: bool,
    },
    Filler(usize),
    Tail {
        name: String,
        kind: FieldKind,
    },
}

impl From<Slot> for Entry {
    fn from(slot: Slot) -> Self {
        match slot {
            Slot::Field {
                name,
                width,
                kind,
                nullable,
            } => Entry::Field {
                name: name.to_string(),
                width,
                kind,
                nullable,
            },
            Slot::Filler(width) => Entry::Filler(width),
            Slot::Tail { name, kind } => Entry::Tail {
                name: name.to_string(),
                kind,
            },
        }
    }
}

/// Incremental layout declaration. Validation happens in [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct LayoutBuilder {
    name: String,
    table: Option<TableId>,
    entries: Vec<Entry>,
}

impl LayoutBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: None,
            entries: Vec::new(),
        }
    }

    /// Tag the layout with the record type it decodes.
    pub fn table(mut self, table: TableId) -> Self {
        self.table = Some(table);
        self
    }

    /// Nullable field of `width` bytes.
    pub fn field(mut self, name: impl Into<String>, width: usize, kind: FieldKind) -> Self {
        self.entries.push(Entry::Field {
            name: name.into(),
            width,
            kind,
            nullable: true,
        });
        self
    }

    /// Non-nullable field of `width` bytes.
    pub fn required_field(
        mut self,
        name: impl Into<String>,
        width: usize,
        kind: FieldKind,
    ) -> Self {
        self.entries.push(Entry::Field {
            name: name.into(),
            width,
            kind,
            nullable: false,
        });
        self
    }

    pub fn filler(mut self, width: usize) -> Self {
        self.entries.push(Entry::Filler(width));
        self
    }

    pub fn tail(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.entries.push(Entry::Tail {
            name: name.into(),
            kind,
        });
        self
    }

    pub fn slot(mut self, slot: Slot) -> Self {
        self.entries.push(slot.into());
        self
    }

    pub fn slots(mut self, slots: &[Slot]) -> Self {
        self.entries.extend(slots.iter().copied().map(Entry::from));
        self
    }

    pub fn build(self) -> Result<Layout, LayoutError> {
        let layout_name = self.name;
        let invalid = |field: &str, reason: String| LayoutError::InvalidField {
            layout: layout_name.clone(),
            field: field.to_string(),
            reason,
        };

        let mut fields = Vec::new();
        let mut names = HashSet::new();
        let mut offset = 0usize;
        let last = self.entries.len().saturating_sub(1);

        for (idx, entry) in self.entries.iter().enumerate() {
            let (name, extent, kind, nullable) = match entry {
                Entry::Filler(width) => {
                    if *width == 0 {
                        return Err(invalid("<filler>", "width must be positive".into()));
                    }
                    offset += width;
                    continue;
                }
                Entry::Field {
                    name,
                    width,
                    kind,
                    nullable,
                } => (name, Extent::Fixed(*width), *kind, *nullable),
                Entry::Tail { name, kind } => {
                    if idx != last {
                        return Err(LayoutError::TailNotLast {
                            layout: layout_name.clone(),
                        });
                    }
                    if !kind.is_textual() {
                        return Err(invalid(
                            name,
                            format!("trailing field must be text or code, got {}", kind.name()),
                        ));
                    }
                    (name, Extent::ToEnd, *kind, true)
                }
            };

            if name.trim().is_empty() {
                return Err(invalid(name, "name must not be empty".into()));
            }
            if !names.insert(name.clone()) {
                return Err(LayoutError::DuplicateField {
                    layout: layout_name.clone(),
                    field: name.clone(),
                });
            }
            if let Extent::Fixed(width) = extent {
                validate_width(name, width, kind).map_err(|reason| invalid(name, reason))?;
            }

            fields.push(FieldDef {
                name: name.clone(),
                offset,
                extent,
                kind,
                nullable,
            });
            if let Extent::Fixed(width) = extent {
                offset += width;
            }
        }

        if fields.is_empty() {
            return Err(LayoutError::Empty {
                layout: layout_name,
            });
        }

        Ok(Layout::from_parts(layout_name, self.table, fields, offset))
    }
}

fn validate_width(name: &str, width: usize, kind: FieldKind) -> Result<(), String> {
    if width == 0 {
        return Err("width must be positive".into());
    }
    match kind {
        FieldKind::Decimal { scale } => {
            if width > MAX_DECIMAL_PRECISION {
                return Err(format!(
                    "decimal width {} exceeds precision {}",
                    width, MAX_DECIMAL_PRECISION
                ));
            }
            if scale as usize > width {
                return Err(format!("scale {} exceeds width {}", scale, width));
            }
        }
        FieldKind::Date { .. } if width != DatePattern::WIDTH => {
            return Err(format!(
                "date field '{}' must be {} bytes wide, got {}",
                name,
                DatePattern::WIDTH,
                width
            ));
        }
        _ => {}
    }
    Ok(())
}

/// An immutable record layout.
///
/// Holds the named fields in declaration order and the Arrow schema derived
/// from them. The schema is computed once at construction and every chunk of
/// a run is checked against this exact value.
#[derive(Debug, Clone, Serialize)]
pub struct Layout {
    name: String,
    table: Option<TableId>,
    fields: Vec<FieldDef>,
    min_width: usize,
    #[serde(skip)]
    schema: SchemaRef,
}

impl Layout {
    pub fn builder(name: impl Into<String>) -> LayoutBuilder {
        LayoutBuilder::new(name)
    }

    fn from_parts(
        name: String,
        table: Option<TableId>,
        fields: Vec<FieldDef>,
        min_width: usize,
    ) -> Self {
        let arrow_fields: Vec<Field> = fields.iter().map(FieldDef::arrow_field).collect();
        let metadata = HashMap::from([(LAYOUT_METADATA_KEY.to_string(), name.clone())]);
        let schema = Arc::new(Schema::new_with_metadata(arrow_fields, metadata));
        Self {
            name,
            table,
            fields,
            min_width,
            schema,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> Option<TableId> {
        self.table
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Shortest line (in bytes) that holds every fixed slot.
    pub fn min_width(&self) -> usize {
        self.min_width
    }

    pub fn schema(&self) -> SchemaRef {
        Arc::clone(&self.schema)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }
}
