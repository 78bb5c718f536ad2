//! Decoded values and rows.

use catastro_layout::Layout;
use chrono::NaiveDate;

/// One typed field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Null,
    Text(String),
    Int(i64),
    /// Fixed-point number: `mantissa / 10^scale`.
    Decimal { mantissa: i128, scale: u8 },
    Date(NaiveDate),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Text(_) => "text",
            Value::Int(_) => "integer",
            Value::Decimal { .. } => "decimal",
            Value::Date(_) => "date",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Lossy float view of a numeric value, for display and tests.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Decimal { mantissa, scale } => {
                Some(*mantissa as f64 / 10f64.powi(i32::from(*scale)))
            }
            _ => None,
        }
    }

    /// Rough in-memory footprint once appended to a column builder.
    pub fn estimated_bytes(&self) -> usize {
        match self {
            Value::Null => 1,
            Value::Text(s) => s.len() + 4,
            Value::Int(_) => 8,
            Value::Decimal { .. } => 16,
            Value::Date(_) => 4,
        }
    }
}

/// A decoded record: one value per layout field, in layout order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRow {
    values: Vec<Value>,
}

impl DecodedRow {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Value of the field called `name` in `layout`.
    pub fn get_named(&self, layout: &Layout, name: &str) -> Option<&Value> {
        let index = layout.column_names().position(|n| n == name)?;
        self.values.get(index)
    }

    /// Pair each value with its field name.
    pub fn named<'a>(&'a self, layout: &'a Layout) -> impl Iterator<Item = (&'a str, &'a Value)> {
        layout.column_names().zip(self.values.iter())
    }

    pub fn estimated_bytes(&self) -> usize {
        self.values.iter().map(Value::estimated_bytes).sum()
    }
}
