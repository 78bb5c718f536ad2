//! Record-type identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::LayoutError;

/// A supported CAT record type.
///
/// The numeric code doubles as the line discriminator: every line of a CAT
/// file starts with the two-digit code of its record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TableId {
    /// Type 11: cadastral parcel (finca)
    #[serde(rename = "11")]
    Parcel,
    /// Type 13: construction unit
    #[serde(rename = "13")]
    ConstructionUnit,
    /// Type 14: construction
    #[serde(rename = "14")]
    Construction,
    /// Type 15: real estate property (inmueble)
    #[serde(rename = "15")]
    RealEstate,
    /// Type 16: distribution of common elements
    #[serde(rename = "16")]
    CommonElements,
    /// Type 17: cultivation
    #[serde(rename = "17")]
    Cultivation,
}

impl TableId {
    pub const ALL: [TableId; 6] = [
        TableId::Parcel,
        TableId::ConstructionUnit,
        TableId::Construction,
        TableId::RealEstate,
        TableId::CommonElements,
        TableId::Cultivation,
    ];

    pub fn code(self) -> &'static str {
        match self {
            TableId::Parcel => "11",
            TableId::ConstructionUnit => "13",
            TableId::Construction => "14",
            TableId::RealEstate => "15",
            TableId::CommonElements => "16",
            TableId::Cultivation => "17",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            TableId::Parcel => "cadastral parcel",
            TableId::ConstructionUnit => "construction unit",
            TableId::Construction => "construction",
            TableId::RealEstate => "real estate property",
            TableId::CommonElements => "distribution of common elements",
            TableId::Cultivation => "cultivation",
        }
    }

    /// Leading bytes that identify a line of this record type.
    pub fn discriminator(self) -> &'static [u8] {
        self.code().as_bytes()
    }

    /// True if `line` belongs to this record type.
    pub fn matches(self, line: &[u8]) -> bool {
        line.starts_with(self.discriminator())
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for TableId {
    type Err = LayoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim();
        TableId::ALL
            .into_iter()
            .find(|table| table.code() == code)
            .ok_or_else(|| LayoutError::UnknownTable(code.to_string()))
    }
}
