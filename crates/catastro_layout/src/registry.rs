//! Official CAT record layouts.
//!
//! Offsets follow the cadastral exchange format for the alphanumeric CAT
//! file. Reserved ranges are declared as fillers so the minimum record width
//! still covers them. Ranges that only carry reserved or derived data after
//! the last named field (`cucm`, `modl`, `cpt`) are not declared at all.
//!
//! Bump [`LAYOUT_VERSION`] whenever a declaration below changes; the version
//! is stamped into every artifact.

use crate::field::FieldKind;
use crate::layout::{Layout, Slot};
use crate::table::TableId;
use crate::LayoutError;

pub const LAYOUT_VERSION: u32 = 1;

const TIPO_REG: Slot = Slot::code("tipo_reg", 2).required();

/// Type 11: cadastral parcel.
const PARCEL: &[Slot] = &[
    TIPO_REG,
    Slot::filler(21),
    Slot::code("cd", 2),
    Slot::code("cmc", 3),
    Slot::code("cn", 2),
    Slot::code("pc", 14),
    Slot::filler(6),
    Slot::code("cp", 2),
    Slot::text("np", 25),
    Slot::code("cmc2", 3),
    Slot::code("cm", 3),
    Slot::text("nm", 40),
    Slot::text("nem", 30),
    Slot::code("cv", 5),
    Slot::code("tv", 5),
    Slot::text("nv", 25),
    Slot::code("pnp", 4),
    Slot::code("plp", 1),
    Slot::code("snp", 4),
    Slot::code("slp", 1),
    Slot::code("km", 5),
    Slot::code("bl", 4),
    Slot::filler(8),
    Slot::text("td", 25),
    Slot::code("dp", 5),
    Slot::code("dm", 2),
    Slot::code("cma", 3),
    Slot::code("czc", 2),
    Slot::code("cpo", 3),
    Slot::code("cpa", 5),
    Slot::code("cpaj", 5),
    Slot::text("npa", 30),
    Slot::integer("sup", 10),
    Slot::integer("sct", 7),
    Slot::integer("ssr", 7),
    Slot::integer("sbr", 7),
    Slot::integer("sc", 7),
    Slot::decimal("xcen", 9, 2),
    Slot::decimal("ycen", 10, 2),
    // reserved, BICE reference, BICE name
    Slot::filler(229),
    Slot::filler(20),
    Slot::filler(65),
    Slot::tail("srs", FieldKind::Code),
];

/// Type 13: construction unit.
const CONSTRUCTION_UNIT: &[Slot] = &[
    TIPO_REG,
    Slot::filler(21),
    Slot::code("cd", 2),
    Slot::code("cmc", 3),
    Slot::code("cn", 2),
    Slot::code("pc", 14),
    Slot::code("cuc", 4),
    Slot::filler(2),
    Slot::code("cp", 2),
    Slot::text("np", 25),
    Slot::code("cmc2", 3),
    Slot::code("cm", 3),
    Slot::text("nm", 40),
    Slot::text("nem", 30),
    Slot::code("cv", 5),
    Slot::code("tv", 5),
    Slot::text("nv", 25),
    Slot::code("pnp", 4),
    Slot::code("plp", 1),
    Slot::code("snp", 4),
    Slot::code("slp", 1),
    Slot::code("km", 5),
    Slot::filler(12),
    Slot::text("td", 25),
    Slot::filler(55),
    Slot::code("ac", 4),
    Slot::code("iacons", 1),
    Slot::code("so", 7),
    Slot::code("lf", 5),
    Slot::filler(97),
];

/// Type 14: construction.
const CONSTRUCTION: &[Slot] = &[
    TIPO_REG,
    Slot::filler(21),
    Slot::code("cd", 2),
    Slot::code("cmc", 3),
    Slot::filler(2),
    Slot::code("pc", 14),
    Slot::code("noec", 4),
    Slot::filler(2),
    Slot::code("nobf", 4),
    Slot::code("cuc", 4),
    Slot::code("bl", 4),
    Slot::code("es", 2),
    Slot::code("pt", 3),
    Slot::code("pu", 3),
    Slot::code("cd2", 3),
    Slot::code("tr", 1),
    Slot::code("ar", 4),
    Slot::code("aec", 4),
    Slot::code("ili", 1),
    Slot::code("stl", 7),
    Slot::code("spt", 7),
    Slot::code("sil", 7),
    Slot::code("tip", 5),
    Slot::filler(2),
];

/// Type 15: real estate property.
const REAL_ESTATE: &[Slot] = &[
    TIPO_REG,
    Slot::filler(21),
    Slot::code("cd", 2),
    Slot::code("cmc", 3),
    Slot::code("cn", 2),
    Slot::code("pc", 14),
    Slot::code("car", 4),
    Slot::code("cc1", 1),
    Slot::code("cc2", 1),
    Slot::code("nfbi", 8),
    Slot::code("iia", 15),
    Slot::code("nfv", 19),
    Slot::code("cp", 2),
    Slot::text("np", 25),
    Slot::code("cmc2", 3),
    Slot::code("cm", 3),
    Slot::text("nm", 40),
    Slot::text("nem", 30),
    Slot::code("cv", 5),
    Slot::code("tv", 5),
    Slot::text("nv", 25),
    Slot::code("pnp", 4),
    Slot::code("plp", 1),
    Slot::code("snp", 4),
    Slot::code("slp", 1),
    Slot::code("km", 5),
    Slot::code("bl", 4),
    Slot::code("es", 2),
    Slot::code("pt", 3),
    Slot::code("pu", 3),
    Slot::text("td", 25),
    Slot::code("dp", 5),
    Slot::code("dm", 2),
    Slot::code("cma", 3),
    Slot::code("czc", 2),
    Slot::code("cpo", 3),
    Slot::code("cpa", 5),
    Slot::code("cpaj", 5),
    Slot::text("npa", 30),
    Slot::filler(30),
    Slot::code("noe", 4),
    Slot::code("ant", 4),
    Slot::filler(52),
    Slot::code("grbice/coduso", 1),
    Slot::filler(13),
    Slot::code("sfc", 10),
    Slot::code("sfs", 10),
];

/// Type 16: distribution of common elements. Fifteen repeated blocks of
/// (element number, share in thousandths, reserved).
const COMMON_ELEMENTS: &[Slot] = &[
    TIPO_REG,
    Slot::filler(21),
    Slot::code("cd", 2),
    Slot::code("cmc", 3),
    Slot::filler(2),
    Slot::code("pc", 14),
    Slot::code("noev", 4),
    Slot::code("ccsp", 2),
    Slot::code("nreg", 4),
    Slot::code("nc1", 4),
    Slot::decimal("pr1", 6, 3),
    Slot::filler(49),
    Slot::code("nc2", 4),
    Slot::decimal("pr2", 6, 3),
    Slot::filler(49),
    Slot::code("nc3", 4),
    Slot::decimal("pr3", 6, 3),
    Slot::filler(49),
    Slot::code("nc4", 4),
    Slot::decimal("pr4", 6, 3),
    Slot::filler(49),
    Slot::code("nc5", 4),
    Slot::decimal("pr5", 6, 3),
    Slot::filler(49),
    Slot::code("nc6", 4),
    Slot::decimal("pr6", 6, 3),
    Slot::filler(49),
    Slot::code("nc7", 4),
    Slot::decimal("pr7", 6, 3),
    Slot::filler(49),
    Slot::code("nc8", 4),
    Slot::decimal("pr8", 6, 3),
    Slot::filler(49),
    Slot::code("nc9", 4),
    Slot::decimal("pr9", 6, 3),
    Slot::filler(49),
    Slot::code("nc10", 4),
    Slot::decimal("pr10", 6, 3),
    Slot::filler(49),
    Slot::code("nc11", 4),
    Slot::decimal("pr11", 6, 3),
    Slot::filler(49),
    Slot::code("nc12", 4),
    Slot::decimal("pr12", 6, 3),
    Slot::filler(49),
    Slot::code("nc13", 4),
    Slot::decimal("pr13", 6, 3),
    Slot::filler(49),
    Slot::code("nc14", 4),
    Slot::decimal("pr14", 6, 3),
    Slot::filler(49),
    Slot::code("nc15", 4),
    Slot::decimal("pr15", 6, 3),
    Slot::filler(49),
];

/// Type 17: cultivation.
const CULTIVATION: &[Slot] = &[
    TIPO_REG,
    Slot::filler(21),
    Slot::code("cd", 2),
    Slot::code("cmc", 3),
    Slot::code("cn", 2),
    Slot::code("pc", 14),
    Slot::code("cspr", 4),
    Slot::filler(2),
    Slot::code("nobf", 4),
    Slot::code("tspr", 1),
    Slot::code("ssp", 10),
    Slot::code("ccc", 2),
    Slot::text("dcc", 40),
    Slot::code("ip", 2),
    Slot::filler(17),
];

fn slots(table: TableId) -> &'static [Slot] {
    match table {
        TableId::Parcel => PARCEL,
        TableId::ConstructionUnit => CONSTRUCTION_UNIT,
        TableId::Construction => CONSTRUCTION,
        TableId::RealEstate => REAL_ESTATE,
        TableId::CommonElements => COMMON_ELEMENTS,
        TableId::Cultivation => CULTIVATION,
    }
}

/// Build the official layout for `table`.
pub fn layout_for(table: TableId) -> Result<Layout, LayoutError> {
    Layout::builder(format!("CAT{}", table.code()))
        .table(table)
        .slots(slots(table))
        .build()
}

/// Resolve a table code ("11", "13", ...) to its layout.
///
/// Unknown codes fail with [`LayoutError::UnknownTable`].
pub fn lookup(code: &str) -> Result<Layout, LayoutError> {
    layout_for(code.parse()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Extent;

    #[test]
    fn test_every_official_layout_builds() {
        for table in TableId::ALL {
            let layout = layout_for(table).unwrap();
            assert_eq!(layout.table(), Some(table));
            assert_eq!(layout.fields()[0].name, "tipo_reg");
            assert!(!layout.fields()[0].nullable);
        }
    }

    #[test]
    fn test_minimum_widths() {
        let widths: Vec<(TableId, usize)> = TableId::ALL
            .into_iter()
            .map(|t| (t, layout_for(t).unwrap().min_width()))
            .collect();
        assert_eq!(
            widths,
            vec![
                (TableId::Parcel, 666),
                (TableId::ConstructionUnit, 409),
                (TableId::Construction, 111),
                (TableId::RealEstate, 461),
                (TableId::CommonElements, 939),
                (TableId::Cultivation, 126),
            ]
        );
    }

    #[test]
    fn test_parcel_offsets() {
        let layout = lookup("11").unwrap();
        let pc = layout.field("pc").unwrap();
        assert_eq!((pc.offset, pc.width()), (30, Some(14)));
        let sup = layout.field("sup").unwrap();
        assert_eq!((sup.offset, sup.kind), (295, FieldKind::Integer));
        let ycen = layout.field("ycen").unwrap();
        assert_eq!(ycen.offset, 342);
        assert_eq!(ycen.kind, FieldKind::Decimal { scale: 2 });
        let srs = layout.field("srs").unwrap();
        assert_eq!((srs.offset, srs.extent), (666, Extent::ToEnd));
        assert_eq!(layout.len(), 37);
    }

    #[test]
    fn test_common_element_shares() {
        let layout = lookup("16").unwrap();
        let shares: Vec<usize> = layout
            .fields()
            .iter()
            .filter(|f| f.name.starts_with("pr"))
            .map(|f| f.offset)
            .collect();
        assert_eq!(shares.len(), 15);
        assert_eq!(shares[0], 58);
        assert_eq!(shares[14], 884);
        assert!(shares.windows(2).all(|w| w[1] - w[0] == 59));
    }

    #[test]
    fn test_column_counts() {
        let counts: Vec<usize> = TableId::ALL
            .into_iter()
            .map(|t| layout_for(t).unwrap().len())
            .collect();
        assert_eq!(counts, vec![37, 25, 20, 43, 37, 12]);
    }

    #[test]
    fn test_lookup_unknown_table() {
        assert_eq!(
            lookup("99").unwrap_err(),
            LayoutError::UnknownTable("99".into())
        );
    }
}
