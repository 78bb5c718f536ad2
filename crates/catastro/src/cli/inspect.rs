//! `tables` and `layout`: describe the built-in record layouts.

use super::error::HelpfulError;
use super::output::print_table;
use anyhow::{Context, Result};
use catastro_layout::{layout_for, Extent, Layout, TableId};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct TableInfo {
    code: &'static str,
    description: &'static str,
    layout: String,
    columns: usize,
    min_width: usize,
}

fn describe_tables() -> Result<Vec<TableInfo>> {
    TableId::ALL
        .into_iter()
        .map(|table| {
            let layout = layout_for(table)
                .with_context(|| format!("Built-in layout for table {} is invalid", table))?;
            Ok(TableInfo {
                code: table.code(),
                description: table.description(),
                layout: layout.name().to_string(),
                columns: layout.len(),
                min_width: layout.min_width(),
            })
        })
        .collect()
}

pub fn run_tables(json: bool) -> Result<()> {
    let tables = describe_tables()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&tables)?);
        return Ok(());
    }

    let rows = tables
        .iter()
        .map(|t| {
            vec![
                t.code.to_string(),
                t.description.to_string(),
                t.columns.to_string(),
                t.min_width.to_string(),
            ]
        })
        .collect();
    print_table(&["Type", "Description", "Columns", "Min width"], rows);
    Ok(())
}

fn resolve(code: &str) -> Result<Layout> {
    let table: TableId = code
        .parse()
        .map_err(|_| HelpfulError::unknown_table(code))?;
    Ok(layout_for(table)?)
}

pub fn run_layout(code: &str, json: bool) -> Result<()> {
    let layout = resolve(code)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&layout)?);
        return Ok(());
    }

    println!(
        "{} ({}), minimum line width {}",
        layout.name(),
        layout
            .table()
            .map(|t| t.description())
            .unwrap_or("custom layout"),
        layout.min_width()
    );
    let rows = layout
        .fields()
        .iter()
        .enumerate()
        .map(|(i, f)| {
            let width = match f.extent {
                Extent::Fixed(w) => w.to_string(),
                Extent::ToEnd => "to end".to_string(),
            };
            vec![
                (i + 1).to_string(),
                f.name.clone(),
                f.offset.to_string(),
                width,
                f.kind.name().to_string(),
                f.data_type().to_string(),
                if f.nullable { "yes" } else { "no" }.to_string(),
            ]
        })
        .collect();
    print_table(
        &["#", "Field", "Offset", "Width", "Kind", "Type", "Nullable"],
        rows,
    );
    Ok(())
}
