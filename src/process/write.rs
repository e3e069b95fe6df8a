// src/process/write.rs

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::config::GeoidStyle;
use crate::error::Result;
use crate::process::extract::TableData;
use crate::process::geo::GEOID_COLUMN;
use crate::schema::AppendixIndex;

/// Block Group shapefiles key on the last 12 characters of the Summary File
/// identifier (state + county + tract + block group).
const SHAPEFILE_GEOID_LEN: usize = 12;

fn trailing_chars(s: &str, n: usize) -> &str {
    match s.char_indices().rev().nth(n - 1) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}

/// Write one merged table as CSV: identifier column, then the estimate
/// block, then the margin block. Null cells come out empty.
pub fn write_table_csv(path: &Path, table: &TableData, style: GeoidStyle) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;

    let geoid_label = match style {
        GeoidStyle::Full => GEOID_COLUMN,
        GeoidStyle::Shapefile => "GEOID",
    };
    let width = 1 + table.estimate_labels.len() + table.margin_labels.len();
    let mut header: Vec<&str> = Vec::with_capacity(width);
    header.push(geoid_label);
    header.extend(table.estimate_labels.iter().map(String::as_str));
    header.extend(table.margin_labels.iter().map(String::as_str));
    writer.write_record(&header)?;

    for row in &table.rows {
        let geoid = match style {
            GeoidStyle::Full => row.geoid.as_str(),
            GeoidStyle::Shapefile => trailing_chars(&row.geoid, SHAPEFILE_GEOID_LEN),
        };
        let mut record: Vec<&str> = Vec::with_capacity(width);
        record.push(geoid);
        record.extend(row.estimates.iter().map(|v| v.as_deref().unwrap_or("")));
        record.extend(row.margins.iter().map(|v| v.as_deref().unwrap_or("")));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    debug!(path = %path.display(), rows = table.rows.len(), "wrote table");
    Ok(())
}

/// Write the `ACS All Tables.csv` catalog: one row per table in the appendix
/// directory, in directory order.
pub fn write_catalog(path: &Path, appendix: &AppendixIndex) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["Table Number", "Table Title"])?;
    for (table_id, title) in appendix.catalog() {
        writer.write_record([table_id, title])?;
    }
    writer.flush()?;
    debug!(path = %path.display(), "wrote table catalog");
    Ok(())
}
