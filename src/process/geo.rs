// src/process/geo.rs

use tracing::{debug, warn};

use crate::config::RowPolicy;
use crate::error::{AcsError, Result};
use crate::process::summary_reader;

/// Template labels of the geography columns the pipeline needs. Positions
/// come from the template, never from hard-coded offsets.
pub const SUMMARY_LEVEL_COLUMN: &str = "Summary Level";
pub const LOGRECNO_COLUMN: &str = "Logical Record Number";
pub const GEOID_COLUMN: &str = "Geographic Identifier";

/// A geography row reduced to the join key and the output identifier;
/// everything else in the geography file is dropped before the join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeographyRecord {
    pub logrecno: String,
    pub geoid: String,
}

/// Geography rows at the target summary level, in file order.
#[derive(Debug)]
pub struct FilteredGeography {
    pub records: Vec<GeographyRecord>,
    /// Malformed rows dropped under `RowPolicy::Skip`.
    pub skipped: usize,
}

/// Apply the geography template to the state's geography file and keep only
/// rows at `summary_level`. Filtering happens here, before any join, so
/// non-target geographies cannot leak into table output.
pub fn filter_geography(
    file: &str,
    text: &str,
    template: &[String],
    summary_level: &str,
    policy: RowPolicy,
) -> Result<FilteredGeography> {
    let find = |label: &str| -> Result<usize> {
        template
            .iter()
            .position(|name| name.trim().eq_ignore_ascii_case(label))
            .ok_or_else(|| {
                AcsError::invalid_metadata(
                    "geography template",
                    format!("no '{label}' column"),
                )
            })
    };
    let level_idx = find(SUMMARY_LEVEL_COLUMN)?;
    let logrecno_idx = find(LOGRECNO_COLUMN)?;
    let geoid_idx = find(GEOID_COLUMN)?;

    let mut records = Vec::new();
    let mut skipped = 0usize;
    let mut rdr = summary_reader(text);
    for (i, result) in rdr.records().enumerate() {
        let record = result?;
        let number = (i + 1) as u64;

        if record.len() != template.len() {
            match policy {
                RowPolicy::Abort => {
                    return Err(AcsError::malformed_row(
                        file,
                        number,
                        format!("expected {} columns, found {}", template.len(), record.len()),
                    ))
                }
                RowPolicy::Skip => {
                    skipped += 1;
                    continue;
                }
            }
        }

        if record.get(level_idx).map(str::trim) != Some(summary_level) {
            continue;
        }

        let logrecno = record.get(logrecno_idx).unwrap_or("").trim();
        let geoid = record.get(geoid_idx).unwrap_or("").trim();
        if logrecno.is_empty() || geoid.is_empty() {
            match policy {
                RowPolicy::Abort => {
                    return Err(AcsError::malformed_row(
                        file,
                        number,
                        "empty logical record number or geographic identifier",
                    ))
                }
                RowPolicy::Skip => {
                    skipped += 1;
                    continue;
                }
            }
        }

        records.push(GeographyRecord {
            logrecno: logrecno.to_string(),
            geoid: geoid.to_string(),
        });
    }

    if skipped > 0 {
        warn!(file, skipped, "skipped malformed geography rows");
    }
    debug!(file, kept = records.len(), summary_level, "filtered geography");
    Ok(FilteredGeography { records, skipped })
}
