// src/process/slice.rs

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::config::{KeyPolicy, RowPolicy};
use crate::error::{AcsError, Result};
use crate::process::{cell, summary_reader};
use crate::schema::TableDescriptor;

/// Join-key label in the sequence templates. The data files themselves carry
/// no header row, so the position always comes from the template.
pub const LOGRECNO_LABEL: &str = "LOGRECNO";

/// One logical record's slice of a sequence: estimates and margins paired by
/// logical record number, in estimate-file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRow {
    pub logrecno: String,
    pub estimates: Vec<Option<String>>,
    pub margins: Vec<Option<String>>,
}

/// A table's columns cut out of one sequence's estimate and margin files.
#[derive(Debug)]
pub struct SequenceSlice {
    /// Column names from the template, `E: ` prefixed.
    pub estimate_labels: Vec<String>,
    /// Column names from the template, `M: ` prefixed.
    pub margin_labels: Vec<String>,
    pub rows: Vec<DataRow>,
    /// Malformed or unpaired rows dropped under `RowPolicy::Skip`.
    pub skipped: usize,
    /// Repeated keys dropped under `KeyPolicy::KeepFirst`.
    pub duplicates: usize,
}

/// Cut `descriptor`'s column range out of a sequence's estimate and margin
/// files and pair the two by logical record number.
///
/// Appendix positions are 1-based and inclusive, counted on the full data row
/// including the bookkeeping columns, so the slice is `start-1..end` on both
/// the template and every row. A range that does not fit the template is an
/// appendix/data version mismatch and fails with `ColumnRange` before any row
/// is read.
pub fn slice_sequence(
    descriptor: &TableDescriptor,
    template: &[String],
    estimate_file: &str,
    estimate_text: &str,
    margin_file: &str,
    margin_text: &str,
    row_policy: RowPolicy,
    key_policy: KeyPolicy,
) -> Result<SequenceSlice> {
    let start = descriptor.start_column;
    let end = descriptor.end_column;
    if start < 1 || end > template.len() {
        return Err(AcsError::ColumnRange {
            sequence: descriptor.sequence.clone(),
            start,
            end,
            available: template.len(),
        });
    }
    let logrecno_idx = template
        .iter()
        .position(|name| name.trim().eq_ignore_ascii_case(LOGRECNO_LABEL))
        .ok_or_else(|| {
            AcsError::invalid_metadata(
                format!("sequence {} template", descriptor.sequence),
                format!("no '{LOGRECNO_LABEL}' column"),
            )
        })?;

    let names = &template[start - 1..end];
    let estimate_labels: Vec<String> = names.iter().map(|n| format!("E: {n}")).collect();
    let margin_labels: Vec<String> = names.iter().map(|n| format!("M: {n}")).collect();

    // Slice one file's rows down to (record number, key, values). Ordered for
    // the estimate side; the margin side is keyed into a map below.
    let parse = |file: &str, text: &str| -> Result<(Vec<(u64, String, Vec<Option<String>>)>, usize)> {
        let mut rows = Vec::new();
        let mut skipped = 0usize;
        let mut rdr = summary_reader(text);
        for (i, result) in rdr.records().enumerate() {
            let record = result?;
            let number = (i + 1) as u64;

            if record.len() != template.len() {
                match row_policy {
                    RowPolicy::Abort => {
                        return Err(AcsError::malformed_row(
                            file,
                            number,
                            format!(
                                "expected {} columns, found {}",
                                template.len(),
                                record.len()
                            ),
                        ))
                    }
                    RowPolicy::Skip => {
                        skipped += 1;
                        continue;
                    }
                }
            }
            let logrecno = record.get(logrecno_idx).unwrap_or("").trim();
            if logrecno.is_empty() {
                match row_policy {
                    RowPolicy::Abort => {
                        return Err(AcsError::malformed_row(
                            file,
                            number,
                            "empty logical record number",
                        ))
                    }
                    RowPolicy::Skip => {
                        skipped += 1;
                        continue;
                    }
                }
            }

            let values: Vec<Option<String>> = (start - 1..end)
                .map(|col| cell(record.get(col).unwrap_or("")))
                .collect();
            rows.push((number, logrecno.to_string(), values));
        }
        Ok((rows, skipped))
    };

    let (estimates, margins) = rayon::join(
        || parse(estimate_file, estimate_text),
        || parse(margin_file, margin_text),
    );
    let (estimate_rows, mut skipped) = estimates?;
    let (margin_rows, margin_skipped) = margins?;
    skipped += margin_skipped;

    let mut duplicates = 0usize;
    let mut margin_map: HashMap<String, (u64, Vec<Option<String>>)> = HashMap::new();
    for (number, logrecno, values) in margin_rows {
        if margin_map.contains_key(&logrecno) {
            match key_policy {
                KeyPolicy::Abort => {
                    return Err(AcsError::DuplicateKey {
                        logrecno,
                        side: "margin",
                    })
                }
                KeyPolicy::KeepFirst => {
                    duplicates += 1;
                    continue;
                }
            }
        }
        margin_map.insert(logrecno, (number, values));
    }

    let mut rows = Vec::with_capacity(estimate_rows.len());
    let mut seen: HashSet<String> = HashSet::with_capacity(estimate_rows.len());
    for (number, logrecno, estimates) in estimate_rows {
        // a repeated estimate key would otherwise look like a missing margin
        // partner, since the first occurrence consumes the margin row
        if seen.contains(&logrecno) {
            match key_policy {
                KeyPolicy::Abort => {
                    return Err(AcsError::DuplicateKey {
                        logrecno,
                        side: "estimate",
                    })
                }
                KeyPolicy::KeepFirst => {
                    duplicates += 1;
                    continue;
                }
            }
        }
        seen.insert(logrecno.clone());
        match margin_map.remove(&logrecno) {
            Some((_, margins)) => rows.push(DataRow {
                logrecno,
                estimates,
                margins,
            }),
            None => match row_policy {
                RowPolicy::Abort => {
                    return Err(AcsError::malformed_row(
                        estimate_file,
                        number,
                        format!("no margin row for logical record number {logrecno}"),
                    ))
                }
                RowPolicy::Skip => skipped += 1,
            },
        }
    }
    if !margin_map.is_empty() {
        match row_policy {
            RowPolicy::Abort => {
                let (logrecno, number) = margin_map
                    .iter()
                    .min_by_key(|(_, (number, _))| *number)
                    .map(|(key, (number, _))| (key.clone(), *number))
                    .unwrap_or_default();
                return Err(AcsError::malformed_row(
                    margin_file,
                    number,
                    format!("no estimate row for logical record number {logrecno}"),
                ));
            }
            RowPolicy::Skip => skipped += margin_map.len(),
        }
    }

    if skipped > 0 {
        warn!(
            table = %descriptor.table_id,
            sequence = %descriptor.sequence,
            skipped,
            "dropped malformed or unpaired rows"
        );
    }
    debug!(
        table = %descriptor.table_id,
        sequence = %descriptor.sequence,
        rows = rows.len(),
        columns = names.len(),
        "sliced sequence"
    );
    Ok(SequenceSlice {
        estimate_labels,
        margin_labels,
        rows,
        skipped,
        duplicates,
    })
}
