// src/process/merge.rs

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::config::KeyPolicy;
use crate::error::{AcsError, Result};
use crate::process::geo::GeographyRecord;
use crate::process::slice::DataRow;

/// One output row: the geographic identifier replaces the logical record
/// number, which exists only to drive the join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedRow {
    pub geoid: String,
    pub estimates: Vec<Option<String>>,
    pub margins: Vec<Option<String>>,
}

#[derive(Debug)]
pub struct MergedRows {
    pub rows: Vec<MergedRow>,
    /// Repeated keys dropped under `KeyPolicy::KeepFirst`.
    pub duplicates: usize,
}

/// Inner-join data rows to the filtered geography on logical record number.
///
/// Output order follows the geography file. Data rows with no geography
/// partner are the rows at other summary levels and are dropped without
/// comment; a geography row with no data partner is dropped the same way. An
/// empty result is a valid outcome, not an error.
pub fn merge_rows(
    geography: &[GeographyRecord],
    data: Vec<DataRow>,
    key_policy: KeyPolicy,
) -> Result<MergedRows> {
    let mut duplicates = 0usize;
    let mut by_key: HashMap<String, DataRow> = HashMap::with_capacity(data.len());
    for row in data {
        if by_key.contains_key(&row.logrecno) {
            match key_policy {
                KeyPolicy::Abort => {
                    return Err(AcsError::DuplicateKey {
                        logrecno: row.logrecno,
                        side: "data",
                    })
                }
                KeyPolicy::KeepFirst => {
                    duplicates += 1;
                    continue;
                }
            }
        }
        by_key.insert(row.logrecno.clone(), row);
    }

    let mut seen: HashSet<&str> = HashSet::with_capacity(geography.len());
    let mut rows = Vec::with_capacity(geography.len().min(by_key.len()));
    for record in geography {
        if !seen.insert(record.logrecno.as_str()) {
            match key_policy {
                KeyPolicy::Abort => {
                    return Err(AcsError::DuplicateKey {
                        logrecno: record.logrecno.clone(),
                        side: "geography",
                    })
                }
                KeyPolicy::KeepFirst => {
                    duplicates += 1;
                    continue;
                }
            }
        }
        if let Some(row) = by_key.remove(&record.logrecno) {
            rows.push(MergedRow {
                geoid: record.geoid.clone(),
                estimates: row.estimates,
                margins: row.margins,
            });
        }
    }

    debug!(
        joined = rows.len(),
        unmatched_data = by_key.len(),
        "merged data rows with geography"
    );
    Ok(MergedRows { rows, duplicates })
}
