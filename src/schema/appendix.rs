// src/schema/appendix.rs

use csv::ReaderBuilder;
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use tracing::{debug, instrument};

use super::types::{normalize_sequence, TableDescriptor};
use crate::error::{AcsError, Result};

const TABLE_NUMBER: &str = "table number";
const TABLE_TITLE: &str = "table title";
const RESTRICTION: &str = "geography restriction";
const SEQUENCE_NUMBER: &str = "sequence number";
const START_POSITION: &str = "start position";
const END_POSITION: &str = "end position";

/// The Appendix A table directory: one row per (table, sequence) pair,
/// answering where a table id lives and which columns it spans.
#[derive(Debug)]
pub struct AppendixIndex {
    entries: Vec<TableDescriptor>,
}

impl AppendixIndex {
    /// Load the directory from its CSV export. Columns are located by the
    /// Bureau's header names; every entry is validated to a usable
    /// `start <= end` range at load time.
    #[instrument(level = "debug", skip_all, fields(path = %path.as_ref().display()))]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<AppendixIndex> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(AcsError::missing_file_hint(
                path,
                "export Appendix A of the Summary File documentation to CSV",
            ));
        }
        let file_label = path.display().to_string();

        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(File::open(path)?);

        let headers = rdr.headers()?.clone();
        let col = |name: &str| -> Result<usize> {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
                .ok_or_else(|| {
                    AcsError::invalid_metadata(&file_label, format!("no '{name}' column"))
                })
        };

        let id_col = col(TABLE_NUMBER)?;
        let title_col = col(TABLE_TITLE)?;
        let seq_col = col(SEQUENCE_NUMBER)?;
        let start_col = col(START_POSITION)?;
        let end_col = col(END_POSITION)?;
        // Restriction is informational; tolerate its absence.
        let restr_col = col(RESTRICTION).ok();

        let mut entries = Vec::new();
        for (i, result) in rdr.records().enumerate() {
            let record = result?;
            let table_id = record.get(id_col).unwrap_or("").trim();
            if table_id.is_empty() {
                continue;
            }

            let field = |idx: usize| record.get(idx).unwrap_or("").trim();
            let start = parse_position(field(start_col)).ok_or_else(|| {
                AcsError::invalid_metadata(
                    &file_label,
                    format!("row {}: bad start position {:?}", i + 2, field(start_col)),
                )
            })?;
            let end = parse_position(field(end_col)).ok_or_else(|| {
                AcsError::invalid_metadata(
                    &file_label,
                    format!("row {}: bad end position {:?}", i + 2, field(end_col)),
                )
            })?;
            if start == 0 || start > end {
                return Err(AcsError::invalid_metadata(
                    &file_label,
                    format!("row {}: invalid column range {start}-{end} for {table_id}", i + 2),
                ));
            }

            // spreadsheet exports render the sequence as "3.0" as readily as
            // "3"; parse it numerically before padding to the 4-digit key
            let sequence = parse_position(field(seq_col)).ok_or_else(|| {
                AcsError::invalid_metadata(
                    &file_label,
                    format!("row {}: bad sequence number {:?}", i + 2, field(seq_col)),
                )
            })?;

            let restriction = restr_col
                .map(field)
                .filter(|s| !s.is_empty())
                .map(str::to_string);

            entries.push(TableDescriptor {
                table_id: table_id.to_string(),
                title: field(title_col).to_string(),
                restriction,
                sequence: normalize_sequence(&sequence.to_string()),
                start_column: start,
                end_column: end,
            });
        }

        debug!(entries = entries.len(), "loaded appendix directory");
        Ok(AppendixIndex { entries })
    }

    /// All descriptors for `table_id`, matched exactly against the directory's
    /// own convention. Most tables map to one sequence; large ones span
    /// several and return one descriptor per appendix row, in directory order.
    pub fn resolve(&self, table_id: &str) -> Result<Vec<TableDescriptor>> {
        let matches: Vec<TableDescriptor> = self
            .entries
            .iter()
            .filter(|e| e.table_id == table_id)
            .cloned()
            .collect();
        if matches.is_empty() {
            return Err(AcsError::TableNotFound {
                table_id: table_id.to_string(),
            });
        }
        Ok(matches)
    }

    /// Distinct table ids in directory order.
    pub fn table_ids(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.entries
            .iter()
            .filter(|e| seen.insert(e.table_id.as_str()))
            .map(|e| e.table_id.clone())
            .collect()
    }

    /// Distinct (table id, title) pairs in directory order, for the catalog.
    pub fn catalog(&self) -> Vec<(&str, &str)> {
        let mut seen = HashSet::new();
        self.entries
            .iter()
            .filter(|e| seen.insert(e.table_id.as_str()))
            .map(|e| (e.table_id.as_str(), e.title.as_str()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Spreadsheet exports sometimes render integer cells as "7.0"; accept both.
fn parse_position(raw: &str) -> Option<usize> {
    if let Ok(n) = raw.parse::<usize>() {
        return Some(n);
    }
    let f = raw.parse::<f64>().ok()?;
    if f.fract() == 0.0 && f >= 0.0 {
        Some(f as usize)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_appendix(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    const HEADER: &str =
        "Table Number,Table Title,Geography Restriction,Sequence Number,Start Position,End Position\n";

    #[test]
    fn resolves_a_single_sequence_table() {
        let f = write_appendix(&format!(
            "{HEADER}B01001,SEX BY AGE,,2,7,55\nB01002,MEDIAN AGE BY SEX,,3,100,102\n"
        ));
        let index = AppendixIndex::load(f.path()).unwrap();

        let descriptors = index.resolve("B01002").unwrap();
        assert_eq!(descriptors.len(), 1);
        let d = &descriptors[0];
        assert_eq!(d.sequence, "0003");
        assert_eq!(d.start_column, 100);
        assert_eq!(d.end_column, 102);
        assert_eq!(d.title, "MEDIAN AGE BY SEX");
        assert!(d.restriction.is_none());
    }

    #[test]
    fn table_spanning_sequences_yields_one_descriptor_per_row() {
        let f = write_appendix(&format!(
            "{HEADER}B24121,DETAILED OCCUPATION,,104,7,250\nB24121,DETAILED OCCUPATION,,105,7,277\n"
        ));
        let index = AppendixIndex::load(f.path()).unwrap();

        let descriptors = index.resolve("B24121").unwrap();
        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].sequence, "0104");
        assert_eq!(descriptors[1].sequence, "0105");
        // both usable ranges
        assert!(descriptors.iter().all(|d| d.start_column <= d.end_column));
    }

    #[test]
    fn unknown_table_is_not_found() {
        let f = write_appendix(&format!("{HEADER}B01001,SEX BY AGE,,2,7,55\n"));
        let index = AppendixIndex::load(f.path()).unwrap();
        match index.resolve("B99999") {
            Err(AcsError::TableNotFound { table_id }) => assert_eq!(table_id, "B99999"),
            other => panic!("expected TableNotFound, got {other:?}"),
        }
    }

    #[test]
    fn match_is_exact_and_case_sensitive() {
        let f = write_appendix(&format!("{HEADER}B01001,SEX BY AGE,,2,7,55\n"));
        let index = AppendixIndex::load(f.path()).unwrap();
        assert!(index.resolve("b01001").is_err());
        assert!(index.resolve("B01001 ").is_err());
    }

    #[test]
    fn inverted_range_is_rejected_at_load() {
        let f = write_appendix(&format!("{HEADER}B01001,SEX BY AGE,,2,55,7\n"));
        match AppendixIndex::load(f.path()) {
            Err(AcsError::InvalidMetadata { reason, .. }) => {
                assert!(reason.contains("invalid column range"))
            }
            other => panic!("expected InvalidMetadata, got {other:?}"),
        }
    }

    #[test]
    fn spreadsheet_float_positions_are_accepted() {
        let f = write_appendix(&format!("{HEADER}B01001,SEX BY AGE,,2.0,7.0,55.0\n"));
        let index = AppendixIndex::load(f.path()).unwrap();
        let d = &index.resolve("B01001").unwrap()[0];
        assert_eq!(d.sequence, "0002");
        assert_eq!((d.start_column, d.end_column), (7, 55));
    }

    #[test]
    fn non_numeric_sequence_is_invalid_metadata() {
        let f = write_appendix(&format!("{HEADER}B01001,SEX BY AGE,,two,7,55\n"));
        match AppendixIndex::load(f.path()) {
            Err(AcsError::InvalidMetadata { reason, .. }) => {
                assert!(reason.contains("bad sequence number"))
            }
            other => panic!("expected InvalidMetadata, got {other:?}"),
        }
    }

    #[test]
    fn restriction_is_carried_through() {
        let f = write_appendix(&format!(
            "{HEADER}B08406,SEX OF WORKERS,Urban Areas Only,31,7,57\n"
        ));
        let index = AppendixIndex::load(f.path()).unwrap();
        let d = &index.resolve("B08406").unwrap()[0];
        assert_eq!(d.restriction.as_deref(), Some("Urban Areas Only"));
    }

    #[test]
    fn catalog_and_ids_are_distinct_in_order() {
        let f = write_appendix(&format!(
            "{HEADER}B01001,SEX BY AGE,,2,7,55\nB24121,DETAILED OCCUPATION,,104,7,250\nB24121,DETAILED OCCUPATION,,105,7,277\n"
        ));
        let index = AppendixIndex::load(f.path()).unwrap();
        assert_eq!(index.len(), 3);
        assert_eq!(index.table_ids(), vec!["B01001", "B24121"]);
        assert_eq!(
            index.catalog(),
            vec![
                ("B01001", "SEX BY AGE"),
                ("B24121", "DETAILED OCCUPATION")
            ]
        );
    }

    #[test]
    fn missing_directory_file_is_reported_with_hint() {
        match AppendixIndex::load("/nonexistent/appendix.csv") {
            Err(AcsError::MissingFile { hint, .. }) => assert!(hint.is_some()),
            other => panic!("expected MissingFile, got {other:?}"),
        }
    }

    #[test]
    fn missing_header_column_is_invalid_metadata() {
        let f = write_appendix("Table Number,Table Title\nB01001,SEX BY AGE\n");
        assert!(matches!(
            AppendixIndex::load(f.path()),
            Err(AcsError::InvalidMetadata { .. })
        ));
    }
}
