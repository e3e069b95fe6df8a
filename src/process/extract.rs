// src/process/extract.rs

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, error, info, instrument, warn};

use crate::config::{GeoidStyle, KeyPolicy, RowPolicy};
use crate::error::Result;
use crate::process::geo::{filter_geography, GeographyRecord};
use crate::process::merge::{merge_rows, MergedRow};
use crate::process::slice::slice_sequence;
use crate::process::write::write_table_csv;
use crate::process::StateArchive;
use crate::schema::{TableDescriptor, TemplateStore};

/// Knobs shared by every table built in a run.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub summary_level: String,
    pub row_policy: RowPolicy,
    pub key_policy: KeyPolicy,
    pub geoid_style: GeoidStyle,
}

/// A fully merged table, ready to write: geography-ordered rows with the
/// estimate block first and the margin block second.
#[derive(Debug)]
pub struct TableData {
    pub estimate_labels: Vec<String>,
    pub margin_labels: Vec<String>,
    pub rows: Vec<MergedRow>,
}

/// One table's result plus the row bookkeeping the state summary needs.
#[derive(Debug)]
pub struct TableOutcome {
    /// `None` when the merged table had no usable data.
    pub table: Option<TableData>,
    pub skipped_rows: usize,
    pub duplicate_keys: usize,
}

/// Counters reported once per state after its table loop finishes.
#[derive(Debug, Default)]
pub struct StateSummary {
    pub state: String,
    pub built: usize,
    pub dropped_empty: usize,
    pub failed: usize,
    pub skipped_rows: usize,
    pub duplicate_keys: usize,
}

/// Build one table from its appendix descriptors: slice each sequence the
/// table spans, pair estimates with margins, join to the filtered geography,
/// and column-join multi-sequence tables on the geographic identifier.
///
/// Returns a `None` table when the result has no row with any value, so the
/// caller can count it as dropped instead of writing an empty CSV.
pub fn extract_table(
    archive: &mut StateArchive,
    table_id: &str,
    descriptors: &[TableDescriptor],
    templates: &TemplateStore,
    geography: &[GeographyRecord],
    opts: &ExtractOptions,
) -> Result<TableOutcome> {
    if let Some(restriction) = descriptors.iter().find_map(|d| d.restriction.as_deref()) {
        warn!(
            table = table_id,
            restriction, "table is restricted to specific geographies and may come out empty"
        );
    }

    let mut skipped_rows = 0usize;
    let mut duplicate_keys = 0usize;
    let mut estimate_labels = Vec::new();
    let mut margin_labels = Vec::new();
    let mut rows: Option<Vec<MergedRow>> = None;

    for descriptor in descriptors {
        let template = templates.sequence(&descriptor.sequence)?;
        let files = archive.read_sequence(&descriptor.sequence)?;
        let slice = slice_sequence(
            descriptor,
            template,
            &files.estimate_name,
            &files.estimate_text,
            &files.margin_name,
            &files.margin_text,
            opts.row_policy,
            opts.key_policy,
        )?;
        skipped_rows += slice.skipped;
        duplicate_keys += slice.duplicates;
        estimate_labels.extend(slice.estimate_labels);
        margin_labels.extend(slice.margin_labels);

        let merged = merge_rows(geography, slice.rows, opts.key_policy)?;
        duplicate_keys += merged.duplicates;

        rows = Some(match rows {
            None => merged.rows,
            // a table spanning several sequences joins column-wise on the
            // geographic identifier; both sides are already geography-ordered
            Some(base) => {
                let mut by_geoid: HashMap<String, MergedRow> = merged
                    .rows
                    .into_iter()
                    .map(|row| (row.geoid.clone(), row))
                    .collect();
                let mut joined = Vec::with_capacity(base.len());
                let mut unmatched = 0usize;
                for mut row in base {
                    match by_geoid.remove(&row.geoid) {
                        Some(extra) => {
                            row.estimates.extend(extra.estimates);
                            row.margins.extend(extra.margins);
                            joined.push(row);
                        }
                        None => unmatched += 1,
                    }
                }
                unmatched += by_geoid.len();
                if unmatched > 0 {
                    warn!(
                        table = table_id,
                        sequence = %descriptor.sequence,
                        unmatched,
                        "dropped geographies present in only one sequence"
                    );
                    skipped_rows += unmatched;
                }
                joined
            }
        });
    }

    let rows = rows.unwrap_or_default();
    let has_data = rows
        .iter()
        .any(|row| row.estimates.iter().chain(row.margins.iter()).any(Option::is_some));
    let table = if has_data {
        Some(TableData {
            estimate_labels,
            margin_labels,
            rows,
        })
    } else {
        debug!(table = table_id, "table has no usable data");
        None
    };
    Ok(TableOutcome {
        table,
        skipped_rows,
        duplicate_keys,
    })
}

/// Build every planned table for one state and write the results under
/// `out_dir` as `<State><TableId>.csv`. A failed table is logged and counted;
/// it does not stop the remaining tables.
#[instrument(skip_all, fields(state = %state))]
pub fn process_state(
    state: &str,
    zip_path: &Path,
    plan: &[(String, Vec<TableDescriptor>)],
    templates: &TemplateStore,
    opts: &ExtractOptions,
    out_dir: &Path,
) -> Result<StateSummary> {
    let mut archive = StateArchive::open(zip_path)?;

    let geo_label = archive.geo_entry().unwrap_or("geography").to_string();
    let geo_text = archive.read_geography()?;
    let geography = filter_geography(
        &geo_label,
        &geo_text,
        templates.geo()?,
        &opts.summary_level,
        opts.row_policy,
    )?;
    if geography.records.is_empty() {
        warn!(
            summary_level = %opts.summary_level,
            "no geographies at the target summary level; all tables will be empty"
        );
    }
    info!(
        geographies = geography.records.len(),
        tables = plan.len(),
        "processing state"
    );

    let mut summary = StateSummary {
        state: state.to_string(),
        skipped_rows: geography.skipped,
        ..Default::default()
    };

    let step = (plan.len() / 10).max(1);
    for (n, (table_id, descriptors)) in plan.iter().enumerate() {
        match extract_table(
            &mut archive,
            table_id,
            descriptors,
            templates,
            &geography.records,
            opts,
        ) {
            Ok(outcome) => {
                summary.skipped_rows += outcome.skipped_rows;
                summary.duplicate_keys += outcome.duplicate_keys;
                match outcome.table {
                    Some(table) => {
                        let path = out_dir.join(format!("{state}{table_id}.csv"));
                        match write_table_csv(&path, &table, opts.geoid_style) {
                            Ok(()) => summary.built += 1,
                            Err(e) => {
                                error!(table = %table_id, error = %e, "failed to write table");
                                summary.failed += 1;
                            }
                        }
                    }
                    None => summary.dropped_empty += 1,
                }
            }
            Err(e) => {
                error!(table = %table_id, error = %e, "table failed");
                summary.failed += 1;
            }
        }
        if (n + 1) % step == 0 || n + 1 == plan.len() {
            info!(done = n + 1, total = plan.len(), "table progress");
        }
    }

    info!(
        built = summary.built,
        dropped_empty = summary.dropped_empty,
        failed = summary.failed,
        skipped_rows = summary.skipped_rows,
        duplicate_keys = summary.duplicate_keys,
        "state complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::testutil::zip_fixture;
    use std::fs;
    use tempfile::tempdir;
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    fn init_test_logging() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("info,acstables::process=debug")),
            )
            .with_test_writer()
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }

    const GEO_TEMPLATE: &str = "FILEID,STUSAB,SUMLEVEL,COMPONENT,LOGRECNO,GEOID,NAME\n\
        File Identification,State Postal Abbreviation,Summary Level,Geographic Component,Logical Record Number,Geographic Identifier,Area Name\n";

    // Bureau layout: 6 bookkeeping columns, fillers, then the three median-age
    // cells at full-row positions 100-102.
    fn median_age_template() -> String {
        let mut codes: Vec<String> = ["FILEID", "FILETYPE", "STUSAB", "CHARITER", "SEQUENCE", "LOGRECNO"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mut labels = codes.clone();
        for i in 7..=99 {
            codes.push(format!("B00000_{i:03}"));
            labels.push(format!("Filler {i}"));
        }
        for (code, label) in [
            ("B01002_001", "Median age Total:"),
            ("B01002_002", "Median age Male"),
            ("B01002_003", "Median age Female"),
        ] {
            codes.push(code.to_string());
            labels.push(label.to_string());
        }
        format!("{}\n{}\n", codes.join(","), labels.join(","))
    }

    fn data_row(logrecno: &str, values: [&str; 3]) -> String {
        let mut cells: Vec<String> = ["ACSSF", "2015e5", "co", "000", "0003"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        cells.push(logrecno.to_string());
        for _ in 7..=99 {
            cells.push(".".to_string());
        }
        cells.extend(values.iter().map(|v| v.to_string()));
        cells.join(",")
    }

    fn descriptor(table_id: &str, sequence: &str, start: usize, end: usize) -> TableDescriptor {
        TableDescriptor {
            table_id: table_id.into(),
            title: format!("{table_id} title"),
            restriction: None,
            sequence: sequence.into(),
            start_column: start,
            end_column: end,
        }
    }

    fn options() -> ExtractOptions {
        ExtractOptions {
            summary_level: "150".to_string(),
            row_policy: RowPolicy::Skip,
            key_policy: KeyPolicy::Abort,
            geoid_style: GeoidStyle::Full,
        }
    }

    /// Fixture matching the published B01002 layout for one block group plus
    /// a tract-level row that shares the data files.
    fn median_age_state() -> (tempfile::TempDir, tempfile::NamedTempFile) {
        let templates_dir = tempdir().unwrap();
        fs::write(templates_dir.path().join("2015_SFGeoFileTemplate.csv"), GEO_TEMPLATE).unwrap();
        fs::write(templates_dir.path().join("Seq0003.csv"), median_age_template()).unwrap();

        let geo = "\
ACSSF,CO,140,00,00050,14000US08001000100,Census Tract 1
ACSSF,CO,150,00,00101,15000US080010001001,Block Group 1
";
        let estimates = format!(
            "{}\n{}\n",
            data_row("00050", ["33.0", "31.5", "34.1"]),
            data_row("00101", ["36.2", "34.8", "37.5"])
        );
        let margins = format!(
            "{}\n{}\n",
            data_row("00050", ["2.1", "2.6", "2.2"]),
            data_row("00101", ["1.2", "2.0", "1.8"])
        );
        let archive = zip_fixture(&[
            ("g20155co.csv", geo),
            ("e20155co0003000.txt", estimates.as_str()),
            ("m20155co0003000.txt", margins.as_str()),
        ]);
        (templates_dir, archive)
    }

    #[test]
    fn builds_the_median_age_table() {
        init_test_logging();
        let (templates_dir, archive) = median_age_state();
        let templates = TemplateStore::load(templates_dir.path()).unwrap();
        let plan = vec![("B01002".to_string(), vec![descriptor("B01002", "0003", 100, 102)])];
        let out = tempdir().unwrap();

        let summary = process_state(
            "Colorado",
            archive.path(),
            &plan,
            &templates,
            &options(),
            out.path(),
        )
        .unwrap();
        assert_eq!(summary.built, 1);
        assert_eq!(summary.failed, 0);

        let csv = fs::read_to_string(out.path().join("ColoradoB01002.csv")).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "Geographic Identifier,\
             E: Median age Total:,E: Median age Male,E: Median age Female,\
             M: Median age Total:,M: Median age Male,M: Median age Female"
        );
        // only the block-group row survives the summary-level filter, even
        // though the tract's logical record exists in the data files
        assert_eq!(
            lines.next().unwrap(),
            "15000US080010001001,36.2,34.8,37.5,1.2,2.0,1.8"
        );
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn reruns_write_identical_bytes() {
        init_test_logging();
        let (templates_dir, archive) = median_age_state();
        let templates = TemplateStore::load(templates_dir.path()).unwrap();
        let plan = vec![("B01002".to_string(), vec![descriptor("B01002", "0003", 100, 102)])];
        let out = tempdir().unwrap();

        process_state("Colorado", archive.path(), &plan, &templates, &options(), out.path())
            .unwrap();
        let first = fs::read(out.path().join("ColoradoB01002.csv")).unwrap();
        process_state("Colorado", archive.path(), &plan, &templates, &options(), out.path())
            .unwrap();
        let second = fs::read(out.path().join("ColoradoB01002.csv")).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn joins_sequences_column_wise() {
        init_test_logging();
        let templates_dir = tempdir().unwrap();
        fs::write(templates_dir.path().join("GeoTemplate.csv"), GEO_TEMPLATE).unwrap();
        fs::write(
            templates_dir.path().join("Seq0003.csv"),
            "FILEID,FILETYPE,STUSAB,CHARITER,SEQUENCE,LOGRECNO,P1,P2\n\
             FILEID,FILETYPE,STUSAB,CHARITER,SEQUENCE,LOGRECNO,Part one,Part two\n",
        )
        .unwrap();
        fs::write(
            templates_dir.path().join("Seq0004.csv"),
            "FILEID,FILETYPE,STUSAB,CHARITER,SEQUENCE,LOGRECNO,P3\n\
             FILEID,FILETYPE,STUSAB,CHARITER,SEQUENCE,LOGRECNO,Part three\n",
        )
        .unwrap();
        let templates = TemplateStore::load(templates_dir.path()).unwrap();

        let archive_file = zip_fixture(&[
            ("g20155co.csv", "ACSSF,CO,150,00,00101,15000US080010001001,BG 1\n"),
            ("e20155co0003000.txt", "ACSSF,2015e5,co,000,0003,00101,1,2\n"),
            ("m20155co0003000.txt", "ACSSF,2015e5,co,000,0003,00101,10,20\n"),
            ("e20155co0004000.txt", "ACSSF,2015e5,co,000,0004,00101,3\n"),
            ("m20155co0004000.txt", "ACSSF,2015e5,co,000,0004,00101,30\n"),
        ]);
        let mut archive = StateArchive::open(archive_file.path()).unwrap();

        let descriptors = vec![
            descriptor("B99999", "0003", 7, 8),
            descriptor("B99999", "0004", 7, 7),
        ];
        let geography = vec![GeographyRecord {
            logrecno: "00101".to_string(),
            geoid: "15000US080010001001".to_string(),
        }];

        let outcome = extract_table(
            &mut archive,
            "B99999",
            &descriptors,
            &templates,
            &geography,
            &options(),
        )
        .unwrap();
        let table = outcome.table.unwrap();
        assert_eq!(
            table.estimate_labels,
            vec!["E: Part one", "E: Part two", "E: Part three"]
        );
        assert_eq!(
            table.margin_labels,
            vec!["M: Part one", "M: Part two", "M: Part three"]
        );
        assert_eq!(table.rows.len(), 1);
        assert_eq!(
            table.rows[0].estimates,
            vec![Some("1".into()), Some("2".into()), Some("3".into())]
        );
        assert_eq!(
            table.rows[0].margins,
            vec![Some("10".into()), Some("20".into()), Some("30".into())]
        );
    }

    #[test]
    fn all_null_tables_are_dropped_not_written() {
        init_test_logging();
        let (templates_dir, archive) = median_age_state();
        let templates = TemplateStore::load(templates_dir.path()).unwrap();
        // columns 7-9 hold only "." in the fixture rows
        let plan = vec![
            ("B01002".to_string(), vec![descriptor("B01002", "0003", 100, 102)]),
            ("B09999".to_string(), vec![descriptor("B09999", "0003", 7, 9)]),
        ];
        let out = tempdir().unwrap();

        let summary = process_state(
            "Colorado",
            archive.path(),
            &plan,
            &templates,
            &options(),
            out.path(),
        )
        .unwrap();
        assert_eq!(summary.built, 1);
        assert_eq!(summary.dropped_empty, 1);
        assert!(!out.path().join("ColoradoB09999.csv").exists());
    }

    #[test]
    fn failed_tables_do_not_stop_the_state() {
        init_test_logging();
        let (templates_dir, archive) = median_age_state();
        let templates = TemplateStore::load(templates_dir.path()).unwrap();
        // sequence 0999 has no files in the archive
        let plan = vec![
            ("B00001".to_string(), vec![descriptor("B00001", "0999", 7, 7)]),
            ("B01002".to_string(), vec![descriptor("B01002", "0003", 100, 102)]),
        ];
        let out = tempdir().unwrap();

        let summary = process_state(
            "Colorado",
            archive.path(),
            &plan,
            &templates,
            &options(),
            out.path(),
        )
        .unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.built, 1);
        assert!(out.path().join("ColoradoB01002.csv").exists());
    }

    #[test]
    fn missing_archive_fails_the_state() {
        let templates_dir = tempdir().unwrap();
        fs::write(templates_dir.path().join("GeoTemplate.csv"), GEO_TEMPLATE).unwrap();
        let templates = TemplateStore::load(templates_dir.path()).unwrap();
        let out = tempdir().unwrap();

        assert!(process_state(
            "Colorado",
            Path::new("/nonexistent/Colorado.zip"),
            &[],
            &templates,
            &options(),
            out.path(),
        )
        .is_err());
    }
}
