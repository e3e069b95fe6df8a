//! Run configuration, read from a `config.json`. An absent or unreadable
//! config falls back to the built-in defaults rather than failing the run.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Suffix of the per-state Summary File archive covering tracts and block
/// groups, as distributed by the Bureau.
pub const SUMMARY_FILE_SUFFIX: &str = "_Tracts_Block_Groups_Only.zip";

/// What to do with a row that does not match the expected column layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RowPolicy {
    /// Drop the row, count it, and surface one warning per file after the run.
    Skip,
    /// Fail the table with a `MalformedRow` error.
    Abort,
}

/// What to do when a logical record number repeats on one side of the join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyPolicy {
    /// Fail the table with a `DuplicateKey` error.
    Abort,
    /// Keep the first occurrence and count the rest as skipped.
    KeepFirst,
}

/// Shape of the geographic identifier column in output tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GeoidStyle {
    /// Full Summary File identifier, e.g. `15000US080010001001`.
    Full,
    /// Last 12 characters under a `GEOID` header, conforming with the
    /// Census Block Group shapefiles.
    Shapefile,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// ACS release year, e.g. "2015".
    pub year: String,
    /// State names as they appear in the by-state archive filenames.
    pub states: Vec<String>,
    /// Table ids to build; empty means every table in the appendix.
    pub tables: Vec<String>,
    /// Target geographic summary level (150 = Block Group).
    pub summary_level: String,
    pub on_malformed_row: RowPolicy,
    pub on_duplicate_key: KeyPolicy,
    pub geoid_style: GeoidStyle,
    /// Whether to fetch missing state archives from the Census servers.
    pub download: bool,
    pub data_dir: Option<PathBuf>,
    pub appendix_file: Option<PathBuf>,
    pub templates_file: Option<PathBuf>,
    pub out_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            year: "2015".to_string(),
            states: vec!["Colorado".to_string()],
            tables: Vec::new(),
            summary_level: "150".to_string(),
            on_malformed_row: RowPolicy::Skip,
            on_duplicate_key: KeyPolicy::Abort,
            geoid_style: GeoidStyle::Full,
            download: true,
            data_dir: None,
            appendix_file: None,
            templates_file: None,
            out_dir: None,
        }
    }
}

impl Config {
    /// Read the config file, falling back to defaults when it is absent or
    /// invalid.
    pub fn load(path: Option<&Path>) -> Config {
        let Some(path) = path else {
            return Config::default();
        };
        match fs::read_to_string(path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(cfg) => cfg,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "invalid config, using defaults");
                    Config::default()
                }
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable config, using defaults");
                Config::default()
            }
        }
    }

    /// Directory holding downloaded source files for this release year.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("ACS_data_{}", self.year)))
    }

    /// Directory the merged table CSVs are written to.
    pub fn out_dir(&self) -> PathBuf {
        self.out_dir
            .clone()
            .unwrap_or_else(|| self.data_dir().join("ACS_tables"))
    }

    /// Appendix A directory file (CSV export of the Bureau's appendix workbook).
    pub fn appendix_file(&self) -> PathBuf {
        self.appendix_file.clone().unwrap_or_else(|| {
            self.data_dir()
                .join(format!("ACS_{}_SF_5YR_Appendices.csv", self.year))
        })
    }

    /// Summary File Templates archive (zip of delimited templates) or a
    /// directory of unpacked template files.
    pub fn templates_file(&self) -> PathBuf {
        self.templates_file.clone().unwrap_or_else(|| {
            self.data_dir()
                .join(format!("{}_5yr_Summary_FileTemplates.zip", self.year))
        })
    }

    /// Filename of a state's Summary File archive.
    pub fn state_zip_name(&self, state: &str) -> String {
        format!("{}{}", state, SUMMARY_FILE_SUFFIX)
    }
}
