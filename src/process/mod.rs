// src/process/mod.rs

use csv::{Reader, ReaderBuilder};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};
use zip::ZipArchive;

use crate::error::{AcsError, Result};

pub mod extract;
pub mod geo;
pub mod merge;
pub mod slice;
pub mod write;

/// Estimate/margin entry: kind letter, 7 bookkeeping characters
/// (year + period + state), 4-digit sequence, 3-digit iteration.
static DATA_ENTRY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([em]).{7}(\d{4})\d{3}\.").unwrap());

/// Decode a Summary File cell. The distribution marks missing values with
/// `.` and `-1`; both, and empty cells, come back as `None`. Everything else
/// is kept verbatim, no numeric coercion.
pub(crate) fn cell(raw: &str) -> Option<String> {
    let v = raw.trim();
    if v.is_empty() || v == "." || v == "-1" {
        None
    } else {
        Some(v.to_string())
    }
}

/// Reader for the headerless Summary File CSVs.
pub(crate) fn summary_reader(text: &str) -> Reader<&[u8]> {
    ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes())
}

/// One state's Summary File archive: a geography CSV plus per-sequence
/// estimate (`e…`) and margin (`m…`) files, all ISO-8859-1 encoded.
#[derive(Debug)]
pub struct StateArchive {
    path: PathBuf,
    archive: ZipArchive<File>,
    geo_entry: Option<String>,
    estimate_entries: HashMap<String, String>,
    margin_entries: HashMap<String, String>,
}

impl StateArchive {
    /// Open the archive and index its entries by kind and sequence number.
    #[instrument(level = "debug", skip_all, fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<StateArchive> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(AcsError::missing_file_hint(
                path,
                "state Summary File archive; enable download or place it here",
            ));
        }

        let file = File::open(path)?;
        let archive = ZipArchive::new(file)?;
        let names: Vec<String> = archive.file_names().map(String::from).collect();

        let mut geo_entry = None;
        let mut estimate_entries = HashMap::new();
        let mut margin_entries = HashMap::new();
        for name in names {
            let base = name.rsplit('/').next().unwrap_or(&name);
            if base.starts_with('g') && base.ends_with(".csv") {
                geo_entry.get_or_insert(name.clone());
            } else if let Some(caps) = DATA_ENTRY.captures(base) {
                let seq = caps[2].to_string();
                match &caps[1] {
                    "e" => estimate_entries.insert(seq, name.clone()),
                    _ => margin_entries.insert(seq, name.clone()),
                };
            }
        }

        debug!(
            geo = geo_entry.as_deref().unwrap_or("<none>"),
            sequences = estimate_entries.len(),
            "indexed state archive"
        );
        Ok(StateArchive {
            path: path.to_path_buf(),
            archive,
            geo_entry,
            estimate_entries,
            margin_entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entry name of the geography file, for labeling diagnostics.
    pub fn geo_entry(&self) -> Option<&str> {
        self.geo_entry.as_deref()
    }

    /// Read and decode the geography CSV.
    pub fn read_geography(&mut self) -> Result<String> {
        let entry = self.geo_entry.clone().ok_or_else(|| {
            AcsError::missing_file_hint(&self.path, "no geography file (g*.csv) in archive")
        })?;
        self.read_entry(&entry)
    }

    /// Read and decode a sequence's estimate and margin files.
    pub fn read_sequence(&mut self, seq: &str) -> Result<SequenceFiles> {
        let estimate_name = self.estimate_entries.get(seq).cloned().ok_or_else(|| {
            AcsError::missing_file_hint(&self.path, format!("no estimate file for sequence {seq}"))
        })?;
        let margin_name = self.margin_entries.get(seq).cloned().ok_or_else(|| {
            AcsError::missing_file_hint(&self.path, format!("no margin file for sequence {seq}"))
        })?;
        let estimate_text = self.read_entry(&estimate_name)?;
        let margin_text = self.read_entry(&margin_name)?;
        Ok(SequenceFiles {
            estimate_name,
            estimate_text,
            margin_name,
            margin_text,
        })
    }

    fn read_entry(&mut self, name: &str) -> Result<String> {
        let mut entry = self.archive.by_name(name)?;
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut bytes)?;
        Ok(encoding_rs::mem::decode_latin1(&bytes).into_owned())
    }
}

/// A sequence's decoded estimate and margin files, entry names kept for
/// diagnostics.
#[derive(Debug)]
pub struct SequenceFiles {
    pub estimate_name: String,
    pub estimate_text: String,
    pub margin_name: String,
    pub margin_text: String,
}
