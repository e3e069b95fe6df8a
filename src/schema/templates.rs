// src/schema/templates.rs

use csv::ReaderBuilder;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument, trace, warn};
use zip::ZipArchive;

use super::types::normalize_sequence;
use crate::error::{AcsError, Result};

/// `Seq` followed by the sequence number somewhere in the file stem,
/// e.g. `Seq0003`, `2015_SFSequence3`.
static SEQ_KEY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)seq\D*?(\d+)").unwrap());

/// Column-name templates for the geography file and each sequence file.
///
/// The Bureau distributes these as one workbook per file inside the Summary
/// File Templates archive; this loader consumes their delimited-text exports,
/// either still zipped or unpacked into a directory. Each template carries a
/// machine-code row followed by a label row; the label row supplies the
/// column names (the geography template labels the key columns
/// `Logical Record Number`, `Summary Level` and `Geographic Identifier`,
/// sequence templates keep `LOGRECNO` for theirs).
#[derive(Debug)]
pub struct TemplateStore {
    source: PathBuf,
    geo: Option<Vec<String>>,
    sequences: HashMap<String, Vec<String>>,
}

impl TemplateStore {
    /// Load every template from `path` (a zip archive or a directory).
    #[instrument(level = "debug", skip_all, fields(path = %path.as_ref().display()))]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<TemplateStore> {
        let path = path.as_ref();
        let mut store = TemplateStore {
            source: path.to_path_buf(),
            geo: None,
            sequences: HashMap::new(),
        };

        if path.is_dir() {
            for entry in fs::read_dir(path)? {
                let entry = entry?;
                if !entry.file_type()?.is_file() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy().to_string();
                let bytes = fs::read(entry.path())?;
                store.insert(&name, &bytes)?;
            }
        } else if path.is_file() {
            let file = File::open(path)?;
            let mut archive = ZipArchive::new(file)?;
            for i in 0..archive.len() {
                let mut entry = archive.by_index(i)?;
                if !entry.is_file() {
                    continue;
                }
                let name = entry.name().to_string();
                let mut bytes = Vec::with_capacity(entry.size() as usize);
                entry.read_to_end(&mut bytes)?;
                store.insert(&name, &bytes)?;
            }
        } else {
            return Err(AcsError::missing_file_hint(
                path,
                "Summary File Templates archive (zip of delimited templates) or directory",
            ));
        }

        debug!(
            sequences = store.sequences.len(),
            has_geo = store.geo.is_some(),
            "loaded templates"
        );
        Ok(store)
    }

    /// Column names for the geography file.
    pub fn geo(&self) -> Result<&[String]> {
        self.geo.as_deref().ok_or_else(|| {
            AcsError::missing_file_hint(
                &self.source,
                "no geography template (file name containing 'Geo')",
            )
        })
    }

    /// Column names for a sequence's estimate/margin files.
    pub fn sequence(&self, seq: &str) -> Result<&[String]> {
        let key = normalize_sequence(seq);
        self.sequences.get(&key).map(Vec::as_slice).ok_or_else(|| {
            AcsError::missing_file_hint(
                &self.source,
                format!("no template for sequence {key}"),
            )
        })
    }

    pub fn sequence_count(&self) -> usize {
        self.sequences.len()
    }

    /// File names carry the routing: `Seq<digits>` maps to that sequence,
    /// `Geo` to the geography template, anything else is skipped.
    fn insert(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        let base = name.rsplit('/').next().unwrap_or(name);
        let stem = base.split('.').next().unwrap_or(base);

        if let Some(caps) = SEQ_KEY.captures(stem) {
            let key = normalize_sequence(&caps[1]);
            let labels = parse_template(name, bytes)?;
            trace!(name, key = %key, columns = labels.len(), "sequence template");
            if self.sequences.insert(key.clone(), labels).is_some() {
                warn!(key = %key, name, "duplicate sequence template, keeping the later one");
            }
        } else if stem.to_ascii_lowercase().contains("geo") {
            let labels = parse_template(name, bytes)?;
            trace!(name, columns = labels.len(), "geography template");
            self.geo = Some(labels);
        } else {
            trace!(name, "not a template, skipping");
        }
        Ok(())
    }
}

/// Row 1 holds machine codes, row 2 the labels used as column names.
fn parse_template(name: &str, bytes: &[u8]) -> Result<Vec<String>> {
    let text = encoding_rs::mem::decode_latin1(bytes);
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut records = rdr.records();
    let codes = records
        .next()
        .transpose()?
        .ok_or_else(|| AcsError::invalid_metadata(name, "empty template"))?;
    let labels = records.next().transpose()?.ok_or_else(|| {
        AcsError::invalid_metadata(name, "missing label row (codes row only)")
    })?;
    if labels.len() != codes.len() {
        warn!(
            name,
            codes = codes.len(),
            labels = labels.len(),
            "template rows disagree on width, using label row"
        );
    }
    Ok(labels.iter().map(|s| s.trim().to_string()).collect())
}
