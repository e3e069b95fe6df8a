// src/schema/types.rs

/// One appendix directory row: where a detailed table lives inside the
/// Summary File, as inclusive 1-based column positions counted on the full
/// data row (bookkeeping columns included, Appendix A convention).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    pub table_id: String,
    pub title: String,
    /// Geography restriction noted in the directory (e.g. urban areas only).
    pub restriction: Option<String>,
    /// Zero-padded 4-digit sequence number, e.g. "0003".
    pub sequence: String,
    pub start_column: usize,
    pub end_column: usize,
}

impl TableDescriptor {
    /// Number of data cells the table occupies in its sequence.
    pub fn width(&self) -> usize {
        self.end_column - self.start_column + 1
    }
}

/// Normalize a sequence number to the 4-digit form used in template keys and
/// data-file names ("3" -> "0003").
pub fn normalize_sequence(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.len() >= 4 {
        trimmed.to_string()
    } else {
        format!("{:0>4}", trimmed)
    }
}
