// src/fetch/urls.rs

use crate::config::SUMMARY_FILE_SUFFIX;

/// Census Bureau Summary File distribution root.
pub const ACS_BASE_URL: &str = "https://www2.census.gov/programs-surveys/acs/summary_file";

/// URL of one state's tracts and block groups archive for a release year.
/// State names appear in the filename exactly as configured.
pub fn state_archive_url(year: &str, state: &str) -> String {
    format!("{ACS_BASE_URL}/{year}/data/5_year_by_state/{state}{SUMMARY_FILE_SUFFIX}")
}

/// Archive URLs for every configured state.
pub fn state_archive_urls(year: &str, states: &[String]) -> Vec<String> {
    states
        .iter()
        .map(|state| state_archive_url(year, state))
        .collect()
}

/// URL of the Summary File Templates archive for a release year.
pub fn templates_url(year: &str) -> String {
    format!("{ACS_BASE_URL}/{year}/data/{year}_5yr_Summary_FileTemplates.zip")
}

/// URL of the Appendix A workbook. The Bureau distributes it as a
/// spreadsheet; this pipeline consumes its CSV export, so the URL is only
/// ever surfaced in diagnostics.
pub fn appendix_workbook_url(year: &str) -> String {
    format!("{ACS_BASE_URL}/{year}/documentation/tech_docs/ACS_{year}_SF_5YR_Appendices.xls")
}
