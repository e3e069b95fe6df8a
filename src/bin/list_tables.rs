//! list_tables.rs
//!
//! Print every table id and title found in a local Appendix A export,
//! one per line. Pass the CSV path as the first argument, or rely on the
//! default data-dir layout for the default release year.

use acstables::config::Config;
use acstables::schema::AppendixIndex;
use anyhow::Result;
use std::env;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| Config::default().appendix_file());

    let appendix = AppendixIndex::load(&path)?;
    for (table_id, title) in appendix.catalog() {
        println!("{table_id}\t{title}");
    }
    Ok(())
}
