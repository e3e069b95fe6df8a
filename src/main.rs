use acstables::{
    config::Config,
    fetch,
    process::extract::{process_state, ExtractOptions},
    process::write::write_catalog,
    schema::{AppendixIndex, TemplateStore},
};
use anyhow::{bail, Context, Result};
use reqwest::Client;
use std::{env, fs, path::PathBuf, sync::Arc};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,acstables=info"));
    fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");

    std::panic::set_hook(Box::new(|info| {
        eprintln!("panic: {:?}", info);
    }));

    // ─── 2) read config & make dirs ──────────────────────────────────
    let cfg = Config::load(config_arg().as_deref());
    info!(year = %cfg.year, states = cfg.states.len(), "configured");

    let data_dir = cfg.data_dir();
    let out_dir = cfg.out_dir();
    for d in [&data_dir, &out_dir] {
        fs::create_dir_all(d)?;
    }

    // ─── 3) load the table directory, resolve the plan ───────────────
    // resolve every requested table up front so an unknown id fails the
    // run before any state work starts
    let appendix = AppendixIndex::load(cfg.appendix_file()).with_context(|| {
        format!(
            "loading the appendix directory (export {} to CSV)",
            fetch::urls::appendix_workbook_url(&cfg.year)
        )
    })?;
    info!(entries = appendix.len(), "appendix directory loaded");
    write_catalog(&out_dir.join("ACS All Tables.csv"), &appendix)?;

    let table_ids = if cfg.tables.is_empty() {
        appendix.table_ids()
    } else {
        cfg.tables.clone()
    };
    let mut plan = Vec::with_capacity(table_ids.len());
    for table_id in table_ids {
        let descriptors = appendix.resolve(&table_id)?;
        plan.push((table_id, descriptors));
    }
    info!(tables = plan.len(), "plan resolved");

    // ─── 4) download missing source files ────────────────────────────
    if cfg.download {
        let client = Client::new();
        let mut urls = fetch::urls::state_archive_urls(&cfg.year, &cfg.states);
        // the templates zip lives at a derived URL too, unless the config
        // points somewhere custom
        if cfg.templates_file.is_none() {
            urls.push(fetch::urls::templates_url(&cfg.year));
        }
        let failures = fetch::zips::download_missing(&client, &urls, &data_dir).await?;
        if failures > 0 {
            warn!(failures, "some source files could not be downloaded");
        }
    }

    let templates = TemplateStore::load(cfg.templates_file())?;
    info!(sequences = templates.sequence_count(), "templates loaded");

    // ─── 5) build tables per state ───────────────────────────────────
    let plan = Arc::new(plan);
    let templates = Arc::new(templates);
    let opts = Arc::new(ExtractOptions {
        summary_level: cfg.summary_level.clone(),
        row_policy: cfg.on_malformed_row,
        key_policy: cfg.on_duplicate_key,
        geoid_style: cfg.geoid_style,
    });

    let mut handles = Vec::with_capacity(cfg.states.len());
    for state in cfg.states.clone() {
        let zip_path = data_dir.join(cfg.state_zip_name(&state));
        let plan = Arc::clone(&plan);
        let templates = Arc::clone(&templates);
        let opts = Arc::clone(&opts);
        let out_dir = out_dir.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            process_state(&state, &zip_path, &plan, &templates, &opts, &out_dir)
        }));
    }

    // ─── 6) report totals ────────────────────────────────────────────
    let mut built = 0usize;
    let mut dropped_empty = 0usize;
    let mut failed_tables = 0usize;
    let mut failed_states = 0usize;
    for handle in handles {
        match handle.await? {
            Ok(summary) => {
                built += summary.built;
                dropped_empty += summary.dropped_empty;
                failed_tables += summary.failed;
            }
            Err(e) => {
                error!(error = %e, "state failed");
                failed_states += 1;
            }
        }
    }
    info!(
        built,
        dropped_empty, failed_tables, failed_states, "run complete"
    );
    if failed_states > 0 || failed_tables > 0 {
        bail!("{failed_states} state(s) and {failed_tables} table(s) failed");
    }
    Ok(())
}

fn config_arg() -> Option<PathBuf> {
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "-c" || arg == "--config" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}
