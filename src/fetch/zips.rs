// src/fetch/zips.rs

use anyhow::{Context, Result};
use futures::{stream::FuturesUnordered, StreamExt};
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::{fs as tokio_fs, time::sleep};
use tracing::{error, info, instrument, warn};
use url::Url;

// The Census mirrors throttle aggressively; keep concurrency low and back
// off on failure.
const MAX_CONCURRENCY: usize = 3;
const MAX_RETRIES: u32 = 3;
const BACKOFF_MS: u64 = 500;

fn url_filename(url: &Url) -> String {
    url.path_segments()
        .and_then(|segments| segments.last())
        .filter(|name| !name.is_empty())
        .unwrap_or("download.zip")
        .to_string()
}

async fn download_core(client: &Client, url: &Url, dest: &Path) -> Result<()> {
    let resp = client
        .get(url.clone())
        .send()
        .await
        .with_context(|| format!("GET {url} failed"))?
        .error_for_status()
        .with_context(|| format!("non-success status from {url}"))?;
    let body = resp
        .bytes()
        .await
        .with_context(|| format!("reading body from {url}"))?;
    tokio_fs::write(dest, &body)
        .await
        .with_context(|| format!("writing {}", dest.display()))?;
    Ok(())
}

/// Download one archive into `dest_dir` under the URL's filename, retrying
/// transient failures with exponential backoff. Returns the saved path.
pub async fn download_zip(
    client: &Client,
    url_str: &str,
    dest_dir: impl AsRef<Path>,
) -> Result<PathBuf> {
    let url = Url::parse(url_str).with_context(|| format!("invalid download url {url_str}"))?;
    let dest_dir = dest_dir.as_ref();
    tokio_fs::create_dir_all(dest_dir)
        .await
        .with_context(|| format!("creating {}", dest_dir.display()))?;
    let dest = dest_dir.join(url_filename(&url));

    let mut attempts = 0;
    loop {
        match download_core(client, &url, &dest).await {
            Ok(()) => return Ok(dest),
            Err(e) if attempts < MAX_RETRIES => {
                attempts += 1;
                let backoff = BACKOFF_MS * 2u64.pow(attempts - 1);
                warn!(%url, attempt = attempts, delay_ms = backoff, error = %e, "retrying download");
                sleep(Duration::from_millis(backoff)).await;
            }
            Err(e) => {
                error!(%url, error = %e, "download failed");
                return Err(e);
            }
        }
    }
}

/// Download every archive not already present under `dest_dir`. A failed
/// download is logged and counted but does not stop the others; the caller
/// decides whether missing archives are fatal.
#[instrument(level = "info", skip(client, urls))]
pub async fn download_missing(client: &Client, urls: &[String], dest_dir: &Path) -> Result<usize> {
    tokio_fs::create_dir_all(dest_dir)
        .await
        .with_context(|| format!("creating {}", dest_dir.display()))?;

    let mut tasks = FuturesUnordered::new();
    let mut failures = 0usize;
    for url_str in urls {
        let url =
            Url::parse(url_str).with_context(|| format!("invalid download url {url_str}"))?;
        let dest = dest_dir.join(url_filename(&url));
        if dest.exists() {
            info!(file = %dest.display(), "already downloaded, skipping");
            continue;
        }

        let client = client.clone();
        let url_str = url_str.clone();
        let dest_dir = dest_dir.to_path_buf();
        tasks.push(async move {
            info!(url = %url_str, "downloading");
            download_zip(&client, &url_str, &dest_dir).await
        });

        // throttle concurrency
        if tasks.len() >= MAX_CONCURRENCY {
            if let Some(result) = tasks.next().await {
                match result {
                    Ok(path) => info!(file = %path.display(), "downloaded"),
                    Err(e) => {
                        warn!(error = %e, "state archive download failed");
                        failures += 1;
                    }
                }
            }
        }
    }

    while let Some(result) = tasks.next().await {
        match result {
            Ok(path) => info!(file = %path.display(), "downloaded"),
            Err(e) => {
                warn!(error = %e, "state archive download failed");
                failures += 1;
            }
        }
    }
    Ok(failures)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filenames_come_from_the_url_path() {
        let url = Url::parse(
            "https://www2.census.gov/programs-surveys/acs/summary_file/2015\
             /data/5_year_by_state/Colorado_Tracts_Block_Groups_Only.zip",
        )
        .unwrap();
        assert_eq!(url_filename(&url), "Colorado_Tracts_Block_Groups_Only.zip");

        let bare = Url::parse("https://www2.census.gov/").unwrap();
        assert_eq!(url_filename(&bare), "download.zip");
    }
}
