use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crawler_archive::ArchiveWriter;
use crawler_core::AppConfig;
use crawler_fetch::Fetcher;
use crawler_frontier::normalize;
use crawler_frontier::{Frontier, FrontierParams};

#[derive(Serialize)]
struct DebugLine {
    #[serde(rename = "URL")]
    url: String,
    #[serde(rename = "Title")]
    title: Option<String>,
    #[serde(rename = "Text")]
    text: String,
    #[serde(rename = "Timestamp")]
    timestamp: String,
}

/// Runs the crawl to completion: spawns `config.general.workers` fetch
/// tasks pulling from a shared frontier, archiving every successfully
/// fetched HTML page until `config.general.target` have been stored.
pub async fn run_crawl(config: AppConfig, seed_urls: Vec<String>, verbose: bool) -> Result<()> {
    let target = config.general.target;
    let workers = config.general.workers;
    let filter_capacity = target.saturating_mul(config.frontier.filter_ratio).max(1);

    let (frontier, scheduler) = Frontier::spawn(FrontierParams {
        workers,
        filter_capacity,
        filter_error: config.frontier.filter_error,
        default_delay: Duration::from_secs_f64(config.frontier.default_delay_secs),
        heap_timeout: Duration::from_secs(config.frontier.heap_timeout_secs),
        policy_cache_size: config.frontier.policy_cache_size,
        robots_timeout: Duration::from_secs(config.frontier.robots_timeout_secs),
    });

    for url in seed_urls {
        match normalize::normalize(&url, &url) {
            Some(n) => frontier.put(n),
            None => warn!(url, "seed URL rejected by normalization"),
        }
    }

    let archive = Arc::new(ArchiveWriter::new(
        config.archive.data_dir.clone(),
        config.archive.base_name.clone(),
        config.archive.pages_per_file,
    )?);

    let crawled = Arc::new(AtomicU64::new(0));
    let mut handles = Vec::with_capacity(workers);
    let max_body_size = config.general.max_body_size_mb * 1024 * 1024;

    for worker_id in 0..workers {
        let frontier = Arc::clone(&frontier);
        let archive = Arc::clone(&archive);
        let crawled = Arc::clone(&crawled);
        let fetch_config = crawler_core::FetchConfig {
            max_body_size,
            ..Default::default()
        };

        let handle: tokio::task::JoinHandle<Result<()>> = tokio::spawn(async move {
            let fetcher = match Fetcher::new(fetch_config) {
                Ok(f) => f,
                Err(e) => {
                    warn!(worker_id, error = %e, "failed to build fetcher, worker exiting");
                    return Ok(());
                }
            };

            loop {
                if crawled.load(Ordering::SeqCst) >= target {
                    break;
                }

                let policy = Arc::clone(frontier.policy());
                let fetcher_ref = &fetcher;
                let fetched = frontier
                    .get(move |url| async move { fetcher_ref.fetch(&policy, &url).await })
                    .await;

                let Some(Some(resp)) = fetched else {
                    continue;
                };

                if resp.is_redirect() {
                    if let Some(location) = resp.location() {
                        if let Some(new_url) = normalize::normalize(&resp.final_url, location) {
                            frontier.put(new_url);
                        }
                    }
                    continue;
                }

                if !resp.is_html() {
                    continue;
                }

                if crawled.fetch_add(1, Ordering::SeqCst) >= target {
                    break;
                }

                let page = crawler_parser::parse(&resp.body_text());
                for href in &page.links {
                    if let Some(link) = normalize::normalize(&resp.final_url, href) {
                        frontier.put(link);
                    }
                }

                // Archive errors are fatal: a disk/permission failure is not
                // something the crawl can degrade through, since it would
                // otherwise spin forever without ever reaching `target`.
                archive.write(&resp)?;

                if verbose {
                    let text: String = page
                        .body_text
                        .split_whitespace()
                        .take(20)
                        .collect::<Vec<_>>()
                        .join(" ");
                    let line = DebugLine {
                        url: resp.url.clone(),
                        title: page.title.clone(),
                        text,
                        timestamp: Utc::now().to_rfc3339(),
                    };
                    if let Ok(json) = serde_json::to_string(&line) {
                        info!(target: "web_crawler::debug", "{json}");
                    }
                }
            }
            Ok(())
        });
        handles.push(handle);
    }

    for handle in handles {
        handle.await??;
    }
    archive.close()?;
    scheduler.abort();

    info!(crawled = crawled.load(Ordering::SeqCst), "crawl finished");
    Ok(())
}
