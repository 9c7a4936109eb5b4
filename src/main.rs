mod cli;
mod crawl;
mod seeds;

use anyhow::Result;
use clap::Parser;
use tracing::warn;

// mimalloc releases memory back to the OS more eagerly than glibc's
// allocator under the churn of many short-lived per-fetch allocations.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use crawler_core::AppConfig;

use crate::cli::Cli;
use crate::crawl::run_crawl;

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config_str = std::fs::read_to_string(&cli.config).unwrap_or_else(|_| {
        warn!(path = %cli.config, "config file not found, using defaults");
        include_str!("../config/default.toml").to_string()
    });
    let mut config: AppConfig = toml::from_str(&config_str)?;

    // Environment variable overrides, applied before the CLI flags that take
    // final precedence below.
    if let Ok(v) = std::env::var("CRAWL_WORKERS") {
        if let Ok(n) = v.parse::<usize>() {
            if n > 0 {
                config.general.workers = n;
            }
        }
    }
    if let Ok(v) = std::env::var("CRAWL_TARGET") {
        if let Ok(n) = v.parse::<u64>() {
            config.general.target = n;
        }
    }
    if let Ok(v) = std::env::var("CRAWL_FILTER_RATIO") {
        if let Ok(n) = v.parse::<u64>() {
            if n > 0 {
                config.frontier.filter_ratio = n;
            }
        }
    }

    config.general.target = cli.target;
    if let Some(workers) = cli.workers {
        config.general.workers = workers;
    }
    if cli.debug {
        config.general.verbose = true;
    }
    config.validate()?;

    let seed_urls = seeds::load_seeds(&cli.seeds)?;
    let verbose = config.general.verbose;

    run_crawl(config, seed_urls, verbose).await
}
