use clap::Parser;

#[derive(Parser)]
#[command(name = "web-crawler", about = "Polite multi-threaded web crawler")]
pub struct Cli {
    /// Path to a file of seed URLs, one per line
    #[arg(short = 's', long = "seeds")]
    pub seeds: String,

    /// Number of successful text/html pages to archive before stopping
    #[arg(short = 'n', long = "target")]
    pub target: u64,

    /// Enable per-fetch JSON-line debug output
    #[arg(short = 'd', long = "debug")]
    pub debug: bool,

    /// Path to a TOML config file
    #[arg(short = 'c', long = "config", default_value = "config/default.toml")]
    pub config: String,

    /// Override the configured worker count
    #[arg(short = 'w', long = "workers")]
    pub workers: Option<usize>,
}
