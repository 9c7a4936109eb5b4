use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub frontier: FrontierConfig,
    pub archive: ArchiveConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeneralConfig {
    /// W: number of fetch worker tasks.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Target number of successful text/html pages to archive before
    /// stopping. Always overridden by the CLI's required `-n` flag, so the
    /// config file default of 0 is never actually used as-is.
    #[serde(default)]
    pub target: u64,
    #[serde(default = "default_max_body_mb")]
    pub max_body_size_mb: usize,
    #[serde(default)]
    pub verbose: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FrontierConfig {
    /// Sizing multiplier for the approximate set: V is built to hold
    /// `target * filter_ratio` URLs.
    #[serde(default = "default_filter_ratio")]
    pub filter_ratio: u64,
    #[serde(default = "default_filter_error")]
    pub filter_error: f64,
    #[serde(default = "default_policy_cache_size")]
    pub policy_cache_size: usize,
    #[serde(default = "default_delay")]
    pub default_delay_secs: f64,
    #[serde(default = "default_robots_timeout")]
    pub robots_timeout_secs: u64,
    #[serde(default = "default_heap_timeout")]
    pub heap_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ArchiveConfig {
    pub data_dir: String,
    #[serde(default = "default_pages_per_file")]
    pub pages_per_file: usize,
    #[serde(default = "default_base_name")]
    pub base_name: String,
}

fn default_workers() -> usize {
    10
}
fn default_max_body_mb() -> usize {
    10
}
fn default_filter_ratio() -> u64 {
    1000
}
fn default_filter_error() -> f64 {
    0.01
}
fn default_policy_cache_size() -> usize {
    1000
}
fn default_delay() -> f64 {
    0.1
}
fn default_robots_timeout() -> u64 {
    1
}
fn default_heap_timeout() -> u64 {
    60
}
fn default_pages_per_file() -> usize {
    1000
}
fn default_base_name() -> String {
    "pages".to_string()
}

impl AppConfig {
    /// Rejects configurations that can never make progress: zero workers,
    /// or a zero-sized archive rotation.
    pub fn validate(&self) -> Result<(), crate::CrawlError> {
        if self.archive.pages_per_file == 0 {
            return Err(crate::CrawlError::Config(
                "archive.pages_per_file must be > 0".to_string(),
            ));
        }
        if self.general.workers == 0 {
            return Err(crate::CrawlError::Config(
                "general.workers must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}
