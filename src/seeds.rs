use anyhow::{Context, Result};

/// Reads one URL per line from `path`, skipping blank lines. Missing or
/// unreadable files are a fatal startup error — the caller is expected to
/// let it propagate and exit non-zero.
pub fn load_seeds(path: &str) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("seed file not found: {path}"))?;
    Ok(content
        .lines()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect())
}
