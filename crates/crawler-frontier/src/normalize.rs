//! Canonicalizes URLs and rejects non-HTTP(S) / malformed inputs.
//!
//! `normalize(base, link)` resolves `link` against `base` (RFC 3986 via the
//! `url` crate), pre-filters with a structural regex shaped like a typical
//! web URL validator, then canonicalizes: lowercase scheme/host, drop
//! default ports, sort and filter query parameters (removing tracking
//! parameters), strip fragments. Any failure along the way yields `None` —
//! the sentinel the worker loop uses to skip the link.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

/// Tracking parameters stripped during canonicalization. Not exhaustive —
/// covers the common analytics/campaign families.
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "gclid",
    "fbclid",
    "msclkid",
    "mc_cid",
    "mc_eid",
    "ref",
    "ref_src",
];

static URL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^https?://(?:(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,63}|localhost|(?:\d{1,3}\.){3}\d{1,3})(?::\d+)?(?:/[^\s]*)?$",
    )
    .expect("static regex is valid")
});

/// Resolves `link` against `base` and returns the normalized form, or `None`
/// if the input is not a valid, resolvable http(s) URL.
pub fn normalize(base: &str, link: &str) -> Option<String> {
    let base_url = Url::parse(base).ok()?;
    let resolved = base_url.join(link).ok()?;

    if !URL_REGEX.is_match(resolved.as_str()) {
        return None;
    }

    canonicalize(&resolved)
}

/// Canonicalizes an already-resolved URL. Public so callers with an
/// already-parsed `Url` (e.g. a redirect `Location`) can skip re-resolving.
pub fn canonicalize(url: &Url) -> Option<String> {
    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return None;
    }
    let host = url.host_str()?;

    let mut out = Url::parse(&format!("{scheme}://{host}")).ok()?;
    if let Some(port) = url.port() {
        let is_default = (scheme == "http" && port == 80) || (scheme == "https" && port == 443);
        if !is_default {
            out.set_port(Some(port)).ok()?;
        }
    }
    out.set_path(url.path());

    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !TRACKING_PARAMS.contains(&k.to_lowercase().as_str()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    params.sort();
    if !params.is_empty() {
        let mut qp = out.query_pairs_mut();
        qp.clear();
        for (k, v) in &params {
            qp.append_pair(k, v);
        }
    }
    out.set_fragment(None);

    // `Url` already lowercases scheme and host on parse/serialization.
    Some(out.to_string())
}

/// Derives the host key (`"{scheme}://{netloc}"`) used for politeness and
/// robots-rule scoping.
pub fn host_key(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let scheme = parsed.scheme();
    if scheme != "http" && scheme != "https" {
        return None;
    }
    let host = parsed.host_str()?;
    match parsed.port() {
        Some(port) => Some(format!("{scheme}://{host}:{port}")),
        None => Some(format!("{scheme}://{host}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_http_schemes() {
        assert_eq!(normalize("http://h/", "ftp://h/x"), None);
        assert_eq!(normalize("http://h/", "mailto:a@b.com"), None);
        assert_eq!(normalize("http://h/", "javascript:void(0)"), None);
    }

    #[test]
    fn resolves_relative_links() {
        let n = normalize("http://example.com/a/b", "../c").unwrap();
        assert_eq!(n, "http://example.com/c");
    }

    #[test]
    fn lowercases_scheme_and_host() {
        let n = normalize("http://EXAMPLE.com/", "/PATH").unwrap();
        assert!(n.starts_with("http://example.com/"));
    }

    #[test]
    fn drops_default_ports() {
        let n = normalize("http://example.com:80/", "/x").unwrap();
        assert_eq!(n, "http://example.com/x");
    }

    #[test]
    fn strips_fragment() {
        let n = normalize("http://example.com/", "/x#section").unwrap();
        assert_eq!(n, "http://example.com/x");
    }

    #[test]
    fn sorts_and_filters_query_params() {
        let n = normalize("http://example.com/", "/x?b=2&utm_source=foo&a=1").unwrap();
        assert_eq!(n, "http://example.com/x?a=1&b=2");
    }

    #[test]
    fn idempotent() {
        let once = normalize("http://example.com/a", "/b?z=1&y=2#frag").unwrap();
        let twice = normalize(&once, &once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn rejects_missing_host() {
        assert_eq!(normalize("http://h/", "http:///path"), None);
    }

    #[test]
    fn host_key_strips_path_and_query() {
        assert_eq!(
            host_key("http://example.com/a/b?x=1").unwrap(),
            "http://example.com"
        );
        assert_eq!(
            host_key("https://example.com:8443/a").unwrap(),
            "https://example.com:8443"
        );
    }
}
