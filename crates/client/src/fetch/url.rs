//! Fetch-address canonicalization.
//!
//! The engine passes addresses through verbatim from its caller, so an
//! address must already be an absolute http(s) URL. Canonicalization only
//! removes variance that would split one origin resource across cache
//! entries: surrounding whitespace, host casing, and the fragment.

use url::Url;

/// Error type for address canonicalization failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty address")]
    Empty,

    #[error("address must use http or https, got `{0}`")]
    NotHttp(String),

    #[error("unparseable address: {0}")]
    Unparseable(String),
}

/// Canonicalize an explicit fetch address.
pub fn canonicalize(input: &str) -> Result<Url, UrlError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let mut url = Url::parse(trimmed).map_err(|e| UrlError::Unparseable(e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(UrlError::NotHttp(url.scheme().to_string()));
    }

    // Host names are case-insensitive; rewrite only when casing differs so
    // the common all-lowercase case stays allocation-light.
    let lowered = url.host_str().map(str::to_ascii_lowercase);
    if let Some(host) = lowered.as_deref()
        && url.host_str() != Some(host)
    {
        url.set_host(Some(host)).map_err(|e| UrlError::Unparseable(e.to_string()))?;
    }

    url.set_fragment(None);

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_passthrough() {
        let url = canonicalize("https://example.com/path?q=1").unwrap();
        assert_eq!(url.as_str(), "https://example.com/path?q=1");
    }

    #[test]
    fn test_canonicalize_lowercases_host_only() {
        let url = canonicalize("https://EXAMPLE.COM/Path/To/File").unwrap();
        assert_eq!(url.host_str(), Some("example.com"));
        // Path casing is significant and must survive.
        assert_eq!(url.path(), "/Path/To/File");
    }

    #[test]
    fn test_canonicalize_drops_fragment_keeps_query() {
        let url = canonicalize("https://example.com/page?a=1&b=2#section").unwrap();
        assert_eq!(url.fragment(), None);
        assert_eq!(url.query(), Some("a=1&b=2"));
    }

    #[test]
    fn test_canonicalize_trims_whitespace() {
        let url = canonicalize("  https://example.com  ").unwrap();
        assert_eq!(url.as_str(), "https://example.com/");
    }

    #[test]
    fn test_canonicalize_http_allowed() {
        let url = canonicalize("http://example.com").unwrap();
        assert_eq!(url.scheme(), "http");
    }

    #[test]
    fn test_canonicalize_rejects_other_schemes() {
        let result = canonicalize("file:///etc/passwd");
        assert!(matches!(result, Err(UrlError::NotHttp(scheme)) if scheme == "file"));
    }

    #[test]
    fn test_canonicalize_rejects_scheme_relative() {
        // No default scheme is supplied; a bare host is not an address.
        let result = canonicalize("example.com/resource");
        assert!(matches!(result, Err(UrlError::Unparseable(_))));
    }

    #[test]
    fn test_canonicalize_rejects_empty() {
        assert!(matches!(canonicalize(""), Err(UrlError::Empty)));
        assert!(matches!(canonicalize("   "), Err(UrlError::Empty)));
    }
}
