use url::Url;

// A full http/https URL with a host.
pub fn is_url(s: &str) -> bool {
    match Url::parse(s) {
        Ok(u) => matches!(u.scheme(), "http" | "https") && u.host_str().is_some_and(|h| !h.is_empty()),
        Err(_) => false,
    }
}

// Plain http (no TLS) URL with a host.
pub fn is_http_url(s: &str) -> bool {
    match Url::parse(s) {
        Ok(u) => u.scheme() == "http" && u.host_str().is_some_and(|h| !h.is_empty()),
        Err(_) => false,
    }
}

/// Swap the scheme of an http URL for https, leaving the rest of the string untouched.
/// Anything that isn't a usable http URL comes back unchanged.
pub fn rewrite_to_https(s: &str) -> String {
    if !is_http_url(s) { return s.to_string(); }
    let trimmed = s.trim();
    match trimmed.get(..5) {
        Some(prefix) if prefix.eq_ignore_ascii_case("http:") => format!("https:{}", &trimmed[5..]),
        _ => s.to_string(),
    }
}
