//! Host extraction and host pattern matching for network checks.

/// Extracts the bare host from a `host:port` string.
///
/// Tries a standard host/port split first, then strips brackets from a
/// bracketed IPv6 literal without a port, and otherwise returns the input
/// unchanged (bare hostnames and unbracketed IPv6 addresses).
///
/// ```
/// use inkstone_sandbox::extract_host;
///
/// assert_eq!(extract_host("[::1]:8080"), "::1");
/// assert_eq!(extract_host("example.com:443"), "example.com");
/// assert_eq!(extract_host("[::1]"), "::1");
/// assert_eq!(extract_host("2001:db8::1"), "2001:db8::1");
/// ```
pub fn extract_host(hostport: &str) -> &str {
    if let Some((host, _port)) = split_host_port(hostport) {
        return host;
    }
    if let Some(inner) = hostport
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
    {
        return inner;
    }
    hostport
}

/// Splits `host:port` or `[host]:port`. Fails on a missing port, on
/// unbracketed hosts containing colons, and on stray brackets.
fn split_host_port(hostport: &str) -> Option<(&str, &str)> {
    let colon = hostport.rfind(':')?;
    let (host, port) = if let Some(rest) = hostport.strip_prefix('[') {
        let end = rest.find(']')?;
        // `]` must be immediately followed by the last colon
        if end + 2 != colon {
            return None;
        }
        (&rest[..end], &hostport[colon + 1..])
    } else {
        let host = &hostport[..colon];
        if host.contains(':') {
            return None;
        }
        (host, &hostport[colon + 1..])
    };
    if host.contains(['[', ']']) || port.contains(['[', ']']) {
        return None;
    }
    Some((host, port))
}

/// Canonical form for stored host patterns: lowercased, brackets removed.
pub(crate) fn normalize_host_pattern(pattern: &str) -> String {
    let trimmed = pattern.trim();
    let unbracketed = trimmed
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .unwrap_or(trimmed);
    unbracketed.to_lowercase()
}

/// Exact match, or `*.suffix` matching any proper subdomain of `suffix`.
///
/// The apex does not match its own wildcard: `*.example.com` rejects
/// `example.com`. Both arguments are expected lowercased.
pub fn host_matches(pattern: &str, host: &str) -> bool {
    if pattern == host {
        return true;
    }
    match pattern.strip_prefix("*.") {
        Some(suffix) => host
            .strip_suffix(suffix)
            .is_some_and(|label| label.len() > 1 && label.ends_with('.')),
        None => false,
    }
}
