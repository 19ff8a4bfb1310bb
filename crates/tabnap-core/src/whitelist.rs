//! Hostname / regex list matching.
//!
//! Entries without a prefix are compared to the page hostname exactly.
//! Entries prefixed with `re:` are regular expressions searched in the full
//! URL. A malformed expression is logged and never matches.

use regex::Regex;

pub const REGEX_PREFIX: &str = "re:";

/// True if `url` is covered by any entry of `list`.
pub fn matches(list: &[String], url: &str) -> bool {
    if list.is_empty() {
        return false;
    }

    let hostname = hostname_of(url);
    let (patterns, hosts): (Vec<&String>, Vec<&String>) =
        list.iter().partition(|entry| entry.starts_with(REGEX_PREFIX));

    if let Some(host) = hostname.as_deref()
        && hosts.iter().any(|h| h.as_str() == host)
    {
        return true;
    }

    patterns.iter().any(|entry| {
        let source = entry.strip_prefix(REGEX_PREFIX).unwrap_or(entry.as_str());
        match Regex::new(source) {
            Ok(re) => re.is_match(url),
            Err(e) => {
                tracing::warn!("ignoring malformed whitelist regex {source:?}: {e}");
                false
            }
        }
    })
}

/// Hostname as a page would see it (`location.hostname`); `None` for URLs
/// without a host.
pub fn hostname_of(url: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
}
