//! URL helpers for image classification and record keeping
//!
//! Host lookups return slices of the input. Only tokenization allocates.

const MIN_TOKEN_LEN: usize = 3;
const MAX_TOKENS: usize = 32;

/// Offset of the authority, i.e. just past `scheme://`.
fn authority_start(url: &str) -> Option<usize> {
    let colon = url.find(':')?;
    let scheme = &url[..colon];
    if scheme.is_empty() || !scheme.bytes().all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'-' | b'.')) {
        return None;
    }
    url[colon..].starts_with("://").then_some(colon + 3)
}

/// Inline image sources carry their bytes in the URL and have no host.
pub fn is_inline_url(url: &str) -> bool {
    let url = url.trim_start();
    url.get(..5)
        .map(|prefix| prefix.eq_ignore_ascii_case("data:") || prefix.eq_ignore_ascii_case("blob:"))
        .unwrap_or(false)
}

/// Hostname of an absolute URL, without userinfo or port.
pub fn extract_host(url: &str) -> Option<&str> {
    if is_inline_url(url) {
        return None;
    }
    let start = authority_start(url)?;
    let rest = &url[start..];
    let authority = &rest[..rest.find(['/', '?', '#']).unwrap_or(rest.len())];
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    let host = host_port.split(':').next().unwrap_or_default();
    (!host.is_empty()).then_some(host)
}

/// `host` equals `suffix` or is one of its subdomains. Case-insensitive.
pub fn host_matches_suffix(host: &str, suffix: &str) -> bool {
    let host = host.trim_end_matches('.');
    let suffix = suffix.trim_start_matches('.');
    if suffix.is_empty() || host.len() < suffix.len() {
        return false;
    }
    let split = host.len() - suffix.len();
    if !host.is_char_boundary(split) || !host[split..].eq_ignore_ascii_case(suffix) {
        return false;
    }
    split == 0 || host.as_bytes()[split - 1] == b'.'
}

/// Lowercase alphanumeric runs of the URL after its scheme, for keyword
/// matching (`/NSFW_gallery/` yields `nsfw` and `gallery`).
pub fn tokenize_url(url: &str) -> Vec<String> {
    let body = match authority_start(url) {
        Some(start) => &url[start..],
        None => url,
    };
    body.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| token.len() >= MIN_TOKEN_LEN)
        .take(MAX_TOKENS)
        .map(str::to_ascii_lowercase)
        .collect()
}
