//! `Link` response-header parsing for paginated GitHub endpoints.
//!
//! GitHub advertises further pages as
//! `<https://api.github.com/...&page=2>; rel="next", <...>; rel="last"`.

use regex::Regex;
use std::sync::LazyLock;

/// Matches one `<url>; rel="name"` element.
static LINK_REL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<([^>]+)>\s*;\s*rel="([^"]+)""#).expect("link rel regex")
});

/// Extract the `rel="next"` URL from a `Link` header value, if any.
pub(crate) fn next_page_url(header: &str) -> Option<String> {
    LINK_REL_RE
        .captures_iter(header)
        .find(|caps| caps[2].split_whitespace().any(|rel| rel == "next"))
        .map(|caps| caps[1].to_string())
}
