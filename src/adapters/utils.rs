//! Shared helpers for the HTTP portal.

use url::form_urlencoded;

/// Decode an `application/x-www-form-urlencoded` body into key/value pairs.
///
/// `None` if the body or any percent-decoded value is not UTF-8; a network
/// name is never stored with replacement characters.
pub(super) fn decode_form(body: &[u8]) -> Option<Vec<(String, String)>> {
    std::str::from_utf8(body).ok()?;
    form_urlencoded::parse(body)
        .map(|(key, value)| {
            let lossy = |s: &str| s.contains(char::REPLACEMENT_CHARACTER);
            if lossy(&key) || lossy(&value) {
                None
            } else {
                Some((key.into_owned(), value.into_owned()))
            }
        })
        .collect()
}

/// First value for `key` in a decoded form.
pub(super) fn form_value<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// Escape text for inclusion in HTML element content or attribute values.
pub(super) fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
