//! Store key construction.
//!
//! Keys are `/`-joined segments. Every segment is form-urlencoded so that user
//! supplied names (run ids, action names, system ids) can never introduce a
//! separator or a `.`/`..` component.

use url::form_urlencoded::byte_serialize;

/// Encode one key segment.
pub fn segment(raw: &str) -> String {
    if raw.is_empty() {
        // '%' never appears unescaped otherwise
        return "%".to_string();
    }
    let encoded: String = byte_serialize(raw.as_bytes()).collect();
    match encoded.strip_prefix('.') {
        Some(rest) => format!("%2E{}", rest),
        None => encoded,
    }
}

/// Join raw segments into a key under `prefix`.
pub fn key<S: AsRef<str>>(prefix: &str, segments: &[S]) -> String {
    let mut out = prefix.trim_end_matches('/').to_string();
    for s in segments {
        if !out.is_empty() {
            out.push('/');
        }
        out.push_str(&segment(s.as_ref()));
    }
    out
}

/// Like `key`, with a trailing separator so listing stays inside the subtree.
pub fn dir<S: AsRef<str>>(prefix: &str, segments: &[S]) -> String {
    let mut k = key(prefix, segments);
    k.push('/');
    k
}
