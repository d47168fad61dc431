//! Preferred locales from `Accept-Language`.

use axum::http::{HeaderMap, header::ACCEPT_LANGUAGE};

/// Ordered locales of a request, most preferred first. Installed as an
/// extension when a saved request is replayed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestLocales(pub Vec<String>);

/// Parse all `Accept-Language` headers into language tags ordered by quality.
///
/// Equal qualities keep header order. Wildcards and `q=0` entries are dropped.
pub fn parse_accept_language(headers: &HeaderMap) -> Vec<String> {
    let mut weighted: Vec<(String, f32)> = headers
        .get_all(ACCEPT_LANGUAGE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(parse_entry)
        .collect();

    // sort_by is stable
    weighted.sort_by(|a, b| b.1.total_cmp(&a.1));
    weighted.into_iter().map(|(tag, _)| tag).collect()
}

fn parse_entry(entry: &str) -> Option<(String, f32)> {
    let mut parts = entry.split(';');
    let tag = parts.next()?.trim();
    if tag.is_empty() || tag == "*" {
        return None;
    }

    let mut quality = 1.0;
    for param in parts {
        if let Some(q) = param.trim().strip_prefix("q=") {
            quality = q.trim().parse().ok()?;
        }
    }
    if quality <= 0.0 {
        return None;
    }
    Some((tag.to_string(), quality))
}
