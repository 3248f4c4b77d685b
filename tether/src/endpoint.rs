//! Connection URL resolution.

use std::collections::BTreeMap;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use url::Url;

/// Everything except ASCII alphanumerics and `-._~/?` is escaped.
///
/// Stricter than form encoding in one place that matters: a literal `+` in
/// a token becomes `%2B` instead of surviving to be decoded as a space.
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'/')
    .remove(b'?');

pub fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, QUERY_VALUE).to_string()
}

/// Append `params` to `endpoint` as an encoded query string.
///
/// Parameters are emitted in key order. A query already present on the
/// endpoint is kept in front.
pub fn resolve(endpoint: &str, params: &BTreeMap<String, String>) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(endpoint)?;
    if params.is_empty() {
        return Ok(url);
    }

    let encoded = params
        .iter()
        .map(|(key, value)| format!("{}={}", encode_component(key), encode_component(value)))
        .collect::<Vec<_>>()
        .join("&");

    let query = match url.query() {
        Some(existing) if !existing.is_empty() => format!("{existing}&{encoded}"),
        _ => encoded,
    };
    url.set_query(Some(&query));
    Ok(url)
}
