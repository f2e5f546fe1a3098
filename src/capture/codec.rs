//! Body codec: request parameters and response bodies.
//!
//! Pure functions, no state and no I/O. Nothing here fails: input that
//! cannot be parsed in the expected shape degrades to a raw-string
//! representation.
//!
//! # Request bodies
//!
//! | Body | Result |
//! |------|--------|
//! | JSON object text | its keys |
//! | JSON array text | index keys (`"0"`, `"1"`, …) |
//! | JSON number, string, bool, null | `{raw: body}` (1) |
//! | `a=1&b=2` | `{a: "1", b: "2"}` |
//! | any other non-blank text | `{raw: body}` |
//! | blank text / no body | nothing |
//! | form data, search params | their entries, last duplicate wins |
//! | plain mapping | used as-is |
//!
//! Body keys override query-string keys.
//!
//! (1) A scalar has no keys to spread, so it is kept verbatim under `raw`
//! instead of yielding an empty mapping. `"42"` and a body that merely fails
//! to parse are recorded the same way.

// ============================================================================
// Imports
// ============================================================================

use serde_json::{Map, Value};
use tracing::trace;
use url::Url;
use url::form_urlencoded;

use super::record::{Params, ResponseBody};

// ============================================================================
// Constants
// ============================================================================

/// Base used to resolve relative URLs when the page origin is unknown.
const FALLBACK_BASE: &str = "http://localhost/";

/// Key used for bodies kept verbatim.
pub const RAW_KEY: &str = "raw";

/// Method used when the page did not name one.
pub const DEFAULT_METHOD: &str = "GET";

// ============================================================================
// RequestBody
// ============================================================================

/// A request body in one of the shapes the page can pass.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// A string body (JSON, url-encoded, or anything else).
    Text(String),

    /// Multipart form entries.
    FormData(Vec<(String, String)>),

    /// URL search-params entries.
    SearchParams(Vec<(String, String)>),

    /// An already-structured mapping.
    Object(Map<String, Value>),
}

impl RequestBody {
    /// Creates a text body.
    #[inline]
    #[must_use]
    pub fn text(body: impl Into<String>) -> Self {
        Self::Text(body.into())
    }

    /// Creates a form-data body from entries.
    #[must_use]
    pub fn form_data<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self::FormData(entries.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    /// Creates a search-params body from entries.
    #[must_use]
    pub fn search_params<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self::SearchParams(entries.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

// ============================================================================
// Request Params
// ============================================================================

/// Encodes the parameters of a request.
///
/// Relative URLs are resolved against a placeholder origin; use
/// [`encode_params_at`] when the page origin is known.
#[must_use]
pub fn encode_params(method: &str, url: &str, body: Option<&RequestBody>) -> Params {
    encode_params_at(None, method, url, body)
}

/// Encodes the parameters of a request issued by a page at `base`.
#[must_use]
pub fn encode_params_at(
    base: Option<&Url>,
    method: &str,
    url: &str,
    body: Option<&RequestBody>,
) -> Params {
    let mut params = query_params(base, url);

    if let Some(body) = body {
        for (key, value) in body_params(body) {
            params.insert(key, value);
        }
    }

    trace!(method, url, keys = params.len(), "Encoded request params");
    params
}

/// Returns the uppercase method, defaulting to `GET`.
#[must_use]
pub fn normalize_method(method: Option<&str>) -> String {
    match method {
        Some(m) if !m.trim().is_empty() => m.trim().to_ascii_uppercase(),
        _ => DEFAULT_METHOD.to_string(),
    }
}

/// Parses the URL's query string.
fn query_params(base: Option<&Url>, url: &str) -> Params {
    let fallback;
    let base = match base {
        Some(base) => base,
        None => match Url::parse(FALLBACK_BASE) {
            Ok(parsed) => {
                fallback = parsed;
                &fallback
            }
            Err(_) => return Params::new(),
        },
    };

    match Url::options().base_url(Some(base)).parse(url) {
        Ok(parsed) => collect_pairs(parsed.query_pairs().into_owned()),
        Err(e) => {
            trace!(url, error = %e, "Unparseable request URL, no query params");
            Params::new()
        }
    }
}

/// Decodes a body into parameter entries.
fn body_params(body: &RequestBody) -> Params {
    match body {
        RequestBody::Text(text) => text_params(text),
        RequestBody::FormData(entries) | RequestBody::SearchParams(entries) => {
            collect_pairs(entries.iter().cloned())
        }
        RequestBody::Object(map) => map.clone(),
    }
}

fn text_params(text: &str) -> Params {
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return match value {
            Value::Object(map) => map,
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), v))
                .collect(),
            _ => raw_params(text),
        };
    }

    if text.contains('=') {
        let query = text.strip_prefix('?').unwrap_or(text);
        return collect_pairs(form_urlencoded::parse(query.as_bytes()).into_owned());
    }

    if text.trim().is_empty() {
        Params::new()
    } else {
        raw_params(text)
    }
}

fn raw_params(text: &str) -> Params {
    let mut params = Params::new();
    params.insert(RAW_KEY.to_string(), Value::String(text.to_string()));
    params
}

fn collect_pairs(pairs: impl Iterator<Item = (String, String)>) -> Params {
    pairs.map(|(k, v)| (k, Value::String(v))).collect()
}

// ============================================================================
// Response Body
// ============================================================================

/// Decodes a response body.
///
/// Returns the JSON value when the text parses, otherwise the opaque
/// variant holding the text byte-for-byte.
#[must_use]
pub fn encode_response(text: &str) -> ResponseBody {
    match serde_json::from_str::<Value>(text) {
        Ok(value) => ResponseBody::Json(value),
        Err(_) => ResponseBody::Opaque(text.to_string()),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;
    use serde_json::json;

    fn params(value: Value) -> Params {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_query_only() {
        let p = encode_params("GET", "https://api.example.com/items?x=1", None);
        assert_eq!(p, params(json!({ "x": "1" })));
    }

    #[test]
    fn test_relative_url_against_base() {
        let base = Url::parse("https://shop.example.com/cart").expect("url");
        let p = encode_params_at(Some(&base), "GET", "/api/items?page=2&sort=asc", None);
        assert_eq!(p, params(json!({ "page": "2", "sort": "asc" })));
    }

    #[test]
    fn test_relative_url_without_base() {
        let p = encode_params("GET", "items?q=shoes", None);
        assert_eq!(p, params(json!({ "q": "shoes" })));
    }

    #[test]
    fn test_json_object_body_overrides_query() {
        let body = RequestBody::text(r#"{"x": 2, "y": [1, 2]}"#);
        let p = encode_params("POST", "/items?x=1&z=3", Some(&body));
        assert_eq!(p, params(json!({ "x": 2, "y": [1, 2], "z": "3" })));
    }

    #[test]
    fn test_json_array_body() {
        let body = RequestBody::text("[10, \"b\"]");
        let p = encode_params("POST", "/items", Some(&body));
        assert_eq!(p, params(json!({ "0": 10, "1": "b" })));
    }

    #[test]
    fn test_json_scalar_body_kept_raw() {
        for text in ["42", "\"sku\"", "true", "null"] {
            let body = RequestBody::text(text);
            let p = encode_params("POST", "/items", Some(&body));
            assert_eq!(p, params(json!({ "raw": text })), "body {text}");
        }
    }

    #[test]
    fn test_urlencoded_body() {
        let body = RequestBody::text("a=1&b=2&name=J%C3%BCrgen+M");
        let p = encode_params("POST", "/login", Some(&body));
        assert_eq!(p, params(json!({ "a": "1", "b": "2", "name": "Jürgen M" })));
    }

    #[test]
    fn test_plain_text_body_kept_raw() {
        let body = RequestBody::text("hello world");
        let p = encode_params("POST", "/echo", Some(&body));
        assert_eq!(p, params(json!({ "raw": "hello world" })));
    }

    #[test]
    fn test_blank_and_absent_bodies() {
        let blank = RequestBody::text("   ");
        assert!(encode_params("POST", "/a", Some(&blank)).is_empty());
        assert!(encode_params("POST", "/a", Some(&RequestBody::text(""))).is_empty());
        assert!(encode_params("POST", "/a", None).is_empty());
    }

    #[test]
    fn test_form_data_last_duplicate_wins() {
        let body = RequestBody::form_data([("tag", "a"), ("tag", "b"), ("id", "1")]);
        let p = encode_params("POST", "/upload?id=0", Some(&body));
        assert_eq!(p, params(json!({ "tag": "b", "id": "1" })));
    }

    #[test]
    fn test_search_params_body() {
        let body = RequestBody::search_params([("q", "rust")]);
        let p = encode_params("POST", "/search", Some(&body));
        assert_eq!(p, params(json!({ "q": "rust" })));
    }

    #[test]
    fn test_object_body_used_as_is() {
        let body = RequestBody::Object(params(json!({ "nested": { "k": true } })));
        let p = encode_params("PUT", "/doc", Some(&body));
        assert_eq!(p, params(json!({ "nested": { "k": true } })));
    }

    #[test]
    fn test_normalize_method() {
        assert_eq!(normalize_method(None), "GET");
        assert_eq!(normalize_method(Some("")), "GET");
        assert_eq!(normalize_method(Some("post")), "POST");
    }

    #[test]
    fn test_encode_response_json() {
        assert_eq!(encode_response(r#"{"ok":true}"#), ResponseBody::Json(json!({ "ok": true })));
    }

    #[test]
    fn test_encode_response_opaque() {
        assert_eq!(encode_response(""), ResponseBody::Opaque(String::new()));
        assert_eq!(
            encode_response("<b>not json</b>\r\n"),
            ResponseBody::Opaque("<b>not json</b>\r\n".to_string())
        );
    }

    proptest! {
        #[test]
        fn prop_encode_params_never_panics(body in ".*", url in "[a-z/?=&%]{0,40}") {
            let body = RequestBody::Text(body);
            let _ = encode_params("POST", &url, Some(&body));
        }

        #[test]
        fn prop_opaque_round_trip_is_verbatim(text in ".*") {
            let encoded = encode_response(&text);
            let value = serde_json::to_value(&encoded).expect("serialize");
            let decoded: ResponseBody = serde_json::from_value(value).expect("parse");
            match serde_json::from_str::<Value>(&text) {
                Ok(expected) => prop_assert_eq!(decoded, ResponseBody::Json(expected)),
                Err(_) => prop_assert_eq!(decoded.to_text().into_owned(), text),
            }
        }
    }
}
