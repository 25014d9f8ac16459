//! HTTP request/response types described as plain data.
//!
//! # Design
//! Backend clients build `HttpRequest` values and parse `HttpResponse`
//! values without touching the network; a `Transport` (see
//! `crate::transport`) performs the actual round-trip. Bodies are raw bytes
//! because the auth API prefixes its JSON with junk that is only stripped
//! after the status check.

use std::fmt;

use url::Url;

use crate::error::ApiError;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// GET and DELETE never carry a body.
    pub fn allows_body(self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered query parameters. Values are already string-coerced.
pub type QueryParams = Vec<(String, String)>;

/// An HTTP request described as plain data.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn body_json(&self) -> Option<serde_json::Value> {
        self.body
            .as_deref()
            .and_then(|body| serde_json::from_slice(body).ok())
    }
}

/// An HTTP response described as plain data.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// All values of a repeatable header such as `Set-Cookie`.
    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Join `base_url` and `path`, appending a form-encoded query string only
/// when `query` is non-empty.
pub fn compose_url(base_url: &str, path: &str, query: &[(String, String)]) -> Result<String, ApiError> {
    let base = base_url.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    let joined = if path.is_empty() {
        base.to_string()
    } else {
        format!("{base}/{path}")
    };
    let mut url =
        Url::parse(&joined).map_err(|e| ApiError::InvalidInput(format!("url {joined}: {e}")))?;
    if !query.is_empty() {
        url.query_pairs_mut().extend_pairs(query);
    }
    Ok(url.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_query_produces_no_query_string() {
        let url =
            compose_url("https://parse.udacity.com/parse/classes", "StudentLocation", &[]).unwrap();
        assert_eq!(url, "https://parse.udacity.com/parse/classes/StudentLocation");
        assert!(!url.contains('?'));
    }

    #[test]
    fn every_query_key_is_attached() {
        let query = vec![
            ("limit".to_string(), 100.to_string()),
            ("skip".to_string(), 0.to_string()),
            ("order".to_string(), "-updatedAt".to_string()),
        ];
        let url = compose_url("https://host/base", "/items", &query).unwrap();
        assert_eq!(url, "https://host/base/items?limit=100&skip=0&order=-updatedAt");
    }

    #[test]
    fn query_values_are_form_encoded() {
        let query = vec![("where".to_string(), r#"{"uniqueKey":"u 1&x"}"#.to_string())];
        let url = compose_url("https://host", "c", &query).unwrap();
        assert_eq!(url, "https://host/c?where=%7B%22uniqueKey%22%3A%22u+1%26x%22%7D");
    }

    #[test]
    fn unparseable_base_is_invalid_input() {
        let err = compose_url("not a url", "c", &[]).unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)));
    }

    #[test]
    fn slashes_are_normalised_between_base_and_path() {
        assert_eq!(
            compose_url("https://host/api/", "/session", &[]).unwrap(),
            "https://host/api/session"
        );
        assert_eq!(compose_url("https://host/api", "", &[]).unwrap(), "https://host/api");
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let response = HttpResponse::new(200, Vec::new())
            .with_header("Set-Cookie", "a=1")
            .with_header("set-cookie", "b=2");
        let values: Vec<&str> = response.header_values("SET-COOKIE").collect();
        assert_eq!(values, vec!["a=1", "b=2"]);
        assert_eq!(response.header("set-COOKIE"), Some("a=1"));
    }

    #[test]
    fn only_post_and_put_allow_body() {
        assert!(HttpMethod::Post.allows_body());
        assert!(HttpMethod::Put.allows_body());
        assert!(!HttpMethod::Get.allows_body());
        assert!(!HttpMethod::Delete.allows_body());
    }
}
