//! Generic REST request builder/executor.
//!
//! # Design
//! Backend-specific behaviour (base URL, per-verb headers, response
//! post-processing) lives in a `Backend` strategy injected into one
//! `RequestExecutor`. The executor holds no per-call state; the only thing
//! it mutates is the cookie jar shared by every call to that backend.

use std::sync::Arc;

use tracing::debug;

use crate::cookies::CookieJar;
use crate::error::ApiError;
use crate::http::{compose_url, HttpMethod, HttpRequest, HttpResponse};
use crate::transport::Transport;

/// Request-building strategy for one remote API.
pub trait Backend: Send + Sync {
    /// `scheme://host/basePath`, without a trailing slash.
    fn base_url(&self) -> &str;

    /// Headers to attach for `method`. `cookies` holds whatever this
    /// backend has set so far.
    fn headers_for(&self, _method: HttpMethod, _cookies: &CookieJar) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Post-process a successful response body before it is decoded.
    fn transform_response(&self, body: Vec<u8>) -> Vec<u8> {
        body
    }
}

pub struct RequestExecutor<B> {
    backend: B,
    transport: Arc<dyn Transport>,
    cookies: CookieJar,
}

impl<B: Backend> RequestExecutor<B> {
    pub fn new(backend: B, transport: Arc<dyn Transport>) -> Self {
        Self {
            backend,
            transport,
            cookies: CookieJar::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn cookies(&self) -> &CookieJar {
        &self.cookies
    }

    /// Build the request for a logical call without sending it.
    pub fn build(
        &self,
        method: HttpMethod,
        path: &str,
        query: &[(String, String)],
        json_body: Option<&serde_json::Value>,
    ) -> Result<HttpRequest, ApiError> {
        let url = compose_url(self.backend.base_url(), path, query)?;
        let mut headers = self.backend.headers_for(method, &self.cookies);
        if let Some(cookie) = self.cookies.header_value() {
            headers.push(("Cookie".to_string(), cookie));
        }
        let body = match json_body {
            Some(value) if method.allows_body() => Some(
                serde_json::to_vec(value).map_err(|e| ApiError::Serialization(e.to_string()))?,
            ),
            _ => None,
        };
        Ok(HttpRequest {
            method,
            url,
            headers,
            body,
        })
    }

    /// Send a prepared request, record its cookies, reject non-2xx
    /// statuses and return the transformed body.
    pub async fn send(&self, request: HttpRequest) -> Result<Vec<u8>, ApiError> {
        let method = request.method;
        let url = request.url.clone();
        let response = self.transport.send(request).await?;
        debug!(%method, %url, status = response.status, "request completed");
        self.cookies.store_from(&response);
        check_status(&response)?;
        Ok(self.backend.transform_response(response.body))
    }

    pub async fn execute(
        &self,
        method: HttpMethod,
        path: &str,
        query: &[(String, String)],
        json_body: Option<&serde_json::Value>,
    ) -> Result<Vec<u8>, ApiError> {
        let request = self.build(method, path, query, json_body)?;
        self.send(request).await
    }
}

/// Map non-2xx statuses to `ApiError::Http`.
fn check_status(response: &HttpResponse) -> Result<(), ApiError> {
    if response.is_success() {
        return Ok(());
    }
    Err(ApiError::Http {
        status: response.status,
        body: String::from_utf8_lossy(&response.body).into_owned(),
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::transport::scripted::ScriptedTransport;

    struct Plain;

    impl Backend for Plain {
        fn base_url(&self) -> &str {
            "https://example.test/api"
        }
    }

    struct Shouting;

    impl Backend for Shouting {
        fn base_url(&self) -> &str {
            "https://example.test"
        }

        fn headers_for(&self, method: HttpMethod, _cookies: &CookieJar) -> Vec<(String, String)> {
            vec![("X-Verb".to_string(), method.to_string())]
        }

        fn transform_response(&self, body: Vec<u8>) -> Vec<u8> {
            body.to_ascii_uppercase()
        }
    }

    fn executor<B: Backend>(backend: B) -> (RequestExecutor<B>, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::new());
        (RequestExecutor::new(backend, transport.clone()), transport)
    }

    #[test]
    fn default_backend_adds_no_headers() {
        let (exec, _) = executor(Plain);
        let req = exec.build(HttpMethod::Get, "items", &[], None).unwrap();
        assert_eq!(req.url, "https://example.test/api/items");
        assert!(req.headers.is_empty());
        assert!(req.body.is_none());
    }

    #[test]
    fn get_and_delete_never_carry_a_body() {
        let (exec, _) = executor(Plain);
        let body = json!({"ignored": true});
        let get = exec.build(HttpMethod::Get, "x", &[], Some(&body)).unwrap();
        let delete = exec.build(HttpMethod::Delete, "x", &[], Some(&body)).unwrap();
        assert!(get.body.is_none());
        assert!(delete.body.is_none());
    }

    #[test]
    fn put_serializes_json_body() {
        let (exec, _) = executor(Plain);
        let body = json!({"latitude": 1.5, "name": "x"});
        let req = exec.build(HttpMethod::Put, "x", &[], Some(&body)).unwrap();
        assert_eq!(req.body_json().unwrap(), body);
    }

    #[test]
    fn headers_come_from_the_backend_hook() {
        let (exec, _) = executor(Shouting);
        let req = exec.build(HttpMethod::Delete, "", &[], None).unwrap();
        assert_eq!(req.header("x-verb"), Some("DELETE"));
    }

    #[tokio::test]
    async fn success_body_passes_through_transform() {
        let (exec, transport) = executor(Shouting);
        transport.respond(HttpResponse::new(200, "hello"));
        let body = exec.execute(HttpMethod::Get, "", &[], None).await.unwrap();
        assert_eq!(body, b"HELLO");
    }

    #[tokio::test]
    async fn non_success_status_is_reported_with_code() {
        let (exec, transport) = executor(Plain);
        transport.respond(HttpResponse::new(403, "forbidden"));
        let err = exec.execute(HttpMethod::Post, "", &[], None).await.unwrap_err();
        assert!(matches!(err, ApiError::Http { status: 403, .. }));
    }

    #[tokio::test]
    async fn network_failure_is_distinct_from_http_failure() {
        let (exec, transport) = executor(Plain);
        transport.fail(ApiError::Network("connection refused".to_string()));
        let err = exec.execute(HttpMethod::Get, "", &[], None).await.unwrap_err();
        assert!(matches!(err, ApiError::Network(_)));
        assert_eq!(err.status(), None);
    }

    #[tokio::test]
    async fn cookies_set_by_one_call_are_sent_on_the_next() {
        let (exec, transport) = executor(Plain);
        transport.respond(HttpResponse::new(200, "{}").with_header("Set-Cookie", "session=abc; Path=/"));
        transport.respond(HttpResponse::new(200, "{}"));

        exec.execute(HttpMethod::Post, "session", &[], None).await.unwrap();
        exec.execute(HttpMethod::Get, "me", &[], None).await.unwrap();

        let requests = transport.requests();
        assert!(requests[0].header("cookie").is_none());
        assert_eq!(requests[1].header("cookie"), Some("session=abc"));
    }
}
