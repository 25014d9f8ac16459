//! Client for the identity API: login, current-user lookup, logout.
//!
//! # Design
//! Every response body from this API starts with a fixed anti-XSSI junk
//! prefix that `AuthBackend::transform_response` strips before decoding.
//! The session and XSRF token arrive as cookies; DELETE echoes the XSRF
//! cookie as a header.
//!
//! The `Session` is published through a `watch` channel: it is replaced as a
//! whole on login and on logout, so readers never see a partially filled
//! session.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::AuthConfig;
use crate::cookies::CookieJar;
use crate::error::ApiError;
use crate::executor::{Backend, RequestExecutor};
use crate::http::{HttpMethod, HttpRequest};
use crate::transport::Transport;
use crate::types::Session;

const PROVIDER: &str = "udacity";
const SESSION_PATH: &str = "api/session";
const CURRENT_USER_PATH: &str = "api/users/me";
const XSRF_COOKIE: &str = "XSRF-TOKEN";
const XSRF_HEADER: &str = "X-XSRF-TOKEN";

/// State that belongs to one session and must be dropped whenever a
/// session starts or ends.
pub trait SessionScoped: Send + Sync {
    fn session_changed(&self);
}

pub struct AuthBackend {
    base_url: String,
    xssi_prefix_len: usize,
}

impl AuthBackend {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            xssi_prefix_len: config.xssi_prefix_len,
        }
    }
}

impl Backend for AuthBackend {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn headers_for(&self, method: HttpMethod, cookies: &CookieJar) -> Vec<(String, String)> {
        match method {
            HttpMethod::Post => vec![
                ("Accept".to_string(), "application/json".to_string()),
                ("Content-Type".to_string(), "application/json".to_string()),
            ],
            HttpMethod::Delete => cookies
                .get(XSRF_COOKIE)
                .map(|token| vec![(XSRF_HEADER.to_string(), token)])
                .unwrap_or_default(),
            HttpMethod::Get | HttpMethod::Put => Vec::new(),
        }
    }

    fn transform_response(&self, body: Vec<u8>) -> Vec<u8> {
        strip_xssi_prefix(body, self.xssi_prefix_len)
    }
}

/// Drop exactly `prefix_len` leading bytes; shorter bodies become empty.
pub fn strip_xssi_prefix(mut body: Vec<u8>, prefix_len: usize) -> Vec<u8> {
    if body.len() <= prefix_len {
        return Vec::new();
    }
    body.split_off(prefix_len)
}

#[derive(Deserialize)]
struct SessionEnvelope {
    session: SessionInfo,
}

#[derive(Deserialize)]
struct SessionInfo {
    id: String,
}

#[derive(Deserialize)]
struct UserEnvelope {
    user: UserInfo,
}

/// The user fields read from the current-user endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserInfo {
    pub key: String,
    pub first_name: String,
    pub last_name: String,
}

pub struct AuthClient {
    executor: RequestExecutor<AuthBackend>,
    session: watch::Sender<Option<Session>>,
    signup_url: String,
    session_scoped: Vec<Arc<dyn SessionScoped>>,
}

impl AuthClient {
    pub fn new(config: &AuthConfig, transport: Arc<dyn Transport>) -> Self {
        let (session, _) = watch::channel(None);
        Self {
            executor: RequestExecutor::new(AuthBackend::new(config), transport),
            session,
            signup_url: config.signup_url.clone(),
            session_scoped: Vec::new(),
        }
    }

    /// Register state to be cleared whenever the session changes.
    pub fn scoped_to_session(mut self, scoped: Arc<dyn SessionScoped>) -> Self {
        self.session_scoped.push(scoped);
        self
    }

    pub fn session(&self) -> Option<Session> {
        self.session.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.borrow().is_some()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.session.subscribe()
    }

    pub fn signup_url(&self) -> &str {
        &self.signup_url
    }

    pub fn build_create_session(&self, username: &str, password: &str) -> Result<HttpRequest, ApiError> {
        let mut envelope = serde_json::Map::new();
        envelope.insert(
            PROVIDER.to_string(),
            json!({ "username": username, "password": password }),
        );
        self.executor.build(
            HttpMethod::Post,
            SESSION_PATH,
            &[],
            Some(&serde_json::Value::Object(envelope)),
        )
    }

    /// Session id from an already-stripped create-session body.
    pub fn parse_create_session(&self, body: &[u8]) -> Result<String, ApiError> {
        serde_json::from_slice::<SessionEnvelope>(body)
            .map(|envelope| envelope.session.id)
            .map_err(|_| ApiError::AuthProtocol("session info missing".to_string()))
    }

    pub fn build_current_user(&self) -> Result<HttpRequest, ApiError> {
        self.executor.build(HttpMethod::Get, CURRENT_USER_PATH, &[], None)
    }

    pub fn parse_current_user(&self, body: &[u8]) -> Result<UserInfo, ApiError> {
        serde_json::from_slice::<UserEnvelope>(body)
            .map(|envelope| envelope.user)
            .map_err(|_| ApiError::AuthProtocol("user info missing".to_string()))
    }

    pub fn build_delete_session(&self) -> Result<HttpRequest, ApiError> {
        self.executor.build(HttpMethod::Delete, SESSION_PATH, &[], None)
    }

    /// Authenticate and load the user's profile. The session is published
    /// only once both calls have succeeded; on any failure the cookie jar is
    /// put back as it was, so an existing session keeps its own cookies.
    pub async fn login(&self, username: &str, password: &str) -> Result<Session, ApiError> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(ApiError::InvalidInput(
                "username and password are required".to_string(),
            ));
        }

        let saved_cookies = self.executor.cookies().snapshot();
        let session = match self.establish_session(username, password).await {
            Ok(session) => session,
            Err(e) => {
                self.executor.cookies().restore(saved_cookies);
                return Err(e);
            }
        };

        self.end_scoped_state();
        self.session.send_replace(Some(session.clone()));
        info!(owner_key = %session.owner_key, "logged in");
        Ok(session)
    }

    async fn establish_session(&self, username: &str, password: &str) -> Result<Session, ApiError> {
        let request = self.build_create_session(username, password)?;
        let body = self.executor.send(request).await.map_err(|e| match e {
            ApiError::Http { status: 403, .. } => ApiError::InvalidCredentials,
            other => other,
        })?;
        let session_id = self.parse_create_session(&body)?;

        let body = self.executor.send(self.build_current_user()?).await?;
        let user = self.parse_current_user(&body)?;

        Ok(Session {
            session_id,
            owner_key: user.key,
            first_name: user.first_name,
            last_name: user.last_name,
        })
    }

    /// End the session. The remote DELETE is best effort; local state is
    /// always cleared, including every registered `SessionScoped` cache.
    pub async fn logout(&self) -> Result<(), ApiError> {
        if !self.is_authenticated() {
            return Ok(());
        }

        let outcome = match self.build_delete_session() {
            Ok(request) => self.executor.send(request).await.map(|_| ()),
            Err(e) => Err(e),
        };
        if let Err(e) = outcome {
            warn!(error = %e, "session delete failed, clearing local state anyway");
        }

        self.session.send_replace(None);
        self.executor.cookies().clear();
        self.end_scoped_state();
        info!("logged out");
        Ok(())
    }

    fn end_scoped_state(&self) {
        for scoped in &self.session_scoped {
            scoped.session_changed();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::http::HttpResponse;
    use crate::transport::scripted::ScriptedTransport;

    const PREFIX: &str = ")]}'\n";

    fn prefixed(json: &str) -> Vec<u8> {
        format!("{PREFIX}{json}").into_bytes()
    }

    fn session_body() -> Vec<u8> {
        prefixed(r#"{"account":{"registered":true,"key":"u-42"},"session":{"id":"s-1","expiration":"x"}}"#)
    }

    fn user_body() -> Vec<u8> {
        prefixed(r#"{"user":{"key":"u-42","first_name":"Ada","last_name":"Lovelace","nickname":"ada"}}"#)
    }

    fn client() -> (AuthClient, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::new());
        let config = AuthConfig {
            base_url: "https://auth.test".to_string(),
            ..AuthConfig::default()
        };
        (AuthClient::new(&config, transport.clone()), transport)
    }

    #[derive(Default)]
    struct Counter(AtomicUsize);

    impl SessionScoped for Counter {
        fn session_changed(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn strip_removes_exactly_the_prefix() {
        let body = prefixed(r#"{"a":1}"#);
        assert_eq!(strip_xssi_prefix(body, 5), br#"{"a":1}"#.to_vec());
        assert_eq!(strip_xssi_prefix(b"abcdefgh".to_vec(), 0), b"abcdefgh".to_vec());
        assert_eq!(strip_xssi_prefix(b"abcdefgh".to_vec(), 3), b"defgh".to_vec());
    }

    #[test]
    fn strip_of_short_body_is_empty() {
        assert!(strip_xssi_prefix(b"abc".to_vec(), 5).is_empty());
        assert!(strip_xssi_prefix(b")]}'\n".to_vec(), 5).is_empty());
        assert!(strip_xssi_prefix(Vec::new(), 5).is_empty());
    }

    #[test]
    fn create_session_request_wraps_credentials() {
        let (client, _) = client();
        let req = client.build_create_session("ada@example.com", "secret").unwrap();
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.url, "https://auth.test/api/session");
        assert_eq!(req.header("content-type"), Some("application/json"));
        assert_eq!(req.header("accept"), Some("application/json"));
        let body = req.body_json().unwrap();
        assert_eq!(body["udacity"]["username"], "ada@example.com");
        assert_eq!(body["udacity"]["password"], "secret");
    }

    #[test]
    fn delete_without_xsrf_cookie_omits_header() {
        let (client, _) = client();
        let req = client.build_delete_session().unwrap();
        assert_eq!(req.method, HttpMethod::Delete);
        assert!(req.header(XSRF_HEADER).is_none());
    }

    #[test]
    fn delete_echoes_xsrf_cookie() {
        let (client, _) = client();
        client.executor.cookies().set(XSRF_COOKIE, "tok-9");
        let req = client.build_delete_session().unwrap();
        assert_eq!(req.header("x-xsrf-token"), Some("tok-9"));
    }

    #[test]
    fn xsrf_header_is_only_sent_on_delete() {
        let (client, _) = client();
        client.executor.cookies().set(XSRF_COOKIE, "tok-9");
        let get = client.build_current_user().unwrap();
        let post = client.build_create_session("a", "b").unwrap();
        assert!(get.header(XSRF_HEADER).is_none());
        assert!(post.header(XSRF_HEADER).is_none());
    }

    #[test]
    fn parse_session_requires_id() {
        let (client, _) = client();
        assert_eq!(client.parse_create_session(br#"{"session":{"id":"s"}}"#).unwrap(), "s");
        let err = client.parse_create_session(br#"{"account":{}}"#).unwrap_err();
        assert!(matches!(err, ApiError::AuthProtocol(ref m) if m == "session info missing"));
        assert!(client.parse_create_session(b"").is_err());
    }

    #[test]
    fn parse_user_requires_every_field() {
        let (client, _) = client();
        let err = client
            .parse_current_user(br#"{"user":{"key":"u","first_name":"A"}}"#)
            .unwrap_err();
        assert!(matches!(err, ApiError::AuthProtocol(ref m) if m == "user info missing"));
    }

    #[tokio::test]
    async fn login_sets_every_session_field() {
        let (client, transport) = client();
        transport.respond(
            HttpResponse::new(200, session_body())
                .with_header("Set-Cookie", "XSRF-TOKEN=tok; Path=/")
                .with_header("Set-Cookie", "session=s-1; Path=/"),
        );
        transport.respond(HttpResponse::new(200, user_body()));

        let session = client.login("ada@example.com", "pw").await.unwrap();
        assert_eq!(
            session,
            Session {
                session_id: "s-1".to_string(),
                owner_key: "u-42".to_string(),
                first_name: "Ada".to_string(),
                last_name: "Lovelace".to_string(),
            }
        );
        assert_eq!(client.session(), Some(session));

        let requests = transport.requests();
        assert_eq!(requests[1].url, "https://auth.test/api/users/me");
        assert!(requests[1].header("cookie").unwrap().contains("session=s-1"));
    }

    #[tokio::test]
    async fn login_forbidden_is_invalid_credentials() {
        let (client, transport) = client();
        transport.respond(HttpResponse::new(403, prefixed(r#"{"status":403}"#)));
        let err = client.login("ada", "wrong").await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidCredentials));
        assert!(client.session().is_none());
    }

    #[tokio::test]
    async fn login_other_status_is_http_error() {
        let (client, transport) = client();
        transport.respond(HttpResponse::new(500, "oops"));
        let err = client.login("ada", "pw").await.unwrap_err();
        assert!(matches!(err, ApiError::Http { status: 500, .. }));
    }

    #[tokio::test]
    async fn login_network_failure_is_network_error() {
        let (client, transport) = client();
        transport.fail(ApiError::Network("offline".to_string()));
        let err = client.login("ada", "pw").await.unwrap_err();
        assert!(matches!(err, ApiError::Network(_)));
    }

    #[tokio::test]
    async fn user_lookup_failure_leaves_session_unset() {
        let (client, transport) = client();
        transport.respond(HttpResponse::new(200, session_body()));
        transport.fail(ApiError::Network("dropped".to_string()));

        assert!(client.login("ada", "pw").await.is_err());
        assert!(client.session().is_none());
        assert!(!client.is_authenticated());
    }

    #[tokio::test]
    async fn failed_user_lookup_drops_the_new_cookies() {
        let (client, transport) = client();
        transport.respond(
            HttpResponse::new(200, session_body())
                .with_header("Set-Cookie", "XSRF-TOKEN=x")
                .with_header("Set-Cookie", "session=new"),
        );
        transport.respond(HttpResponse::new(500, "down"));

        assert!(client.login("ada", "pw").await.is_err());
        assert!(client.session().is_none());
        assert_eq!(client.executor.cookies().header_value(), None);
    }

    #[tokio::test]
    async fn failed_relogin_keeps_the_existing_session_and_cookies() {
        let (client, transport) = client();
        transport.respond(
            HttpResponse::new(200, session_body()).with_header("Set-Cookie", "session=old"),
        );
        transport.respond(HttpResponse::new(200, user_body()));
        let existing = client.login("ada", "pw").await.unwrap();

        transport.respond(
            HttpResponse::new(200, session_body()).with_header("Set-Cookie", "session=new"),
        );
        transport.respond(HttpResponse::new(200, prefixed(r#"{"user":{}}"#)));
        assert!(client.login("grace", "pw").await.is_err());

        assert_eq!(client.session(), Some(existing));
        assert_eq!(client.executor.cookies().get("session").as_deref(), Some("old"));
    }

    #[tokio::test]
    async fn login_resets_session_scoped_state() {
        let transport = Arc::new(ScriptedTransport::new());
        let counter = Arc::new(Counter::default());
        let client = AuthClient::new(&AuthConfig::default(), transport.clone())
            .scoped_to_session(counter.clone());

        transport.respond(HttpResponse::new(500, "down"));
        assert!(client.login("ada", "pw").await.is_err());
        assert_eq!(counter.0.load(Ordering::SeqCst), 0);

        for _ in 0..2 {
            transport.respond(HttpResponse::new(200, session_body()));
            transport.respond(HttpResponse::new(200, user_body()));
            client.login("ada", "pw").await.unwrap();
        }
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn incomplete_user_leaves_session_unset() {
        let (client, transport) = client();
        transport.respond(HttpResponse::new(200, session_body()));
        transport.respond(HttpResponse::new(200, prefixed(r#"{"user":{"key":"u-42"}}"#)));

        let err = client.login("ada", "pw").await.unwrap_err();
        assert!(matches!(err, ApiError::AuthProtocol(_)));
        assert!(client.session().is_none());
    }

    #[tokio::test]
    async fn empty_credentials_never_hit_the_network() {
        let (client, transport) = client();
        assert!(matches!(client.login("", "pw").await, Err(ApiError::InvalidInput(_))));
        assert!(matches!(client.login("ada", "").await, Err(ApiError::InvalidInput(_))));
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn logout_without_session_is_a_no_op() {
        let (client, transport) = client();
        client.logout().await.unwrap();
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn logout_clears_state_even_when_delete_fails() {
        let transport = Arc::new(ScriptedTransport::new());
        let counter = Arc::new(Counter::default());
        let client = AuthClient::new(&AuthConfig::default(), transport.clone())
            .scoped_to_session(counter.clone());

        transport.respond(
            HttpResponse::new(200, session_body()).with_header("Set-Cookie", "XSRF-TOKEN=tok"),
        );
        transport.respond(HttpResponse::new(200, user_body()));
        client.login("ada", "pw").await.unwrap();

        transport.fail(ApiError::Network("offline".to_string()));
        client.logout().await.unwrap();

        assert!(client.session().is_none());
        assert!(client.executor.cookies().is_empty());
        // Once for the login, once for the logout.
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);

        let delete = &transport.requests()[2];
        assert_eq!(delete.method, HttpMethod::Delete);
        assert_eq!(delete.header("X-XSRF-TOKEN"), Some("tok"));
    }

    #[tokio::test]
    async fn subscribers_observe_login_and_logout() {
        let (client, transport) = client();
        let mut rx = client.subscribe();
        transport.respond(HttpResponse::new(200, session_body()));
        transport.respond(HttpResponse::new(200, user_body()));
        transport.respond(HttpResponse::new(200, prefixed("{}")));

        client.login("ada", "pw").await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().as_ref().unwrap().owner_key, "u-42");

        client.logout().await.unwrap();
        assert!(rx.borrow_and_update().is_none());
    }
}
