//! Minimal per-backend cookie store.
//!
//! The auth API hands out its session and XSRF token as cookies. Only the
//! `name=value` pair of each `Set-Cookie` header is kept, plus its expiry:
//! a cookie whose `Max-Age` is not positive, or whose `Expires` is in the
//! past, deletes the stored one. Domain and path are ignored; every cookie
//! a backend sets goes back to that same backend.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use cookie::time::{Duration, OffsetDateTime};
use cookie::Cookie;

use crate::http::HttpResponse;

/// Saved jar contents, see `CookieJar::snapshot`.
pub type CookieSnapshot = BTreeMap<String, String>;

#[derive(Debug, Default)]
pub struct CookieJar {
    cookies: RwLock<BTreeMap<String, String>>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.cookies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn set(&self, name: &str, value: &str) {
        self.cookies
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), value.to_string());
    }

    pub fn clear(&self) {
        self.cookies
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Copy of the current contents, to be put back with `restore`.
    pub fn snapshot(&self) -> CookieSnapshot {
        self.cookies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn restore(&self, snapshot: CookieSnapshot) {
        *self.cookies.write().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }

    pub fn is_empty(&self) -> bool {
        self.cookies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    /// Record every `Set-Cookie` header of `response`.
    pub fn store_from(&self, response: &HttpResponse) {
        let mut cookies = self.cookies.write().unwrap_or_else(PoisonError::into_inner);
        for raw in response.header_values("set-cookie") {
            let Ok(cookie) = Cookie::parse(raw) else {
                continue;
            };
            if is_expired(&cookie) {
                cookies.remove(cookie.name());
            } else {
                cookies.insert(cookie.name().to_string(), cookie.value_trimmed().to_string());
            }
        }
    }

    /// Value for a `Cookie` request header, or `None` when the jar is empty.
    pub fn header_value(&self) -> Option<String> {
        let cookies = self.cookies.read().unwrap_or_else(PoisonError::into_inner);
        if cookies.is_empty() {
            return None;
        }
        let pairs: Vec<String> = cookies.iter().map(|(k, v)| format!("{k}={v}")).collect();
        Some(pairs.join("; "))
    }
}

/// `Max-Age` wins over `Expires` when both are present.
fn is_expired(cookie: &Cookie<'_>) -> bool {
    if let Some(max_age) = cookie.max_age() {
        return max_age <= Duration::ZERO;
    }
    cookie
        .expires_datetime()
        .is_some_and(|at| at <= OffsetDateTime::now_utc())
}
