//! Async client core for the OnTheMap location-sharing service.
//!
//! # Overview
//! Authenticates against the identity API, lists peer-submitted locations
//! from the document store, and posts or updates the user's own record.
//!
//! # Design
//! - Requests and responses are plain data (`http`). A `Transport` performs
//!   the round-trip; `UreqTransport` is the default, tests script their own.
//! - One generic `RequestExecutor` is specialised per remote API by an
//!   injected `Backend` strategy (URL, per-verb headers, body transform).
//! - Each client splits remote calls into `build_*` / `parse_*` pairs and
//!   composes them in its async operations.
//! - Shared state (`Session`, own record id, cached records) lives in
//!   `tokio::sync::watch` channels: replaced whole, read without locking
//!   out the writer.

pub mod auth;
pub mod cache;
pub mod config;
pub mod cookies;
pub mod error;
pub mod executor;
pub mod http;
pub mod services;
pub mod store;
pub mod transport;
pub mod types;

pub use auth::{AuthBackend, AuthClient, SessionScoped};
pub use cache::{CacheEvent, LocationCache};
pub use config::{AuthConfig, ClientConfig, StoreConfig};
pub use error::ApiError;
pub use executor::{Backend, RequestExecutor};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use services::Services;
pub use store::{ListQuery, LocationStoreClient, StoreBackend};
pub use transport::{Transport, UreqTransport};
pub use types::{LocationDraft, LocationPayload, LocationRecord, Session};
