//! Client for the location document store: list records, find the caller's
//! own record, and upsert it.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::auth::SessionScoped;
use crate::config::StoreConfig;
use crate::cookies::CookieJar;
use crate::error::ApiError;
use crate::executor::{Backend, RequestExecutor};
use crate::http::{HttpMethod, HttpRequest};
use crate::transport::Transport;
use crate::types::{LocationPayload, LocationRecord};

const APPLICATION_ID_HEADER: &str = "X-Parse-Application-Id";
const REST_API_KEY_HEADER: &str = "X-Parse-REST-API-Key";

pub struct StoreBackend {
    base_url: String,
    application_id: String,
    rest_api_key: String,
}

impl StoreBackend {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            application_id: config.application_id.clone(),
            rest_api_key: config.rest_api_key.clone(),
        }
    }
}

impl Backend for StoreBackend {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn headers_for(&self, method: HttpMethod, _cookies: &CookieJar) -> Vec<(String, String)> {
        let mut headers = vec![
            (APPLICATION_ID_HEADER.to_string(), self.application_id.clone()),
            (REST_API_KEY_HEADER.to_string(), self.rest_api_key.clone()),
        ];
        if method == HttpMethod::Put {
            headers.push(("Content-Type".to_string(), "application/json".to_string()));
        }
        headers
    }
}

/// Paging and ordering for `list_records`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub limit: u32,
    pub skip: u32,
    pub order: String,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            limit: 100,
            skip: 0,
            order: "-updatedAt".to_string(),
        }
    }
}

#[derive(Deserialize)]
struct ResultsEnvelope {
    results: Vec<serde_json::Value>,
}

/// The caller's own record id together with the owner it was resolved for.
#[derive(Debug, Clone, Default)]
struct OwnRecord {
    /// Bumped on every session change. A lookup started under an older
    /// generation does not write its answer back.
    generation: u64,
    entry: Option<(String, String)>,
}

impl OwnRecord {
    fn id_for(&self, owner_key: &str) -> Option<String> {
        self.entry
            .as_ref()
            .filter(|(owner, _)| owner == owner_key)
            .map(|(_, id)| id.clone())
    }
}

pub struct LocationStoreClient {
    executor: RequestExecutor<StoreBackend>,
    collection: String,
    own_record: watch::Sender<OwnRecord>,
}

impl LocationStoreClient {
    pub fn new(config: &StoreConfig, transport: Arc<dyn Transport>) -> Self {
        let (own_record, _) = watch::channel(OwnRecord::default());
        Self {
            executor: RequestExecutor::new(StoreBackend::new(config), transport),
            collection: config.collection.clone(),
            own_record,
        }
    }

    /// The cached own record id, whichever owner it was resolved for.
    pub fn own_record_id(&self) -> Option<String> {
        self.own_record.borrow().entry.as_ref().map(|(_, id)| id.clone())
    }

    /// The cached id if it was resolved for `owner_key`.
    pub fn own_record_id_for(&self, owner_key: &str) -> Option<String> {
        self.own_record.borrow().id_for(owner_key)
    }

    pub fn forget_own_record(&self) {
        self.own_record.send_modify(|own| {
            own.generation += 1;
            own.entry = None;
        });
    }

    pub fn build_list_records(&self, query: &ListQuery) -> Result<HttpRequest, ApiError> {
        let params = vec![
            ("limit".to_string(), query.limit.to_string()),
            ("skip".to_string(), query.skip.to_string()),
            ("order".to_string(), query.order.clone()),
        ];
        self.executor.build(HttpMethod::Get, &self.collection, &params, None)
    }

    /// Decode a `results` array, dropping elements that are not valid
    /// records and keeping server order.
    pub fn parse_list_records(&self, body: &[u8]) -> Result<Vec<LocationRecord>, ApiError> {
        let envelope = decode_results(body)?;
        let total = envelope.results.len();
        let records: Vec<LocationRecord> = envelope
            .results
            .iter()
            .filter_map(LocationRecord::from_json)
            .collect();
        if records.len() < total {
            warn!(skipped = total - records.len(), "dropped malformed location records");
        }
        Ok(records)
    }

    pub fn build_own_record_query(&self, owner_key: &str) -> Result<HttpRequest, ApiError> {
        let filter = json!({ "uniqueKey": owner_key }).to_string();
        let params = vec![("where".to_string(), filter)];
        self.executor.build(HttpMethod::Get, &self.collection, &params, None)
    }

    /// Record id of the first match, `None` when nothing matched.
    pub fn parse_own_record_query(&self, body: &[u8]) -> Result<Option<String>, ApiError> {
        let envelope = decode_results(body)?;
        let Some(first) = envelope.results.first() else {
            return Ok(None);
        };
        first
            .get("objectId")
            .and_then(|id| id.as_str())
            .map(|id| Some(id.to_string()))
            .ok_or_else(|| ApiError::StoreProtocol("record id missing".to_string()))
    }

    /// PUT to the path of the record cached for the payload's owner, or to
    /// the collection path when none is known.
    pub fn build_upsert(&self, payload: &LocationPayload) -> Result<HttpRequest, ApiError> {
        let path = match self.own_record_id_for(&payload.owner_key) {
            Some(id) => format!("{}/{id}", self.collection),
            None => self.collection.clone(),
        };
        let body = serde_json::to_value(payload).map_err(|e| ApiError::Serialization(e.to_string()))?;
        self.executor.build(HttpMethod::Put, &path, &[], Some(&body))
    }

    pub async fn list_records(&self, query: &ListQuery) -> Result<Vec<LocationRecord>, ApiError> {
        let body = self.executor.send(self.build_list_records(query)?).await?;
        self.parse_list_records(&body)
    }

    /// Find the caller's own record id. A found id is cached for `owner_key`
    /// until the session changes; "not found" is not cached and is
    /// re-queried next time.
    pub async fn resolve_own_record_id(&self, owner_key: &str) -> Result<Option<String>, ApiError> {
        let generation = {
            let own = self.own_record.borrow();
            if let Some(id) = own.id_for(owner_key) {
                return Ok(Some(id));
            }
            own.generation
        };
        let body = self
            .executor
            .send(self.build_own_record_query(owner_key)?)
            .await?;
        let found = self.parse_own_record_query(&body)?;
        if let Some(id) = &found {
            let stored = self.own_record.send_if_modified(|own| {
                if own.generation != generation {
                    return false;
                }
                own.entry = Some((owner_key.to_string(), id.clone()));
                true
            });
            debug!(record_id = %id, stored, "resolved own record");
        }
        Ok(found)
    }

    pub async fn upsert_record(&self, payload: &LocationPayload) -> Result<(), ApiError> {
        if self.own_record_id_for(&payload.owner_key).is_none() {
            warn!("upserting without a known record id, sending PUT to the collection path");
        }
        self.executor.send(self.build_upsert(payload)?).await?;
        Ok(())
    }
}

impl SessionScoped for LocationStoreClient {
    fn session_changed(&self) {
        self.forget_own_record();
    }
}

fn decode_results(body: &[u8]) -> Result<ResultsEnvelope, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::StoreProtocol(format!("results: {e}")))
}
