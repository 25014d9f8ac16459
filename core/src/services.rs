//! Composition root wiring the clients and the cache together.
//!
//! One `Services` value lives for the whole process; the host owns it and
//! hands clones of the `Arc`s to whatever needs them.

use std::sync::Arc;

use tracing::{info, warn};

use crate::auth::AuthClient;
use crate::cache::LocationCache;
use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::store::LocationStoreClient;
use crate::transport::{Transport, UreqTransport};
use crate::types::LocationDraft;

#[derive(Clone)]
pub struct Services {
    pub auth: Arc<AuthClient>,
    pub store: Arc<LocationStoreClient>,
    pub cache: Arc<LocationCache>,
}

impl Services {
    pub fn new(config: &ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let store = Arc::new(LocationStoreClient::new(&config.store, transport.clone()));
        let auth = Arc::new(
            AuthClient::new(&config.auth, transport).scoped_to_session(store.clone()),
        );
        let cache = Arc::new(LocationCache::new(store.clone()));
        Self { auth, store, cache }
    }

    pub fn with_default_transport(config: &ClientConfig) -> Self {
        Self::new(config, Arc::new(UreqTransport::new()))
    }

    /// Post or update the signed-in user's location, then refresh the cache.
    ///
    /// Returns the record id that was updated, or `None` when no earlier
    /// record was known. Once the upsert succeeds the call succeeds; a
    /// failed refresh is only logged and reported through `CacheEvent`s.
    pub async fn submit_location(&self, draft: LocationDraft) -> Result<Option<String>, ApiError> {
        draft.validate()?;
        let session = self.auth.session().ok_or(ApiError::NotAuthenticated)?;

        let record_id = self.store.resolve_own_record_id(&session.owner_key).await?;
        self.store.upsert_record(&draft.into_payload(&session)).await?;
        info!(owner_key = %session.owner_key, updated = record_id.is_some(), "location submitted");

        if let Err(e) = self.cache.refresh().await {
            warn!(error = %e, "refresh after location submit failed");
        }
        Ok(record_id)
    }
}
