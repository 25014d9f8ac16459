//! In-memory snapshot of the last fetched location list.
//!
//! Observers subscribe to `CacheEvent`s over a broadcast channel. The
//! snapshot is `None` until the first successful refresh, so "never
//! fetched" and "fetched, empty" stay distinguishable.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

use crate::error::ApiError;
use crate::store::{ListQuery, LocationStoreClient};
use crate::types::LocationRecord;

const EVENT_CAPACITY: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    RefreshStarted,
    RefreshSucceeded { count: usize },
    RefreshFailed { message: String },
}

pub struct LocationCache {
    store: Arc<LocationStoreClient>,
    records: watch::Sender<Option<Arc<Vec<LocationRecord>>>>,
    events: broadcast::Sender<CacheEvent>,
}

impl LocationCache {
    pub fn new(store: Arc<LocationStoreClient>) -> Self {
        let (records, _) = watch::channel(None);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store,
            records,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    /// Current snapshot; `None` before the first successful refresh.
    pub fn snapshot(&self) -> Option<Arc<Vec<LocationRecord>>> {
        self.records.borrow().clone()
    }

    /// Current records, empty if never fetched.
    pub fn records(&self) -> Arc<Vec<LocationRecord>> {
        self.snapshot().unwrap_or_default()
    }

    /// Re-fetch with the default query and replace the snapshot on success.
    /// On failure the previous snapshot is kept.
    pub async fn refresh(&self) -> Result<(), ApiError> {
        self.emit(CacheEvent::RefreshStarted);
        match self.store.list_records(&ListQuery::default()).await {
            Ok(records) => {
                let count = records.len();
                self.records.send_replace(Some(Arc::new(records)));
                info!(count, "location cache refreshed");
                self.emit(CacheEvent::RefreshSucceeded { count });
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "location cache refresh failed");
                self.emit(CacheEvent::RefreshFailed {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn emit(&self, event: CacheEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::http::HttpResponse;
    use crate::transport::scripted::ScriptedTransport;

    fn cache() -> (LocationCache, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::new());
        let store = Arc::new(LocationStoreClient::new(&StoreConfig::default(), transport.clone()));
        (LocationCache::new(store), transport)
    }

    const TWO_RECORDS: &str = r#"{"results":[
        {"objectId":"a","latitude":1.0,"longitude":1.0},
        {"objectId":"b","latitude":2.0,"longitude":2.0}
    ]}"#;

    #[tokio::test]
    async fn successful_refresh_replaces_records_and_notifies() {
        let (cache, transport) = cache();
        let mut events = cache.subscribe();
        transport.respond(HttpResponse::new(200, TWO_RECORDS));

        assert!(cache.snapshot().is_none());
        cache.refresh().await.unwrap();

        assert_eq!(cache.records().len(), 2);
        assert_eq!(events.recv().await.unwrap(), CacheEvent::RefreshStarted);
        assert_eq!(
            events.recv().await.unwrap(),
            CacheEvent::RefreshSucceeded { count: 2 }
        );
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_records() {
        let (cache, transport) = cache();
        transport.respond(HttpResponse::new(200, TWO_RECORDS));
        cache.refresh().await.unwrap();

        let mut events = cache.subscribe();
        transport.respond(HttpResponse::new(500, "down"));
        assert!(cache.refresh().await.is_err());

        assert_eq!(cache.records().len(), 2);
        assert_eq!(events.recv().await.unwrap(), CacheEvent::RefreshStarted);
        assert!(matches!(
            events.recv().await.unwrap(),
            CacheEvent::RefreshFailed { .. }
        ));
    }

    #[tokio::test]
    async fn empty_result_differs_from_never_fetched() {
        let (cache, transport) = cache();
        transport.respond(HttpResponse::new(200, r#"{"results":[]}"#));
        assert!(cache.snapshot().is_none());
        cache.refresh().await.unwrap();
        assert_eq!(cache.snapshot().map(|records| records.len()), Some(0));
    }

    #[tokio::test]
    async fn refresh_without_subscribers_succeeds() {
        let (cache, transport) = cache();
        transport.respond(HttpResponse::new(200, TWO_RECORDS));
        assert!(cache.refresh().await.is_ok());
    }
}
