//! Request handlers for the gate endpoints.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::lock::LockManager;
use crate::store::RemoteStore;
use parking_lot::RwLock;
use replidb_core::{wall_millis, SequenceClock};
use replidb_sync_protocol::{
    ChangeAck, ChangeFeed, ChangedSinceRequest, ClearRequest, Endpoint, LockRequest, LockResponse,
    OnlineResponse, PageRequest, PageResponse, ReleaseRequest, WireFormat,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// State shared by all request handlers.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// Sync locks.
    pub locks: LockManager,
    clock: Arc<SequenceClock>,
    stores: RwLock<HashMap<String, Arc<RemoteStore>>>,
    online: AtomicBool,
}

impl HandlerContext {
    /// Creates a new handler context.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            locks: LockManager::new(config.lock_expiry),
            config,
            clock: Arc::new(SequenceClock::new()),
            stores: RwLock::new(HashMap::new()),
            online: AtomicBool::new(true),
        }
    }

    /// Returns the store for a collection, creating it if needed.
    pub fn store(&self, collection: &str) -> Arc<RemoteStore> {
        if let Some(store) = self.stores.read().get(collection) {
            return Arc::clone(store);
        }
        let mut stores = self.stores.write();
        Arc::clone(stores.entry(collection.to_string()).or_insert_with(|| {
            Arc::new(RemoteStore::new(
                collection,
                self.config.server_id.clone(),
                Arc::clone(&self.clock),
            ))
        }))
    }

    /// Names of the collections seen so far.
    pub fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.stores.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns whether sync traffic is accepted.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Switches the server on or off for sync traffic.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    fn prune_expired_tombstones(&self, store: &RemoteStore) {
        if let Some(retention) = self.config.tombstone_retention {
            let before = wall_millis() - retention.as_millis() as i64;
            let pruned = store.prune_tombstones(before);
            if pruned > 0 {
                tracing::debug!(collection = store.name(), pruned, "pruned tombstones");
            }
        }
    }
}

/// Handler for gate requests.
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Decodes a request body, runs the endpoint and encodes the response.
    pub fn dispatch(
        &self,
        endpoint: Endpoint,
        collection: &str,
        format: WireFormat,
        body: &[u8],
    ) -> ServerResult<Vec<u8>> {
        if endpoint != Endpoint::Online && !self.context.is_online() {
            return Err(ServerError::Offline);
        }

        let response = match endpoint {
            Endpoint::Online => format.encode(&self.handle_online())?,
            Endpoint::Lock => format.encode(&self.handle_lock(collection, format.decode(body)?))?,
            Endpoint::Unlock => {
                format.encode(&self.handle_unlock(collection, format.decode(body)?))?
            }
            Endpoint::ChangedSince => {
                format.encode(&self.handle_changed_since(collection, format.decode(body)?))?
            }
            Endpoint::Change => {
                format.encode(&self.handle_change(collection, format.decode(body)?)?)?
            }
            Endpoint::Fetch => format.encode(&self.handle_fetch(collection, format.decode(body)?)?)?,
            Endpoint::Clear => format.encode(&self.handle_clear(collection, format.decode(body)?)?)?,
        };
        Ok(response)
    }

    /// Handles `online`.
    pub fn handle_online(&self) -> OnlineResponse {
        OnlineResponse {
            online: self.context.is_online(),
        }
    }

    /// Handles `lock`. The requested wait is capped by the configuration.
    pub fn handle_lock(&self, collection: &str, request: LockRequest) -> LockResponse {
        let wait = std::time::Duration::from_millis(request.max_wait_millis)
            .min(self.context.config.max_lock_wait);
        let acquired = self
            .context
            .locks
            .try_acquire(collection, &request.owner, wait);
        LockResponse { acquired }
    }

    /// Handles `unlock`.
    pub fn handle_unlock(&self, collection: &str, request: ReleaseRequest) -> ChangeAck {
        let released = self.context.locks.release(collection, &request.owner);
        ChangeAck { mutated: released }
    }

    /// Handles `changed-since`.
    pub fn handle_changed_since(&self, collection: &str, request: ChangedSinceRequest) -> ChangeFeed {
        self.context.store(collection).changed_since(request.from_sequence)
    }

    /// Handles `change`. Rejected while another replica holds the lock.
    pub fn handle_change(&self, collection: &str, feed: ChangeFeed) -> ServerResult<ChangeAck> {
        if let Err(err) = self
            .context
            .locks
            .check_owner(collection, feed.originator.as_deref())
        {
            tracing::warn!(collection, originator = ?feed.originator, "change rejected: {err}");
            return Err(err);
        }

        let store = self.context.store(collection);
        let mutated = store.apply_change(&feed)?;
        self.context.prune_expired_tombstones(&store);
        Ok(ChangeAck { mutated })
    }

    /// Handles `fetch`. The page size is capped by the configuration.
    pub fn handle_fetch(&self, collection: &str, request: PageRequest) -> ServerResult<PageResponse> {
        let size = request.size.min(self.context.config.max_page_size);
        let documents = self.context.store(collection).page(request.offset, size);
        Ok(PageResponse { documents })
    }

    /// Handles `clear`. Rejected while another replica holds the lock.
    pub fn handle_clear(&self, collection: &str, request: ClearRequest) -> ServerResult<ChangeAck> {
        self.context
            .locks
            .check_owner(collection, Some(&request.owner))?;
        let mutated = self.context.store(collection).clear();
        tracing::info!(collection, owner = %request.owner, mutated, "collection cleared");
        Ok(ChangeAck { mutated })
    }
}
