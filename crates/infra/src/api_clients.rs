use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use warden_auth::{ApiClient, ApiClientLookup, DirectoryError};

/// In-memory API-client registry for tests/dev.
///
/// Counts lookups so callers can assert that a request was rejected before
/// any credential was fetched.
#[derive(Debug, Default)]
pub struct InMemoryApiClients {
    clients: RwLock<HashMap<String, ApiClient>>,
    lookups: AtomicUsize,
}

impl InMemoryApiClients {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, client: ApiClient) {
        self.clients.write().insert(client.client_id.clone(), client);
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ApiClientLookup for InMemoryApiClients {
    async fn get_api_client_by_client_id(&self, client_id: &str) -> Result<ApiClient, DirectoryError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.clients
            .read()
            .get(client_id)
            .cloned()
            .ok_or(DirectoryError::NotFound)
    }
}
