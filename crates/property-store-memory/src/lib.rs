//! In-memory (single process) implementation of the property store for tests
//! and local clusters.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::Error;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use swarm_property_store::PropertyStore;
use swarm_state::{PropertyDelta, PropertyKey, PropertyValue};
use tokio::sync::Mutex;

type Scopes = HashMap<String, BTreeMap<PropertyKey, PropertyValue>>;

/// In-memory property store. Clones share the same data.
#[derive(Clone, Debug, Default)]
pub struct MemoryPropertyStore {
    scopes: Arc<Mutex<Scopes>>,
    scope: String,
}

impl MemoryPropertyStore {
    /// Creates a new `MemoryPropertyStore`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of properties in this store's scope.
    pub async fn len(&self) -> usize {
        self.scopes
            .lock()
            .await
            .get(&self.scope)
            .map_or(0, BTreeMap::len)
    }

    /// Whether this store's scope holds no properties.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl PropertyStore for MemoryPropertyStore {
    type Error = Error;

    async fn apply(&self, delta: PropertyDelta) -> Result<(), Self::Error> {
        let mut scopes = self.scopes.lock().await;
        let properties = scopes.entry(self.scope.clone()).or_default();
        for (key, value) in delta {
            match value {
                Some(value) => {
                    properties.insert(key, value);
                }
                None => {
                    properties.remove(&key);
                }
            }
        }
        Ok(())
    }

    async fn get(&self, key: &PropertyKey) -> Result<Option<PropertyValue>, Self::Error> {
        let scopes = self.scopes.lock().await;
        Ok(scopes
            .get(&self.scope)
            .and_then(|properties| properties.get(key))
            .cloned())
    }

    async fn snapshot(&self) -> Result<Vec<(PropertyKey, PropertyValue)>, Self::Error> {
        let scopes = self.scopes.lock().await;
        Ok(scopes
            .get(&self.scope)
            .map(|properties| {
                properties
                    .iter()
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn scope<S: Into<String> + Send>(&self, scope: S) -> Self {
        let scope = scope.into();
        Self {
            scopes: self.scopes.clone(),
            scope: if self.scope.is_empty() {
                scope
            } else {
                format!("{}:{scope}", self.scope)
            },
        }
    }
}
