//! Abstract interface for the externally stored, last-write-wins property
//! set nodes coordinate through.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::error::Error;
use std::fmt::Debug;

use async_trait::async_trait;
use swarm_state::{PropertyDelta, PropertyKey, PropertyValue, StateView, StateViewBuilder};

/// Marker trait for `PropertyStore` errors
pub trait PropertyStoreError: Debug + Error + Send + Sync + 'static {}

/// A store of swarm properties.
///
/// Writes are overwrite-only: a key disappears only when a delta retracts it.
/// Concurrent writers to one key resolve last-write-wins.
///
/// # Required Methods
/// - `apply`: publish and retract the properties in a delta.
/// - `get`: read one property.
/// - `snapshot`: read every property.
/// - `scope`: a store whose keys do not collide with this one's.
#[async_trait]
pub trait PropertyStore: Clone + Send + Sync + 'static {
    /// The error type for this store.
    type Error: PropertyStoreError;

    /// Apply `delta`: `Some` overwrites, `None` removes.
    async fn apply(&self, delta: PropertyDelta) -> Result<(), Self::Error>;

    /// Read one property.
    async fn get(&self, key: &PropertyKey) -> Result<Option<PropertyValue>, Self::Error>;

    /// Every property, in key order.
    async fn snapshot(&self) -> Result<Vec<(PropertyKey, PropertyValue)>, Self::Error>;

    /// A store namespaced under `scope`, such as one swarm among several.
    #[must_use]
    fn scope<S: Into<String> + Send>(&self, scope: S) -> Self;

    /// Complete `builder` with every stored property.
    async fn view(&self, builder: StateViewBuilder) -> Result<StateView, Self::Error> {
        let builder = self
            .snapshot()
            .await?
            .into_iter()
            .fold(builder, |builder, (key, value)| {
                builder.property(swarm_state::Property {
                    key,
                    value: Some(value),
                })
            });
        Ok(builder.build())
    }
}
