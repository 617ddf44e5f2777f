//! Object store abstraction
//!
//! The reconciler talks to the cluster through [`ObjectStore`]. The
//! production implementation is [`KubeStore`]; [`MemoryStore`] keeps
//! versioned objects in process for tests and offline tooling.

mod conditions;
mod cluster;
mod memory;

pub use self::conditions::{retry_on_conflict, ConditionWriter, RetryPolicy};
pub use self::cluster::KubeStore;
pub use self::memory::MemoryStore;

use crate::error::Result;
use k8s_openapi::NamespaceResourceScope;
use kube::{Resource, ResourceExt};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::fmt::Debug;
use thiserror::Error;

/// Namespaced resources the store can hold
pub trait StoreObject:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<K> StoreObject for K where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// Identity of a stored object, used in error messages and metrics
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new<K: StoreObject>(namespace: &str, name: &str) -> Self {
        Self {
            kind: K::kind(&()).to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    pub fn of<K: StoreObject>(obj: &K) -> Self {
        Self::new::<K>(&obj.namespace().unwrap_or_default(), &obj.name_any())
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
    }
}

/// Object store errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(ObjectKey),

    #[error("{0} already exists")]
    AlreadyExists(ObjectKey),

    #[error("Conflict writing {0}: the object has been modified")]
    Conflict(ObjectKey),

    #[error("Rejected: {0}")]
    Rejected(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Decode error: {0}")]
    Decode(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

/// Versioned store of namespaced objects
///
/// Writes carry the resourceVersion they were read at and fail with
/// [`StoreError::Conflict`] when the stored object has moved on.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Get an object by namespace and name
    async fn get<K: StoreObject>(&self, namespace: &str, name: &str) -> Result<K, StoreError>;

    /// List objects of a kind, in one namespace or all of them
    async fn list<K: StoreObject>(&self, namespace: Option<&str>) -> Result<Vec<K>, StoreError>;

    /// Create an object, ignoring any status it carries
    async fn create<K: StoreObject>(&self, obj: &K) -> Result<K, StoreError>;

    /// Replace an object's metadata and spec, keeping its stored status
    async fn update<K: StoreObject>(&self, obj: &K) -> Result<K, StoreError>;

    /// Replace an object's status only
    async fn update_status<K: StoreObject>(&self, obj: &K) -> Result<K, StoreError>;

    /// Delete an object
    async fn delete<K: StoreObject>(&self, namespace: &str, name: &str) -> Result<(), StoreError>;
}

/// Get an object, mapping absence to `None`
pub async fn lookup<K, S>(store: &S, namespace: &str, name: &str) -> Result<Option<K>, StoreError>
where
    K: StoreObject,
    S: ObjectStore + ?Sized,
{
    match store.get::<K>(namespace, name).await {
        Ok(obj) => Ok(Some(obj)),
        Err(StoreError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Outcome of a create-or-update call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationResult {
    Created,
    Updated,
    Unchanged,
}

impl OperationResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationResult::Created => "created",
            OperationResult::Updated => "updated",
            OperationResult::Unchanged => "unchanged",
        }
    }
}

/// Converge an already looked-up object, creating it when `existing` is empty
///
/// `object` supplies the identity (and initial content) of an object that
/// is not stored yet; `mutate` is applied to the stored copy, or to
/// `object` when nothing is stored. An update is only issued when the
/// mutation changed the serialized object.
pub async fn upsert<K, S, F>(
    store: &S,
    existing: Option<K>,
    object: K,
    mutate: F,
) -> Result<(K, OperationResult)>
where
    K: StoreObject,
    S: ObjectStore + ?Sized,
    F: FnOnce(&mut K) -> Result<()> + Send,
{
    match existing {
        None => {
            let mut obj = object;
            mutate(&mut obj)?;
            let created = store.create(&obj).await?;
            Ok((created, OperationResult::Created))
        }
        Some(mut existing) => {
            let before = serde_json::to_value(&existing)?;
            mutate(&mut existing)?;
            if serde_json::to_value(&existing)? == before {
                return Ok((existing, OperationResult::Unchanged));
            }
            let updated = store.update(&existing).await?;
            Ok((updated, OperationResult::Updated))
        }
    }
}

/// Create the object if absent, otherwise converge the stored copy
pub async fn create_or_update<K, S, F>(
    store: &S,
    object: K,
    mutate: F,
) -> Result<(K, OperationResult)>
where
    K: StoreObject,
    S: ObjectStore + ?Sized,
    F: FnOnce(&mut K) -> Result<()> + Send,
{
    let namespace = object.namespace().unwrap_or_default();
    let existing = lookup::<K, S>(store, &namespace, &object.name_any()).await?;
    upsert(store, existing, object, mutate).await
}
