//! In-process object store
//!
//! Mirrors the parts of API server behaviour the reconciler depends on:
//! resourceVersion checks on every write, status kept apart from the rest of
//! the object, generation bumps on spec changes and no version bump for a
//! no-op write. Test hooks inject concurrent writers, write failures and
//! latency.

use super::{ObjectKey, ObjectStore, StoreError, StoreObject};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use dashmap::DashMap;
use kube::ResourceExt;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

type Mutation = Box<dyn FnOnce(&mut Value) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StoreKey {
    type_key: String,
    namespace: String,
    name: String,
}

impl StoreKey {
    fn new<K: StoreObject>(namespace: &str, name: &str) -> Self {
        Self {
            type_key: type_key::<K>(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

fn type_key<K: StoreObject>() -> String {
    format!("{}/{}", K::api_version(&()), K::kind(&()))
}

/// Versioned in-memory [`ObjectStore`]
pub struct MemoryStore {
    objects: DashMap<StoreKey, Value>,
    races: DashMap<StoreKey, Mutation>,
    failures: DashMap<String, StoreError>,
    latency: Option<Duration>,
    version: AtomicU64,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            objects: DashMap::new(),
            races: DashMap::new(),
            failures: DashMap::new(),
            latency: None,
            version: AtomicU64::new(1),
            writes: AtomicUsize::new(0),
        }
    }

    /// Delay every call by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of successful write calls so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of stored objects of a kind
    pub fn count<K: StoreObject>(&self) -> usize {
        let type_key = type_key::<K>();
        self.objects
            .iter()
            .filter(|entry| entry.key().type_key == type_key)
            .count()
    }

    /// Apply `mutate` as a concurrent writer just before the next write to
    /// the object, so that write sees a newer resourceVersion
    pub fn race_next_write<K, F>(&self, namespace: &str, name: &str, mutate: F)
    where
        K: StoreObject,
        F: FnOnce(&mut K) + Send + Sync + 'static,
    {
        let mutation: Mutation = Box::new(move |value: &mut Value| {
            if let Ok(mut obj) = serde_json::from_value::<K>(value.clone()) {
                mutate(&mut obj);
                if let Ok(next) = serde_json::to_value(&obj) {
                    *value = next;
                }
            }
        });
        self.races.insert(StoreKey::new::<K>(namespace, name), mutation);
    }

    /// Store a raw document as-is, bypassing encoding
    ///
    /// Lets tests plant objects written by other controllers, including ones
    /// this crate cannot decode.
    pub fn insert_raw<K: StoreObject>(&self, namespace: &str, name: &str, value: Value) {
        self.objects.insert(StoreKey::new::<K>(namespace, name), value);
    }

    /// Fail every write to objects of a kind with `error`
    pub fn fail_writes<K: StoreObject>(&self, error: StoreError) {
        self.failures.insert(type_key::<K>(), error);
    }

    pub fn clear_failures(&self) {
        self.failures.clear();
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn next_version(&self) -> String {
        self.version.fetch_add(1, Ordering::SeqCst).to_string()
    }

    fn check_failure<K: StoreObject>(&self) -> Result<(), StoreError> {
        match self.failures.get(&type_key::<K>()) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    /// Run the pending concurrent writer for `key`, if any
    fn run_race(&self, key: &StoreKey) {
        let Some((_, mutation)) = self.races.remove(key) else {
            return;
        };
        if let Some(mut stored) = self.objects.get_mut(key) {
            let before = stored.clone();
            mutation(&mut *stored);
            restore_identity(&mut *stored, &before);
            if *stored != before {
                let version = self.next_version();
                bump(&mut *stored, &before, version);
            }
        }
    }

    fn stored_for_write<K: StoreObject>(&self, obj: &K) -> Result<(StoreKey, Value), StoreError> {
        let namespace = obj
            .namespace()
            .ok_or_else(|| StoreError::Rejected(format!("{} {} has no namespace", K::kind(&()), obj.name_any())))?;
        let key = StoreKey::new::<K>(&namespace, &obj.name_any());

        self.run_race(&key);
        self.check_failure::<K>()?;

        let stored = self
            .objects
            .get(&key)
            .map(|v| v.clone())
            .ok_or_else(|| StoreError::NotFound(ObjectKey::of(obj)))?;

        if let Some(expected) = obj.resource_version() {
            if Some(expected.as_str()) != metadata_str(&stored, "resourceVersion") {
                return Err(StoreError::Conflict(ObjectKey::of(obj)));
            }
        }
        Ok((key, stored))
    }

    fn commit<K: StoreObject>(&self, key: StoreKey, stored: &Value, mut next: Value) -> Result<K, StoreError> {
        restore_identity(&mut next, stored);
        if next != *stored {
            let version = self.next_version();
            bump(&mut next, stored, version);
            self.objects.insert(key, next.clone());
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        decode(next)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn decode<K: StoreObject>(value: Value) -> Result<K, StoreError> {
    serde_json::from_value(value).map_err(|e| StoreError::Decode(e.to_string()))
}

fn encode<K: StoreObject>(obj: &K) -> Result<Value, StoreError> {
    serde_json::to_value(obj).map_err(|e| StoreError::Decode(e.to_string()))
}

fn metadata_mut(value: &mut Value) -> Option<&mut Map<String, Value>> {
    value
        .as_object_mut()?
        .entry("metadata")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
}

fn metadata_str<'v>(value: &'v Value, field: &str) -> Option<&'v str> {
    value.get("metadata")?.get(field)?.as_str()
}

fn without_metadata_and_status(value: &Value) -> Value {
    let mut view = value.clone();
    if let Some(obj) = view.as_object_mut() {
        obj.remove("metadata");
        obj.remove("status");
    }
    view
}

/// Carry over the fields clients cannot change
fn restore_identity(next: &mut Value, stored: &Value) {
    let stored_meta = stored.get("metadata").cloned().unwrap_or(Value::Null);
    let Some(meta) = metadata_mut(next) else {
        return;
    };
    for field in ["uid", "creationTimestamp", "resourceVersion", "generation"] {
        match stored_meta.get(field) {
            Some(value) => {
                meta.insert(field.to_string(), value.clone());
            }
            None => {
                meta.remove(field);
            }
        }
    }
}

fn bump(next: &mut Value, stored: &Value, version: String) {
    let spec_changed = without_metadata_and_status(next) != without_metadata_and_status(stored);
    let generation = stored
        .get("metadata")
        .and_then(|m| m.get("generation"))
        .and_then(Value::as_i64)
        .unwrap_or(1);

    if let Some(meta) = metadata_mut(next) {
        meta.insert("resourceVersion".to_string(), Value::String(version));
        if spec_changed {
            meta.insert("generation".to_string(), Value::from(generation + 1));
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get<K: StoreObject>(&self, namespace: &str, name: &str) -> Result<K, StoreError> {
        self.delay().await;
        let value = self
            .objects
            .get(&StoreKey::new::<K>(namespace, name))
            .map(|v| v.clone())
            .ok_or_else(|| StoreError::NotFound(ObjectKey::new::<K>(namespace, name)))?;
        decode(value)
    }

    async fn list<K: StoreObject>(&self, namespace: Option<&str>) -> Result<Vec<K>, StoreError> {
        self.delay().await;
        let type_key = type_key::<K>();
        let mut values: Vec<(StoreKey, Value)> = self
            .objects
            .iter()
            .filter(|entry| {
                entry.key().type_key == type_key
                    && namespace.map(|ns| entry.key().namespace == ns).unwrap_or(true)
            })
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        values.sort_by(|a, b| (&a.0.namespace, &a.0.name).cmp(&(&b.0.namespace, &b.0.name)));
        values.into_iter().map(|(_, v)| decode(v)).collect()
    }

    async fn create<K: StoreObject>(&self, obj: &K) -> Result<K, StoreError> {
        self.delay().await;
        self.check_failure::<K>()?;

        let namespace = obj
            .namespace()
            .ok_or_else(|| StoreError::Rejected(format!("{} {} has no namespace", K::kind(&()), obj.name_any())))?;
        let key = StoreKey::new::<K>(&namespace, &obj.name_any());
        if self.objects.contains_key(&key) {
            return Err(StoreError::AlreadyExists(ObjectKey::of(obj)));
        }

        let mut value = encode(obj)?;
        if let Some(fields) = value.as_object_mut() {
            fields.remove("status");
        }
        let version = self.next_version();
        let meta = metadata_mut(&mut value)
            .ok_or_else(|| StoreError::Rejected(format!("{} is not an object", ObjectKey::of(obj))))?;
        meta.insert("resourceVersion".to_string(), Value::String(version.clone()));
        meta.insert("generation".to_string(), Value::from(1));
        meta.entry("uid")
            .or_insert_with(|| Value::String(format!("00000000-0000-4000-8000-{:0>12}", version)));
        meta.entry("creationTimestamp").or_insert_with(|| {
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true))
        });

        self.objects.insert(key, value.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        decode(value)
    }

    async fn update<K: StoreObject>(&self, obj: &K) -> Result<K, StoreError> {
        self.delay().await;
        let (key, stored) = self.stored_for_write(obj)?;

        let mut next = encode(obj)?;
        if let Some(fields) = next.as_object_mut() {
            match stored.get("status") {
                Some(status) => fields.insert("status".to_string(), status.clone()),
                None => fields.remove("status"),
            };
        }
        self.commit(key, &stored, next)
    }

    async fn update_status<K: StoreObject>(&self, obj: &K) -> Result<K, StoreError> {
        self.delay().await;
        let (key, stored) = self.stored_for_write(obj)?;

        let mut next = stored.clone();
        if let Some(fields) = next.as_object_mut() {
            match encode(obj)?.get("status") {
                Some(status) => fields.insert("status".to_string(), status.clone()),
                None => fields.remove("status"),
            };
        }
        self.commit(key, &stored, next)
    }

    async fn delete<K: StoreObject>(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.delay().await;
        self.check_failure::<K>()?;
        self.objects
            .remove(&StoreKey::new::<K>(namespace, name))
            .map(|_| {
                self.writes.fetch_add(1, Ordering::SeqCst);
            })
            .ok_or_else(|| StoreError::NotFound(ObjectKey::new::<K>(namespace, name)))
    }
}
