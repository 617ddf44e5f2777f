//! Object store backed by the Kubernetes API server

use super::{ObjectKey, ObjectStore, StoreError, StoreObject};
use async_trait::async_trait;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::{Client, ResourceExt};

/// [`ObjectStore`] over a `kube` client
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn api<K: StoreObject>(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Kind of call that failed, which decides how a 409 is read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verb {
    Read,
    Create,
    Write,
}

fn map_error(err: kube::Error, key: ObjectKey, verb: Verb) -> StoreError {
    match err {
        kube::Error::Api(response) => match response.code {
            404 => StoreError::NotFound(key),
            409 if verb == Verb::Create => StoreError::AlreadyExists(key),
            409 => StoreError::Conflict(key),
            400 | 422 => StoreError::Rejected(format!("{}: {}", key, response.message)),
            _ => StoreError::Transport(format!("{}: {}", key, response.message)),
        },
        kube::Error::SerdeError(e) => StoreError::Decode(format!("{}: {}", key, e)),
        other => StoreError::Transport(format!("{}: {}", key, other)),
    }
}

fn namespace_of<K: StoreObject>(obj: &K) -> Result<String, StoreError> {
    obj.namespace()
        .ok_or_else(|| StoreError::Rejected(format!("{} {} has no namespace", K::kind(&()), obj.name_any())))
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get<K: StoreObject>(&self, namespace: &str, name: &str) -> Result<K, StoreError> {
        self.api::<K>(namespace)
            .get(name)
            .await
            .map_err(|e| map_error(e, ObjectKey::new::<K>(namespace, name), Verb::Read))
    }

    async fn list<K: StoreObject>(&self, namespace: Option<&str>) -> Result<Vec<K>, StoreError> {
        let api: Api<K> = match namespace {
            Some(ns) => self.api(ns),
            None => Api::all(self.client.clone()),
        };
        let key = ObjectKey::new::<K>(namespace.unwrap_or("*"), "*");
        api.list(&ListParams::default())
            .await
            .map(|list| list.items)
            .map_err(|e| map_error(e, key, Verb::Read))
    }

    async fn create<K: StoreObject>(&self, obj: &K) -> Result<K, StoreError> {
        let namespace = namespace_of(obj)?;
        self.api::<K>(&namespace)
            .create(&PostParams::default(), obj)
            .await
            .map_err(|e| map_error(e, ObjectKey::of(obj), Verb::Create))
    }

    async fn update<K: StoreObject>(&self, obj: &K) -> Result<K, StoreError> {
        let namespace = namespace_of(obj)?;
        self.api::<K>(&namespace)
            .replace(&obj.name_any(), &PostParams::default(), obj)
            .await
            .map_err(|e| map_error(e, ObjectKey::of(obj), Verb::Write))
    }

    async fn update_status<K: StoreObject>(&self, obj: &K) -> Result<K, StoreError> {
        let namespace = namespace_of(obj)?;
        let body = serde_json::to_vec(obj).map_err(|e| StoreError::Decode(e.to_string()))?;
        self.api::<K>(&namespace)
            .replace_status(&obj.name_any(), &PostParams::default(), body)
            .await
            .map_err(|e| map_error(e, ObjectKey::of(obj), Verb::Write))
    }

    async fn delete<K: StoreObject>(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.api::<K>(namespace)
            .delete(name, &DeleteParams::background())
            .await
            .map(|_| ())
            .map_err(|e| map_error(e, ObjectKey::new::<K>(namespace, name), Verb::Write))
    }
}
