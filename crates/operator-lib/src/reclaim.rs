//! Cleanup of objects an Intent's owner references cannot reach
//!
//! Runtime objects are garbage collected with their Intent. The Solver lives
//! in the FLUIDOS namespace and the NamespaceOffloading is left without an
//! owner, so both are removed explicitly when an Intent is deleted.

use crate::crd::{Intent, NamespaceOffloading, Solver, NAMESPACE_OFFLOADING_NAME};
use crate::error::Result;
use crate::store::{ObjectStore, StoreError, StoreObject};
use kube::ResourceExt;
use tracing::{debug, info};

/// Objects removed by [`reclaim_external_resources`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reclaimed {
    pub solver: bool,
    pub namespace_offloading: bool,
}

async fn delete_if_present<K, S>(store: &S, namespace: &str, name: &str) -> Result<bool>
where
    K: StoreObject,
    S: ObjectStore + ?Sized,
{
    match store.delete::<K>(namespace, name).await {
        Ok(()) => Ok(true),
        Err(StoreError::NotFound(key)) => {
            debug!(object = %key, "Already gone");
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

/// Delete the Solver and NamespaceOffloading created for `intent`
pub async fn reclaim_external_resources<S: ObjectStore + ?Sized>(
    store: &S,
    intent: &Intent,
    fluidos_namespace: &str,
) -> Result<Reclaimed> {
    let namespace = intent.namespace().unwrap_or_default();

    let reclaimed = Reclaimed {
        solver: delete_if_present::<Solver, S>(store, fluidos_namespace, &namespace).await?,
        namespace_offloading: delete_if_present::<NamespaceOffloading, S>(
            store,
            &namespace,
            NAMESPACE_OFFLOADING_NAME,
        )
        .await?,
    };

    info!(
        namespace = %namespace,
        name = %intent.name_any(),
        solver = reclaimed.solver,
        namespace_offloading = reclaimed.namespace_offloading,
        "External resources reclaimed"
    );
    Ok(reclaimed)
}
