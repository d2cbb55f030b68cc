//! Namespaced object access.
//!
//! Reconcilers only talk to the cluster through [`Store`], so they can be
//! driven against an in-memory store in tests.

use crate::{Error, Result};
use gateway_operator_k8s_api::{
    self as k8s, Api, DeleteParams, ListParams, Patch, PatchParams, PostParams,
};
use k8s_openapi::NamespaceResourceScope;
use serde::{de::DeserializeOwned, Serialize};
use std::{fmt, time::Duration};
use tokio::time;

/// A namespaced resource the store can read and write.
pub trait Object:
    k8s::Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + fmt::Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<K> Object for K where
    K: k8s::Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + fmt::Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// Object-store operations.
///
/// Patches are JSON merge patches. A `metadata.resourceVersion` in a patch
/// makes the write conditional on the object not having changed, failing
/// with [`Error::Conflict`] otherwise.
#[async_trait::async_trait]
pub trait Store: Send + Sync + 'static {
    async fn get<K: Object>(&self, ns: &str, name: &str) -> Result<Option<K>>;

    /// Lists objects matching an equality-based label selector. An empty
    /// selector matches everything.
    async fn list<K: Object>(&self, ns: &str, selector: &str) -> Result<Vec<K>>;

    async fn create<K: Object>(&self, ns: &str, obj: &K) -> Result<K>;

    async fn patch<K: Object>(&self, ns: &str, name: &str, patch: &serde_json::Value)
        -> Result<K>;

    /// Deletes an object. Deleting an object that does not exist succeeds.
    async fn delete<K: Object>(&self, ns: &str, name: &str) -> Result<()>;

    async fn patch_status<K: Object>(
        &self,
        ns: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<K>;
}

/// A [`Store`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeStore {
    client: k8s::Client,
    timeout: Duration,
}

// === impl KubeStore ===

impl KubeStore {
    pub fn new(client: k8s::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    fn api<K: Object>(&self, ns: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), ns)
    }
}

#[async_trait::async_trait]
impl Store for KubeStore {
    async fn get<K: Object>(&self, ns: &str, name: &str) -> Result<Option<K>> {
        let api = self.api::<K>(ns);
        time::timeout(self.timeout, api.get_opt(name))
            .await?
            .map_err(|e| api_error::<K>(name, e))
    }

    async fn list<K: Object>(&self, ns: &str, selector: &str) -> Result<Vec<K>> {
        let mut params = ListParams::default();
        if !selector.is_empty() {
            params = params.labels(selector);
        }
        let api = self.api::<K>(ns);
        let list = time::timeout(self.timeout, api.list(&params))
            .await?
            .map_err(|e| api_error::<K>("", e))?;
        Ok(list.items)
    }

    async fn create<K: Object>(&self, ns: &str, obj: &K) -> Result<K> {
        let api = self.api::<K>(ns);
        let name = obj.meta().name.clone().unwrap_or_default();
        time::timeout(self.timeout, api.create(&PostParams::default(), obj))
            .await?
            .map_err(|e| api_error::<K>(&name, e))
    }

    async fn patch<K: Object>(
        &self,
        ns: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<K> {
        let api = self.api::<K>(ns);
        time::timeout(
            self.timeout,
            api.patch(name, &PatchParams::default(), &Patch::Merge(patch)),
        )
        .await?
        .map_err(|e| api_error::<K>(name, e))
    }

    async fn delete<K: Object>(&self, ns: &str, name: &str) -> Result<()> {
        let api = self.api::<K>(ns);
        match time::timeout(self.timeout, api.delete(name, &DeleteParams::default())).await? {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
            Err(e) => Err(api_error::<K>(name, e)),
        }
    }

    async fn patch_status<K: Object>(
        &self,
        ns: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<K> {
        let api = self.api::<K>(ns);
        time::timeout(
            self.timeout,
            api.patch_status(name, &PatchParams::default(), &Patch::Merge(patch)),
        )
        .await?
        .map_err(|e| api_error::<K>(name, e))
    }
}

fn api_error<K: Object>(name: &str, error: kube::Error) -> Error {
    let kind = K::kind(&()).to_string();
    let name = name.to_string();
    match error {
        kube::Error::Api(ref e) if e.code == 409 && e.reason == "AlreadyExists" => {
            Error::AlreadyExists { kind, name }
        }
        kube::Error::Api(ref e) if e.code == 409 => Error::Conflict { kind, name },
        kube::Error::Api(ref e) if e.code == 404 => Error::NotFound { kind, name },
        error => Error::Kube(error),
    }
}
