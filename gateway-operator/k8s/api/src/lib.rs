#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod condition;
pub mod gateway;
pub mod l7api;
pub mod labels;
pub mod pod;
pub mod portal;
pub mod state_store;

pub use self::{
    condition::Condition,
    gateway::Gateway,
    l7api::{L7Api, L7ApiSpec, L7ApiStatus},
    labels::Labels,
    portal::{L7Portal, L7PortalSpec, L7PortalStatus},
    state_store::{L7StateStore, L7StateStoreSpec, L7StateStoreStatus},
};
pub use k8s_openapi::{
    api::core::v1::{ConfigMap, Pod, PodStatus, Secret},
    apimachinery::pkg::apis::meta::v1::OwnerReference,
    ByteString,
};
pub use kube::{
    api::{Api, DeleteParams, ListParams, ObjectMeta, Patch, PatchParams, PostParams, ResourceExt},
    Client, Error, Resource,
};

/// The API group of every custom resource managed here.
pub const GROUP: &str = "l7.operator.dev";

/// Held on an `L7Api` until its bundle has been removed from every gateway.
pub const API_FINALIZER: &str = "l7.operator.dev/api-cleanup";

/// Returns true if the object has been marked for deletion.
pub fn is_deleting<K: Resource>(obj: &K) -> bool {
    obj.meta().deletion_timestamp.is_some()
}
