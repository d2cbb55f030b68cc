//! Verifies that `L7StateStore`s are reachable and publishes their
//! configuration for gateways to mount.

use crate::{
    events::Event,
    objects,
    probe::Credentials,
    secret_value,
    store::Store,
    Context, Error, Result,
};
use gateway_operator_core::checksum;
use gateway_operator_k8s_api::{
    is_deleting,
    state_store::{PASSWORD_KEY, USERNAME_KEY},
    ByteString, L7StateStore, L7StateStoreStatus, ObjectMeta, Resource, ResourceExt, Secret,
};
use kube::runtime::controller::Action;
use serde_json::json;
use std::{collections::BTreeMap, sync::Arc};

/// Secret key holding the credential-free store configuration.
pub const CONFIG_KEY: &str = "config.json";

pub fn credentials_secret(name: &str) -> String {
    format!("{name}-secret")
}

pub fn config_secret(name: &str) -> String {
    format!("{name}-config-secret")
}

pub async fn reconcile<S: Store>(
    state_store: Arc<L7StateStore>,
    ctx: Arc<Context<S>>,
) -> Result<Action> {
    if is_deleting(state_store.as_ref()) {
        return Ok(Action::await_change());
    }
    let ns = crate::namespace(state_store.as_ref())?;
    let name = state_store.name_any();
    let redis = state_store.spec.redis.as_ref().ok_or(Error::MissingField {
        kind: "L7StateStore",
        field: "spec.redis",
    })?;

    let credentials = match state_store.spec.existing_secret.as_deref() {
        Some(secret) => existing_credentials(&ctx.store, &ns, secret).await?,
        None => {
            let credentials = Credentials {
                username: redis.username.clone(),
                password: redis.master_password.clone(),
            };
            if credentials != Credentials::default() {
                mirror_credentials(&ctx.store, &state_store, &credentials).await?;
            }
            credentials
        }
    };

    let config = serde_json::to_vec(&redis.without_credentials())?;
    let sum = checksum::fingerprint(&config);
    let secret = owned_secret(
        &state_store,
        config_secret(&name),
        [(CONFIG_KEY.to_string(), ByteString(config))].into_iter().collect(),
    );
    objects::apply(&ctx.store, &ns, secret, &sum).await?;

    let reference = state_store.object_ref(&());
    let ready = match ctx.probe.probe(redis, &credentials).await {
        Ok(()) => {
            tracing::debug!(%ns, %name, "State store reachable");
            ctx.events
                .publish(
                    &reference,
                    Event::normal("ConnectionSuccess", "Probe", "connected to the state store"),
                )
                .await;
            true
        }
        Err(error) => {
            tracing::warn!(%ns, %name, %error, "State store unreachable");
            ctx.events
                .publish(
                    &reference,
                    Event::warning("ConnectionFailed", "Probe", error.to_string()),
                )
                .await;
            false
        }
    };

    let current = state_store.status.as_ref().map(|s| s.ready);
    if current != Some(ready) {
        let patch = json!({
            "metadata": { "resourceVersion": state_store.resource_version() },
            "status": L7StateStoreStatus { ready },
        });
        ctx.store
            .patch_status::<L7StateStore>(&ns, &name, &patch)
            .await?;
        tracing::info!(%ns, %name, ready, "Updated state store status");
    }

    Ok(Action::requeue(ctx.config.requeue))
}

async fn existing_credentials<S: Store>(store: &S, ns: &str, name: &str) -> Result<Credentials> {
    let secret = store
        .get::<Secret>(ns, name)
        .await?
        .ok_or_else(|| Error::NotFound {
            kind: "Secret".to_string(),
            name: name.to_string(),
        })?;
    let password = secret_value(&secret, PASSWORD_KEY).ok_or_else(|| Error::MissingKey {
        secret: name.to_string(),
        key: PASSWORD_KEY,
    })?;
    Ok(Credentials {
        username: secret_value(&secret, USERNAME_KEY),
        password: Some(password),
    })
}

/// Copies inline credentials into a secret owned by the state store.
async fn mirror_credentials<S: Store>(
    store: &S,
    state_store: &L7StateStore,
    credentials: &Credentials,
) -> Result<()> {
    let data = [
        (USERNAME_KEY, credentials.username.as_deref()),
        (PASSWORD_KEY, credentials.password.as_deref()),
    ]
    .into_iter()
    .filter_map(|(k, v)| Some((k.to_string(), ByteString(v?.as_bytes().to_vec()))))
    .collect::<BTreeMap<_, _>>();
    let sum = checksum::fingerprint_json(&data)?;
    let ns = crate::namespace(state_store)?;
    let secret = owned_secret(state_store, credentials_secret(&state_store.name_any()), data);
    objects::apply(store, &ns, secret, &sum).await?;
    Ok(())
}

fn owned_secret(
    state_store: &L7StateStore,
    name: String,
    data: BTreeMap<String, ByteString>,
) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: state_store.namespace(),
            owner_references: state_store.controller_owner_ref(&()).map(|r| vec![r]),
            ..Default::default()
        },
        data: Some(data),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    }
}
