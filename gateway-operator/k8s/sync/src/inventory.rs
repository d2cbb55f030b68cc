//! Sources of API descriptors for a portal.

use crate::{secret_value, store::Store, Error, Result};
use gateway_operator_core::ApiDescriptor;
use gateway_operator_k8s_api::{
    portal::{PortalAuth, CLIENT_ID_KEY, CLIENT_SECRET_KEY},
    L7Portal, ResourceExt, Secret,
};
use serde::Deserialize;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, SystemTime},
};

/// The largest page the portal serves.
const PAGE_SIZE: u32 = 2000;

#[async_trait::async_trait]
pub trait InventorySource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<ApiDescriptor>>;

    /// Whether the inventory may have changed since `since`, or `None` if the
    /// source cannot tell.
    async fn modified_since(&self, since: SystemTime) -> Result<Option<bool>>;
}

/// Builds the inventory source a portal is configured with.
#[async_trait::async_trait]
pub trait SourceProvider: Send + Sync {
    async fn source(&self, portal: &L7Portal) -> Result<Arc<dyn InventorySource>>;
}

/// Reads one JSON descriptor per `*.json` file in a directory.
#[derive(Clone, Debug)]
pub struct CacheDir {
    path: PathBuf,
}

/// Fetches descriptors from a portal tenant with client credentials.
#[derive(Clone, Debug)]
pub struct RemotePortal {
    http: reqwest::Client,
    endpoint: String,
    tenant: String,
    auth_endpoint: String,
    client_id: String,
    client_secret: String,
}

/// Provides [`CacheDir`] or [`RemotePortal`] sources, reading portal
/// credentials through the store.
pub struct Sources<S> {
    store: S,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct Token {
    access_token: String,
}

#[derive(Deserialize)]
struct Page {
    #[serde(default)]
    results: Vec<ApiDescriptor>,
}

// === impl CacheDir ===

impl CacheDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn entries(&self) -> Result<Vec<PathBuf>> {
        let mut dir = tokio::fs::read_dir(&self.path).await?;
        let mut paths = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }
}

#[async_trait::async_trait]
impl InventorySource for CacheDir {
    async fn fetch(&self) -> Result<Vec<ApiDescriptor>> {
        let mut descriptors = Vec::new();
        for path in self.entries().await? {
            let bytes = tokio::fs::read(&path).await?;
            descriptors.push(serde_json::from_slice(&bytes)?);
        }
        Ok(descriptors)
    }

    async fn modified_since(&self, since: SystemTime) -> Result<Option<bool>> {
        // Removing a file only touches the directory.
        if modified(&self.path).await? > since {
            return Ok(Some(true));
        }
        for path in self.entries().await? {
            if modified(&path).await? > since {
                return Ok(Some(true));
            }
        }
        Ok(Some(false))
    }
}

async fn modified(path: &Path) -> Result<SystemTime> {
    Ok(tokio::fs::metadata(path).await?.modified()?)
}

// === impl RemotePortal ===

impl RemotePortal {
    async fn token(&self) -> Result<String> {
        let url = format!(
            "{}/auth/oauth/v2/token",
            self.auth_endpoint.trim_end_matches('/')
        );
        let rsp = self
            .http
            .post(&url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;
        let rsp = accepted(url, rsp).await?;
        Ok(rsp.json::<Token>().await?.access_token)
    }
}

#[async_trait::async_trait]
impl InventorySource for RemotePortal {
    async fn fetch(&self) -> Result<Vec<ApiDescriptor>> {
        let token = self.token().await?;
        let url = format!(
            "{}/{}/apis?size={PAGE_SIZE}",
            self.endpoint.trim_end_matches('/'),
            self.tenant
        );
        let rsp = self.http.get(&url).bearer_auth(token).send().await?;
        let page = accepted(url, rsp).await?.json::<Page>().await?;
        Ok(page.results)
    }

    async fn modified_since(&self, _: SystemTime) -> Result<Option<bool>> {
        Ok(None)
    }
}

async fn accepted(url: String, rsp: reqwest::Response) -> Result<reqwest::Response> {
    let status = rsp.status();
    if status.is_success() {
        return Ok(rsp);
    }
    let body = rsp.text().await.unwrap_or_default();
    Err(Error::Rejected {
        url,
        status: status.as_u16(),
        body,
    })
}

// === impl Sources ===

impl<S: Store> Sources<S> {
    pub fn new(store: S, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { store, http })
    }

    async fn credentials(&self, ns: &str, auth: &PortalAuth) -> Result<(String, String)> {
        if let Some(name) = auth.existing_secret_name.as_deref() {
            let secret = self
                .store
                .get::<Secret>(ns, name)
                .await?
                .ok_or_else(|| Error::NotFound {
                    kind: "Secret".to_string(),
                    name: name.to_string(),
                })?;
            let id = secret_value(&secret, CLIENT_ID_KEY).ok_or_else(|| Error::MissingKey {
                secret: name.to_string(),
                key: CLIENT_ID_KEY,
            })?;
            let key = secret_value(&secret, CLIENT_SECRET_KEY).ok_or_else(|| {
                Error::MissingKey {
                    secret: name.to_string(),
                    key: CLIENT_SECRET_KEY,
                }
            })?;
            return Ok((id, key));
        }

        match (auth.client_id.clone(), auth.client_secret.clone()) {
            (Some(id), Some(key)) => Ok((id, key)),
            (None, _) => Err(Error::MissingField {
                kind: "L7Portal",
                field: "spec.auth.clientId",
            }),
            (_, None) => Err(Error::MissingField {
                kind: "L7Portal",
                field: "spec.auth.clientSecret",
            }),
        }
    }
}

#[async_trait::async_trait]
impl<S: Store> SourceProvider for Sources<S> {
    async fn source(&self, portal: &L7Portal) -> Result<Arc<dyn InventorySource>> {
        if let Some(dir) = portal.spec.cache_dir.as_deref() {
            return Ok(Arc::new(CacheDir::new(dir)));
        }

        let ns = portal.namespace().ok_or(Error::MissingField {
            kind: "L7Portal",
            field: "metadata.namespace",
        })?;
        let auth = portal.spec.auth.as_ref().ok_or(Error::MissingField {
            kind: "L7Portal",
            field: "spec.auth",
        })?;
        let (client_id, client_secret) = self.credentials(&ns, auth).await?;
        let auth_endpoint = if auth.endpoint.is_empty() {
            portal.spec.endpoint.clone()
        } else {
            auth.endpoint.clone()
        };
        Ok(Arc::new(RemotePortal {
            http: self.http.clone(),
            endpoint: portal.spec.endpoint.clone(),
            tenant: portal.spec.tenant.clone(),
            auth_endpoint,
            client_id,
            client_secret,
        }))
    }
}
