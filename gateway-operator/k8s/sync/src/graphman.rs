//! Pushes bundles to a gateway pod's management endpoint.

use crate::{Error, Result};
use serde_json::json;
use std::time::Duration;

const INSTALL: &str =
    "mutation install($bundle: JSON!) { installBundleGeneric(bundle: $bundle) { summary } }";
const DELETE: &str =
    "mutation delete($bundle: JSON!) { deleteBundleGeneric(bundle: $bundle) { summary } }";

/// A gateway pod's management endpoint and the admin credentials for it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Target {
    pub pod: String,
    pub address: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

#[async_trait::async_trait]
pub trait GraphmanClient: Send + Sync {
    /// Installs or updates every entity in the bundle.
    async fn apply(&self, target: &Target, bundle: &[u8]) -> Result<()>;

    /// Deletes the entities named by a removal bundle's mappings.
    async fn remove(&self, target: &Target, bundle: &[u8]) -> Result<()>;
}

#[derive(Clone, Debug)]
pub struct HttpGraphman {
    http: reqwest::Client,
}

// === impl Target ===

impl Target {
    pub fn url(&self) -> String {
        format!("https://{}:{}/graphman", self.address, self.port)
    }
}

// === impl HttpGraphman ===

impl HttpGraphman {
    /// Gateway pods serve self-signed certificates, so certificate
    /// verification is disabled.
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(timeout)
            .build()?;
        Ok(Self { http })
    }

    async fn send(&self, target: &Target, query: &str, bundle: &[u8]) -> Result<()> {
        let bundle = serde_json::from_slice::<serde_json::Value>(bundle)?;
        let url = target.url();
        let rsp = self
            .http
            .post(&url)
            .basic_auth(&target.username, Some(&target.password))
            .json(&json!({ "query": query, "variables": { "bundle": bundle } }))
            .send()
            .await?;

        let status = rsp.status();
        let body = rsp.text().await?;
        if !status.is_success() {
            return Err(Error::Rejected {
                url,
                status: status.as_u16(),
                body,
            });
        }

        // GraphQL reports failures in the body of a successful response.
        let errors = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("errors").cloned())
            .filter(|e| e.as_array().is_some_and(|e| !e.is_empty()));
        if let Some(errors) = errors {
            return Err(Error::Rejected {
                url,
                status: status.as_u16(),
                body: errors.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl GraphmanClient for HttpGraphman {
    async fn apply(&self, target: &Target, bundle: &[u8]) -> Result<()> {
        self.send(target, INSTALL, bundle).await
    }

    async fn remove(&self, target: &Target, bundle: &[u8]) -> Result<()> {
        self.send(target, DELETE, bundle).await
    }
}
