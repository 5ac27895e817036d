use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use super::{DeploymentCache, DeploymentRecord, DeploymentResolver};
use crate::proxy::auth::AuthorityAuth;
use crate::proxy::config::GatewayConfig;
use crate::proxy::error::UpstreamError;
use crate::proxy::upstream::build_http_client;

#[derive(Debug, Default, Deserialize)]
struct DeploymentList {
    #[serde(default)]
    deployments: Vec<DeploymentEntry>,
}

#[derive(Debug, Deserialize)]
struct DeploymentEntry {
    #[serde(default)]
    domain: Option<String>,
    #[serde(default)]
    manifest_id: Option<Value>,
    #[serde(default)]
    target: Option<DeploymentTarget>,
}

#[derive(Debug, Deserialize)]
struct DeploymentTarget {
    #[serde(default)]
    id: Option<Value>,
}

/// Ids come back as numbers or strings depending on the endpoint version.
fn id_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Discovery through the platform API, memoized per manifest id.
pub struct NetworkDiscovery {
    http_client: Client,
    deployments_url: String,
    project_env_id: String,
    backend_scheme: String,
    cache: Arc<DeploymentCache>,
}

impl NetworkDiscovery {
    pub fn new(config: &GatewayConfig, cache: Arc<DeploymentCache>) -> Result<Self, String> {
        Ok(Self {
            http_client: build_http_client(Some(config.validation_timeout()))?,
            deployments_url: format!("{}/deployments", config.project_url()),
            project_env_id: config.project_env_id.clone(),
            backend_scheme: config.backend_scheme.clone(),
            cache,
        })
    }

    pub fn cache(&self) -> &Arc<DeploymentCache> {
        &self.cache
    }

    fn to_record(&self, entry: &DeploymentEntry, manifest_id: Option<&str>) -> Option<DeploymentRecord> {
        let domain = entry.domain.as_deref().filter(|d| !d.is_empty())?;
        let manifest_id = match manifest_id {
            Some(id) => id.to_string(),
            None => entry.manifest_id.as_ref().and_then(id_to_string)?,
        };

        Some(DeploymentRecord {
            manifest_id,
            domain: domain.to_string(),
            target_id: entry
                .target
                .as_ref()
                .and_then(|t| t.id.as_ref())
                .and_then(id_to_string),
            scheme: self.backend_scheme.clone(),
        })
    }

    async fn query(
        &self,
        auth: &AuthorityAuth,
        manifest_id: Option<&str>,
    ) -> Result<DeploymentList, UpstreamError> {
        let mut params = vec![
            ("status", "running"),
            ("project_env_id", self.project_env_id.as_str()),
        ];
        if let Some(id) = manifest_id {
            params.push(("manifest_id", id));
        }

        let response = auth
            .apply(self.http_client.get(&self.deployments_url))
            .query(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(UpstreamError::Status(response.status()));
        }

        response
            .json()
            .await
            .map_err(|e| UpstreamError::Payload(e.to_string()))
    }
}

#[async_trait]
impl DeploymentResolver for NetworkDiscovery {
    async fn resolve(&self, manifest_id: &str, auth: &AuthorityAuth) -> Option<DeploymentRecord> {
        if let Some(record) = self.cache.get(manifest_id) {
            tracing::debug!(manifest_id, "deployment cache hit");
            return Some(record);
        }

        tracing::info!(manifest_id, "resolving deployment");
        let list = match self.query(auth, Some(manifest_id)).await {
            Ok(list) => list,
            Err(e) => {
                tracing::warn!(manifest_id, error = %e, "deployment discovery failed");
                return None;
            }
        };

        // Duplicates are possible upstream; which one comes first is unspecified.
        let record = list
            .deployments
            .first()
            .and_then(|entry| self.to_record(entry, Some(manifest_id)));

        match record {
            Some(record) => {
                tracing::info!(manifest_id, domain = %record.domain, "cached deployment");
                self.cache.insert(record.clone());
                Some(record)
            }
            None => {
                tracing::info!(manifest_id, "no running deployment");
                None
            }
        }
    }

    async fn list(&self, auth: &AuthorityAuth) -> Result<Vec<DeploymentRecord>, UpstreamError> {
        let list = self.query(auth, None).await?;
        Ok(list
            .deployments
            .iter()
            .filter_map(|entry| self.to_record(entry, None))
            .collect())
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}
