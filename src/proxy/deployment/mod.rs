//! Workforce deployment resolution.
//!
//! A manifest id names a backend component; resolution turns it into the
//! network location of a running instance. Two strategies exist behind
//! [`DeploymentResolver`]: the platform discovery API (memoized in a
//! [`DeploymentCache`]) and a scan of local manifests for offline work.

pub mod cache;
pub mod local;
pub mod remote;

use async_trait::async_trait;
use serde::Serialize;

use crate::proxy::auth::AuthorityAuth;
use crate::proxy::error::UpstreamError;

pub use cache::DeploymentCache;
pub use local::LocalManifests;
pub use remote::NetworkDiscovery;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentRecord {
    pub manifest_id: String,
    pub domain: String,
    pub target_id: Option<String>,
    pub scheme: String,
}

impl DeploymentRecord {
    /// `<scheme>://<domain>/<endpoint>`
    pub fn endpoint_url(&self, endpoint: &str) -> String {
        format!(
            "{}://{}/{}",
            self.scheme,
            self.domain.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }
}

#[async_trait]
pub trait DeploymentResolver: Send + Sync {
    /// Running deployment for `manifest_id`, or `None` when nothing is running.
    async fn resolve(&self, manifest_id: &str, auth: &AuthorityAuth) -> Option<DeploymentRecord>;

    /// Every deployment this resolver can currently reach.
    async fn list(&self, auth: &AuthorityAuth) -> Result<Vec<DeploymentRecord>, UpstreamError>;

    /// Whether proxied payloads carry `context.platform_config`.
    fn injects_platform_config(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str;
}
