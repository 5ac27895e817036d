use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use super::{DeploymentRecord, DeploymentResolver};
use crate::proxy::auth::AuthorityAuth;
use crate::proxy::error::UpstreamError;

const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Default, Deserialize)]
struct LocalManifest {
    #[serde(default)]
    id: Option<String>,
}

/// Offline resolution: one backend per on-disk manifest, on `base_port + index`.
///
/// Manifests are read on every call so edits show up without a restart.
/// Nothing here touches the discovery cache.
pub struct LocalManifests {
    dir: PathBuf,
    base_port: u16,
}

impl LocalManifests {
    pub fn new(dir: PathBuf, base_port: u16) -> Self {
        Self { dir, base_port }
    }

    /// Scan the manifests dir and assign ports in id order.
    pub async fn scan(&self) -> Result<Vec<DeploymentRecord>, String> {
        let dir = self.dir.clone();
        let mut ids = tokio::task::spawn_blocking(move || collect_manifest_ids(&dir))
            .await
            .map_err(|e| format!("manifest scan task failed: {}", e))??;

        ids.sort();
        ids.dedup();

        ids.into_iter()
            .enumerate()
            .map(|(index, manifest_id)| -> Result<DeploymentRecord, String> {
                let port = u16::try_from(index)
                    .ok()
                    .and_then(|offset| self.base_port.checked_add(offset))
                    .ok_or_else(|| format!("no port left for local manifest {}", manifest_id))?;
                Ok(DeploymentRecord {
                    manifest_id,
                    domain: format!("127.0.0.1:{}", port),
                    target_id: None,
                    scheme: "http".to_string(),
                })
            })
            .collect()
    }
}

fn read_manifest_id(path: &Path, fallback: Option<&str>) -> Option<String> {
    let parsed = std::fs::read_to_string(path)
        .ok()
        .and_then(|content| serde_json::from_str::<LocalManifest>(&content).ok());

    match parsed {
        Some(manifest) => manifest
            .id
            .filter(|id| !id.is_empty())
            .or_else(|| fallback.map(str::to_string)),
        None => {
            tracing::debug!("skipping unreadable manifest {:?}", path);
            None
        }
    }
}

/// `<dir>/<name>/manifest.json` and `<dir>/<name>.json` both define a component.
fn collect_manifest_ids(dir: &Path) -> Result<Vec<String>, String> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| format!("Failed to read manifests dir {:?}: {}", dir, e))?;

    let mut ids = Vec::new();
    for path in entries.filter_map(|e| e.ok()).map(|e| e.path()) {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(str::to_string);

        if path.is_dir() {
            let manifest = path.join(MANIFEST_FILE);
            if manifest.is_file() {
                ids.extend(read_manifest_id(&manifest, stem.as_deref()));
            }
        } else if path.extension().and_then(|s| s.to_str()) == Some("json") {
            ids.extend(read_manifest_id(&path, stem.as_deref()));
        }
    }
    Ok(ids)
}

#[async_trait]
impl DeploymentResolver for LocalManifests {
    async fn resolve(&self, manifest_id: &str, _auth: &AuthorityAuth) -> Option<DeploymentRecord> {
        match self.scan().await {
            Ok(records) => records.into_iter().find(|r| r.manifest_id == manifest_id),
            Err(e) => {
                tracing::warn!(error = %e, "local manifest scan failed");
                None
            }
        }
    }

    async fn list(&self, _auth: &AuthorityAuth) -> Result<Vec<DeploymentRecord>, UpstreamError> {
        self.scan().await.map_err(UpstreamError::Payload)
    }

    fn injects_platform_config(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "local"
    }
}
