//! Manifest Registry (spec §4.5): load, validate, index, hot-reload.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;

use super::types::Manifest;

/// A snapshot of the loaded manifest set: the tool-name index plus the
/// manifests that back it. Replaced wholesale on reload — readers always see
/// either the pre-swap or post-swap snapshot, never a mix (spec §5).
#[derive(Debug, Default)]
struct Snapshot {
    /// tool name -> index into `manifests`
    tool_index: HashMap<String, usize>,
    manifests: Vec<Arc<Manifest>>,
}

impl Snapshot {
    fn build(manifests: Vec<Manifest>) -> Self {
        let mut tool_index = HashMap::new();
        let mut kept = Vec::new();
        for manifest in manifests {
            if let Err(e) = manifest.validate() {
                tracing::warn!(manifest = %manifest.id, error = %e, "rejecting invalid manifest");
                continue;
            }
            let idx = kept.len();
            let mut collided = false;
            for tool in &manifest.tools {
                if tool_index.contains_key(&tool.name) {
                    tracing::warn!(
                        tool = %tool.name,
                        manifest = %manifest.id,
                        "duplicate tool name, first loader wins"
                    );
                    collided = true;
                }
            }
            if collided {
                // Invariant: tool names are globally unique; on collision the
                // *later* load is rejected wholesale and the former is kept
                // (spec §3 invariant). We detect collisions per-tool above so
                // partial overlap with an otherwise-fine manifest still
                // rejects the whole file, matching "first loader wins".
                continue;
            }
            for tool in &manifest.tools {
                tool_index.insert(tool.name.clone(), idx);
            }
            kept.push(Arc::new(manifest));
        }
        Self {
            tool_index,
            manifests: kept,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AdvertisedTool {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: serde_json::Value,
}

/// The manifest registry. Cheaply cloneable; all clones share the same
/// snapshot via `Arc<RwLock<_>>`.
#[derive(Clone)]
pub struct ManifestRegistry {
    root: PathBuf,
    snapshot: Arc<RwLock<Snapshot>>,
}

impl ManifestRegistry {
    /// Load the registry from `root`, scanning recursively for `*.json`
    /// files (spec §4.5 storage layout: subdirectories are organizational
    /// only).
    pub async fn load(root: PathBuf) -> std::io::Result<Self> {
        let manifests = read_manifests(&root).await?;
        Ok(Self {
            root,
            snapshot: Arc::new(RwLock::new(Snapshot::build(manifests))),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Rebuild from scratch and atomically swap in the new snapshot. Reload
    /// idempotence (spec §8 Testable Property 6): calling this twice against
    /// an unchanged directory produces identical tool index contents because
    /// `Snapshot::build` is a pure function of the manifest files on disk.
    pub async fn reload(&self) -> std::io::Result<()> {
        let manifests = read_manifests(&self.root).await?;
        let new_snapshot = Snapshot::build(manifests);
        *self.snapshot.write().await = new_snapshot;
        Ok(())
    }

    pub async fn find_tool(&self, name: &str) -> Option<(Arc<Manifest>, super::types::Tool)> {
        let snap = self.snapshot.read().await;
        let idx = *snap.tool_index.get(name)?;
        let manifest = snap.manifests[idx].clone();
        let tool = manifest.tools.iter().find(|t| t.name == name)?.clone();
        Some((manifest, tool))
    }

    /// Tools advertised to the stdio bridge: `mcpExpose != false` and backed
    /// by an Internal implementation (spec §4.8).
    pub async fn list_mcp_exposed(&self) -> Vec<AdvertisedTool> {
        let snap = self.snapshot.read().await;
        let mut out: Vec<AdvertisedTool> = snap
            .manifests
            .iter()
            .filter(|m| matches!(m.implementation, super::types::Implementation::Internal { .. }))
            .flat_map(|m| m.tools.iter())
            .filter(|t| t.mcp_expose)
            .map(|t| AdvertisedTool {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.input_schema.clone(),
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    pub async fn manifest_count(&self) -> usize {
        self.snapshot.read().await.manifests.len()
    }

    /// `(AdvertisedTool, dotted socket method)` pairs for the stdio bridge
    /// (spec §4.8): `mcpExpose != false` tools whose manifest is
    /// Internal-backed, sorted by name for deterministic `tools/list`.
    pub async fn list_bridge_tools(&self) -> Vec<(AdvertisedTool, String)> {
        let snap = self.snapshot.read().await;
        let mut out: Vec<(AdvertisedTool, String)> = Vec::new();
        for manifest in &snap.manifests {
            let super::types::Implementation::Internal { methods, .. } = &manifest.implementation else {
                continue;
            };
            for tool in &manifest.tools {
                if !tool.mcp_expose {
                    continue;
                }
                let Some(dotted) = methods.get(&tool.name) else {
                    continue;
                };
                out.push((
                    AdvertisedTool {
                        name: tool.name.clone(),
                        description: tool.description.clone(),
                        input_schema: tool.input_schema.clone(),
                    },
                    dotted.clone(),
                ));
            }
        }
        out.sort_by(|a, b| a.0.name.cmp(&b.0.name));
        out
    }
}

async fn read_manifests(root: &Path) -> std::io::Result<Vec<Manifest>> {
    let mut out = Vec::new();
    if !root.exists() {
        return Ok(out);
    }
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = match tokio::fs::read_to_string(&path).await {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to read manifest");
                    continue;
                }
            };
            match serde_json::from_str::<Manifest>(&content) {
                Ok(m) => out.push(m),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping invalid manifest file");
                }
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn write_manifest(dir: &Path, name: &str, tool: &str) {
        let body = serde_json::json!({
            "id": name, "name": name, "version": "1.0.0", "category": "test",
            "schema_version": 1,
            "tools": [{"name": tool, "description": "d", "inputSchema": {"type": "object"}}],
            "implementation": {
                "type": "internal",
                "module": "server",
                "methods": { tool: "server.status" }
            }
        });
        tokio::fs::write(dir.join(format!("{name}.json")), body.to_string())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn loads_and_finds_tool() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), "a", "tool_a").await;
        let reg = ManifestRegistry::load(dir.path().to_path_buf()).await.unwrap();
        assert!(reg.find_tool("tool_a").await.is_some());
        assert!(reg.find_tool("nope").await.is_none());
    }

    #[tokio::test]
    async fn duplicate_tool_name_second_manifest_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), "a", "shared_tool").await;
        write_manifest(dir.path(), "b", "shared_tool").await;
        let reg = ManifestRegistry::load(dir.path().to_path_buf()).await.unwrap();
        // Exactly one manifest survives; the tool is still queryable.
        assert!(reg.find_tool("shared_tool").await.is_some());
        assert_eq!(reg.manifest_count().await, 1);
    }

    #[tokio::test]
    async fn reload_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), "a", "tool_a").await;
        let reg = ManifestRegistry::load(dir.path().to_path_buf()).await.unwrap();
        let before = reg.list_mcp_exposed().await;
        reg.reload().await.unwrap();
        let after = reg.list_mcp_exposed().await;
        assert_eq!(
            serde_json::to_string(&before).unwrap(),
            serde_json::to_string(&after).unwrap()
        );
    }
}
