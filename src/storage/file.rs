//! YAML files on disk
//!
//! Every `*.yaml` / `*.yml` file in a directory may hold several documents
//! separated by `---`. Each document names its type with a `kind` field:
//!
//! ```yaml
//! kind: RoutingSpec
//! name: test-xds
//! listener: echo_server
//! ---
//! kind: Membership
//! name: test-service
//! subsets:
//!   - addresses: [10.0.0.1]
//!     ports: [{name: grpc, port: 8080}]
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{MembershipSource, RoutingSpecSource};
use crate::domain::{Membership, RoutingSpec};
use crate::errors::{Error, Result};

#[derive(Debug, Deserialize)]
#[serde(tag = "kind")]
enum Document {
    RoutingSpec(RoutingSpec),
    Membership(Membership),
}

/// Reads routing specs and membership from YAML directories.
#[derive(Debug, Clone)]
pub struct FileSource {
    specs_dir: PathBuf,
    membership_dir: PathBuf,
    namespace: Option<String>,
}

impl FileSource {
    /// Read both kinds of document from `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self { specs_dir: dir.clone(), membership_dir: dir, namespace: None }
    }

    pub fn with_membership_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.membership_dir = dir.into();
        self
    }

    /// Only return routing specs from `namespace`. Membership is not scoped
    /// because specs may reference services in other namespaces.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    async fn load_documents(dir: &Path) -> Result<Vec<Document>> {
        let mut paths = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| {
            Error::transient(format!("failed to list {}: {}", dir.display(), e))
        })?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::transient(format!("failed to list {}: {}", dir.display(), e)))?
        {
            let path = entry.path();
            let is_yaml = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext == "yaml" || ext == "yml");
            if is_yaml {
                paths.push(path);
            }
        }
        paths.sort();

        let mut documents = Vec::new();
        for path in paths {
            let text = tokio::fs::read_to_string(&path).await.map_err(|e| {
                Error::transient(format!("failed to read {}: {}", path.display(), e))
            })?;
            let parsed = parse_documents(&text)
                .map_err(|e| Error::serialization(format!("{}: {}", path.display(), e)))?;
            debug!(file = %path.display(), documents = parsed.len(), "Loaded YAML documents");
            documents.extend(parsed);
        }

        Ok(documents)
    }
}

fn parse_documents(text: &str) -> std::result::Result<Vec<Document>, serde_yaml::Error> {
    let mut documents = Vec::new();
    for document in serde_yaml::Deserializer::from_str(text) {
        let value = serde_yaml::Value::deserialize(document)?;
        if value.is_null() {
            continue;
        }
        documents.push(serde_yaml::from_value(value)?);
    }
    Ok(documents)
}

#[async_trait]
impl RoutingSpecSource for FileSource {
    async fn list_routing_specs(&self) -> Result<Vec<RoutingSpec>> {
        let documents = Self::load_documents(&self.specs_dir).await?;
        Ok(documents
            .into_iter()
            .filter_map(|doc| match doc {
                Document::RoutingSpec(spec) => Some(spec),
                Document::Membership(_) => None,
            })
            .filter(|spec| self.namespace.as_deref().map_or(true, |ns| spec.namespace == ns))
            .collect())
    }
}

#[async_trait]
impl MembershipSource for FileSource {
    async fn list_membership(&self) -> Result<Vec<Membership>> {
        let documents = Self::load_documents(&self.membership_dir).await?;
        Ok(documents
            .into_iter()
            .filter_map(|doc| match doc {
                Document::Membership(membership) => Some(membership),
                Document::RoutingSpec(_) => None,
            })
            .collect())
    }
}
