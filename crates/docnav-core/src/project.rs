//! The persisted unit of work: which bundles a workspace shows, in what
//! order, and where their bytes come from.
//!
//! A [`Project`] is either transient (a scratch workspace that silently skips
//! persistence) or loaded from a [`ProjectStore`], in which case
//! [`Workspace::save`](crate::workspace::Workspace::save) writes it back after
//! the plugins have flushed their in-memory state into it.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::types::{BundleIdentifier, DocumentationBundle};
use crate::{Error, Result};

/// The persisted description of which bundles are loaded and in what order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Stable identifier, also used to scope per-project caches.
    pub identifier: String,
    /// Mutable, user-facing project name.
    pub display_name: String,
    /// Ordered top-level entries, including non-bundle separators.
    pub items: Vec<ProjectNode>,
    /// Source configuration per referenced bundle. Keys are unique.
    pub references: HashMap<BundleIdentifier, ProjectReference>,
    #[serde(skip)]
    is_persistent: bool,
}

impl Project {
    /// Creates a project with an explicit identifier.
    ///
    /// The result is transient until it passes through a [`ProjectStore`].
    pub fn new(
        identifier: impl Into<String>,
        display_name: impl Into<String>,
        items: Vec<ProjectNode>,
        references: HashMap<BundleIdentifier, ProjectReference>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            display_name: display_name.into(),
            items,
            references,
            is_persistent: false,
        }
    }

    /// Creates an empty transient project (one that is never persisted).
    pub fn transient(display_name: impl Into<String>) -> Self {
        Self::new(
            uuid::Uuid::new_v4().to_string(),
            display_name,
            Vec::new(),
            HashMap::new(),
        )
    }

    /// Whether `persist()` is meaningful for this project.
    pub const fn is_persistent(&self) -> bool {
        self.is_persistent
    }

    pub(crate) fn mark_persistent(&mut self) {
        self.is_persistent = true;
    }

    /// Checks the structural consistency between `items` and `references`.
    ///
    /// Every bundle node must have a matching reference entry, and every
    /// reference must be used by at least one node. Violations are reported
    /// together in a [`ValidationFailure`]; nothing is mutated.
    pub fn validate(&self) -> std::result::Result<(), ValidationFailure> {
        let mut missing = Vec::new();
        let mut unused: Vec<&str> = self.references.keys().map(String::as_str).collect();

        for item in &self.items {
            let Some(identifier) = item.bundle_identifier() else {
                continue;
            };

            if self.references.contains_key(identifier) {
                unused.retain(|candidate| *candidate != identifier);
            } else if !missing.iter().any(|m| m == identifier) {
                missing.push(identifier.to_string());
            }
        }

        if missing.is_empty() && unused.is_empty() {
            return Ok(());
        }

        let mut unused: Vec<String> = unused.into_iter().map(str::to_string).collect();
        unused.sort_unstable();
        Err(ValidationFailure {
            missing_references: missing,
            unused_references: unused,
        })
    }
}

impl fmt::Display for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Project({})", self.identifier)
    }
}

/// Structural consistency error produced by [`Project::validate`].
#[derive(Debug, Clone, thiserror::Error)]
#[error(
    "project validation failed: missing references [{}], unused references [{}]",
    .missing_references.join(", "),
    .unused_references.join(", ")
)]
pub struct ValidationFailure {
    /// Identifiers referenced by nodes but absent from `references`.
    pub missing_references: Vec<String>,
    /// Reference entries no node points at, sorted for stable reporting.
    pub unused_references: Vec<String>,
}

/// One ordered entry in a project's top-level navigator list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ProjectNode {
    /// A documentation bundle entry.
    #[serde(rename_all = "camelCase")]
    Bundle {
        /// Display name persisted for this entry.
        display_name: String,
        /// Identifier of the referenced bundle.
        bundle_identifier: BundleIdentifier,
    },
    /// A display-only separator between bundles.
    #[serde(rename_all = "camelCase")]
    GroupMarker {
        /// Display name of the separator.
        display_name: String,
    },
}

impl ProjectNode {
    /// Creates a bundle node.
    pub fn bundle(
        display_name: impl Into<String>,
        bundle_identifier: impl Into<BundleIdentifier>,
    ) -> Self {
        Self::Bundle {
            display_name: display_name.into(),
            bundle_identifier: bundle_identifier.into(),
        }
    }

    /// Creates a group-marker node.
    pub fn group_marker(display_name: impl Into<String>) -> Self {
        Self::GroupMarker {
            display_name: display_name.into(),
        }
    }

    /// The display name persisted for this entry.
    pub fn display_name(&self) -> &str {
        match self {
            Self::Bundle { display_name, .. } | Self::GroupMarker { display_name } => display_name,
        }
    }

    /// The referenced bundle identifier, if this is a bundle node.
    pub fn bundle_identifier(&self) -> Option<&str> {
        match self {
            Self::Bundle {
                bundle_identifier, ..
            } => Some(bundle_identifier),
            Self::GroupMarker { .. } => None,
        }
    }
}

/// Bundle metadata carried by a project reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceMetadata {
    /// Human-readable bundle name.
    pub display_name: String,
    /// The bundle identifier.
    pub identifier: BundleIdentifier,
}

/// Source configuration and metadata for one referenced bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectReference {
    /// Where the bundle's bytes come from.
    pub source: ProjectSource,
    /// Identity of the referenced bundle.
    pub metadata: ReferenceMetadata,
}

impl ProjectReference {
    /// Creates a reference from a source and the bundle's identity.
    pub fn new(
        source: ProjectSource,
        display_name: impl Into<String>,
        identifier: impl Into<BundleIdentifier>,
    ) -> Self {
        Self {
            source,
            metadata: ReferenceMetadata {
                display_name: display_name.into(),
                identifier: identifier.into(),
            },
        }
    }

    /// The identifier of the referenced bundle.
    pub fn bundle_identifier(&self) -> &str {
        &self.metadata.identifier
    }

    /// The display name of the referenced bundle.
    pub fn display_name(&self) -> &str {
        &self.metadata.display_name
    }

    /// Reconstructs the [`DocumentationBundle`] this reference describes.
    ///
    /// The index location depends on the source kind: local roots keep their
    /// index under `index/`, index sources *are* the index directory, and HTTP
    /// sources derive the index path from the configured index URL.
    pub fn bundle(&self) -> Result<DocumentationBundle> {
        let (base_url, index_path) = match &self.source {
            ProjectSource::LocalFs { root } => (file_base_url(root)?, "index".to_string()),
            ProjectSource::Index { path } => (file_base_url(path)?, String::new()),
            ProjectSource::Http {
                base_url,
                index_url,
            } => {
                let index_path = index_url
                    .as_str()
                    .strip_prefix(base_url.as_str())
                    .ok_or_else(|| {
                        Error::InvalidUrl(format!(
                            "index URL '{index_url}' is not below base URL '{base_url}'"
                        ))
                    })?
                    .trim_matches('/')
                    .to_string();
                (base_url.clone(), index_path)
            },
        };

        Ok(DocumentationBundle::new(
            self.metadata.identifier.clone(),
            self.metadata.display_name.clone(),
            base_url,
            index_path,
        ))
    }
}

fn file_base_url(path: &Path) -> Result<Url> {
    Url::from_file_path(path)
        .map_err(|()| Error::InvalidUrl(format!("'{}' is not an absolute path", path.display())))
}

/// Where a referenced bundle's bytes come from.
///
/// Each variant carries exactly the configuration needed to build a byte
/// provider for that source kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "config")]
pub enum ProjectSource {
    /// A bundle archive on the local filesystem.
    #[serde(rename = "localFS", rename_all = "camelCase")]
    LocalFs {
        /// Root directory of the bundle archive.
        #[serde(rename = "rootURL")]
        root: PathBuf,
    },
    /// A bare navigator index directory on the local filesystem.
    #[serde(rename = "index")]
    Index {
        /// The index directory itself.
        path: PathBuf,
    },
    /// A bundle served over HTTP.
    #[serde(rename = "http", rename_all = "camelCase")]
    Http {
        /// Base URL all bundle-relative paths resolve against.
        #[serde(rename = "baseURL")]
        base_url: Url,
        /// Absolute URL of the navigator index directory.
        #[serde(rename = "indexURL")]
        index_url: Url,
    },
}

/// Loads and persists projects.
///
/// Projects returned by [`ProjectStore::load`] report themselves persistent;
/// transient projects never reach [`ProjectStore::persist`].
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Loads the stored project, marking it persistent.
    async fn load(&self) -> Result<Project>;

    /// Writes the project back to the store.
    async fn persist(&self, project: &Project) -> Result<()>;
}

/// A [`ProjectStore`] that keeps the project as a JSON document on disk.
pub struct FileProjectStore {
    path: PathBuf,
}

impl FileProjectStore {
    /// Creates a store backed by the given file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ProjectStore for FileProjectStore {
    async fn load(&self) -> Result<Project> {
        let bytes = tokio::fs::read(&self.path).await?;
        let mut project: Project = serde_json::from_slice(&bytes)?;
        project.mark_persistent();
        debug!(path = %self.path.display(), %project, "loaded project");
        Ok(project)
    }

    async fn persist(&self, project: &Project) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write-then-rename so a crash never leaves a torn project file.
        let json = serde_json::to_string_pretty(project)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json.as_bytes()).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), %project, "persisted project");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_reference(identifier: &str) -> ProjectReference {
        ProjectReference::new(
            ProjectSource::LocalFs {
                root: PathBuf::from("/tmp/bundles/sloth"),
            },
            "SlothCreator",
            identifier,
        )
    }

    #[test]
    fn validation_passes_when_items_and_references_match() {
        let mut references = HashMap::new();
        references.insert("com.example.sloth".to_string(), local_reference("com.example.sloth"));

        let project = Project::new(
            "p1",
            "Test",
            vec![
                ProjectNode::bundle("SlothCreator", "com.example.sloth"),
                ProjectNode::group_marker("Tools"),
            ],
            references,
        );

        assert!(project.validate().is_ok());
    }

    #[test]
    fn validation_reports_missing_references() {
        let project = Project::new(
            "p1",
            "Test",
            vec![ProjectNode::bundle("SlothCreator", "com.example.sloth")],
            HashMap::new(),
        );

        let failure = project.validate().unwrap_err();
        assert_eq!(failure.missing_references, vec!["com.example.sloth"]);
        assert!(failure.unused_references.is_empty());
    }

    #[test]
    fn validation_reports_unused_references() {
        let mut references = HashMap::new();
        references.insert("com.example.sloth".to_string(), local_reference("com.example.sloth"));
        references.insert("com.example.other".to_string(), local_reference("com.example.other"));

        let project = Project::new(
            "p1",
            "Test",
            vec![ProjectNode::bundle("SlothCreator", "com.example.sloth")],
            references,
        );

        let failure = project.validate().unwrap_err();
        assert!(failure.missing_references.is_empty());
        assert_eq!(failure.unused_references, vec!["com.example.other"]);
    }

    #[test]
    fn validation_reports_both_sides_at_once() {
        let mut references = HashMap::new();
        references.insert("com.example.unused".to_string(), local_reference("com.example.unused"));

        let project = Project::new(
            "p1",
            "Test",
            vec![ProjectNode::bundle("SlothCreator", "com.example.missing")],
            references,
        );

        let failure = project.validate().unwrap_err();
        assert_eq!(failure.missing_references, vec!["com.example.missing"]);
        assert_eq!(failure.unused_references, vec!["com.example.unused"]);
    }

    #[test]
    fn project_json_round_trips() {
        let mut references = HashMap::new();
        references.insert(
            "com.example.http".to_string(),
            ProjectReference::new(
                ProjectSource::Http {
                    base_url: Url::parse("https://docs.example.com/sloth/").unwrap(),
                    index_url: Url::parse("https://docs.example.com/sloth/index").unwrap(),
                },
                "Sloth",
                "com.example.http",
            ),
        );

        let project = Project::new(
            "p1",
            "Test",
            vec![
                ProjectNode::group_marker("Remote"),
                ProjectNode::bundle("Sloth", "com.example.http"),
            ],
            references,
        );

        let json = serde_json::to_string(&project).unwrap();
        assert!(json.contains("\"kind\":\"groupMarker\""));
        assert!(json.contains("\"kind\":\"http\""));
        assert!(json.contains("\"baseURL\""));

        let decoded: Project = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.items, project.items);
        assert_eq!(decoded.references, project.references);
        assert!(!decoded.is_persistent());
    }

    #[test]
    fn http_reference_derives_index_path_from_urls() {
        let reference = ProjectReference::new(
            ProjectSource::Http {
                base_url: Url::parse("https://docs.example.com/sloth/").unwrap(),
                index_url: Url::parse("https://docs.example.com/sloth/index").unwrap(),
            },
            "Sloth",
            "com.example.http",
        );

        let bundle = reference.bundle().unwrap();
        assert_eq!(bundle.index_path, "index");
        assert_eq!(
            bundle.index_url().unwrap().as_str(),
            "https://docs.example.com/sloth/index"
        );
    }

    #[test]
    fn index_reference_is_its_own_index_directory() {
        let reference = ProjectReference::new(
            ProjectSource::Index {
                path: PathBuf::from("/tmp/bundles/sloth/index"),
            },
            "Sloth",
            "com.example.idx",
        );

        let bundle = reference.bundle().unwrap();
        assert_eq!(bundle.index_path, "");
        assert!(bundle.base_url.as_str().ends_with("/tmp/bundles/sloth/index"));
    }

    #[tokio::test]
    async fn file_store_round_trips_and_marks_persistent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileProjectStore::new(dir.path().join("project.json"));

        let project = Project::transient("Scratch");
        assert!(!project.is_persistent());
        store.persist(&project).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert!(loaded.is_persistent());
        assert_eq!(loaded.identifier, project.identifier);
        assert_eq!(loaded.display_name, "Scratch");
    }
}
