//! The navigator: loaded indices, top-level display nodes, and topic
//! addressing across every bundle in the workspace.
//!
//! The navigator owns all [`NavigatorIndex`] instances and the ordered list
//! of top-level nodes (bundles and group markers). Loading a project resets
//! everything; adding a bundle prepends one node. Tree reads run
//! concurrently, one task per distinct index, each bounded by
//! [`READ_TREE_TIMEOUT`]; a failure or timeout marks only the owning nodes as
//! failed.
//!
//! All externally observable state lives in one lock-guarded struct and is
//! swapped or mutated only through the navigator's methods. Every mutation
//! bumps a watch channel so UI layers can re-render; completions from a
//! superseded `load` generation are discarded before they can touch state.

pub mod ids;
pub mod index;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::try_join_all;
use tokio::sync::{Mutex, RwLock, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::project::{Project, ProjectNode};
use crate::provider::CachedResource;
use crate::types::{
    BundleIdentifier, DocumentationBundle, DocumentationUri, InterfaceLanguage,
};
use crate::workspace::{DocumentationContext, WorkspacePlugin};
use crate::{Error, Result};

use self::ids::{IdAllocator, NavigatorId};
use self::index::{INDEX_ARTIFACTS, NavigatorIndex};

/// Time budget for reading one bundle's navigator tree.
pub const READ_TREE_TIMEOUT: Duration = Duration::from_secs(5);

/// Loading lifecycle of a top-level node.
///
/// `Pending → Loading → Ready | Failed`. Terminal states are only left when a
/// new project load replaces the node wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoadState {
    /// Published, index not opened yet.
    #[default]
    Pending,
    /// Index opened; tree read in flight.
    Loading,
    /// Tree read completed.
    Ready,
    /// Index open or tree read failed; the message is kept for display.
    Failed(String),
}

impl LoadState {
    /// Whether a load is currently in flight.
    pub const fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    /// Whether the node's content is fully available.
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// The retained failure message, if the load failed.
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failed(message) => Some(message),
            _ => None,
        }
    }
}

/// What a top-level node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopLevelNodeKind {
    /// A documentation bundle with an index behind it.
    Bundle,
    /// A display-only separator.
    GroupMarker,
}

/// One entry in the navigator's top-level display list.
#[derive(Debug, Clone)]
pub struct TopLevelNode {
    /// Stable identity for display layers.
    pub display_id: Uuid,
    /// Whether this is a bundle or a separator.
    pub kind: TopLevelNodeKind,
    /// Name shown for this entry.
    pub display_name: String,
    /// The bundle topic this entry points at; `None` for group markers.
    pub reference: Option<DocumentationUri>,
    /// Current loading state.
    pub status: LoadState,
}

impl TopLevelNode {
    fn bundle(reference: DocumentationUri, display_name: impl Into<String>) -> Self {
        Self {
            display_id: Uuid::new_v4(),
            kind: TopLevelNodeKind::Bundle,
            display_name: display_name.into(),
            reference: Some(reference),
            status: LoadState::Pending,
        }
    }

    fn group_marker(display_name: impl Into<String>) -> Self {
        Self {
            display_id: Uuid::new_v4(),
            kind: TopLevelNodeKind::GroupMarker,
            display_name: display_name.into(),
            reference: None,
            status: LoadState::Pending,
        }
    }

    /// The identifier of the referenced bundle, if this is a bundle node.
    pub fn bundle_identifier(&self) -> Option<&str> {
        self.reference
            .as_ref()
            .map(|reference| reference.bundle_identifier.as_str())
    }
}

#[derive(Default)]
struct NavigatorState {
    indices: HashMap<u32, Arc<NavigatorIndex>>,
    bundle_id_to_top_level: HashMap<BundleIdentifier, u32>,
    nodes: Vec<TopLevelNode>,
    selection: Option<NavigatorId>,
}

impl NavigatorState {
    fn path_of(&self, id: NavigatorId) -> Option<&str> {
        self.indices
            .get(&id.top_level_id())
            .and_then(|index| index.path_for_id(id.node_id()))
    }
}

/// Owns all loaded navigator indices and the top-level display list.
pub struct Navigator {
    allocator: IdAllocator,
    state: Arc<RwLock<NavigatorState>>,
    generation: Arc<AtomicU64>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    version: watch::Sender<u64>,
}

impl Navigator {
    /// Creates a navigator with a fresh allocator.
    pub fn new() -> Self {
        Self::with_allocator(IdAllocator::new())
    }

    /// Creates a navigator issuing top-level IDs from the given allocator.
    pub fn with_allocator(allocator: IdAllocator) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            allocator,
            state: Arc::new(RwLock::new(NavigatorState::default())),
            generation: Arc::new(AtomicU64::new(0)),
            tasks: Mutex::new(Vec::new()),
            version,
        }
    }

    /// A receiver that changes whenever observable navigator state changes.
    pub fn observe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    fn bump(&self) {
        self.version.send_modify(|v| *v += 1);
    }

    /// Snapshot of the top-level display list, in project order.
    pub async fn nodes(&self) -> Vec<TopLevelNode> {
        self.state.read().await.nodes.clone()
    }

    /// The currently selected topic, if any.
    pub async fn selection(&self) -> Option<NavigatorId> {
        self.state.read().await.selection
    }

    /// Resolves a composite ID to the topic path inside its index.
    ///
    /// Returns `None` when the top-level ID is unknown or the node ID does
    /// not resolve; misses are diagnostics, not errors.
    pub async fn path_for(&self, id: NavigatorId) -> Option<String> {
        let state = self.state.read().await;
        let Some(index) = state.indices.get(&id.top_level_id()) else {
            debug!(%id, "no index for top-level id");
            return None;
        };
        let path = index.path_for_id(id.node_id());
        if path.is_none() {
            debug!(%id, "no path for node id");
        }
        path.map(str::to_string)
    }

    /// Resolves a composite ID to a fully qualified topic reference.
    pub async fn topic_uri_for(&self, id: NavigatorId) -> Option<DocumentationUri> {
        let state = self.state.read().await;
        let Some(index) = state.indices.get(&id.top_level_id()) else {
            debug!(%id, "no index for top-level id");
            return None;
        };
        index
            .path_for_id(id.node_id())
            .map(|path| DocumentationUri::new(index.bundle_identifier(), path))
    }

    /// Resolves a topic path within a bundle to its composite ID.
    pub async fn id_for(
        &self,
        path: &str,
        language: InterfaceLanguage,
        bundle_identifier: &str,
    ) -> Option<NavigatorId> {
        let state = self.state.read().await;
        let Some(top_level_id) = state.bundle_id_to_top_level.get(bundle_identifier) else {
            debug!(bundle_identifier, "unknown bundle");
            return None;
        };
        let Some(index) = state.indices.get(top_level_id) else {
            debug!(bundle_identifier, top_level_id, "no index for bundle");
            return None;
        };
        let Some(node_id) = index.id_for_path(path, language) else {
            debug!(bundle_identifier, path, "no node for path");
            return None;
        };
        Some(NavigatorId::new(*top_level_id, node_id))
    }

    /// Moves the selection to the topic a URI points at.
    ///
    /// A no-op when the URI cannot be resolved or already is the selection;
    /// selections are compared by effective path, since two IDs can resolve
    /// to identical paths after a reload.
    pub async fn navigate_to(&self, uri: &DocumentationUri) {
        let Some(id) = self
            .id_for(&uri.path, InterfaceLanguage::DEFAULT, &uri.bundle_identifier)
            .await
        else {
            debug!(%uri, "uri not present in navigator");
            return;
        };

        {
            let mut state = self.state.write().await;
            if let Some(current) = state.selection {
                if current == id || state.path_of(current) == state.path_of(id) {
                    return;
                }
            }
            state.selection = Some(id);
        }
        self.bump();
    }

    async fn load_project(
        &self,
        project: &Project,
        context: &dyn DocumentationContext,
    ) -> Result<()> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(%project, generation, "navigator loading project");

        // Cancel in-flight loads from the previous generation before the
        // reset; their completions are additionally generation-checked.
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }

        // Publish placeholder nodes in project order before any index work,
        // so display layers can render immediately.
        {
            let mut state = self.state.write().await;
            *state = NavigatorState::default();
            for item in &project.items {
                state.nodes.push(match item {
                    ProjectNode::GroupMarker { display_name } => {
                        TopLevelNode::group_marker(display_name.clone())
                    },
                    ProjectNode::Bundle {
                        display_name,
                        bundle_identifier,
                    } => TopLevelNode::bundle(
                        DocumentationUri::new(bundle_identifier.clone(), ""),
                        display_name.clone(),
                    ),
                });
            }
        }
        self.bump();

        // Open each distinct bundle's index exactly once; items sharing a
        // bundle share its index.
        let mut distinct: Vec<&str> = Vec::new();
        for item in &project.items {
            if let Some(identifier) = item.bundle_identifier() {
                if !distinct.contains(&identifier) {
                    distinct.push(identifier);
                }
            }
        }

        for bundle_identifier in distinct {
            let bundle = context.bundle(bundle_identifier).await.ok_or_else(|| {
                Error::Precondition(format!(
                    "project references bundle '{bundle_identifier}' that was never \
                     registered in the context"
                ))
            })?;

            match self.open_bundle_index(&bundle, context).await {
                Ok(index) => self.install_index(generation, bundle_identifier, index).await,
                Err(error) => {
                    warn!(bundle = bundle_identifier, %error, "failed to open navigator index");
                    self.mark_bundle(
                        generation,
                        bundle_identifier,
                        LoadState::Failed(error.to_string()),
                    )
                    .await;
                },
            }
        }

        Ok(())
    }

    async fn add_bundle(
        &self,
        identifier: &BundleIdentifier,
        context: &dyn DocumentationContext,
    ) -> Result<()> {
        let bundle = context.bundle(identifier).await.ok_or_else(|| {
            Error::Precondition(format!(
                "bundle '{identifier}' must be registered in the context before it \
                 can be added to the navigator"
            ))
        })?;
        info!(%bundle, "adding bundle to navigator");

        let index = self.open_bundle_index(&bundle, context).await?;
        let generation = self.generation.load(Ordering::SeqCst);

        // The new node goes to the front; existing nodes stay untouched.
        {
            let mut state = self.state.write().await;
            state.nodes.insert(
                0,
                TopLevelNode::bundle(
                    DocumentationUri::new(identifier.clone(), ""),
                    bundle.display_name.clone(),
                ),
            );
        }
        self.install_index(generation, identifier, index).await;
        Ok(())
    }

    /// Opens a bundle's index: directly for local locations, via the
    /// short-lived artifact cache for remote ones, since the parser operates
    /// on a local file location.
    async fn open_bundle_index(
        &self,
        bundle: &DocumentationBundle,
        context: &dyn DocumentationContext,
    ) -> Result<NavigatorIndex> {
        let index_url = bundle.index_url()?;
        if index_url.scheme() == "file" {
            let path = index_url.to_file_path().map_err(|()| {
                Error::InvalidUrl(format!("'{index_url}' is not a local path"))
            })?;
            return NavigatorIndex::open(&path, bundle.identifier.clone(), false, None).await;
        }

        let cache = fetch_index_artifacts(bundle, context).await?;
        // The cache directory is removed when `cache` drops, on success and
        // on error alike; the parsed index owns its data by then.
        NavigatorIndex::open(cache.path(), bundle.identifier.clone(), false, None).await
    }

    async fn install_index(
        &self,
        generation: u64,
        bundle_identifier: &str,
        mut index: NavigatorIndex,
    ) {
        let top_level_id = self.allocator.next();
        index.set_top_level_id(top_level_id);
        let index = Arc::new(index);

        {
            let mut state = self.state.write().await;
            if self.generation.load(Ordering::SeqCst) != generation {
                debug!(bundle = bundle_identifier, "discarding index for stale generation");
                return;
            }
            state.indices.insert(top_level_id, Arc::clone(&index));
            state
                .bundle_id_to_top_level
                .insert(bundle_identifier.to_string(), top_level_id);
            for node in nodes_of_bundle(&mut state.nodes, bundle_identifier) {
                node.status = LoadState::Loading;
            }
        }
        self.bump();

        let state = Arc::clone(&self.state);
        let generation_counter = Arc::clone(&self.generation);
        let version = self.version.clone();
        let bundle_identifier = bundle_identifier.to_string();
        let handle = tokio::spawn(async move {
            let result = index.read_tree(READ_TREE_TIMEOUT).await;

            let mut state = state.write().await;
            if generation_counter.load(Ordering::SeqCst) != generation {
                debug!(bundle = %bundle_identifier, "discarding completion for stale generation");
                return;
            }
            let status = match result {
                Ok(()) => LoadState::Ready,
                Err(error) => {
                    warn!(bundle = %bundle_identifier, %error, "navigator tree read failed");
                    LoadState::Failed(error.to_string())
                },
            };
            for node in nodes_of_bundle(&mut state.nodes, &bundle_identifier) {
                node.status = status.clone();
            }
            drop(state);
            version.send_modify(|v| *v += 1);
        });
        self.tasks.lock().await.push(handle);
    }

    async fn mark_bundle(&self, generation: u64, bundle_identifier: &str, status: LoadState) {
        {
            let mut state = self.state.write().await;
            if self.generation.load(Ordering::SeqCst) != generation {
                return;
            }
            for node in nodes_of_bundle(&mut state.nodes, bundle_identifier) {
                node.status = status.clone();
            }
        }
        self.bump();
    }

    async fn write_back(&self, project: &mut Project) -> Result<()> {
        let state = self.state.read().await;
        let mut items = Vec::with_capacity(state.nodes.len());

        for node in &state.nodes {
            match node.kind {
                TopLevelNodeKind::GroupMarker => {
                    items.push(ProjectNode::group_marker(node.display_name.clone()));
                },
                TopLevelNodeKind::Bundle => {
                    let reference = node.reference.as_ref().ok_or_else(|| {
                        Error::Precondition(
                            "bundle node has no bundle reference at save time".into(),
                        )
                    })?;
                    let bundle_identifier = &reference.bundle_identifier;

                    let top_level_id = state
                        .bundle_id_to_top_level
                        .get(bundle_identifier)
                        .ok_or_else(|| {
                            Error::Precondition(format!(
                                "bundle '{bundle_identifier}' has no top-level id; save ran \
                                 before its load completed"
                            ))
                        })?;
                    let index = state.indices.get(top_level_id).ok_or_else(|| {
                        Error::Precondition(format!(
                            "no index for bundle '{bundle_identifier}' at save time"
                        ))
                    })?;
                    let node_id = index
                        .id_for_path(&reference.path, InterfaceLanguage::DEFAULT)
                        .ok_or_else(|| {
                            Error::Precondition(format!(
                                "reference path '{}' of bundle '{bundle_identifier}' does not \
                                 resolve in its index",
                                reference.path
                            ))
                        })?;
                    let tree = index.tree().ok_or_else(|| {
                        Error::Precondition(format!(
                            "navigator tree for '{bundle_identifier}' is not loaded; save ran \
                             before its load completed"
                        ))
                    })?;
                    let title = tree.node(node_id).map(|n| n.title.clone()).ok_or_else(|| {
                        Error::Precondition(format!(
                            "node {node_id} of bundle '{bundle_identifier}' is missing from \
                             its tree"
                        ))
                    })?;

                    items.push(ProjectNode::bundle(title, bundle_identifier.clone()));
                },
            }
        }

        project.items = items;
        Ok(())
    }
}

impl Default for Navigator {
    fn default() -> Self {
        Self::new()
    }
}

fn nodes_of_bundle<'a>(
    nodes: &'a mut [TopLevelNode],
    bundle_identifier: &'a str,
) -> impl Iterator<Item = &'a mut TopLevelNode> {
    nodes
        .iter_mut()
        .filter(move |node| node.bundle_identifier() == Some(bundle_identifier))
}

/// Fetches the full index artifact set into a fresh local cache.
///
/// Artifact fetches run concurrently; if any fails the whole fetch fails and
/// the cache directory is removed with it.
async fn fetch_index_artifacts(
    bundle: &DocumentationBundle,
    context: &dyn DocumentationContext,
) -> Result<CachedResource> {
    let cache = CachedResource::new()?;

    let fetches = INDEX_ARTIFACTS.iter().map(|artifact| {
        let index_path = bundle.index_path.trim_matches('/');
        let path = if index_path.is_empty() {
            (*artifact).to_string()
        } else {
            format!("{index_path}/{artifact}")
        };
        let uri = DocumentationUri::new(bundle.identifier.clone(), path);
        async move { Ok::<_, Error>((*artifact, context.contents_of_url(&uri).await?)) }
    });

    for (artifact, bytes) in try_join_all(fetches).await? {
        cache.put(artifact, &bytes).await?;
    }
    Ok(cache)
}

#[async_trait]
impl WorkspacePlugin for Navigator {
    fn plugin_id(&self) -> &'static str {
        "navigator"
    }

    async fn load(&self, project: &Project, context: &dyn DocumentationContext) -> Result<()> {
        self.load_project(project, context).await
    }

    async fn did_add_bundle(
        &self,
        identifier: &BundleIdentifier,
        context: &dyn DocumentationContext,
    ) -> Result<()> {
        self.add_bundle(identifier, context).await
    }

    async fn will_save(&self, project: &mut Project) -> Result<()> {
        self.write_back(project).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::{ProjectReference, ProjectSource};
    use crate::provider::LocalFsProvider;
    use crate::repository::BundleRepository;
    use crate::types::PageType;
    use super::index::NavigatorIndexWriter;
    use std::collections::HashMap as Map;
    use std::path::Path;

    struct TestContext {
        repo: BundleRepository,
    }

    #[async_trait]
    impl DocumentationContext for TestContext {
        async fn bundle(&self, identifier: &str) -> Option<DocumentationBundle> {
            self.repo.bundle(identifier).await
        }

        async fn contents_of_url(&self, url: &DocumentationUri) -> Result<Vec<u8>> {
            self.repo.contents_of_url(url).await
        }
    }

    /// Writes a minimal bundle archive (root dir with `index/` inside).
    async fn write_archive(root: &Path, title: &str) {
        let mut writer = NavigatorIndexWriter::new();
        writer
            .add_node(0, None, title, PageType::ROOT, InterfaceLanguage::DEFAULT)
            .add_node(1, Some(0), "Overview", PageType::ARTICLE, InterfaceLanguage::DEFAULT)
            .add_path(0, InterfaceLanguage::DEFAULT, "")
            .add_path(1, InterfaceLanguage::DEFAULT, "documentation/overview");
        writer.write_to(&root.join("index")).await.unwrap();
    }

    async fn register_local_bundle(context: &TestContext, root: &Path, identifier: &str, name: &str) {
        let reference = ProjectReference::new(
            ProjectSource::LocalFs {
                root: root.to_path_buf(),
            },
            name,
            identifier,
        );
        let bundle = reference.bundle().unwrap();
        context
            .repo
            .register_bundle(bundle, Arc::new(LocalFsProvider::new(root)))
            .await
            .unwrap();
    }

    fn project_with<P: AsRef<Path>>(items: Vec<ProjectNode>, references: Vec<(&str, P)>) -> Project {
        let references = references
            .into_iter()
            .map(|(identifier, root)| {
                (
                    identifier.to_string(),
                    ProjectReference::new(
                        ProjectSource::LocalFs {
                            root: root.as_ref().to_path_buf(),
                        },
                        identifier,
                        identifier,
                    ),
                )
            })
            .collect::<Map<_, _>>();
        Project::new("test-project", "Test", items, references)
    }

    async fn wait_for_terminal_states(navigator: &Navigator) -> Vec<TopLevelNode> {
        let mut rx = navigator.observe();
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let nodes = navigator.nodes().await;
                let settled = nodes
                    .iter()
                    .filter(|n| n.kind == TopLevelNodeKind::Bundle)
                    .all(|n| n.status.is_ready() || n.status.error().is_some());
                if settled {
                    return nodes;
                }
                rx.changed().await.unwrap();
            }
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn load_publishes_nodes_in_project_order() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("sloth");
        write_archive(&root, "SlothCreator").await;

        let context = TestContext {
            repo: BundleRepository::new(),
        };
        register_local_bundle(&context, &root, "com.example.sloth", "SlothCreator").await;

        let navigator = Navigator::new();
        let project = project_with(
            vec![
                ProjectNode::group_marker("Favorites"),
                ProjectNode::bundle("SlothCreator", "com.example.sloth"),
            ],
            vec![("com.example.sloth", &root)],
        );
        navigator.load_project(&project, &context).await.unwrap();

        let nodes = navigator.nodes().await;
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].kind, TopLevelNodeKind::GroupMarker);
        assert_eq!(nodes[0].display_name, "Favorites");
        assert_eq!(nodes[1].bundle_identifier(), Some("com.example.sloth"));

        let nodes = wait_for_terminal_states(&navigator).await;
        assert!(nodes[1].status.is_ready());
    }

    #[tokio::test]
    async fn per_bundle_failures_do_not_cascade() {
        let dir = tempfile::tempdir().unwrap();
        let good_root = dir.path().join("good");
        let bad_root = dir.path().join("bad");
        write_archive(&good_root, "Good").await;
        // Corrupt index: directory exists but holds garbage.
        std::fs::create_dir_all(bad_root.join("index")).unwrap();
        std::fs::write(bad_root.join("index/navigator.index"), b"garbage").unwrap();

        let context = TestContext {
            repo: BundleRepository::new(),
        };
        register_local_bundle(&context, &bad_root, "com.example.bad", "Bad").await;
        register_local_bundle(&context, &good_root, "com.example.good", "Good").await;

        let navigator = Navigator::new();
        let project = project_with(
            vec![
                ProjectNode::bundle("Bad", "com.example.bad"),
                ProjectNode::bundle("Good", "com.example.good"),
            ],
            vec![
                ("com.example.bad", &bad_root),
                ("com.example.good", &good_root),
            ],
        );
        navigator.load_project(&project, &context).await.unwrap();

        let nodes = wait_for_terminal_states(&navigator).await;
        assert!(nodes[0].status.error().is_some(), "corrupt bundle must fail");
        assert!(nodes[1].status.is_ready(), "valid bundle must load");
    }

    #[tokio::test]
    async fn lookups_compose_and_decompose_ids() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("sloth");
        write_archive(&root, "SlothCreator").await;

        let context = TestContext {
            repo: BundleRepository::new(),
        };
        register_local_bundle(&context, &root, "com.example.sloth", "SlothCreator").await;

        let navigator = Navigator::new();
        let project = project_with(
            vec![ProjectNode::bundle("SlothCreator", "com.example.sloth")],
            vec![("com.example.sloth", &root)],
        );
        navigator.load_project(&project, &context).await.unwrap();
        wait_for_terminal_states(&navigator).await;

        let id = navigator
            .id_for(
                "documentation/overview",
                InterfaceLanguage::DEFAULT,
                "com.example.sloth",
            )
            .await
            .unwrap();
        assert_eq!(
            navigator.path_for(id).await.as_deref(),
            Some("documentation/overview")
        );
        assert_eq!(
            navigator.topic_uri_for(id).await.unwrap().to_string(),
            "doc://com.example.sloth/documentation/overview"
        );

        // Misses are Options, not errors.
        assert!(navigator.path_for(NavigatorId::new(999, 0)).await.is_none());
        assert!(
            navigator
                .id_for("nope", InterfaceLanguage::DEFAULT, "com.example.sloth")
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn navigate_updates_selection_once_per_path() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("sloth");
        write_archive(&root, "SlothCreator").await;

        let context = TestContext {
            repo: BundleRepository::new(),
        };
        register_local_bundle(&context, &root, "com.example.sloth", "SlothCreator").await;

        let navigator = Navigator::new();
        let project = project_with(
            vec![ProjectNode::bundle("SlothCreator", "com.example.sloth")],
            vec![("com.example.sloth", &root)],
        );
        navigator.load_project(&project, &context).await.unwrap();
        wait_for_terminal_states(&navigator).await;

        let uri = DocumentationUri::new("com.example.sloth", "documentation/overview");
        navigator.navigate_to(&uri).await;
        let selection = navigator.selection().await.unwrap();
        assert_eq!(
            navigator.path_for(selection).await.as_deref(),
            Some("documentation/overview")
        );

        let version_before = *navigator.observe().borrow();
        navigator.navigate_to(&uri).await;
        assert_eq!(*navigator.observe().borrow(), version_before, "re-navigation is a no-op");

        // Unknown URIs leave the selection untouched.
        navigator
            .navigate_to(&DocumentationUri::new("com.example.other", ""))
            .await;
        assert_eq!(navigator.selection().await, Some(selection));
    }

    #[tokio::test]
    async fn load_fails_loudly_when_context_is_missing_a_bundle() {
        let context = TestContext {
            repo: BundleRepository::new(),
        };
        let navigator = Navigator::new();
        let dir = tempfile::tempdir().unwrap();
        let project = project_with(
            vec![ProjectNode::bundle("Ghost", "com.example.ghost")],
            vec![("com.example.ghost", dir.path())],
        );

        let err = navigator.load_project(&project, &context).await.unwrap_err();
        assert!(matches!(err, Error::Precondition(_)));
    }

    #[tokio::test]
    async fn will_save_projects_root_titles_back() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("sloth");
        write_archive(&root, "SlothCreator").await;

        let context = TestContext {
            repo: BundleRepository::new(),
        };
        register_local_bundle(&context, &root, "com.example.sloth", "SlothCreator").await;

        let navigator = Navigator::new();
        let mut project = project_with(
            vec![
                ProjectNode::bundle("stale name", "com.example.sloth"),
                ProjectNode::group_marker("Tools"),
            ],
            vec![("com.example.sloth", &root)],
        );
        navigator.load_project(&project, &context).await.unwrap();
        wait_for_terminal_states(&navigator).await;

        navigator.write_back(&mut project).await.unwrap();
        assert_eq!(
            project.items,
            vec![
                ProjectNode::bundle("SlothCreator", "com.example.sloth"),
                ProjectNode::group_marker("Tools"),
            ]
        );
    }

    #[tokio::test]
    async fn will_save_before_load_completion_is_a_precondition_failure() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("sloth");
        write_archive(&root, "SlothCreator").await;

        let context = TestContext {
            repo: BundleRepository::new(),
        };
        register_local_bundle(&context, &root, "com.example.sloth", "SlothCreator").await;

        let navigator = Navigator::new();
        let mut project = project_with(
            vec![ProjectNode::bundle("SlothCreator", "com.example.sloth")],
            vec![("com.example.sloth", &root)],
        );
        navigator.load_project(&project, &context).await.unwrap();

        // Force a snapshot that may predate tree completion by not waiting;
        // if the tree already finished, the save must succeed instead.
        let result = navigator.write_back(&mut project).await;
        match result {
            Ok(()) => assert_eq!(project.items.len(), 1),
            Err(Error::Precondition(message)) => {
                assert!(message.contains("before its load completed"));
            },
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn reload_replaces_all_state() {
        let dir = tempfile::tempdir().unwrap();
        let root_a = dir.path().join("a");
        let root_b = dir.path().join("b");
        write_archive(&root_a, "Alpha").await;
        write_archive(&root_b, "Beta").await;

        let context = TestContext {
            repo: BundleRepository::new(),
        };
        register_local_bundle(&context, &root_a, "com.example.a", "Alpha").await;
        register_local_bundle(&context, &root_b, "com.example.b", "Beta").await;

        let navigator = Navigator::new();
        let first = project_with(
            vec![ProjectNode::bundle("Alpha", "com.example.a")],
            vec![("com.example.a", &root_a)],
        );
        navigator.load_project(&first, &context).await.unwrap();
        wait_for_terminal_states(&navigator).await;
        let first_id = navigator
            .id_for("", InterfaceLanguage::DEFAULT, "com.example.a")
            .await
            .unwrap();

        let second = project_with(
            vec![ProjectNode::bundle("Beta", "com.example.b")],
            vec![("com.example.b", &root_b)],
        );
        navigator.load_project(&second, &context).await.unwrap();
        let nodes = wait_for_terminal_states(&navigator).await;

        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].bundle_identifier(), Some("com.example.b"));
        assert!(
            navigator
                .id_for("", InterfaceLanguage::DEFAULT, "com.example.a")
                .await
                .is_none(),
            "old bundle mappings must be gone"
        );
        // Top-level ids are never reused across reloads.
        let second_id = navigator
            .id_for("", InterfaceLanguage::DEFAULT, "com.example.b")
            .await
            .unwrap();
        assert!(second_id.top_level_id() > first_id.top_level_id());
    }

    #[tokio::test]
    async fn selection_is_cleared_on_reload() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("sloth");
        write_archive(&root, "SlothCreator").await;

        let context = TestContext {
            repo: BundleRepository::new(),
        };
        register_local_bundle(&context, &root, "com.example.sloth", "SlothCreator").await;

        let navigator = Navigator::new();
        let project = project_with(
            vec![ProjectNode::bundle("SlothCreator", "com.example.sloth")],
            vec![("com.example.sloth", &root)],
        );
        navigator.load_project(&project, &context).await.unwrap();
        wait_for_terminal_states(&navigator).await;
        navigator
            .navigate_to(&DocumentationUri::new("com.example.sloth", ""))
            .await;
        assert!(navigator.selection().await.is_some());

        navigator.load_project(&project, &context).await.unwrap();
        assert!(navigator.selection().await.is_none());
    }
}
