//! The workspace: top-level orchestrator tying the bundle repository,
//! navigator, metadata and search repository to one current project.
//!
//! Sub-components participate in the project lifecycle through the
//! [`WorkspacePlugin`] protocol. Plugin dispatch order is the registration
//! order of the [`PluginRegistry`] and is part of the workspace's
//! configuration; the default workspace registers metadata before the
//! navigator.
//!
//! Lifecycle semantics:
//!
//! - `open` validates first and saves the old project second, so a failure in
//!   either leaves the previous state fully intact. After the bundle
//!   registrations are committed, a plugin failure propagates to the caller
//!   without rolling the registrations back (an accepted inconsistency
//!   window).
//! - `add_bundle` rejects duplicates before touching anything and
//!   compensates a plugin failure by unregistering the bundle again.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::metadata::WorkspaceMetadata;
use crate::navigator::Navigator;
use crate::project::{Project, ProjectStore};
use crate::provider::{BundleRepositoryProvider, provider_for_source};
use crate::repository::BundleRepository;
use crate::search::SearchRepository;
use crate::types::{BundleIdentifier, DocumentationBundle, DocumentationUri};
use crate::{Error, Result};

/// Read-only view of a workspace handed to plugins during loading.
#[async_trait]
pub trait DocumentationContext: Send + Sync {
    /// The bundle registered under `identifier`, if any.
    async fn bundle(&self, identifier: &str) -> Option<DocumentationBundle>;

    /// The bytes a documentation URI points at.
    async fn contents_of_url(&self, url: &DocumentationUri) -> Result<Vec<u8>>;
}

/// Capability interface every workspace sub-component implements.
#[async_trait]
pub trait WorkspacePlugin: Send + Sync {
    /// Stable name used in diagnostics.
    fn plugin_id(&self) -> &'static str;

    /// Resets this plugin's state entirely for a new project.
    async fn load(&self, project: &Project, context: &dyn DocumentationContext) -> Result<()>;

    /// Incrementally absorbs one newly registered bundle.
    async fn did_add_bundle(
        &self,
        _identifier: &BundleIdentifier,
        _context: &dyn DocumentationContext,
    ) -> Result<()> {
        Ok(())
    }

    /// Writes plugin state back into the project before persistence.
    async fn will_save(&self, _project: &mut Project) -> Result<()> {
        Ok(())
    }
}

/// Ordered set of plugins; lifecycle methods dispatch in registration order.
pub struct PluginRegistry {
    plugins: Vec<Arc<dyn WorkspacePlugin>>,
}

impl PluginRegistry {
    /// Starts building a registry.
    pub fn builder() -> PluginRegistryBuilder {
        PluginRegistryBuilder {
            plugins: Vec::new(),
        }
    }

    /// The plugins, in dispatch order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn WorkspacePlugin>> {
        self.plugins.iter()
    }

    /// The number of registered plugins.
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Whether no plugin is registered.
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

/// Builder fixing the plugin dispatch order.
pub struct PluginRegistryBuilder {
    plugins: Vec<Arc<dyn WorkspacePlugin>>,
}

impl PluginRegistryBuilder {
    /// Appends a plugin; it dispatches after everything registered earlier.
    #[must_use]
    pub fn register(mut self, plugin: Arc<dyn WorkspacePlugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Finalizes the registry.
    pub fn build(self) -> PluginRegistry {
        PluginRegistry {
            plugins: self.plugins,
        }
    }
}

/// Workspace construction options.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceConfig {
    /// Keep the search repository entirely in memory.
    pub in_memory: bool,
    /// Root for per-project caches; the platform cache directory if unset.
    pub cache_dir: Option<PathBuf>,
}

/// Builds a [`Workspace`], optionally with a project store and extra plugins.
#[derive(Default)]
pub struct WorkspaceBuilder {
    config: WorkspaceConfig,
    store: Option<Arc<dyn ProjectStore>>,
    extra_plugins: Vec<Arc<dyn WorkspacePlugin>>,
}

impl WorkspaceBuilder {
    /// Sets the workspace configuration.
    #[must_use]
    pub fn config(mut self, config: WorkspaceConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the store persistent projects are written to.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn ProjectStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Appends a plugin after the built-in ones.
    #[must_use]
    pub fn plugin(mut self, plugin: Arc<dyn WorkspacePlugin>) -> Self {
        self.extra_plugins.push(plugin);
        self
    }

    /// Builds the workspace with an empty transient project.
    pub fn build(self) -> Result<Workspace> {
        let project = Project::transient("");
        let bundles = Arc::new(BundleRepository::new());
        let metadata = Arc::new(WorkspaceMetadata::with_identity(&project.identifier));
        let navigator = Arc::new(Navigator::new());

        let mut registry = PluginRegistry::builder()
            .register(Arc::clone(&metadata) as Arc<dyn WorkspacePlugin>)
            .register(Arc::clone(&navigator) as Arc<dyn WorkspacePlugin>);
        for plugin in self.extra_plugins {
            registry = registry.register(plugin);
        }

        let search = load_search(&self.config, &project.identifier)?;

        Ok(Workspace {
            bundles,
            metadata,
            navigator,
            plugins: registry.build(),
            project: RwLock::new(project),
            search: RwLock::new(Arc::new(search)),
            store: self.store,
            config: self.config,
        })
    }
}

/// Top-level orchestrator owning all workspace sub-components and exactly one
/// current project, replaced wholesale on open.
pub struct Workspace {
    bundles: Arc<BundleRepository>,
    metadata: Arc<WorkspaceMetadata>,
    navigator: Arc<Navigator>,
    plugins: PluginRegistry,
    project: RwLock<Project>,
    search: RwLock<Arc<SearchRepository>>,
    store: Option<Arc<dyn ProjectStore>>,
    config: WorkspaceConfig,
}

impl Workspace {
    /// Creates a workspace with the default plugin set and no project store.
    pub fn new(config: WorkspaceConfig) -> Result<Self> {
        Self::builder().config(config).build()
    }

    /// Starts building a customized workspace.
    pub fn builder() -> WorkspaceBuilder {
        WorkspaceBuilder::default()
    }

    /// The navigator plugin.
    pub fn navigator(&self) -> &Navigator {
        &self.navigator
    }

    /// The metadata plugin.
    pub fn metadata(&self) -> &WorkspaceMetadata {
        &self.metadata
    }

    /// The bundle repository.
    pub fn bundle_repository(&self) -> &BundleRepository {
        &self.bundles
    }

    /// The search repository scoped to the current project.
    pub async fn search(&self) -> Arc<SearchRepository> {
        Arc::clone(&*self.search.read().await)
    }

    /// A snapshot of the current project.
    pub async fn current_project(&self) -> Project {
        self.project.read().await.clone()
    }

    /// Persists the current project if it is persistent.
    ///
    /// Every plugin first writes its in-memory state back into the project,
    /// the result is re-validated, and only then is it handed to the project
    /// store. Transient projects run the same protocol but skip persistence.
    pub async fn save(&self) -> Result<()> {
        let mut project = self.project.write().await;
        info!(project = %*project, "saving project");

        for plugin in self.plugins.iter() {
            plugin.will_save(&mut project).await?;
        }
        project.validate()?;

        if !project.is_persistent() {
            debug!(project = %*project, "transient project, skipping persistence");
            return Ok(());
        }

        let store = self.store.as_ref().ok_or_else(|| {
            Error::Precondition("a persistent project requires a project store".into())
        })?;
        store.persist(&project).await
    }

    /// Replaces the entire workspace state with a new project.
    ///
    /// Order: validate the candidate, save the current project (unless
    /// `save_current` is false), reset bundle registrations, register the new
    /// project's bundles, swap the project in, reload every plugin, and
    /// rescope the search repository. Failures in the first two steps leave
    /// the workspace untouched; a plugin failure afterwards propagates with
    /// the registrations already committed.
    pub async fn open(&self, new_project: Project, save_current: bool) -> Result<()> {
        info!(project = %new_project, "opening project");
        new_project.validate()?;

        // Resolve every provider before the destructive steps so a bad
        // source configuration cannot leave the workspace half torn down.
        let mut registrations = Vec::with_capacity(new_project.references.len());
        for reference in new_project.references.values() {
            let provider = provider_for_source(&reference.source)?;
            let bundle = reference.bundle()?;
            registrations.push((bundle, provider));
        }

        if save_current {
            self.save().await?;
        }

        debug!("unregistering bundles");
        self.bundles.unregister_all().await;

        debug!(project = %new_project, "registering bundles");
        for (bundle, provider) in registrations {
            self.bundles.register_bundle(bundle, provider).await?;
        }

        *self.project.write().await = new_project.clone();

        for plugin in self.plugins.iter() {
            if let Err(err) = plugin.load(&new_project, self).await {
                error!(plugin = plugin.plugin_id(), %err, "plugin failed to load project");
                return Err(err);
            }
        }

        debug!("reloading search repository");
        let search = load_search(&self.config, &new_project.identifier)?;
        *self.search.write().await = Arc::new(search);

        Ok(())
    }

    /// Registers one bundle at runtime and runs the incremental add path.
    ///
    /// Fails with [`Error::DuplicateBundle`] before any mutation when the
    /// identifier is already registered. When a plugin's `did_add_bundle`
    /// fails, the bundle is unregistered again to restore the pre-call
    /// invariant (best effort) and the failure propagates.
    pub async fn add_bundle(
        &self,
        bundle: DocumentationBundle,
        provider: Arc<dyn BundleRepositoryProvider>,
    ) -> Result<()> {
        info!(%bundle, "adding bundle");
        let identifier = bundle.identifier.clone();

        if self.bundles.bundle(&identifier).await.is_some() {
            return Err(Error::DuplicateBundle(identifier));
        }
        self.bundles.register_bundle(bundle, provider).await?;

        for plugin in self.plugins.iter() {
            if let Err(err) = plugin.did_add_bundle(&identifier, self).await {
                error!(plugin = plugin.plugin_id(), %err, "plugin rejected the new bundle");
                self.bundles.unregister_bundle(&identifier).await;
                return Err(err);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentationContext for Workspace {
    async fn bundle(&self, identifier: &str) -> Option<DocumentationBundle> {
        self.bundles.bundle(identifier).await
    }

    async fn contents_of_url(&self, url: &DocumentationUri) -> Result<Vec<u8>> {
        self.bundles.contents_of_url(url).await
    }
}

fn load_search(config: &WorkspaceConfig, project_identifier: &str) -> Result<SearchRepository> {
    if config.in_memory {
        return SearchRepository::in_memory();
    }

    let cache_root = match &config.cache_dir {
        Some(dir) => dir.clone(),
        None => directories::ProjectDirs::from("dev", "docnav", "docnav")
            .ok_or_else(|| Error::Storage("failed to determine a cache directory".into()))?
            .cache_dir()
            .to_path_buf(),
    };

    SearchRepository::open_in_dir(&cache_root.join(project_identifier).join("search"))
}
