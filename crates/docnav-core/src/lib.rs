//! # docnav-core
//!
//! Core engine for browsing documentation bundles: ingestion from local and
//! remote sources, binary navigator-index parsing, global topic addressing,
//! concurrent cancellable loading, and full-text bundle search.
//!
//! ## Architecture
//!
//! The crate is organized around a small set of components:
//!
//! - **Workspace**: the orchestrator owning one current project and driving
//!   the plugin lifecycle (`load` / `didAddBundle` / `willSave`)
//! - **Bundle repository**: identifier → (bundle, byte provider) registry
//! - **Navigator**: loaded indices, top-level display nodes, and the packed
//!   64-bit topic identity scheme
//! - **Search repository**: bundle metadata + revisions with camelCase-aware
//!   full-text search
//!
//! ## Quick start
//!
//! ```no_run
//! use docnav_core::{Project, Result, Workspace, WorkspaceConfig};
//!
//! # async fn example() -> Result<()> {
//! let workspace = Workspace::new(WorkspaceConfig::default())?;
//! let project = Project::transient("Scratch");
//! workspace.open(project, false).await?;
//!
//! for node in workspace.navigator().nodes().await {
//!     println!("{} ({:?})", node.display_name, node.status);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency
//!
//! Bundle loads for distinct bundles run fully concurrently; loads for the
//! same index attach to the in-flight read. Each tree read is bounded by a
//! per-bundle timeout, and a failure or timeout marks only the owning node
//! as failed. Starting a new project load cancels everything in flight from
//! the previous one.
//!
//! ## Error handling
//!
//! All operations return [`Result<T, Error>`]. Per-bundle I/O failures are
//! isolated on the owning node; project-level failures abort before any
//! destructive mutation. Lookup misses return `Option` and are logged, never
//! raised.

/// Error types and result aliases
pub mod error;
/// Plugin tracking the current project's identity
pub mod metadata;
/// Topic trees, numeric identity, and concurrent index loading
pub mod navigator;
/// The persisted project model and its validation
pub mod project;
/// Byte-content providers (local filesystem, HTTP, ephemeral cache)
pub mod provider;
/// Bundle registry and content delegation
pub mod repository;
/// Bundle metadata store with camelCase-aware full-text search
pub mod search;
/// Core data types and structures
pub mod types;
/// The workspace orchestrator and plugin protocol
pub mod workspace;

// Re-export commonly used types
pub use error::{Error, Result};
pub use metadata::WorkspaceMetadata;
pub use navigator::ids::{IdAllocator, NavigatorId};
pub use navigator::index::{NavigatorIndex, NavigatorIndexWriter, NavigatorTree};
pub use navigator::{LoadState, Navigator, READ_TREE_TIMEOUT, TopLevelNode, TopLevelNodeKind};
pub use project::{
    FileProjectStore, Project, ProjectNode, ProjectReference, ProjectSource, ProjectStore,
    ValidationFailure,
};
pub use provider::{
    BundleRepositoryProvider, CachedResource, HttpProvider, LocalFsProvider, provider_for_source,
};
pub use repository::BundleRepository;
pub use search::{BundleDetail, BundleMetadata, BundleQuery, BundleRevision, SearchRepository};
pub use types::{
    BundleIdentifier, DocumentationBundle, DocumentationUri, InterfaceLanguage, PageType,
};
pub use workspace::{
    DocumentationContext, PluginRegistry, Workspace, WorkspaceBuilder, WorkspaceConfig,
    WorkspacePlugin,
};
