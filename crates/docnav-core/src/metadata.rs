//! Plugin tracking the current project's identity and display name.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::project::Project;
use crate::workspace::{DocumentationContext, WorkspacePlugin};
use crate::{Error, Result};

#[derive(Debug, Clone)]
struct MetadataState {
    identifier: String,
    display_name: String,
}

/// Holds the open project's identifier and its editable display name.
///
/// The display name can be changed while the project is open; `will_save`
/// writes it back into the project before persistence.
pub struct WorkspaceMetadata {
    state: RwLock<MetadataState>,
}

impl WorkspaceMetadata {
    /// Creates metadata for a workspace with no project loaded yet.
    pub fn new() -> Self {
        Self::with_identity("")
    }

    /// Creates metadata already reflecting a project's identifier, so the
    /// save protocol holds before the first explicit load.
    pub fn with_identity(identifier: impl Into<String>) -> Self {
        Self {
            state: RwLock::new(MetadataState {
                identifier: identifier.into(),
                display_name: "No Project".to_string(),
            }),
        }
    }

    /// The identifier of the project this metadata reflects.
    pub async fn identifier(&self) -> String {
        self.state.read().await.identifier.clone()
    }

    /// The current, possibly edited, display name.
    pub async fn display_name(&self) -> String {
        self.state.read().await.display_name.clone()
    }

    /// Renames the open project. Persisted on the next save.
    pub async fn set_display_name(&self, display_name: impl Into<String>) {
        self.state.write().await.display_name = display_name.into();
    }
}

impl Default for WorkspaceMetadata {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkspacePlugin for WorkspaceMetadata {
    fn plugin_id(&self) -> &'static str {
        "metadata"
    }

    async fn load(&self, project: &Project, _context: &dyn DocumentationContext) -> Result<()> {
        let mut state = self.state.write().await;
        state.identifier = project.identifier.clone();
        state.display_name = project.display_name.clone();
        Ok(())
    }

    async fn will_save(&self, project: &mut Project) -> Result<()> {
        let state = self.state.read().await;
        if project.identifier != state.identifier {
            return Err(Error::Precondition(format!(
                "metadata reflects project '{}' but '{}' is being saved; save ran \
                 before load",
                state.identifier, project.identifier
            )));
        }
        project.display_name = state.display_name.clone();
        Ok(())
    }
}
