//! Registry mapping bundle identifiers to their metadata and byte providers.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::provider::BundleRepositoryProvider;
use crate::types::{BundleIdentifier, DocumentationBundle, DocumentationUri};
use crate::{Error, Result};

struct BundleEntry {
    bundle: DocumentationBundle,
    provider: Arc<dyn BundleRepositoryProvider>,
}

/// Thread-safe registry of loaded bundles and their content providers.
///
/// Purely a registry plus delegation layer: content retrieval hands the
/// bundle-relative path to the provider registered for that identifier,
/// byte-for-byte. Registration and lookup are linearizable; readers see a
/// consistent snapshot, writers are serialized.
#[derive(Default)]
pub struct BundleRepository {
    entries: RwLock<HashMap<BundleIdentifier, BundleEntry>>,
}

impl BundleRepository {
    /// Creates an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a bundle together with its content provider.
    ///
    /// Fails with [`Error::DuplicateBundle`] if the identifier is already
    /// registered; nothing is mutated in that case.
    pub async fn register_bundle(
        &self,
        bundle: DocumentationBundle,
        provider: Arc<dyn BundleRepositoryProvider>,
    ) -> Result<()> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(&bundle.identifier) {
            return Err(Error::DuplicateBundle(bundle.identifier));
        }

        debug!(bundle = %bundle, "registered bundle");
        entries.insert(bundle.identifier.clone(), BundleEntry { bundle, provider });
        Ok(())
    }

    /// Removes one bundle and its provider association.
    pub async fn unregister_bundle(&self, identifier: &str) {
        if self.entries.write().await.remove(identifier).is_some() {
            debug!(identifier, "unregistered bundle");
        }
    }

    /// Removes every registered bundle.
    pub async fn unregister_all(&self) {
        self.entries.write().await.clear();
    }

    /// Returns the registered bundle with this identifier, if any.
    pub async fn bundle(&self, identifier: &str) -> Option<DocumentationBundle> {
        self.entries
            .read()
            .await
            .get(identifier)
            .map(|entry| entry.bundle.clone())
    }

    /// The number of registered bundles.
    pub async fn count(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Retrieves the bytes a documentation URI points at.
    ///
    /// Fails with [`Error::UnknownBundle`] when no bundle with the URI's
    /// identifier is registered; provider failures pass through unchanged.
    pub async fn contents_of_url(&self, url: &DocumentationUri) -> Result<Vec<u8>> {
        // Snapshot the provider before awaiting so the registry lock is never
        // held across I/O.
        let provider = {
            let entries = self.entries.read().await;
            let entry = entries
                .get(&url.bundle_identifier)
                .ok_or_else(|| Error::UnknownBundle(url.bundle_identifier.clone()))?;
            Arc::clone(&entry.provider)
        };

        provider.data(&url.path).await
    }
}
