//! Byte-content providers backing the bundle repository.
//!
//! A provider resolves bundle-relative paths to raw bytes. Three kinds exist:
//! local filesystem archives, HTTP bases, and a short-lived local cache used
//! while ingesting remote index artifacts.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::debug;
use url::Url;

use crate::project::ProjectSource;
use crate::types::join_url;
use crate::{Error, Result};

/// Resolves bundle-relative paths to raw bytes.
#[async_trait]
pub trait BundleRepositoryProvider: Send + Sync {
    /// Returns the bytes stored at `path`, relative to the provider's root.
    async fn data(&self, path: &str) -> Result<Vec<u8>>;
}

/// Builds the provider matching a project source's configuration.
pub fn provider_for_source(source: &ProjectSource) -> Result<Arc<dyn BundleRepositoryProvider>> {
    Ok(match source {
        ProjectSource::LocalFs { root } => Arc::new(LocalFsProvider::new(root.clone())),
        ProjectSource::Index { path } => Arc::new(LocalFsProvider::new(path.clone())),
        ProjectSource::Http { base_url, .. } => Arc::new(HttpProvider::new(base_url.clone())?),
    })
}

/// Serves bundle content from a directory on the local filesystem.
pub struct LocalFsProvider {
    root: PathBuf,
}

impl LocalFsProvider {
    /// Creates a provider rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl BundleRepositoryProvider for LocalFsProvider {
    async fn data(&self, path: &str) -> Result<Vec<u8>> {
        let file = resolve_contained(&self.root, path)?;
        match tokio::fs::read(&file).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("no file at '{path}'")))
            },
            Err(e) => Err(e.into()),
        }
    }
}

/// Resolves `path` below `root`, rejecting anything that would escape it.
fn resolve_contained(root: &Path, path: &str) -> Result<PathBuf> {
    let relative = Path::new(path.trim_start_matches('/'));

    let mut resolved = root.to_path_buf();
    for component in relative.components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {},
            // Parent traversal, absolute roots, and prefixes would all leave
            // the provider's directory.
            _ => {
                return Err(Error::NotFound(format!(
                    "path '{path}' escapes the bundle root"
                )));
            },
        }
    }

    Ok(resolved)
}

/// Serves bundle content with GET requests against a base URL.
pub struct HttpProvider {
    base_url: Url,
    client: Client,
}

impl HttpProvider {
    /// Creates a provider with a default 30-second request timeout.
    pub fn new(base_url: Url) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(30))
    }

    /// Creates a provider with a custom request timeout (primarily for tests).
    pub fn with_timeout(base_url: Url, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("docnav/", env!("CARGO_PKG_VERSION")))
            .gzip(true)
            .build()
            .map_err(Error::Network)?;
        Ok(Self { base_url, client })
    }
}

#[async_trait]
impl BundleRepositoryProvider for HttpProvider {
    async fn data(&self, path: &str) -> Result<Vec<u8>> {
        let url = join_url(&self.base_url, path)?;
        debug!(%url, "fetching bundle content");

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!("no resource at '{url}'")));
        }
        if !status.is_success() {
            match response.error_for_status() {
                Ok(_) => unreachable!("status should be an error"),
                Err(err) => return Err(Error::Network(err)),
            }
        }

        Ok(response.bytes().await?.to_vec())
    }
}

/// A short-lived on-disk cache for remote index artifacts.
///
/// The backing directory is created fresh per instance and removed when the
/// value is dropped, including on error paths. Used while ingesting a remote
/// bundle: artifacts are fetched into the cache so the index parser can
/// operate on a local file location.
pub struct CachedResource {
    dir: tempfile::TempDir,
}

impl CachedResource {
    /// Creates a fresh cache directory.
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("docnav-cached-").tempdir()?;
        Ok(Self { dir })
    }

    /// The cache's root directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Stores `bytes` at `path` inside the cache.
    pub async fn put(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let file = resolve_contained(self.dir.path(), path)?;
        if let Some(parent) = file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&file, bytes).await?;
        Ok(())
    }
}

#[async_trait]
impl BundleRepositoryProvider for CachedResource {
    async fn data(&self, path: &str) -> Result<Vec<u8>> {
        let file = resolve_contained(self.dir.path(), path)?;
        match tokio::fs::read(&file).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("no cached artifact at '{path}'")))
            },
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn local_provider_reads_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("index")).unwrap();
        std::fs::write(dir.path().join("index/data.mdb"), b"payload").unwrap();

        let provider = LocalFsProvider::new(dir.path());
        let bytes = provider.data("index/data.mdb").await.unwrap();
        assert_eq!(bytes, b"payload");

        // Leading slashes are treated as bundle-relative.
        let bytes = provider.data("/index/data.mdb").await.unwrap();
        assert_eq!(bytes, b"payload");
    }

    #[tokio::test]
    async fn local_provider_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let provider = LocalFsProvider::new(dir.path().join("root"));

        let err = provider.data("../outside.txt").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let err = provider.data("nested/../../outside.txt").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn local_provider_maps_missing_files_to_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let provider = LocalFsProvider::new(dir.path());

        let err = provider.data("absent.bin").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn http_provider_fetches_relative_to_base() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bundles/sloth/index/navigator.index"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"tree".to_vec()))
            .mount(&server)
            .await;

        let base = Url::parse(&format!("{}/bundles/sloth", server.uri())).unwrap();
        let provider = HttpProvider::new(base).unwrap();

        let bytes = provider.data("index/navigator.index").await.unwrap();
        assert_eq!(bytes, b"tree");
    }

    #[tokio::test]
    async fn http_provider_maps_404_to_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let base = Url::parse(&server.uri()).unwrap();
        let provider = HttpProvider::new(base).unwrap();

        let err = provider.data("missing").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn cached_resource_round_trips_and_cleans_up() {
        let cache = CachedResource::new().unwrap();
        let root = cache.path().to_path_buf();

        cache.put("navigator.index", b"blob").await.unwrap();
        assert_eq!(cache.data("navigator.index").await.unwrap(), b"blob");

        drop(cache);
        assert!(!root.exists());
    }
}
