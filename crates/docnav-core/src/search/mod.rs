//! Persisted or in-memory store of bundle metadata and revisions, with
//! full-text search over display names and identifiers.
//!
//! The store of record is a JSON document (`bundles.json`); a tantivy index
//! over `(displayName, bundleIdentifier)` is kept synchronized with it using
//! the camelCase analyzer from [`tokenizer`]. Each operation is independently
//! atomic: duplicates are rejected before anything is written, and removals
//! cascade.

pub mod tokenizer;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, RegexQuery};
use tantivy::schema::{
    Field, IndexRecordOption, STORED, STRING, Schema, TextFieldIndexing, TextOptions, Value,
};
use tantivy::{Index, IndexReader, TantivyDocument, Term, doc};
use tokio::sync::RwLock;
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

use crate::types::BundleIdentifier;
use crate::{Error, Result};

const STORE_FILE: &str = "bundles.json";
const FTS_DIR: &str = "fts";
const WRITER_BUDGET: usize = 15_000_000;

/// Identity of one bundle known to the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleMetadata {
    /// Repository-assigned ID.
    pub id: Uuid,
    /// Human-readable bundle name.
    pub display_name: String,
    /// The bundle identifier; unique across the repository.
    pub bundle_identifier: BundleIdentifier,
}

/// One published revision of a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleRevision {
    /// The owning bundle's repository ID.
    pub bundle_id: Uuid,
    /// Revision tag; unique per bundle.
    pub tag: String,
    /// Where this revision's archive lives.
    pub source: Url,
}

/// A bundle's metadata joined with all of its revisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleDetail {
    /// The bundle's identity.
    pub metadata: BundleMetadata,
    /// All revisions, in insertion order.
    pub revisions: Vec<BundleRevision>,
}

/// A search request against the repository.
#[derive(Debug, Clone, Default)]
pub struct BundleQuery {
    /// Free-text term; empty or absent returns every bundle.
    pub term: Option<String>,
}

impl BundleQuery {
    /// A query returning every bundle.
    pub const fn all() -> Self {
        Self { term: None }
    }

    /// A free-text query.
    pub fn term(term: impl Into<String>) -> Self {
        Self {
            term: Some(term.into()),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreData {
    bundles: Vec<BundleMetadata>,
    revisions: Vec<BundleRevision>,
}

#[derive(Clone, Copy)]
struct Fields {
    id: Field,
    display_name: Field,
    bundle_identifier: Field,
}

struct Inner {
    store: StoreData,
    store_path: Option<PathBuf>,
    index: Index,
    reader: IndexReader,
    fields: Fields,
}

/// Store of bundle metadata and revisions with full-text search.
pub struct SearchRepository {
    inner: RwLock<Inner>,
}

impl SearchRepository {
    /// Opens (or creates) a repository persisted under `dir`.
    pub fn open_in_dir(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let fts_dir = dir.join(FTS_DIR);
        std::fs::create_dir_all(&fts_dir)?;

        let index = if fts_dir.join("meta.json").exists() {
            Index::open_in_dir(&fts_dir)
                .map_err(|e| Error::Search(format!("failed to open search index: {e}")))?
        } else {
            Index::create_in_dir(&fts_dir, build_schema())
                .map_err(|e| Error::Search(format!("failed to create search index: {e}")))?
        };

        let store_path = dir.join(STORE_FILE);
        let store = if store_path.exists() {
            serde_json::from_slice(&std::fs::read(&store_path)?)?
        } else {
            StoreData::default()
        };

        let mut inner = Self::assemble(index, store, Some(store_path))?;
        inner.reindex_if_stale()?;
        info!(dir = %dir.display(), bundles = inner.store.bundles.len(), "opened search repository");
        Ok(Self {
            inner: RwLock::new(inner),
        })
    }

    /// Creates a repository that lives entirely in memory.
    pub fn in_memory() -> Result<Self> {
        let index = Index::create_in_ram(build_schema());
        let inner = Self::assemble(index, StoreData::default(), None)?;
        Ok(Self {
            inner: RwLock::new(inner),
        })
    }

    fn assemble(index: Index, store: StoreData, store_path: Option<PathBuf>) -> Result<Inner> {
        tokenizer::register(&index);

        let schema = index.schema();
        let field = |name: &str| {
            schema
                .get_field(name)
                .map_err(|_| Error::Search(format!("missing {name} field")))
        };
        let fields = Fields {
            id: field("id")?,
            display_name: field("displayName")?,
            bundle_identifier: field("bundleIdentifier")?,
        };

        let reader = index
            .reader_builder()
            .reload_policy(tantivy::ReloadPolicy::OnCommitWithDelay)
            .try_into()
            .map_err(|e| Error::Search(format!("failed to create reader: {e}")))?;

        Ok(Inner {
            store,
            store_path,
            index,
            reader,
            fields,
        })
    }

    /// Adds a bundle. The identifier must be unique.
    pub async fn add_bundle(
        &self,
        display_name: impl Into<String>,
        identifier: impl Into<BundleIdentifier>,
    ) -> Result<BundleDetail> {
        let display_name = display_name.into();
        let identifier = identifier.into();

        let mut inner = self.inner.write().await;
        if inner
            .store
            .bundles
            .iter()
            .any(|bundle| bundle.bundle_identifier == identifier)
        {
            return Err(Error::DuplicateBundle(identifier));
        }

        let metadata = BundleMetadata {
            id: Uuid::new_v4(),
            display_name,
            bundle_identifier: identifier,
        };

        let fields = inner.fields;
        inner.with_writer(|writer| {
            writer
                .add_document(doc!(
                    fields.id => metadata.id.to_string(),
                    fields.display_name => metadata.display_name.as_str(),
                    fields.bundle_identifier => metadata.bundle_identifier.as_str(),
                ))
                .map_err(|e| Error::Search(format!("failed to index bundle: {e}")))?;
            Ok(())
        })?;

        inner.store.bundles.push(metadata.clone());
        inner.persist().await?;
        debug!(bundle = %metadata.bundle_identifier, "added bundle to search repository");

        Ok(BundleDetail {
            metadata,
            revisions: Vec::new(),
        })
    }

    /// Returns one bundle with all of its revisions.
    pub async fn bundle(&self, id: Uuid) -> Option<BundleDetail> {
        let inner = self.inner.read().await;
        inner
            .store
            .bundles
            .iter()
            .find(|bundle| bundle.id == id)
            .map(|metadata| inner.detail_of(metadata))
    }

    /// Removes a bundle, cascading its revisions.
    pub async fn remove_bundle(&self, id: Uuid) -> Result<()> {
        let mut inner = self.inner.write().await;
        let Some(position) = inner.store.bundles.iter().position(|b| b.id == id) else {
            return Err(Error::NotFound(format!("no bundle with id {id}")));
        };

        let fields = inner.fields;
        inner.with_writer(|writer| {
            writer.delete_term(Term::from_field_text(fields.id, &id.to_string()));
            Ok(())
        })?;

        inner.store.bundles.remove(position);
        inner.store.revisions.retain(|revision| revision.bundle_id != id);
        inner.persist().await?;
        Ok(())
    }

    /// Adds a revision to a bundle. The tag must be unique per bundle.
    pub async fn add_revision(
        &self,
        tag: impl Into<String>,
        source: Url,
        bundle_id: Uuid,
    ) -> Result<BundleRevision> {
        let tag = tag.into();

        let mut inner = self.inner.write().await;
        if !inner.store.bundles.iter().any(|b| b.id == bundle_id) {
            return Err(Error::NotFound(format!("no bundle with id {bundle_id}")));
        }
        if inner
            .store
            .revisions
            .iter()
            .any(|r| r.bundle_id == bundle_id && r.tag == tag)
        {
            return Err(Error::DuplicateRevision { bundle_id, tag });
        }

        let revision = BundleRevision {
            bundle_id,
            tag,
            source,
        };
        inner.store.revisions.push(revision.clone());
        inner.persist().await?;
        Ok(revision)
    }

    /// Returns one revision of a bundle, if present.
    pub async fn revision(&self, tag: &str, bundle_id: Uuid) -> Option<BundleRevision> {
        let inner = self.inner.read().await;
        inner
            .store
            .revisions
            .iter()
            .find(|r| r.bundle_id == bundle_id && r.tag == tag)
            .cloned()
    }

    /// Removes one revision of a bundle.
    pub async fn remove_revision(&self, tag: &str, bundle_id: Uuid) -> Result<()> {
        let mut inner = self.inner.write().await;
        let before = inner.store.revisions.len();
        inner
            .store
            .revisions
            .retain(|r| !(r.bundle_id == bundle_id && r.tag == tag));
        if inner.store.revisions.len() == before {
            return Err(Error::NotFound(format!(
                "no revision '{tag}' for bundle {bundle_id}"
            )));
        }
        inner.persist().await?;
        Ok(())
    }

    /// Searches bundles by display name and identifier.
    ///
    /// An empty or absent term returns every bundle ordered by display name.
    /// Otherwise the term is camelCase-tokenized and prefix-matched against
    /// the indexed columns; a bundle appears only when at least one of its
    /// indexed tokens matches, and always carries all of its revisions.
    pub async fn search(&self, query: &BundleQuery) -> Result<Vec<BundleDetail>> {
        let inner = self.inner.read().await;

        let term = query.term.as_deref().map(str::trim).unwrap_or("");
        if term.is_empty() {
            let mut details: Vec<BundleDetail> = inner
                .store
                .bundles
                .iter()
                .map(|metadata| inner.detail_of(metadata))
                .collect();
            details.sort_by(|a, b| {
                a.metadata
                    .display_name
                    .to_lowercase()
                    .cmp(&b.metadata.display_name.to_lowercase())
            });
            return Ok(details);
        }

        let terms = tokenizer::analyze(term);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        // Every query term must prefix-match a token in at least one of the
        // two indexed columns.
        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
        for token in &terms {
            let pattern = format!("{}.*", regex::escape(token));
            let mut per_field: Vec<(Occur, Box<dyn Query>)> = Vec::new();
            for field in [inner.fields.display_name, inner.fields.bundle_identifier] {
                let query = RegexQuery::from_pattern(&pattern, field)
                    .map_err(|e| Error::Search(format!("failed to build query: {e}")))?;
                per_field.push((Occur::Should, Box::new(query)));
            }
            clauses.push((Occur::Must, Box::new(BooleanQuery::new(per_field))));
        }
        let query = BooleanQuery::new(clauses);

        let searcher = inner.reader.searcher();
        let limit = inner.store.bundles.len().max(1);
        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(limit))
            .map_err(|e| Error::Search(format!("search failed: {e}")))?;

        let mut details = Vec::with_capacity(top_docs.len());
        for (_score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher
                .doc(doc_address)
                .map_err(|e| Error::Search(format!("failed to retrieve doc: {e}")))?;
            let id = doc
                .get_first(inner.fields.id)
                .and_then(|v| v.as_str())
                .and_then(|raw| Uuid::parse_str(raw).ok())
                .ok_or_else(|| Error::Search("document is missing its id".into()))?;

            if let Some(metadata) = inner.store.bundles.iter().find(|b| b.id == id) {
                details.push(inner.detail_of(metadata));
            }
        }

        debug!(term, hits = details.len(), "searched bundles");
        Ok(details)
    }

    /// Returns distinct indexed terms matching `prefix`, most frequent first.
    pub async fn search_completions(&self, prefix: &str, limit: usize) -> Result<Vec<String>> {
        let prefix = prefix.trim().to_lowercase();
        if prefix.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let inner = self.inner.read().await;
        let searcher = inner.reader.searcher();

        let mut by_term: std::collections::HashMap<String, u64> = std::collections::HashMap::new();
        for segment_reader in searcher.segment_readers() {
            for field in [inner.fields.display_name, inner.fields.bundle_identifier] {
                let index_reader = segment_reader
                    .inverted_index(field)
                    .map_err(|e| Error::Search(format!("failed to read term dictionary: {e}")))?;
                let mut stream = index_reader
                    .terms()
                    .stream()
                    .map_err(|e| Error::Search(format!("failed to stream terms: {e}")))?;
                while stream.advance() {
                    let Ok(term) = std::str::from_utf8(stream.key()) else {
                        continue;
                    };
                    if term.starts_with(&prefix) {
                        *by_term.entry(term.to_string()).or_default() +=
                            u64::from(stream.value().doc_freq);
                    }
                }
            }
        }

        let mut completions: Vec<(String, u64)> = by_term.into_iter().collect();
        completions.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        completions.truncate(limit);
        Ok(completions.into_iter().map(|(term, _)| term).collect())
    }

    /// The number of bundles in the repository.
    pub async fn count(&self) -> usize {
        self.inner.read().await.store.bundles.len()
    }
}

impl Inner {
    fn detail_of(&self, metadata: &BundleMetadata) -> BundleDetail {
        BundleDetail {
            metadata: metadata.clone(),
            revisions: self
                .store
                .revisions
                .iter()
                .filter(|revision| revision.bundle_id == metadata.id)
                .cloned()
                .collect(),
        }
    }

    fn with_writer(
        &self,
        apply: impl FnOnce(&mut tantivy::IndexWriter) -> Result<()>,
    ) -> Result<()> {
        let mut writer = self
            .index
            .writer(WRITER_BUDGET)
            .map_err(|e| Error::Search(format!("failed to create writer: {e}")))?;
        apply(&mut writer)?;
        writer
            .commit()
            .map_err(|e| Error::Search(format!("failed to commit: {e}")))?;
        self.reader
            .reload()
            .map_err(|e| Error::Search(format!("failed to reload reader: {e}")))?;
        Ok(())
    }

    /// Rebuilds the full-text index when it no longer mirrors the store,
    /// e.g. after a crash between a store write and an index commit.
    fn reindex_if_stale(&mut self) -> Result<()> {
        let indexed = self.reader.searcher().num_docs();
        if indexed == self.store.bundles.len() as u64 {
            return Ok(());
        }

        debug!(
            indexed,
            stored = self.store.bundles.len(),
            "rebuilding stale search index"
        );
        let fields = self.fields;
        let bundles = self.store.bundles.clone();
        self.with_writer(|writer| {
            writer
                .delete_all_documents()
                .map_err(|e| Error::Search(format!("failed to clear index: {e}")))?;
            for bundle in &bundles {
                writer
                    .add_document(doc!(
                        fields.id => bundle.id.to_string(),
                        fields.display_name => bundle.display_name.as_str(),
                        fields.bundle_identifier => bundle.bundle_identifier.as_str(),
                    ))
                    .map_err(|e| Error::Search(format!("failed to index bundle: {e}")))?;
            }
            Ok(())
        })
    }

    async fn persist(&self) -> Result<()> {
        let Some(path) = &self.store_path else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(&self.store)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json.as_bytes()).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

fn build_schema() -> Schema {
    let mut builder = Schema::builder();
    builder.add_text_field("id", STRING | STORED);

    let indexing = TextFieldIndexing::default()
        .set_tokenizer(tokenizer::TOKENIZER_NAME)
        .set_index_option(IndexRecordOption::WithFreqsAndPositions);
    let options = TextOptions::default()
        .set_indexing_options(indexing)
        .set_stored();
    builder.add_text_field("displayName", options.clone());
    builder.add_text_field("bundleIdentifier", options);
    builder.build()
}
