//! Reading and writing the compact binary navigator index format.
//!
//! An index location is a directory holding three artifacts: the navigator
//! index itself plus two opaque companion blobs. The index file starts with a
//! fixed header, followed by a path table (enough to answer path↔ID lookups
//! without touching the tree) and a tree section of pre-order node records:
//!
//! ```text
//! magic       4   b"DNIX"
//! version     u16 currently 1
//! reserved    u16
//! path_count  u32
//! node_count  u32
//! tree_off    u32 absolute offset of the tree section
//! -- path table: path_count x { node_id u32, language u8, len u16, utf8 }
//! -- tree section: node_count x { id u32, parent u32 (0xFFFF_FFFF = root),
//!                                 page_type u8, language u8, len u16, utf8 }
//! ```
//!
//! A shallow open parses only the header and path table. The tree section is
//! consumed later by [`NavigatorIndex::read_tree`], a single-shot suspending
//! operation bounded by a timeout, with cooperative cancellation at its yield
//! points and progress observable through a watch channel. Concurrent
//! `read_tree` calls attach to the in-flight read instead of starting a
//! second one.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use tokio::sync::{Mutex, OnceCell, watch};
use tracing::debug;

use crate::types::{BundleIdentifier, InterfaceLanguage, PageType};
use crate::{Error, Result};

/// File name of the navigator index inside an index directory.
pub const NAVIGATOR_INDEX_FILE: &str = "navigator.index";
/// File name of the content blob accompanying a navigator index.
pub const DATA_FILE: &str = "data.mdb";
/// File name of the availability blob accompanying a navigator index.
pub const AVAILABILITY_FILE: &str = "availability.index";

/// Every artifact a complete index directory must contain. Remote ingestion
/// fetches exactly this set before the local parser runs.
pub const INDEX_ARTIFACTS: [&str; 3] = [NAVIGATOR_INDEX_FILE, DATA_FILE, AVAILABILITY_FILE];

const MAGIC: [u8; 4] = *b"DNIX";
const FORMAT_VERSION: u16 = 1;
const HEADER_LEN: usize = 20;
const NO_PARENT: u32 = u32::MAX;

/// Tree records parsed between cancellation/progress points.
const PROGRESS_BATCH: usize = 256;

/// Hook invoked for every tree node as it is read.
pub type NodeCallback = Box<dyn Fn(&mut TreeNode) + Send + Sync>;

/// One node of a parsed navigator tree.
#[derive(Debug, Clone)]
pub struct TreeNode {
    /// Node ID, unique within the owning index.
    pub id: u32,
    /// Parent node ID; `None` for the root.
    pub parent: Option<u32>,
    /// Resolved topic title.
    pub title: String,
    /// Page-type code preserved from the index bytes.
    pub page_type: PageType,
    /// Interface-language tag of this node.
    pub language: InterfaceLanguage,
    /// Top-level ID of the owning index, stamped during parse.
    pub top_level_id: Option<u32>,
    /// Child node IDs in render order.
    pub children: Vec<u32>,
}

/// A fully parsed topic tree.
#[derive(Debug)]
pub struct NavigatorTree {
    root: u32,
    nodes: HashMap<u32, TreeNode>,
    order: Vec<u32>,
}

impl NavigatorTree {
    /// The root node's ID.
    pub const fn root_id(&self) -> u32 {
        self.root
    }

    /// Looks up a node by its ID.
    pub fn node(&self, id: u32) -> Option<&TreeNode> {
        self.nodes.get(&id)
    }

    /// The children of a node, in render order.
    pub fn children(&self, id: u32) -> impl Iterator<Item = &TreeNode> {
        self.nodes
            .get(&id)
            .into_iter()
            .flat_map(|node| node.children.iter())
            .filter_map(|child| self.nodes.get(child))
    }

    /// All nodes in the order they appear in the index.
    pub fn nodes_in_order(&self) -> impl Iterator<Item = &TreeNode> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    /// The number of nodes in the tree.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// A bundle's parsed navigator index.
///
/// Path↔ID lookups are available immediately after a shallow open; the title
/// hierarchy only after [`read_tree`](Self::read_tree) completes.
pub struct NavigatorIndex {
    bundle_identifier: BundleIdentifier,
    top_level_id: Option<u32>,
    node_count: u32,
    path_to_id: HashMap<(String, InterfaceLanguage), u32>,
    id_to_path: HashMap<u32, String>,
    tree_bytes: Mutex<Option<Vec<u8>>>,
    tree: OnceCell<NavigatorTree>,
    progress: watch::Sender<f32>,
    on_node_read: Option<NodeCallback>,
}

impl NavigatorIndex {
    /// Opens the navigator index stored in the directory at `location`.
    ///
    /// With `read_tree_eagerly` the tree section is parsed inline, without a
    /// timeout; otherwise only the path table is read and the tree is
    /// deferred to [`read_tree`](Self::read_tree). `on_node_read` is invoked
    /// for every tree node during parse.
    pub async fn open(
        location: &Path,
        bundle_identifier: BundleIdentifier,
        read_tree_eagerly: bool,
        on_node_read: Option<NodeCallback>,
    ) -> Result<Self> {
        let file = location.join(NAVIGATOR_INDEX_FILE);
        let bytes = match tokio::fs::read(&file).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(format!(
                    "no navigator index at '{}'",
                    file.display()
                )));
            },
            Err(e) => return Err(e.into()),
        };

        let mut index = Self::parse(&bytes, bundle_identifier, on_node_read)?;
        debug!(
            bundle = %index.bundle_identifier,
            nodes = index.node_count,
            paths = index.path_to_id.len(),
            "opened navigator index"
        );

        if read_tree_eagerly {
            index.read_tree_inline().await?;
        }
        Ok(index)
    }

    fn parse(
        bytes: &[u8],
        bundle_identifier: BundleIdentifier,
        on_node_read: Option<NodeCallback>,
    ) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(Error::InvalidIndex("file shorter than header".into()));
        }
        if bytes[0..4] != MAGIC {
            return Err(Error::InvalidIndex("bad magic".into()));
        }

        let mut cursor = Cursor::new(&bytes[4..]);
        let version = cursor.read_u16()?;
        if version != FORMAT_VERSION {
            return Err(Error::InvalidIndex(format!(
                "unsupported format version {version}"
            )));
        }
        let _reserved = cursor.read_u16()?;
        let path_count = cursor.read_u32()?;
        let node_count = cursor.read_u32()?;
        let tree_offset = cursor.read_u32()? as usize;

        if tree_offset < HEADER_LEN || tree_offset > bytes.len() {
            return Err(Error::InvalidIndex(format!(
                "tree offset {tree_offset} outside file of {} bytes",
                bytes.len()
            )));
        }

        let mut path_to_id = HashMap::with_capacity(path_count as usize);
        let mut id_to_path = HashMap::with_capacity(path_count as usize);
        let mut cursor = Cursor::new(&bytes[HEADER_LEN..tree_offset]);
        for _ in 0..path_count {
            let node_id = cursor.read_u32()?;
            let language = InterfaceLanguage(cursor.read_u8()?);
            let path = normalize_path(&cursor.read_string()?);

            // First writer wins so an id keeps its primary rendering path.
            id_to_path.entry(node_id).or_insert_with(|| path.clone());
            path_to_id.insert((path, language), node_id);
        }

        let (progress, _) = watch::channel(0.0);
        Ok(Self {
            bundle_identifier,
            top_level_id: None,
            node_count,
            path_to_id,
            id_to_path,
            tree_bytes: Mutex::new(Some(bytes[tree_offset..].to_vec())),
            tree: OnceCell::new(),
            progress,
            on_node_read,
        })
    }

    /// The identifier of the bundle this index belongs to.
    pub fn bundle_identifier(&self) -> &str {
        &self.bundle_identifier
    }

    /// The top-level ID assigned to this index, if any.
    pub const fn top_level_id(&self) -> Option<u32> {
        self.top_level_id
    }

    /// Assigns the navigator's top-level ID so tree nodes read later can be
    /// addressed globally. Must happen before the tree is read.
    pub fn set_top_level_id(&mut self, id: u32) {
        self.top_level_id = Some(id);
    }

    /// The number of nodes the tree section holds.
    pub const fn node_count(&self) -> u32 {
        self.node_count
    }

    /// Resolves a topic path and language to a node ID.
    pub fn id_for_path(&self, path: &str, language: InterfaceLanguage) -> Option<u32> {
        self.path_to_id
            .get(&(normalize_path(path), language))
            .copied()
    }

    /// Resolves a node ID back to its topic path.
    pub fn path_for_id(&self, id: u32) -> Option<&str> {
        self.id_to_path.get(&id).map(String::as_str)
    }

    /// The parsed tree, if a tree read has completed.
    pub fn tree(&self) -> Option<&NavigatorTree> {
        self.tree.get()
    }

    /// Observes tree-read progress as a fraction in `[0, 1]`.
    pub fn progress(&self) -> watch::Receiver<f32> {
        self.progress.subscribe()
    }

    /// Reads the tree section, bounded by `limit`.
    ///
    /// Single-shot: the first successful call parses the tree, later calls
    /// return immediately, and concurrent calls await the in-flight read.
    /// Exceeding the limit fails with [`Error::Timeout`]; aborting the owning
    /// task stops the parse at its next yield point.
    pub async fn read_tree(&self, limit: Duration) -> Result<()> {
        self.tree
            .get_or_try_init(|| async {
                let mut guard = self.tree_bytes.lock().await;
                let bytes = guard.as_ref().ok_or_else(|| {
                    Error::InvalidIndex("tree section no longer available".into())
                })?;

                let tree = match tokio::time::timeout(limit, self.parse_tree(bytes)).await {
                    Ok(parsed) => parsed?,
                    Err(_) => {
                        return Err(Error::Timeout(format!(
                            "navigator tree read for '{}' exceeded {:.1}s",
                            self.bundle_identifier,
                            limit.as_secs_f32()
                        )));
                    },
                };

                // Free the raw section once the tree owns the data.
                *guard = None;
                Ok(tree)
            })
            .await
            .map(|_| ())
    }

    async fn read_tree_inline(&mut self) -> Result<()> {
        let bytes = self
            .tree_bytes
            .get_mut()
            .take()
            .ok_or_else(|| Error::InvalidIndex("tree section no longer available".into()))?;
        let tree = self.parse_tree(&bytes).await?;
        self.tree
            .set(tree)
            .map_err(|_| Error::InvalidIndex("tree already read".into()))
    }

    async fn parse_tree(&self, bytes: &[u8]) -> Result<NavigatorTree> {
        let total = self.node_count as usize;
        let mut cursor = Cursor::new(bytes);
        let mut nodes: HashMap<u32, TreeNode> = HashMap::with_capacity(total);
        let mut order = Vec::with_capacity(total);
        let mut root = None;

        for read in 0..total {
            let id = cursor.read_u32()?;
            let parent = cursor.read_u32()?;
            let page_type = PageType(cursor.read_u8()?);
            let language = InterfaceLanguage(cursor.read_u8()?);
            let title = cursor.read_string()?;

            if nodes.contains_key(&id) {
                return Err(Error::InvalidIndex(format!("duplicate node id {id}")));
            }

            let mut node = TreeNode {
                id,
                parent: (parent != NO_PARENT).then_some(parent),
                title,
                page_type,
                language,
                top_level_id: self.top_level_id,
                children: Vec::new(),
            };
            if let Some(callback) = &self.on_node_read {
                callback(&mut node);
            }

            match node.parent {
                None => {
                    if root.is_some() {
                        return Err(Error::InvalidIndex(format!(
                            "node {id} is a second root"
                        )));
                    }
                    root = Some(id);
                },
                Some(parent_id) => {
                    nodes
                        .get_mut(&parent_id)
                        .ok_or_else(|| {
                            Error::InvalidIndex(format!(
                                "node {id} appears before its parent {parent_id}"
                            ))
                        })?
                        .children
                        .push(id);
                },
            }

            nodes.insert(id, node);
            order.push(id);

            if (read + 1) % PROGRESS_BATCH == 0 {
                #[allow(clippy::cast_precision_loss)]
                let fraction = (read + 1) as f32 / total as f32;
                let _ = self.progress.send(fraction);
                // Yield so timeouts and task aborts can stop the read here.
                tokio::task::yield_now().await;
            }
        }

        let root = root.ok_or_else(|| Error::InvalidIndex("tree has no root node".into()))?;
        let _ = self.progress.send(1.0);
        Ok(NavigatorTree { root, nodes, order })
    }
}

impl std::fmt::Debug for NavigatorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NavigatorIndex")
            .field("bundle_identifier", &self.bundle_identifier)
            .field("top_level_id", &self.top_level_id)
            .field("node_count", &self.node_count)
            .field("tree_read", &self.tree.initialized())
            .finish_non_exhaustive()
    }
}

fn normalize_path(path: &str) -> String {
    path.trim_start_matches('/').to_string()
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    const fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| Error::InvalidIndex("unexpected end of navigator index".into()))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_u16(&mut self) -> Result<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_string(&mut self) -> Result<String> {
        let len = self.read_u16()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| Error::InvalidIndex("string is not valid UTF-8".into()))
    }
}

struct WriterRecord {
    id: u32,
    parent: Option<u32>,
    page_type: PageType,
    language: InterfaceLanguage,
    title: String,
}

/// Emits the binary navigator index format.
///
/// Nodes must be added in pre-order (parents before children); the reader
/// rejects anything else. `write_to` produces the full artifact set so the
/// directory is directly consumable by [`NavigatorIndex::open`].
#[derive(Default)]
pub struct NavigatorIndexWriter {
    records: Vec<WriterRecord>,
    paths: Vec<(u32, InterfaceLanguage, String)>,
}

impl NavigatorIndexWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a tree node record.
    pub fn add_node(
        &mut self,
        id: u32,
        parent: Option<u32>,
        title: impl Into<String>,
        page_type: PageType,
        language: InterfaceLanguage,
    ) -> &mut Self {
        self.records.push(WriterRecord {
            id,
            parent,
            page_type,
            language,
            title: title.into(),
        });
        self
    }

    /// Appends a path-table entry for a node.
    pub fn add_path(
        &mut self,
        node_id: u32,
        language: InterfaceLanguage,
        path: impl Into<String>,
    ) -> &mut Self {
        self.paths.push((node_id, language, path.into()));
        self
    }

    /// Encodes the navigator index file.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut path_section = Vec::new();
        for (node_id, language, path) in &self.paths {
            path_section.extend_from_slice(&node_id.to_le_bytes());
            path_section.push(language.raw());
            write_string(&mut path_section, path)?;
        }

        let mut tree_section = Vec::new();
        for record in &self.records {
            tree_section.extend_from_slice(&record.id.to_le_bytes());
            tree_section.extend_from_slice(&record.parent.unwrap_or(NO_PARENT).to_le_bytes());
            tree_section.push(record.page_type.raw());
            tree_section.push(record.language.raw());
            write_string(&mut tree_section, &record.title)?;
        }

        let tree_offset = HEADER_LEN + path_section.len();
        let tree_offset = u32::try_from(tree_offset)
            .map_err(|_| Error::InvalidIndex("path table too large".into()))?;
        let path_count = u32::try_from(self.paths.len())
            .map_err(|_| Error::InvalidIndex("too many paths".into()))?;
        let node_count = u32::try_from(self.records.len())
            .map_err(|_| Error::InvalidIndex("too many nodes".into()))?;

        let mut out = Vec::with_capacity(HEADER_LEN + path_section.len() + tree_section.len());
        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&path_count.to_le_bytes());
        out.extend_from_slice(&node_count.to_le_bytes());
        out.extend_from_slice(&tree_offset.to_le_bytes());
        out.extend_from_slice(&path_section);
        out.extend_from_slice(&tree_section);
        Ok(out)
    }

    /// Writes the complete artifact set into `dir`.
    pub async fn write_to(&self, dir: &Path) -> Result<()> {
        tokio::fs::create_dir_all(dir).await?;
        tokio::fs::write(dir.join(NAVIGATOR_INDEX_FILE), self.encode()?).await?;
        // Companion blobs are opaque to this engine; an empty artifact keeps
        // the directory complete for ingestion.
        tokio::fs::write(dir.join(DATA_FILE), b"").await?;
        tokio::fs::write(dir.join(AVAILABILITY_FILE), b"").await?;
        Ok(())
    }
}

fn write_string(out: &mut Vec<u8>, value: &str) -> Result<()> {
    let len = u16::try_from(value.len())
        .map_err(|_| Error::InvalidIndex(format!("string too long: '{value}'")))?;
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(value.as_bytes());
    Ok(())
}
