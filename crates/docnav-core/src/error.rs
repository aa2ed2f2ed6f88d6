//! Error types and handling for docnav-core operations.
//!
//! All fallible operations in this crate return [`Result<T, Error>`]. Errors
//! are grouped into the categories the workspace protocol distinguishes:
//!
//! - **I/O and network errors**: recoverable per bundle; they mark the owning
//!   top-level node as failed without cascading to sibling loads.
//! - **Validation errors**: structural project inconsistencies reported to the
//!   caller before any state is mutated.
//! - **Precondition violations**: internal invariant breaches upstream of the
//!   failing call. These abort the operation loudly instead of continuing with
//!   corrupt state.
//! - **Duplicate-key errors**: rejected up front, with no partial mutation.
//!
//! Lookup misses (unknown path, unknown composite ID) are deliberately *not*
//! errors; those APIs return `Option` and log a diagnostic instead.

use thiserror::Error;

use crate::project::ValidationFailure;
use crate::types::BundleIdentifier;

/// The main error type for docnav-core operations.
///
/// The underlying `std::io::Error`, `reqwest::Error` and `serde_json::Error`
/// values are preserved so callers can inspect the full source chain.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Network operation failed.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// A navigator index file is missing required structure or is corrupt.
    #[error("Invalid navigator index: {0}")]
    InvalidIndex(String),

    /// An operation exceeded its configured time budget.
    ///
    /// Tree reads are bounded per bundle; a timeout is handled exactly like an
    /// I/O failure on the owning node.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Persistent store operation failed beyond basic file I/O.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Search index operation failed.
    #[error("Search error: {0}")]
    Search(String),

    /// Requested resource was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// URL is malformed or cannot be combined with the requested path.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A bundle with this identifier is already registered.
    #[error("a bundle with identifier '{0}' already exists in the workspace")]
    DuplicateBundle(BundleIdentifier),

    /// A revision with this tag already exists for the bundle.
    #[error("revision '{tag}' already exists for bundle {bundle_id}")]
    DuplicateRevision {
        /// The bundle the duplicate revision was added to.
        bundle_id: uuid::Uuid,
        /// The conflicting revision tag.
        tag: String,
    },

    /// No bundle with the given identifier is registered.
    #[error(
        "the requested data could not be located because no bundle with identifier '{0}' is registered"
    )]
    UnknownBundle(BundleIdentifier),

    /// No content provider is registered for the given bundle.
    #[error("no data provider is registered for '{0}'")]
    UnknownProvider(String),

    /// Structural mismatch between a project's items and its references.
    #[error(transparent)]
    Validation(#[from] ValidationFailure),

    /// An internal invariant was broken by the caller.
    ///
    /// Indicates a programming error upstream (for example, saving a project
    /// before its navigator finished loading). Not recoverable.
    #[error("precondition violated: {0}")]
    Precondition(String),
}

impl Error {
    /// Returns whether retrying the failed operation may succeed.
    ///
    /// Network failures, timeouts and interrupted I/O are transient; malformed
    /// indexes, duplicates and invariant breaches are not.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) => true,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }

    /// A short stable category name, used in diagnostics.
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Network(_) => "network",
            Self::Serialize(_) => "serialize",
            Self::InvalidIndex(_) => "index",
            Self::Timeout(_) => "timeout",
            Self::Storage(_) => "storage",
            Self::Search(_) => "search",
            Self::NotFound(_) => "not-found",
            Self::InvalidUrl(_) => "url",
            Self::DuplicateBundle(_) | Self::DuplicateRevision { .. } => "duplicate",
            Self::UnknownBundle(_) | Self::UnknownProvider(_) => "unknown",
            Self::Validation(_) => "validation",
            Self::Precondition(_) => "precondition",
        }
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;
