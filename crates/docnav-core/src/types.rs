use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Error, Result};

/// Opaque, reverse-DNS-style bundle identifier, globally unique within a
/// workspace. Used as the stable key across persistence.
pub type BundleIdentifier = String;

/// A documentation archive registered in a workspace.
///
/// Immutable once constructed. Bundles are not persisted directly; they are
/// reconstructed from a project reference at load time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentationBundle {
    /// The stable bundle identifier.
    pub identifier: BundleIdentifier,
    /// Human-readable name shown in browsers and navigators.
    pub display_name: String,
    /// Root location all provider-relative paths resolve against.
    pub base_url: Url,
    /// Location of the navigator index directory, relative to `base_url`.
    pub index_path: String,
    /// Optional location of theme settings, relative to `base_url`.
    pub theme_settings_path: Option<String>,
}

impl DocumentationBundle {
    /// Creates a bundle with no theme settings.
    pub fn new(
        identifier: impl Into<BundleIdentifier>,
        display_name: impl Into<String>,
        base_url: Url,
        index_path: impl Into<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            display_name: display_name.into(),
            base_url,
            index_path: index_path.into(),
            theme_settings_path: None,
        }
    }

    /// The absolute location of the bundle's navigator index directory.
    pub fn index_url(&self) -> Result<Url> {
        join_url(&self.base_url, &self.index_path)
    }
}

impl fmt::Display for DocumentationBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.display_name, self.identifier)
    }
}

/// Appends a relative path to a base URL, treating the base as a directory.
pub fn join_url(base: &Url, path: &str) -> Result<Url> {
    let mut url = base.clone();
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|()| Error::InvalidUrl(format!("'{base}' cannot be a base URL")))?;
        segments.pop_if_empty();
        segments.extend(path.split('/').filter(|s| !s.is_empty()));
    }
    Ok(url)
}

/// A structured reference to a topic or resource inside a bundle.
///
/// Round-trips through the generic URI form `doc://<bundleIdentifier>/<path>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentationUri {
    /// Identifier of the containing bundle.
    pub bundle_identifier: BundleIdentifier,
    /// Bundle-relative path, without a leading slash. Empty for the root.
    pub path: String,
}

impl DocumentationUri {
    const SCHEME_PREFIX: &'static str = "doc://";

    /// Creates a reference from a bundle identifier and a relative path.
    pub fn new(bundle_identifier: impl Into<BundleIdentifier>, path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            bundle_identifier: bundle_identifier.into(),
            path: path.trim_start_matches('/').to_string(),
        }
    }

    /// Parses a `doc://` URI string.
    pub fn parse(input: &str) -> Result<Self> {
        let rest = input
            .strip_prefix(Self::SCHEME_PREFIX)
            .ok_or_else(|| Error::InvalidUrl(format!("'{input}' is not a doc:// reference")))?;

        let (bundle, path) = rest.split_once('/').unwrap_or((rest, ""));
        if bundle.is_empty() {
            return Err(Error::InvalidUrl(format!(
                "'{input}' is missing a bundle identifier"
            )));
        }

        Ok(Self::new(bundle, path))
    }
}

impl fmt::Display for DocumentationUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}/{}",
            Self::SCHEME_PREFIX,
            self.bundle_identifier,
            self.path
        )
    }
}

impl std::str::FromStr for DocumentationUri {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// One-byte interface-language tag carried by navigator index nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct InterfaceLanguage(pub u8);

impl InterfaceLanguage {
    /// The default language of a bundle's navigator tree.
    pub const DEFAULT: Self = Self(0);

    /// The raw tag byte as stored in the index.
    pub const fn raw(self) -> u8 {
        self.0
    }
}

/// One-byte page-type code carried by navigator index nodes.
///
/// Preserved verbatim from the index bytes; unrecognized codes are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PageType(pub u8);

impl PageType {
    /// The root of a bundle's topic tree.
    pub const ROOT: Self = Self(0);
    /// A free-form article page.
    pub const ARTICLE: Self = Self(1);
    /// A step-by-step tutorial page.
    pub const TUTORIAL: Self = Self(2);
    /// A framework or module landing page.
    pub const FRAMEWORK: Self = Self(3);
    /// A display-only separator with no content of its own.
    pub const GROUP_MARKER: Self = Self(4);

    /// The raw code byte as stored in the index.
    pub const fn raw(self) -> u8 {
        self.0
    }
}
