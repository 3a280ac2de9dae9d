//! Utility functions for the page pipeline.
//!
//! - Virtual module ID construction and parsing
//! - JS string literal encoding (injection-safe)

use std::borrow::Borrow;
use std::fmt;

use arcstr::ArcStr;
use serde::{Deserialize, Serialize};

use crate::PagesError;

// ---------------------------------------------------------------------------
// Well-known module IDs
// ---------------------------------------------------------------------------

/// Prefix for all page virtual modules.
pub const ASTRO_PAGE_MODULE_ID: &str = "@astro-page:";

/// Resolved form of [`ASTRO_PAGE_MODULE_ID`].
/// The `\0` prefix prevents filesystem resolution collisions.
pub const ASTRO_PAGE_RESOLVED_MODULE_ID: &str = "\0@astro-page:";

/// Sentinel that marks a module id as bundler-internal.
pub const RESOLVED_SENTINEL: char = '\0';

/// Shared renderer bundle, owned by the renderers plugin.
pub const RENDERERS_MODULE_ID: &str = "@astro-renderers";

/// Shared middleware bundle, owned by the middleware plugin.
pub const MIDDLEWARE_MODULE_ID: &str = "@astro-middleware";

/// Replaces the extension dot when extension masking is enabled,
/// so `index.astro` is not picked up by `.astro` loaders.
pub const EXTENSION_MASK: &str = "@_@";

// ---------------------------------------------------------------------------
// LogicalPagePath
// ---------------------------------------------------------------------------

/// Source-relative path identifying a page, e.g. `src/pages/blog.astro` or `/blog`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LogicalPagePath(ArcStr);

impl LogicalPagePath {
    /// Rejects empty paths and paths containing the internal sentinel.
    pub fn new(path: impl AsRef<str>) -> Result<Self, PagesError> {
        let path = path.as_ref();
        if path.is_empty() {
            return Err(PagesError::InvalidPagePath {
                path: String::new(),
                reason: "path is empty",
            });
        }
        if path.contains(RESOLVED_SENTINEL) {
            return Err(PagesError::InvalidPagePath {
                path: path.escape_default().to_string(),
                reason: "path contains a NUL byte",
            });
        }
        Ok(Self(ArcStr::from(path)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for LogicalPagePath {
    type Error = PagesError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<LogicalPagePath> for String {
    fn from(value: LogicalPagePath) -> Self {
        value.0.to_string()
    }
}

impl Borrow<str> for LogicalPagePath {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LogicalPagePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Virtual Module IDs
// ---------------------------------------------------------------------------

/// Importable virtual id (`@astro-page:/blog`). Only a [`PageNamespace`] creates these.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(into = "String")]
pub struct VirtualModuleId(ArcStr);

/// Bundler-internal virtual id (`\0@astro-page:/blog`). Never importable by user code.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(into = "String")]
pub struct ResolvedModuleId(ArcStr);

impl VirtualModuleId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_arcstr(&self) -> &ArcStr {
        &self.0
    }

    /// Internal form of this id.
    pub fn to_resolved(&self) -> ResolvedModuleId {
        ResolvedModuleId(arcstr::format!("{}{}", RESOLVED_SENTINEL, self.0))
    }
}

impl ResolvedModuleId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_arcstr(&self) -> &ArcStr {
        &self.0
    }

    /// Importable form of this id.
    pub fn to_external(&self) -> VirtualModuleId {
        VirtualModuleId(ArcStr::from(&self.0[RESOLVED_SENTINEL.len_utf8()..]))
    }
}

impl From<VirtualModuleId> for String {
    fn from(value: VirtualModuleId) -> Self {
        value.0.to_string()
    }
}

impl From<ResolvedModuleId> for String {
    fn from(value: ResolvedModuleId) -> Self {
        value.0.to_string()
    }
}

impl fmt::Display for VirtualModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ResolvedModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Keep the sentinel visible in logs.
        write!(f, "\\0{}", &self.0[RESOLVED_SENTINEL.len_utf8()..])
    }
}

// ---------------------------------------------------------------------------
// PageNamespace (identifier codec)
// ---------------------------------------------------------------------------

/// Bidirectional mapping between logical page paths and virtual module ids.
///
/// Encoding is a plain concatenation of the prefix and the path. With
/// extension masking enabled, the dot of the final extension is replaced by
/// [`EXTENSION_MASK`]. Both directions reject inputs that would make the
/// mapping ambiguous, so `decode(encode(p)) == p` holds for every accepted `p`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageNamespace {
    prefix: ArcStr,
    mask_extensions: bool,
}

impl Default for PageNamespace {
    fn default() -> Self {
        Self {
            prefix: arcstr::literal!("@astro-page:"),
            mask_extensions: false,
        }
    }
}

impl PageNamespace {
    /// Create a namespace with a custom prefix.
    pub fn new(prefix: impl AsRef<str>) -> Result<Self, PagesError> {
        let prefix = prefix.as_ref();
        if prefix.is_empty() || prefix.contains(RESOLVED_SENTINEL) {
            return Err(PagesError::InvalidPrefix(prefix.escape_default().to_string()));
        }
        Ok(Self {
            prefix: ArcStr::from(prefix),
            mask_extensions: false,
        })
    }

    pub fn with_extension_masking(mut self, mask: bool) -> Self {
        self.mask_extensions = mask;
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn masks_extensions(&self) -> bool {
        self.mask_extensions
    }

    /// Encode a logical page path into its importable virtual id.
    pub fn encode(&self, path: &LogicalPagePath) -> Result<VirtualModuleId, PagesError> {
        let raw = path.as_str();
        if raw.contains(self.prefix.as_str()) {
            return Err(PagesError::AmbiguousPrefix {
                path: raw.to_string(),
                token: self.prefix.to_string(),
            });
        }
        if self.mask_extensions && raw.contains(EXTENSION_MASK) {
            return Err(PagesError::AmbiguousPrefix {
                path: raw.to_string(),
                token: EXTENSION_MASK.to_string(),
            });
        }

        let id = if self.mask_extensions {
            let masked = mask_extension(raw);
            // The mask can overlap neighbouring `@_` / `_@` text.
            if unmask_extension(&masked) != raw {
                return Err(PagesError::AmbiguousPrefix {
                    path: raw.to_string(),
                    token: EXTENSION_MASK.to_string(),
                });
            }
            arcstr::format!("{}{}", self.prefix, masked)
        } else {
            arcstr::format!("{}{}", self.prefix, raw)
        };
        Ok(VirtualModuleId(id))
    }

    /// Decode an importable virtual id back into its logical page path.
    pub fn decode(&self, id: &VirtualModuleId) -> Result<LogicalPagePath, PagesError> {
        self.decode_str(id.as_str())
    }

    /// Decode a bundler-internal id back into its logical page path.
    pub fn decode_resolved(&self, id: &ResolvedModuleId) -> Result<LogicalPagePath, PagesError> {
        match id.as_str().strip_prefix(RESOLVED_SENTINEL) {
            Some(external) => self.decode_str(external),
            None => Err(self.malformed(id.as_str())),
        }
    }

    fn decode_str(&self, raw: &str) -> Result<LogicalPagePath, PagesError> {
        let body = raw
            .strip_prefix(self.prefix.as_str())
            .ok_or_else(|| self.malformed(raw))?;
        // A second prefix can never come out of `encode`.
        if body.contains(self.prefix.as_str()) {
            return Err(self.malformed(raw));
        }

        if !self.mask_extensions {
            return LogicalPagePath::new(body).map_err(|_| self.malformed(raw));
        }

        let path = LogicalPagePath::new(unmask_extension(body)).map_err(|_| self.malformed(raw))?;
        // Only the id `encode` produces for this path is accepted.
        match self.encode(&path) {
            Ok(id) if id.as_str() == raw => Ok(path),
            _ => Err(self.malformed(raw)),
        }
    }

    fn malformed(&self, id: &str) -> PagesError {
        PagesError::MalformedIdentifier {
            id: id.escape_default().to_string(),
            expected_prefix: self.prefix.to_string(),
        }
    }

    /// Whether `id` is an importable id in this namespace.
    pub fn owns(&self, id: &str) -> bool {
        id.starts_with(self.prefix.as_str())
    }

    /// Whether `id` is a bundler-internal id in this namespace.
    pub fn owns_resolved(&self, id: &str) -> bool {
        id.strip_prefix(RESOLVED_SENTINEL)
            .is_some_and(|rest| rest.starts_with(self.prefix.as_str()))
    }

    /// Wrap a raw importable id. Returns `None` outside this namespace.
    pub fn parse_external(&self, raw: &str) -> Option<VirtualModuleId> {
        self.owns(raw).then(|| VirtualModuleId(ArcStr::from(raw)))
    }

    /// Wrap a raw internal id. Returns `None` outside this namespace.
    pub fn parse_resolved(&self, raw: &str) -> Option<ResolvedModuleId> {
        self.owns_resolved(raw)
            .then(|| ResolvedModuleId(ArcStr::from(raw)))
    }

    /// Map an import specifier to its internal id, as the resolve hook does.
    pub fn resolve_specifier(&self, specifier: &str) -> Option<ResolvedModuleId> {
        self.parse_external(specifier).map(|id| id.to_resolved())
    }
}

/// Replace the dot of the last segment's extension with [`EXTENSION_MASK`].
/// Dotfiles (`.well-known`) have no extension.
fn mask_extension(path: &str) -> String {
    let segment_start = path.rfind('/').map_or(0, |i| i + 1);
    match path[segment_start..].rfind('.') {
        Some(dot) if dot > 0 => {
            let dot = segment_start + dot;
            format!("{}{}{}", &path[..dot], EXTENSION_MASK, &path[dot + 1..])
        }
        _ => path.to_string(),
    }
}

/// Inverse of [`mask_extension`]: restore the dot at the last mask.
fn unmask_extension(body: &str) -> String {
    match body.rfind(EXTENSION_MASK) {
        Some(at) => format!("{}.{}", &body[..at], &body[at + EXTENSION_MASK.len()..]),
        None => body.to_string(),
    }
}

// ---------------------------------------------------------------------------
// JS String Encoding
// ---------------------------------------------------------------------------

/// Encode a string as a double-quoted JS string literal (JSON encoding).
pub fn js_string_literal(s: &str) -> String {
    serde_json::Value::String(s.to_owned()).to_string()
}

/// Derive an input name from a module id: the last path segment up to the first `.`.
pub fn entry_name(id: &str) -> &str {
    let last = id.rsplit('/').next().unwrap_or(id);
    last.split('.').next().unwrap_or(last)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
