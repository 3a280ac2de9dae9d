//! # Astro Build Pages
//!
//! Virtual page entries for the static build. Every discovered page becomes a
//! bundler entry `@astro-page:<path>`; when the bundler loads the internal
//! form `\0@astro-page:<path>`, a small module is synthesized that lazily
//! imports the page and re-exports the shared renderers (and middleware,
//! when enabled).
//!
//! The crate never reads page sources. It resolves module specifiers only to
//! decide whether a page can be served — routing, rendering and chunking
//! belong to the host bundler.

pub mod bundle;
pub mod config;
pub mod entries;
pub mod plugin;
pub mod registry;
pub mod utils;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use config::PagesConfig;
pub use entries::{select_entries, EntryInput};
pub use plugin::pages_loader::{synthesize, BuildAbort, PagesPlugin, SyntheticModule};
pub use plugin::resolver::{FsResolver, ModuleResolver, ResolvedModule};
pub use registry::{PageKind, PageMetadata, PageRegistry, PageRegistryBuilder, RouteInfo};
pub use utils::{LogicalPagePath, PageNamespace, ResolvedModuleId, VirtualModuleId};

// ---------------------------------------------------------------------------
// Output Mode
// ---------------------------------------------------------------------------

/// The configured output of the site. Decides whether pages become static entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Every page is prerendered; each one is a bundler entry.
    #[default]
    Static,
    /// Server-rendered; pages are resolved on demand, never as static entries.
    Server,
}

impl OutputMode {
    pub fn is_static(self) -> bool {
        self == OutputMode::Static
    }
}

// ---------------------------------------------------------------------------
// Build Target
// ---------------------------------------------------------------------------

/// Which build of the pipeline a plugin participates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildTarget {
    Client,
    Server,
    Both,
}

// ---------------------------------------------------------------------------
// Handled
// ---------------------------------------------------------------------------

/// Outcome of a chained hook: either this handler produced a value, or the
/// input belongs to someone else and the next handler should try.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handled<T> {
    Found(T),
    NotMine,
}

impl<T> Handled<T> {
    pub fn is_found(&self) -> bool {
        matches!(self, Handled::Found(_))
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Handled::Found(value) => Some(value),
            Handled::NotMine => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Handled<U> {
        match self {
            Handled::Found(value) => Handled::Found(f(value)),
            Handled::NotMine => Handled::NotMine,
        }
    }
}

impl<T> From<Option<T>> for Handled<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Handled::NotMine, Handled::Found)
    }
}

// ---------------------------------------------------------------------------
// Diagnostic
// ---------------------------------------------------------------------------

/// A structured diagnostic emitted while planning a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub message: String,
    pub context: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
    Error,
    Warning,
    Info,
}

impl Diagnostic {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Info,
            message: message.into(),
            context: None,
        }
    }

    pub fn warning(message: impl Into<String>, context: Option<String>) -> Self {
        Self {
            level: DiagnosticLevel::Warning,
            message: message.into(),
            context,
        }
    }
}

// ---------------------------------------------------------------------------
// PagesError
// ---------------------------------------------------------------------------

/// Errors that abort the build. "Not mine" conditions are never errors;
/// they are reported as [`Handled::NotMine`].
#[derive(Debug, Error)]
pub enum PagesError {
    #[error("Malformed virtual module id `{id}`: expected prefix `{expected_prefix}`")]
    MalformedIdentifier { id: String, expected_prefix: String },

    #[error("Logical page path `{path}` contains the reserved token `{token}`")]
    AmbiguousPrefix { path: String, token: String },

    #[error("Invalid logical page path `{path}`: {reason}")]
    InvalidPagePath { path: String, reason: &'static str },

    #[error("Invalid virtual module prefix `{0}`")]
    InvalidPrefix(String),

    #[error("Page `{path}` registered twice")]
    DuplicatePage { path: String },

    #[error("Failed to resolve `{specifier}`: {message}")]
    Resolve { specifier: String, message: String },

    #[error("Build aborted")]
    Aborted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid manifest: {0}")]
    Manifest(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Plan a build: select the entries for `registry` and synthesize each one
/// through `resolver`, the way the bundler would drive the plugin.
pub async fn plan_build<R: ModuleResolver>(
    registry: PageRegistry,
    config: PagesConfig,
    resolver: R,
) -> Result<bundle::BuildReport, PagesError> {
    let plugin = PagesPlugin::new(registry, config, resolver)?;
    bundle::execute_plan(&plugin).await
}
