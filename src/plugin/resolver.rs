//! Module resolution service.
//!
//! The synthesizer only needs to know whether a page's module specifier can
//! be resolved. The host bundler owns the real resolver; [`FsResolver`] is a
//! filesystem-backed stand-in for hosts (and the CLI) without one.

use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arcstr::ArcStr;
use tracing::debug;

use crate::PagesError;

/// A module the resolver located.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModule {
    pub id: ArcStr,
    pub external: bool,
}

impl ResolvedModule {
    pub fn new(id: impl Into<ArcStr>) -> Self {
        Self {
            id: id.into(),
            external: false,
        }
    }
}

/// Resolves import specifiers. `Ok(None)` means "not found" and is not an error.
pub trait ModuleResolver: Send + Sync {
    fn resolve(
        &self,
        specifier: &str,
    ) -> impl Future<Output = Result<Option<ResolvedModule>, PagesError>> + Send;
}

impl<R: ModuleResolver> ModuleResolver for Arc<R> {
    fn resolve(
        &self,
        specifier: &str,
    ) -> impl Future<Output = Result<Option<ResolvedModule>, PagesError>> + Send {
        (**self).resolve(specifier)
    }
}

impl<R: ModuleResolver> ModuleResolver for &R {
    fn resolve(
        &self,
        specifier: &str,
    ) -> impl Future<Output = Result<Option<ResolvedModule>, PagesError>> + Send {
        (**self).resolve(specifier)
    }
}

// ---------------------------------------------------------------------------
// FsResolver
// ---------------------------------------------------------------------------

/// Default extensions tried when a specifier has none that exists on disk.
pub const DEFAULT_EXTENSIONS: &[&str] = &[
    ".astro", ".md", ".mdx", ".html", ".js", ".mjs", ".ts", ".jsx", ".tsx",
];

/// Resolves relative and absolute specifiers against a project root.
/// Bare specifiers (`some-package`) are declined.
#[derive(Debug, Clone)]
pub struct FsResolver {
    root: PathBuf,
    extensions: Vec<String>,
}

impl FsResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }

    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Files to probe for `specifier`, in priority order.
    fn candidates(&self, specifier: &str) -> Option<Vec<PathBuf>> {
        if !is_path_specifier(specifier) {
            return None;
        }

        let base = self.root.join(specifier);
        let mut candidates = vec![base.clone()];
        for ext in &self.extensions {
            candidates.push(PathBuf::from(format!("{}{}", base.display(), ext)));
        }
        for ext in &self.extensions {
            candidates.push(base.join(format!("index{ext}")));
        }
        Some(candidates)
    }
}

impl ModuleResolver for FsResolver {
    fn resolve(
        &self,
        specifier: &str,
    ) -> impl Future<Output = Result<Option<ResolvedModule>, PagesError>> + Send {
        let specifier = specifier.to_string();
        let candidates = self.candidates(&specifier);

        async move {
            let Some(candidates) = candidates else {
                debug!(%specifier, "bare specifier, not resolvable from disk");
                return Ok(None);
            };

            for candidate in candidates {
                match tokio::fs::metadata(&candidate).await {
                    Ok(meta) if meta.is_file() => {
                        let id = candidate.to_string_lossy().replace('\\', "/");
                        debug!(%specifier, %id, "resolved");
                        return Ok(Some(ResolvedModule::new(id)));
                    }
                    Ok(_) => continue,
                    Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory) => {
                        continue
                    }
                    Err(e) => {
                        return Err(PagesError::Resolve {
                            specifier,
                            message: format!("cannot stat '{}': {e}", candidate.display()),
                        })
                    }
                }
            }

            debug!(%specifier, "no candidate exists");
            Ok(None)
        }
    }
}

fn is_path_specifier(specifier: &str) -> bool {
    specifier.starts_with("./")
        || specifier.starts_with("../")
        || specifier.starts_with('/')
        || Path::new(specifier).is_absolute()
}
