//! Pages loader — the plugin that turns registered pages into virtual entry
//! modules.
//!
//! - `options` — add one `@astro-page:<path>` entry per page (static output only)
//! - `resolve_id` — map `@astro-page:<path>` to the internal `\0@astro-page:<path>`
//! - `load` — synthesize the page module for an internal id
//!
//! **Invariants:**
//! - Never mutates the registry
//! - Resolves exactly one specifier per load (the page's own)
//! - Identical registry + config produce byte-identical modules

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::config::PagesConfig;
use crate::entries::{select_entries, EntryInput};
use crate::plugin::resolver::ModuleResolver;
use crate::plugin::{HookLoadOutput, HookLoadReturn, HookResolveIdOutput, HookResolveIdReturn, HookUsage, Plugin};
use crate::registry::{PageMetadata, PageRegistry};
use crate::utils::{self, PageNamespace, ResolvedModuleId, VirtualModuleId};
use crate::{BuildTarget, Handled, PagesError};

/// Public plugin name.
pub const PLUGIN_NAME: &str = "@astro/plugin-build-pages";

// ---------------------------------------------------------------------------
// SyntheticModule
// ---------------------------------------------------------------------------

/// Source of a synthesized page module: import lines, then export lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticModule {
    imports: Vec<String>,
    exports: Vec<String>,
}

impl SyntheticModule {
    pub fn imports(&self) -> &[String] {
        &self.imports
    }

    pub fn exports(&self) -> &[String] {
        &self.exports
    }

    /// The module source text.
    pub fn code(&self) -> String {
        format!("{}\n{}", self.imports.join("\n"), self.exports.join("\n"))
    }
}

impl fmt::Display for SyntheticModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code())
    }
}

/// Compose the page module. Statement order is fixed:
/// page, renderers, then middleware when enabled.
pub fn compose_page_module(page: &PageMetadata, config: &PagesConfig) -> SyntheticModule {
    let mut imports = Vec::with_capacity(3);
    let mut exports = Vec::with_capacity(3);

    // Lazy so the page implementation lands in its own chunk.
    imports.push(format!(
        "const page = () => import({});",
        utils::js_string_literal(&page.module_specifier)
    ));
    exports.push("export { page };".to_string());

    imports.push(format!(
        "import {{ renderers }} from {};",
        utils::js_string_literal(&config.renderers_module_id)
    ));
    exports.push("export { renderers };".to_string());

    if config.middleware {
        imports.push(format!(
            "import * as _middleware from {};",
            utils::js_string_literal(&config.middleware_module_id)
        ));
        exports.push("export const middleware = _middleware;".to_string());
    }

    SyntheticModule { imports, exports }
}

/// Synthesize the module for an internal page id.
///
/// Declines with [`Handled::NotMine`] when the id is outside the page
/// namespace, the page is not registered, or its module specifier does not
/// resolve. Malformed ids inside the namespace and resolver failures are errors.
pub async fn synthesize<R: ModuleResolver>(
    id: &str,
    registry: &PageRegistry,
    resolver: &R,
    config: &PagesConfig,
) -> Result<Handled<SyntheticModule>, PagesError> {
    let namespace = config.namespace()?;
    synthesize_in(&namespace, id, registry, resolver, config).await
}

async fn synthesize_in<R: ModuleResolver>(
    namespace: &PageNamespace,
    id: &str,
    registry: &PageRegistry,
    resolver: &R,
    config: &PagesConfig,
) -> Result<Handled<SyntheticModule>, PagesError> {
    let Some(resolved) = namespace.parse_resolved(id) else {
        return Ok(Handled::NotMine);
    };
    let path = namespace.decode_resolved(&resolved)?;

    let Some(page) = registry.get(path.as_str()) else {
        debug!(id = %resolved, "page not registered");
        return Ok(Handled::NotMine);
    };

    if resolver.resolve(&page.module_specifier).await?.is_none() {
        debug!(
            id = %resolved,
            specifier = %page.module_specifier,
            "page module unresolvable"
        );
        return Ok(Handled::NotMine);
    }

    Ok(Handled::Found(compose_page_module(page, config)))
}

// ---------------------------------------------------------------------------
// BuildAbort
// ---------------------------------------------------------------------------

/// Abort signal shared between the host and in-flight loads.
#[derive(Debug, Clone)]
pub struct BuildAbort {
    tx: Arc<watch::Sender<bool>>,
}

impl BuildAbort {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Abort the build. Every pending and future load fails with [`PagesError::Aborted`].
    pub fn abort(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }

    /// Completes once the build is aborted.
    pub async fn aborted(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|aborted| *aborted).await;
    }
}

impl Default for BuildAbort {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// PagesPlugin
// ---------------------------------------------------------------------------

/// The pages plugin. Holds only read-only build state.
pub struct PagesPlugin<R> {
    registry: PageRegistry,
    config: PagesConfig,
    namespace: PageNamespace,
    resolver: R,
    abort: BuildAbort,
}

impl<R> fmt::Debug for PagesPlugin<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PagesPlugin")
            .field("pages", &self.registry.len())
            .field("config", &self.config)
            .finish()
    }
}

impl<R: ModuleResolver> PagesPlugin<R> {
    pub fn new(registry: PageRegistry, config: PagesConfig, resolver: R) -> Result<Self, PagesError> {
        let namespace = config.namespace()?;
        Ok(Self {
            registry,
            config,
            namespace,
            resolver,
            abort: BuildAbort::new(),
        })
    }

    pub fn with_abort(mut self, abort: BuildAbort) -> Self {
        self.abort = abort;
        self
    }

    pub fn registry(&self) -> &PageRegistry {
        &self.registry
    }

    pub fn config(&self) -> &PagesConfig {
        &self.config
    }

    pub fn namespace(&self) -> &PageNamespace {
        &self.namespace
    }

    /// Entry ids this plugin contributes. Called once, before the build.
    pub fn contribute_entries(&self) -> Result<BTreeSet<VirtualModuleId>, PagesError> {
        select_entries(&self.registry, &self.namespace, self.config.output)
    }

    /// Map an importable page id to its internal id.
    pub fn resolve_virtual_id(&self, id: &str) -> Option<ResolvedModuleId> {
        self.namespace.resolve_specifier(id)
    }

    /// Produce the module source for an internal page id.
    pub async fn load_virtual_module(&self, id: &str) -> Result<Handled<SyntheticModule>, PagesError> {
        if self.abort.is_aborted() {
            return Err(PagesError::Aborted);
        }

        tokio::select! {
            biased;
            _ = self.abort.aborted() => Err(PagesError::Aborted),
            result = synthesize_in(&self.namespace, id, &self.registry, &self.resolver, &self.config) => result,
        }
    }
}

impl<R: ModuleResolver> Plugin for PagesPlugin<R> {
    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed(PLUGIN_NAME)
    }

    fn build_target(&self) -> BuildTarget {
        BuildTarget::Server
    }

    fn register_hook_usage(&self) -> HookUsage {
        HookUsage::Options | HookUsage::ResolveId | HookUsage::Load
    }

    fn options(&self, input: &mut EntryInput) -> Result<(), PagesError> {
        let entries = self.contribute_entries()?;
        if entries.is_empty() {
            return Ok(());
        }
        let added = input.add_inputs(entries.iter().map(VirtualModuleId::as_str));
        info!(pages = entries.len(), added, "page entries contributed");
        Ok(())
    }

    fn resolve_id(&self, specifier: &str) -> HookResolveIdReturn {
        Ok(self.resolve_virtual_id(specifier).map(|id| HookResolveIdOutput {
            id: id.as_arcstr().clone(),
            external: false,
        }))
    }

    fn load(&self, id: &str) -> impl Future<Output = HookLoadReturn> + Send {
        async move {
            let module = self.load_virtual_module(id).await?;
            Ok(module.into_option().map(|module| HookLoadOutput {
                code: module.code().into(),
            }))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
