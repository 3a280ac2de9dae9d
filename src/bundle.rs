//! Build planning.
//!
//! Drives the pages plugin the way the host bundler would:
//! 1. Run the `options` hook to collect the page entries
//! 2. Map each entry to its internal id
//! 3. Synthesize each resolved id through `load`
//! 4. Return a `BuildReport` with modules and diagnostics
//!
//! Pages whose module cannot be resolved are declined by the plugin; the
//! report records a warning naming the specifier so the host can surface it.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use crate::entries::EntryInput;
use crate::plugin::pages_loader::PagesPlugin;
use crate::plugin::resolver::ModuleResolver;
use crate::plugin::Plugin;
use crate::utils::{LogicalPagePath, ResolvedModuleId, VirtualModuleId};
use crate::{Diagnostic, Handled, OutputMode, PagesError};

/// One synthesized page module.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageModule {
    pub path: LogicalPagePath,
    pub entry: VirtualModuleId,
    pub resolved_id: ResolvedModuleId,
    pub code: String,
}

/// Outcome of planning one build.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub output: OutputMode,
    /// Entry ids contributed to the bundler input, sorted.
    pub entries: Vec<VirtualModuleId>,
    /// Modules synthesized for those entries, in entry order.
    pub modules: Vec<PageModule>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Execute a build plan with an already constructed plugin.
pub async fn execute_plan<R: ModuleResolver>(
    plugin: &PagesPlugin<R>,
) -> Result<BuildReport, PagesError> {
    let mut diagnostics = Vec::new();
    let output = plugin.config().output;

    diagnostics.push(Diagnostic::info(format!(
        "Plan started for {} pages (output: {:?})",
        plugin.registry().len(),
        output
    )));

    let mut input = EntryInput::Empty;
    plugin.options(&mut input)?;
    // Only this plugin contributed, so every input id is a page entry.
    let entries: Vec<VirtualModuleId> = input
        .ids()
        .into_iter()
        .filter_map(|id| plugin.namespace().parse_external(id))
        .collect();

    let mut modules = Vec::with_capacity(entries.len());
    for entry in &entries {
        let resolved = entry.to_resolved();
        let path = plugin.namespace().decode(entry)?;

        match plugin.load_virtual_module(resolved.as_str()).await? {
            Handled::Found(module) => modules.push(PageModule {
                path,
                entry: entry.clone(),
                resolved_id: resolved,
                code: module.code(),
            }),
            Handled::NotMine => {
                let specifier = plugin
                    .registry()
                    .get(path.as_str())
                    .map(|page| page.module_specifier.clone())
                    .unwrap_or_default();
                warn!(%path, %specifier, "page module could not be resolved");
                diagnostics.push(Diagnostic::warning(
                    format!("Page module `{specifier}` could not be resolved"),
                    Some(format!("while loading {resolved} for page {path}")),
                ));
            }
        }
    }

    info!(entries = entries.len(), modules = modules.len(), "plan complete");
    diagnostics.push(Diagnostic::info(format!(
        "Plan complete: {} entries, {} modules, {} bytes",
        entries.len(),
        modules.len(),
        modules.iter().map(|m| m.code.len()).sum::<usize>(),
    )));

    Ok(BuildReport {
        output,
        entries,
        modules,
        diagnostics,
    })
}

impl BuildReport {
    /// Whether every entry produced a module.
    pub fn is_complete(&self) -> bool {
        self.entries.len() == self.modules.len()
    }

    /// Write one `.mjs` file per module under `<out_dir>/pages/` plus a
    /// `manifest.json` describing the report. Returns the written paths.
    pub async fn write_to_disk(&self, out_dir: &Path) -> Result<Vec<PathBuf>, PagesError> {
        let pages_dir = out_dir.join("pages");
        tokio::fs::create_dir_all(&pages_dir).await?;

        let mut written = Vec::with_capacity(self.modules.len() + 1);
        for module in &self.modules {
            let file_name = module_file_name(&module.path);
            let file_path = pages_dir.join(file_name);
            tokio::fs::write(&file_path, &module.code).await?;
            written.push(file_path);
        }

        let manifest_path = out_dir.join("manifest.json");
        let manifest = serde_json::to_string_pretty(self)?;
        tokio::fs::write(&manifest_path, manifest).await?;
        written.push(manifest_path);

        info!(files = written.len(), dir = %out_dir.display(), "report written");
        Ok(written)
    }
}

/// Stable, filesystem-safe file name for a page module.
/// The hash keeps names unique when sanitizing collapses two paths.
pub fn module_file_name(path: &LogicalPagePath) -> String {
    let token = sanitize_file_token(path.as_str());
    let token = if token.is_empty() { "index" } else { token.as_str() };
    format!("{token}.{}.mjs", stable_hash_8(path.as_str()))
}

fn sanitize_file_token(input: &str) -> String {
    input
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' { ch } else { '_' })
        .collect::<String>()
        .trim_matches('_')
        .to_string()
}

fn stable_hash_8(content: &str) -> String {
    let mut hash: i32 = 0;
    for byte in content.bytes() {
        hash = hash
            .wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(byte as i32);
    }
    let normalized = hash.wrapping_abs() as u32;
    format!("{normalized:08x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> LogicalPagePath {
        LogicalPagePath::new(s).unwrap()
    }

    #[test]
    fn file_names_are_stable_and_safe() {
        let name = module_file_name(&path("/blog/[slug]"));
        assert!(name.starts_with("blog__slug."));
        assert!(name.ends_with(".mjs"));
        assert_eq!(name, module_file_name(&path("/blog/[slug]")));
    }

    #[test]
    fn root_page_is_index() {
        assert!(module_file_name(&path("/")).starts_with("index."));
    }

    #[test]
    fn collapsed_tokens_stay_distinct() {
        assert_ne!(module_file_name(&path("/a-b/c")), module_file_name(&path("/a-b.c")));
    }

    struct AnyResolver;

    impl ModuleResolver for AnyResolver {
        fn resolve(
            &self,
            specifier: &str,
        ) -> impl std::future::Future<
            Output = Result<Option<crate::plugin::resolver::ResolvedModule>, PagesError>,
        > + Send {
            let resolved = crate::plugin::resolver::ResolvedModule::new(specifier.to_string());
            async move { Ok(Some(resolved)) }
        }
    }

    #[tokio::test]
    async fn plan_entries_come_from_options_input() {
        let registry = crate::PageRegistry::from_pages([
            ("/zeta", crate::PageMetadata::new("./z")),
            ("/alpha", crate::PageMetadata::new("./a")),
        ])
        .unwrap();
        let plugin =
            PagesPlugin::new(registry, crate::PagesConfig::default(), AnyResolver).unwrap();
        let report = execute_plan(&plugin).await.unwrap();

        let entries: Vec<&str> = report.entries.iter().map(|e| e.as_str()).collect();
        assert_eq!(entries, vec!["@astro-page:/alpha", "@astro-page:/zeta"]);
        assert_eq!(report.modules[0].resolved_id.as_str(), "\0@astro-page:/alpha");
        assert!(report.is_complete());
    }

    #[tokio::test]
    async fn server_plan_has_no_entries() {
        let registry =
            crate::PageRegistry::from_pages([("/a", crate::PageMetadata::new("./a"))]).unwrap();
        let config = crate::PagesConfig::default().with_output(OutputMode::Server);
        let plugin = PagesPlugin::new(registry, config, AnyResolver).unwrap();
        let report = execute_plan(&plugin).await.unwrap();
        assert!(report.entries.is_empty());
        assert!(report.modules.is_empty());
    }

    #[test]
    fn hash_is_eight_hex_chars() {
        let hash = stable_hash_8("/blog");
        assert_eq!(hash.len(), 8);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
