//! Build configuration consumed by the pages plugin.

use serde::{Deserialize, Serialize};

use crate::utils::{PageNamespace, ASTRO_PAGE_MODULE_ID, MIDDLEWARE_MODULE_ID, RENDERERS_MODULE_ID};
use crate::{OutputMode, PagesError};

/// Pages plugin configuration.
///
/// # Example
/// ```json
/// { "output": "static", "middleware": true }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct PagesConfig {
    /// Static output makes every page a bundler entry.
    pub output: OutputMode,
    /// Compose the shared middleware into every page module.
    pub middleware: bool,
    /// Prefix of page virtual ids.
    pub page_prefix: String,
    /// Module id of the shared renderer bundle.
    pub renderers_module_id: String,
    /// Module id of the shared middleware bundle.
    pub middleware_module_id: String,
    /// Mask page extensions inside virtual ids.
    pub mask_extensions: bool,
}

impl Default for PagesConfig {
    fn default() -> Self {
        Self {
            output: OutputMode::Static,
            middleware: false,
            page_prefix: ASTRO_PAGE_MODULE_ID.to_string(),
            renderers_module_id: RENDERERS_MODULE_ID.to_string(),
            middleware_module_id: MIDDLEWARE_MODULE_ID.to_string(),
            mask_extensions: false,
        }
    }
}

impl PagesConfig {
    pub fn with_output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }

    pub fn with_middleware(mut self, enabled: bool) -> Self {
        self.middleware = enabled;
        self
    }

    /// The identifier codec described by this config.
    pub fn namespace(&self) -> Result<PageNamespace, PagesError> {
        Ok(PageNamespace::new(&self.page_prefix)?.with_extension_masking(self.mask_extensions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = PagesConfig::default();
        assert_eq!(config.output, OutputMode::Static);
        assert!(!config.middleware);
        assert_eq!(config.renderers_module_id, "@astro-renderers");
        assert_eq!(config.middleware_module_id, "@astro-middleware");
        assert_eq!(config.namespace().unwrap(), PageNamespace::default());
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config: PagesConfig =
            serde_json::from_str(r#"{ "output": "server", "middleware": true }"#).unwrap();
        assert_eq!(config.output, OutputMode::Server);
        assert!(config.middleware);
        assert_eq!(config.page_prefix, "@astro-page:");
    }

    #[test]
    fn unknown_field_rejected() {
        let err = serde_json::from_str::<PagesConfig>(r#"{ "outputs": "static" }"#).unwrap_err();
        assert!(err.to_string().contains("unknown field"));
    }

    #[test]
    fn unknown_output_rejected() {
        assert!(serde_json::from_str::<PagesConfig>(r#"{ "output": "hybrid" }"#).is_err());
    }

    #[test]
    fn invalid_prefix() {
        let config = PagesConfig {
            page_prefix: String::new(),
            ..Default::default()
        };
        assert!(matches!(config.namespace(), Err(PagesError::InvalidPrefix(_))));
    }
}
